//! Credential decorators for [`crate::fetch::HttpClient`].
//!
//! [`ApiKey`] sets an authorization header such as a bearer token;
//! [`BasicAuth`] sends HTTP basic credentials. Both validate their header at
//! construction so executing a request cannot fail on a bad credential.

mod api_key;
mod basic_auth;

pub use api_key::ApiKey;
pub use basic_auth::BasicAuth;

use crate::error::Result;

/// Supplies a currently valid access token.
#[async_trait::async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}
