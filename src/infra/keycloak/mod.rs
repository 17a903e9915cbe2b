//! OAuth2 client-credentials tokens from a Keycloak realm.

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;

use crate::error::{Result, SyncError};
use crate::fetch::auth::TokenSource;
use crate::fetch::{FORM_CONTENT_TYPE, HttpClient, execute_json, request_with_body};

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Exchanges client id and secret for an access token on every call.
pub struct KeycloakTokenSource {
    token_url: String,
    client_id: String,
    client_secret: String,
    http: Box<dyn HttpClient>,
}

impl KeycloakTokenSource {
    pub fn new(
        server_url: &str,
        realm: &str,
        client_id: &str,
        client_secret: &str,
        http: Box<dyn HttpClient>,
    ) -> Self {
        Self {
            token_url: token_url(server_url, realm),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            http,
        }
    }

    fn form(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "client_credentials")
            .append_pair("client_id", &self.client_id)
            .append_pair("client_secret", &self.client_secret)
            .finish()
    }
}

fn token_url(server_url: &str, realm: &str) -> String {
    format!(
        "{}/realms/{}/protocol/openid-connect/token",
        server_url.trim_end_matches('/'),
        realm
    )
}

#[async_trait]
impl TokenSource for KeycloakTokenSource {
    async fn access_token(&self) -> Result<String> {
        let req = request_with_body(
            Method::POST,
            &self.token_url,
            FORM_CONTENT_TYPE,
            self.form().into_bytes(),
        )
        .map_err(|e| SyncError::InvalidUrl(format!("{e:#}")))?;

        let token: TokenResponse = execute_json(self.http.as_ref(), req)
            .await
            .map_err(|e| SyncError::fetch(&self.token_url, format!("token exchange failed: {e:#}")))?;

        Ok(token.access_token)
    }
}
