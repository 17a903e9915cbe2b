use crate::fetch::client::HttpClient;
use async_trait::async_trait;
use base64::Engine;
use reqwest::header::{AUTHORIZATION, HeaderValue, InvalidHeaderValue};

/// An [`HttpClient`] wrapper that sends HTTP basic credentials.
pub struct BasicAuth<C> {
    inner: C,
    value: HeaderValue,
}

impl<C> BasicAuth<C> {
    pub fn new(inner: C, user: &str, password: &str) -> Result<Self, InvalidHeaderValue> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{user}:{password}"));
        let mut value = HeaderValue::from_str(&format!("Basic {encoded}"))?;
        value.set_sensitive(true);
        Ok(Self { inner, value })
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for BasicAuth<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        req.headers_mut().insert(AUTHORIZATION, self.value.clone());
        self.inner.execute(req).await
    }
}
