use async_trait::async_trait;

use crate::error::{Result, SyncError};
use crate::fetch::{HttpClient, get_json, post_json};
use crate::services::catalog_api::{BatchRequest, BatchResponse, CatalogApi, Page};

/// [`CatalogApi`] backed by a FROST SensorThings server.
pub struct FrostClient {
    base_url: String,
    http: Box<dyn HttpClient>,
}

impl FrostClient {
    pub fn new(base_url: &str, http: Box<dyn HttpClient>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    fn batch_url(&self) -> String {
        format!("{}/$batch", self.base_url)
    }
}

#[async_trait]
impl CatalogApi for FrostClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_page(&self, url: &str) -> Result<Page> {
        get_json(self.http.as_ref(), url)
            .await
            .map_err(|e| SyncError::fetch(url, format!("{e:#}")))
    }

    #[tracing::instrument(skip(self, batch), fields(size = batch.requests.len()))]
    async fn post_batch(&self, batch: &BatchRequest) -> Result<BatchResponse> {
        post_json(self.http.as_ref(), &self.batch_url(), batch)
            .await
            .map_err(|e| SyncError::BatchTransport {
                size: batch.requests.len(),
                reason: format!("{e:#}"),
            })
    }
}
