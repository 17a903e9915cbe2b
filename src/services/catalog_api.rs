//! Trait and wire types for talking to a SensorThings observation catalog.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// One page of a paginated collection.
///
/// The catalog returns `{ "value": [...], "@iot.nextLink": "..." }`; the link
/// is absent on the last page.
#[derive(Debug, Default, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub value: Vec<serde_json::Value>,
    #[serde(rename = "@iot.nextLink", default)]
    pub next_link: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchMethod {
    Post,
    Patch,
}

/// A single request inside a `$batch` call. `url` is relative to the
/// service root.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchEntry {
    pub id: String,
    pub method: BatchMethod,
    pub url: String,
    pub body: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchRequest {
    pub requests: Vec<BatchEntry>,
}

/// Outcome of one entry. Entries are correlated by `id`, not by position.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchEntryResponse {
    #[serde(default)]
    pub id: String,
    pub status: u16,
    #[serde(default)]
    pub body: serde_json::Value,
}

impl BatchEntryResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchResponse {
    #[serde(default)]
    pub responses: Vec<BatchEntryResponse>,
}

/// Abstraction over the catalog server (e.g., a FROST instance).
#[async_trait::async_trait]
pub trait CatalogApi: Send + Sync {
    /// Service root, e.g. `https://frost.example.org/FROST-Server/v1.1`.
    fn base_url(&self) -> &str;

    /// Fetches one page from an absolute URL. Non-success responses are
    /// returned as [`crate::error::SyncError::TransientFetch`].
    async fn get_page(&self, url: &str) -> Result<Page>;

    /// Submits one `$batch` transaction. Failure of the call itself is
    /// returned as [`crate::error::SyncError::BatchTransport`].
    async fn post_batch(&self, batch: &BatchRequest) -> Result<BatchResponse>;
}

/// Fetches `url` and every page reachable through `@iot.nextLink`,
/// concatenating the `value` arrays in page order.
///
/// Any failing page aborts the whole collection; partial results are never
/// returned. A `nextLink` leading back to an already fetched page is an error.
pub async fn collect_pages<A: CatalogApi + ?Sized>(
    api: &A,
    url: &str,
) -> Result<Vec<serde_json::Value>> {
    let mut values = Vec::new();
    let mut visited = HashSet::new();
    let mut next = Some(url.to_string());

    while let Some(current) = next {
        if !visited.insert(current.clone()) {
            return Err(SyncError::fetch(current, "nextLink leads back to a fetched page"));
        }
        let page = api.get_page(&current).await?;
        values.extend(page.value);
        next = page.next_link;
    }

    tracing::debug!(url, pages = visited.len(), entries = values.len(), "Collection fetched");
    Ok(values)
}
