use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::fetch::auth::{ApiKey, TokenSource};
use crate::fetch::{HttpClient, get_json};
use crate::samples::{RawSample, TelemetryRecord};
use crate::services::telemetry_api::TelemetrySource;

const DAY_FORMAT: &str = "%Y-%m-%d";

/// [`TelemetrySource`] for the thermal camera data API.
///
/// Every call asks `tokens` for a fresh bearer token.
pub struct ThermiCamClient<T> {
    url: String,
    http: Box<dyn HttpClient>,
    tokens: T,
}

impl<T: TokenSource> ThermiCamClient<T> {
    pub fn new(url: &str, http: Box<dyn HttpClient>, tokens: T) -> Self {
        Self {
            url: url.to_string(),
            http,
            tokens,
        }
    }

    /// Query for whole UTC days `from..=to` of one camera.
    pub fn samples_url(&self, from: NaiveDate, to: NaiveDate, camera_id: &str) -> Result<String> {
        let from = from.format(DAY_FORMAT).to_string();
        let to = to.format(DAY_FORMAT).to_string();
        let params = [
            ("fromDay", from.as_str()),
            ("toDay", to.as_str()),
            ("fromHour", "0"),
            ("toHour", "23"),
            ("fromMinute", "0"),
            ("toMinute", "59"),
            ("ids", camera_id),
        ];
        reqwest::Url::parse_with_params(&self.url, &params)
            .map(|u| u.to_string())
            .map_err(|e| SyncError::InvalidUrl(format!("{}: {e}", self.url)))
    }
}

#[async_trait]
impl<T: TokenSource> TelemetrySource for ThermiCamClient<T> {
    #[tracing::instrument(skip(self), fields(from = %from, to = %to))]
    async fn fetch_samples(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        camera_id: &str,
    ) -> Result<Vec<RawSample>> {
        let url = self.samples_url(from, to, camera_id)?;
        let token = self.tokens.access_token().await?;
        let client = ApiKey::bearer(self.http.as_ref(), &token)
            .map_err(|e| SyncError::fetch(&url, format!("unusable access token: {e}")))?;

        let records: Vec<TelemetryRecord> = get_json(&client, &url)
            .await
            .map_err(|e| SyncError::fetch(&url, format!("{e:#}")))?;

        debug!(records = records.len(), "Telemetry received");
        Ok(records.into_iter().map(RawSample::from).collect())
    }
}
