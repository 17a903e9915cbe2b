//! Trait for the upstream telemetry provider.

use chrono::NaiveDate;

use crate::error::Result;
use crate::samples::RawSample;

/// Source of raw samples, queried per camera and UTC day range.
#[async_trait::async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Returns every sample of `camera_id` recorded between the start of
    /// `from` and the end of `to` (both inclusive, UTC days).
    async fn fetch_samples(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        camera_id: &str,
    ) -> Result<Vec<RawSample>>;
}
