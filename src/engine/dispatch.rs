//! Batched submission of operations to the catalog.

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::engine::existing::PhenomenonRange;
use crate::engine::types::Operation;
use crate::error::{Rejection, SyncError};
use crate::services::catalog_api::{BatchEntry, BatchMethod, BatchRequest, CatalogApi};

const RESULT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// When to flush and how large a single `$batch` call may get.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchLimits {
    /// Pending operations that trigger a flush.
    pub soft_threshold: usize,
    /// Maximum operations per batch request.
    pub hard_cap: usize,
}

impl Default for DispatchLimits {
    fn default() -> Self {
        Self {
            soft_threshold: 1000,
            hard_cap: 500,
        }
    }
}

/// What happened to the operations of a run.
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub batches_sent: usize,
    pub operations_sent: usize,
    pub rejected: Vec<Rejection>,
    pub failed_batches: Vec<SyncError>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty() && self.failed_batches.is_empty()
    }
}

/// Renders one operation as a `$batch` entry.
pub fn to_batch_entry(operation: &Operation, result_time: DateTime<Utc>) -> BatchEntry {
    let result_time = result_time.format(RESULT_TIME_FORMAT).to_string();
    match operation {
        Operation::Create {
            datastream_id,
            bucket,
        } => BatchEntry {
            id: format!("{}_{}", datastream_id, bucket.start.to_rfc3339()),
            method: BatchMethod::Post,
            url: format!("Datastreams({})/Observations", datastream_id.path_segment()),
            body: json!({
                "phenomenonTime": PhenomenonRange::new(bucket.start, bucket.end).to_string(),
                "resultTime": result_time,
                "result": bucket.value,
            }),
        },
        Operation::Update {
            existing_id,
            bucket,
        } => BatchEntry {
            id: existing_id.to_string(),
            method: BatchMethod::Patch,
            url: format!("Observations({})", existing_id.path_segment()),
            body: json!({
                "resultTime": result_time,
                "result": bucket.value,
            }),
        },
    }
}

/// Collects operations across series and sends them in bounded batches.
///
/// Each batch is an independent transaction. Nothing is retried: a rejected
/// operation or failed batch stays divergent and is picked up again by the
/// next run.
pub struct Dispatcher<'a, A: CatalogApi + ?Sized> {
    api: &'a A,
    limits: DispatchLimits,
    pending: Vec<Operation>,
    report: DispatchReport,
}

impl<'a, A: CatalogApi + ?Sized> Dispatcher<'a, A> {
    pub fn new(api: &'a A, limits: DispatchLimits) -> Self {
        Self {
            api,
            limits: DispatchLimits {
                soft_threshold: limits.soft_threshold.max(1),
                hard_cap: limits.hard_cap.max(1),
            },
            pending: Vec::new(),
            report: DispatchReport::default(),
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Queues `operations`, flushing once the soft threshold is reached.
    pub async fn push<I: IntoIterator<Item = Operation>>(&mut self, operations: I) {
        self.pending.extend(operations);
        if self.pending.len() >= self.limits.soft_threshold {
            self.flush().await;
        }
    }

    /// Sends everything pending, oldest first, in chunks of at most
    /// `hard_cap` operations.
    pub async fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.pending);
        let result_time = Utc::now();
        debug!(operations = pending.len(), "Flushing operations");

        for chunk in pending.chunks(self.limits.hard_cap) {
            self.send_batch(chunk, result_time).await;
        }
    }

    /// Flushes the remainder and returns the report of the whole run.
    pub async fn finish(mut self) -> DispatchReport {
        self.flush().await;
        self.report
    }

    async fn send_batch(&mut self, operations: &[Operation], result_time: DateTime<Utc>) {
        let request = BatchRequest {
            requests: operations
                .iter()
                .map(|op| to_batch_entry(op, result_time))
                .collect(),
        };
        let size = request.requests.len();

        let response = match self.api.post_batch(&request).await {
            Ok(response) => response,
            Err(e) => {
                error!(size, error = %e, "Batch request failed");
                let failure = if matches!(e, SyncError::BatchTransport { .. }) {
                    e
                } else {
                    SyncError::BatchTransport {
                        size,
                        reason: e.to_string(),
                    }
                };
                self.report.failed_batches.push(failure);
                return;
            }
        };

        self.report.batches_sent += 1;
        self.report.operations_sent += size;

        if response.responses.len() != size {
            warn!(
                submitted = size,
                answered = response.responses.len(),
                "Batch response count does not match request count"
            );
        }

        for entry in response.responses.iter().filter(|r| !r.is_success()) {
            let body = match &entry.body {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            warn!(id = %entry.id, status = entry.status, body = %body, "Operation rejected");
            self.report.rejected.push(Rejection {
                id: entry.id.clone(),
                status: entry.status,
                body,
            });
        }

        info!(size, batches = self.report.batches_sent, "Batch submitted");
    }
}

/// Sends `operations` as a one-off run of batches.
pub async fn dispatch<A: CatalogApi + ?Sized>(
    api: &A,
    limits: DispatchLimits,
    operations: Vec<Operation>,
) -> DispatchReport {
    let mut dispatcher = Dispatcher::new(api, limits);
    dispatcher.push(operations).await;
    dispatcher.finish().await
}
