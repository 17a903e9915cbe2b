//! Diffing fresh buckets against published observations.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::engine::aggregate::aggregate;
use crate::engine::bucket::Calendar;
use crate::engine::existing::{ExistingState, PhenomenonRange, fetch_existing};
use crate::engine::types::{Bucket, EntityId, Operation, Series};
use crate::error::Result;
use crate::samples::RawSample;
use crate::services::catalog_api::CatalogApi;

/// Compares fresh buckets with what the catalog already holds.
///
/// A bucket without a published counterpart becomes a create; one whose
/// stored result differs (exact `f64` equality) becomes an update; an equal
/// one produces nothing.
pub fn diff<I>(datastream_id: &EntityId, buckets: I, existing: &ExistingState) -> Vec<Operation>
where
    I: IntoIterator<Item = Bucket>,
{
    buckets
        .into_iter()
        .filter_map(|bucket| {
            let range = PhenomenonRange::new(bucket.start, bucket.end);
            match existing.get(&range) {
                None => Some(Operation::Create {
                    datastream_id: datastream_id.clone(),
                    bucket,
                }),
                Some(observation) if observation.result != Some(bucket.value.as_f64()) => {
                    Some(Operation::Update {
                        existing_id: observation.id.clone(),
                        bucket,
                    })
                }
                Some(_) => None,
            }
        })
        .collect()
}

/// Aggregates `samples` for `series` and returns the operations needed to
/// bring its datastream in line, in ascending bucket order.
///
/// Published state is loaded from the bucket containing `since` onward;
/// buckets starting earlier are left alone since there is nothing to compare
/// them with.
#[tracing::instrument(
    skip(api, series, samples, calendar),
    fields(datastream = %series.datastream_id, interval = %series.key.interval, mode = %series.key.mode)
)]
pub async fn reconcile_series<A: CatalogApi + ?Sized>(
    api: &A,
    series: &Series,
    samples: &[RawSample],
    since: DateTime<Utc>,
    calendar: &Calendar,
) -> Result<Vec<Operation>> {
    let lower_bound = calendar.bucket_start(since, series.key.interval);
    let mut buckets = aggregate(samples, &series.key, calendar);
    let fresh = buckets.split_off(&lower_bound);
    if !buckets.is_empty() {
        debug!(skipped = buckets.len(), "Ignoring buckets before the lower bound");
    }
    if fresh.is_empty() {
        return Ok(Vec::new());
    }

    let existing = fetch_existing(api, &series.datastream_id, lower_bound).await?;
    let operations = diff(&series.datastream_id, fresh.into_values(), &existing);
    debug!(
        published = existing.len(),
        operations = operations.len(),
        "Series reconciled"
    );
    Ok(operations)
}
