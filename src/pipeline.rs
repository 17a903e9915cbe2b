//! Import passes: load the registry, pull telemetry per camera, reconcile
//! every matching series and dispatch the resulting operations.

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use tracing::{debug, info, warn};

use crate::engine::bucket::Calendar;
use crate::engine::dispatch::{DispatchLimits, DispatchReport, Dispatcher};
use crate::engine::reconcile::reconcile_series;
use crate::engine::types::IntervalKind;
use crate::error::{Result, SyncError};
use crate::registry::load_cameras;
use crate::services::catalog_api::CatalogApi;
use crate::services::telemetry_api::TelemetrySource;

pub const SHORT_INTERVALS: [IntervalKind; 2] = [IntervalKind::FiveMinutes, IntervalKind::Hourly];
pub const DAILY_INTERVALS: [IntervalKind; 1] = [IntervalKind::Daily];
pub const LONG_INTERVALS: [IntervalKind; 3] = [
    IntervalKind::Weekly,
    IntervalKind::Monthly,
    IntervalKind::Yearly,
];

/// Everything a pass needs. Built once at startup and passed by reference.
pub struct SyncContext {
    pub catalog: Box<dyn CatalogApi>,
    pub telemetry: Box<dyn TelemetrySource>,
    pub calendar: Calendar,
    pub limits: DispatchLimits,
}

/// Totals of one or more import passes.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub cameras: usize,
    pub series: usize,
    pub samples: usize,
    pub report: DispatchReport,
}

impl RunSummary {
    fn absorb(&mut self, other: RunSummary) {
        self.cameras += other.cameras;
        self.series += other.series;
        self.samples += other.samples;
        self.report.batches_sent += other.report.batches_sent;
        self.report.operations_sent += other.report.operations_sent;
        self.report.rejected.extend(other.report.rejected);
        self.report.failed_batches.extend(other.report.failed_batches);
    }

    /// Turns rejected operations or failed batches into
    /// [`SyncError::Incomplete`].
    pub fn into_result(self) -> Result<Self> {
        if self.report.is_clean() {
            Ok(self)
        } else {
            Err(SyncError::Incomplete {
                rejected: self.report.rejected.len(),
                failed_batches: self.report.failed_batches.len(),
            })
        }
    }
}

/// UTC midnight of the day containing `instant`.
pub fn utc_day_start(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Earliest bucket start any of `intervals` reaches back to from `since`.
///
/// Local-calendar buckets can start before the UTC day of `since`, so the
/// telemetry window has to begin here for those buckets to be complete.
pub fn window_start(
    calendar: &Calendar,
    since: DateTime<Utc>,
    intervals: &[IntervalKind],
) -> DateTime<Utc> {
    intervals
        .iter()
        .map(|&kind| calendar.bucket_start(since, kind))
        .min()
        .map_or(since, |start| start.min(since))
}

/// Reconciles every series whose interval is in `intervals`, from the bucket
/// containing the UTC day start of `since` up to now.
///
/// Telemetry is fetched once per camera, covering every bucket that is
/// reconciled. A failed read aborts the pass; operations computed before the
/// failure are still submitted.
#[tracing::instrument(skip(ctx), fields(tz = %ctx.calendar.timezone()))]
pub async fn import_observations(
    ctx: &SyncContext,
    since: DateTime<Utc>,
    intervals: &[IntervalKind],
) -> Result<RunSummary> {
    let since = utc_day_start(since);
    let from = window_start(&ctx.calendar, since, intervals).date_naive();
    let to = Utc::now().date_naive().max(from);

    let cameras = load_cameras(ctx.catalog.as_ref()).await?;
    let mut summary = RunSummary::default();
    let mut dispatcher = Dispatcher::new(ctx.catalog.as_ref(), ctx.limits);

    let outcome: Result<()> = async {
        for camera in &cameras {
            let series: Vec<_> = camera.series_for(intervals).collect();
            if series.is_empty() {
                debug!(camera_id = %camera.camera_id, "No series to import");
                continue;
            }

            let samples = ctx
                .telemetry
                .fetch_samples(from, to, &camera.camera_id)
                .await?;
            summary.cameras += 1;
            summary.samples += samples.len();

            for s in series {
                let operations =
                    reconcile_series(ctx.catalog.as_ref(), s, &samples, since, &ctx.calendar)
                        .await?;
                summary.series += 1;
                dispatcher.push(operations).await;
            }
            debug!(
                camera_id = %camera.camera_id,
                samples = samples.len(),
                pending = dispatcher.pending(),
                "Camera reconciled"
            );
        }
        Ok(())
    }
    .await;

    summary.report = dispatcher.finish().await;
    if let Err(e) = outcome {
        warn!(error = %e, sent = summary.report.operations_sent, "Import pass aborted");
        return Err(e);
    }

    info!(
        cameras = summary.cameras,
        series = summary.series,
        samples = summary.samples,
        operations = summary.report.operations_sent,
        rejected = summary.report.rejected.len(),
        failed_batches = summary.report.failed_batches.len(),
        "Import pass finished"
    );
    Ok(summary)
}

/// The frequent pass: 5-minute and hourly series over the last two hours,
/// then daily series over the last two days.
pub async fn short_run(ctx: &SyncContext, now: DateTime<Utc>) -> Result<RunSummary> {
    let mut summary =
        import_observations(ctx, now - TimeDelta::hours(2), &SHORT_INTERVALS).await?;
    summary.absorb(import_observations(ctx, now - TimeDelta::days(2), &DAILY_INTERVALS).await?);
    Ok(summary)
}

/// The nightly pass: weekly, monthly and yearly series since `start`.
pub async fn long_run(ctx: &SyncContext, start: DateTime<Utc>) -> Result<RunSummary> {
    import_observations(ctx, start, &LONG_INTERVALS).await
}

/// Rebuilds every interval kind since `start`.
pub async fn archive(ctx: &SyncContext, start: DateTime<Utc>) -> Result<RunSummary> {
    import_observations(ctx, start, &IntervalKind::ALL).await
}
