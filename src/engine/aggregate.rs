//! Folding raw samples into per-bucket counts and weighted average speeds.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::engine::bucket::Calendar;
use crate::engine::types::{AggregateValue, Bucket, Measurement, Mode, SeriesKey};
use crate::samples::RawSample;

/// Running state of a single bucket while samples are folded in.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateState {
    Count {
        count: u64,
    },
    Speed {
        count_sum: u64,
        speed_sum: f64,
        average: f64,
    },
}

impl AggregateState {
    pub fn new(measurement: Measurement) -> Self {
        match measurement {
            Measurement::Count => AggregateState::Count { count: 0 },
            Measurement::AverageSpeed => AggregateState::Speed {
                count_sum: 0,
                speed_sum: 0.0,
                average: 0.0,
            },
        }
    }

    /// Folds one sample in. Callers must skip speed samples without an
    /// observed speed, see [`contributes`].
    fn fold(&mut self, sample: &RawSample, mode: Mode) {
        let count = sample.counts.get(mode);
        match self {
            AggregateState::Count { count: total } => *total += count,
            AggregateState::Speed {
                count_sum,
                speed_sum,
                average,
            } => {
                let speed = sample.observed_speed(mode).unwrap_or(0.0);
                *count_sum += count;
                *speed_sum += speed * count as f64;
                if *count_sum > 0 {
                    *average = round2(*speed_sum / *count_sum as f64);
                }
            }
        }
    }

    pub fn value(&self) -> AggregateValue {
        match self {
            AggregateState::Count { count } => AggregateValue::Count(*count),
            AggregateState::Speed { average, .. } => AggregateValue::Speed(*average),
        }
    }
}

/// Whether `sample` feeds a bucket of `key` at all.
fn contributes(sample: &RawSample, key: &SeriesKey) -> bool {
    if sample.camera_id != key.scope.camera_id || !key.scope.zone.matches(&sample.zone_name) {
        return false;
    }
    match key.measurement {
        Measurement::Count => true,
        Measurement::AverageSpeed => sample.observed_speed(key.mode).is_some(),
    }
}

/// Rounds to two decimals, ties to even on the exact binary value.
///
/// Float formatting rounds the exact value, so 36.125 becomes 36.12 while
/// 10.675 (stored slightly below) becomes 10.67.
fn round2(value: f64) -> f64 {
    format!("{value:.2}").parse().unwrap_or(value)
}

/// Folds `samples` into the buckets of `key`, keyed by bucket start.
///
/// Buckets that receive no contributing sample are absent from the result.
pub fn aggregate(
    samples: &[RawSample],
    key: &SeriesKey,
    calendar: &Calendar,
) -> BTreeMap<DateTime<Utc>, Bucket> {
    let mut states: BTreeMap<DateTime<Utc>, AggregateState> = BTreeMap::new();

    for sample in samples.iter().filter(|s| contributes(s, key)) {
        let start = calendar.bucket_start(sample.timestamp, key.interval);
        states
            .entry(start)
            .or_insert_with(|| AggregateState::new(key.measurement))
            .fold(sample, key.mode);
    }

    states
        .into_iter()
        .map(|(start, state)| {
            let bucket = Bucket {
                start,
                end: calendar.bucket_end(start, key.interval),
                value: state.value(),
            };
            (start, bucket)
        })
        .collect()
}
