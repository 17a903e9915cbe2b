//! Loading of already published observations.

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::engine::types::EntityId;
use crate::error::{Result, SyncError};
use crate::services::catalog_api::{CatalogApi, collect_pages};

const CANONICAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
const FILTER_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// A phenomenonTime interval normalized to whole UTC seconds.
///
/// Two renderings of the same interval (`Z`, `+01:00`, no zone, with or
/// without fractional seconds) produce equal values. [`fmt::Display`] gives
/// the canonical `start/end` string that is also sent on create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhenomenonRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl PhenomenonRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: start.trunc_subsecs(0),
            end: end.trunc_subsecs(0),
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }
}

impl fmt::Display for PhenomenonRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}",
            self.start.format(CANONICAL_FORMAT),
            self.end.format(CANONICAL_FORMAT)
        )
    }
}

impl FromStr for PhenomenonRange {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (start, end) = match s.split_once('/') {
            Some((start, end)) => (start, end),
            None => (s, s),
        };
        let start = parse_instant(start).ok_or_else(|| format!("bad start in '{s}'"))?;
        let end = parse_instant(end).ok_or_else(|| format!("bad end in '{s}'"))?;
        Ok(Self::new(start, end))
    }
}

/// Parses an ISO 8601 instant; strings without a zone are read as UTC.
fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExistingObservation {
    pub id: EntityId,
    pub range: PhenomenonRange,
    /// `None` when the stored result is not a number.
    pub result: Option<f64>,
}

#[derive(Deserialize)]
struct ObservationRecord {
    #[serde(rename = "@iot.id")]
    id: EntityId,
    #[serde(rename = "phenomenonTime")]
    phenomenon_time: String,
    #[serde(default)]
    result: serde_json::Value,
}

/// Published observations of one datastream, looked up by interval.
pub type ExistingState = HashMap<PhenomenonRange, ExistingObservation>;

/// Builds the observations query of `datastream_id` for everything whose
/// phenomenonTime starts at or after `since`.
pub fn observations_url(
    base_url: &str,
    datastream_id: &EntityId,
    since: DateTime<Utc>,
) -> Result<String> {
    let path = format!(
        "{}/Datastreams({})/Observations",
        base_url.trim_end_matches('/'),
        datastream_id.path_segment()
    );
    let filter = format!("not phenomenonTime lt {}", since.format(FILTER_FORMAT));
    let url = reqwest::Url::parse_with_params(&path, &[("$filter", filter.as_str()), ("$count", "false")])
        .map_err(|e| SyncError::InvalidUrl(format!("{path}: {e}")))?;
    Ok(url.to_string())
}

/// Loads every observation of `datastream_id` starting at or after `since`,
/// following pagination to the end.
#[tracing::instrument(skip(api), fields(datastream = %datastream_id, since = %since))]
pub async fn fetch_existing<A: CatalogApi + ?Sized>(
    api: &A,
    datastream_id: &EntityId,
    since: DateTime<Utc>,
) -> Result<ExistingState> {
    let url = observations_url(api.base_url(), datastream_id, since)?;
    let values = collect_pages(api, &url).await?;

    let mut state = ExistingState::with_capacity(values.len());
    for value in values {
        let record: ObservationRecord = match serde_json::from_value(value) {
            Ok(record) => record,
            Err(e) => return Err(SyncError::fetch(&url, format!("malformed observation: {e}"))),
        };
        let range = match record.phenomenon_time.parse::<PhenomenonRange>() {
            Ok(range) => range,
            Err(e) => {
                warn!(observation = %record.id, error = %e, "Skipping observation with unreadable phenomenonTime");
                continue;
            }
        };
        state.insert(
            range,
            ExistingObservation {
                id: record.id,
                range,
                result: record.result.as_f64(),
            },
        );
    }

    debug!(observations = state.len(), "Existing observations loaded");
    Ok(state)
}
