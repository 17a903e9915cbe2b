//! Read-only view of the cameras and datastreams published in the catalog.
//!
//! Creating or updating things and datastreams is handled elsewhere; this
//! module only maps what exists onto [`SeriesKey`]s.

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::engine::types::{
    EntityId, IntervalKind, Measurement, Mode, Scope, Series, SeriesKey, Zone,
};
use crate::error::{Result, SyncError};
use crate::services::catalog_api::{CatalogApi, collect_pages};

/// A camera thing and the series published for it.
#[derive(Debug, Clone)]
pub struct Camera {
    pub thing_id: EntityId,
    pub camera_id: String,
    pub series: Vec<Series>,
}

impl Camera {
    pub fn series_for<'a>(
        &'a self,
        intervals: &'a [IntervalKind],
    ) -> impl Iterator<Item = &'a Series> + 'a {
        self.series
            .iter()
            .filter(move |s| intervals.contains(&s.key.interval))
    }
}

#[derive(Deserialize)]
struct ThingRecord {
    #[serde(rename = "@iot.id")]
    id: EntityId,
    #[serde(default)]
    properties: ThingProperties,
    #[serde(rename = "Datastreams", default)]
    datastreams: Vec<serde_json::Value>,
    #[serde(rename = "Datastreams@iot.nextLink", default)]
    datastreams_next_link: Option<String>,
}

#[derive(Deserialize, Default)]
struct ThingProperties {
    #[serde(rename = "cameraId")]
    camera_id: Option<String>,
}

#[derive(Deserialize)]
struct DatastreamRecord {
    #[serde(rename = "@iot.id")]
    id: EntityId,
    properties: DatastreamProperties,
}

#[derive(Deserialize)]
struct DatastreamProperties {
    #[serde(rename = "periodLength")]
    period_length: IntervalKind,
    lane: String,
    vehicle: Mode,
    measurement: Measurement,
}

fn things_url(base_url: &str) -> Result<String> {
    let path = format!("{}/Things", base_url.trim_end_matches('/'));
    reqwest::Url::parse_with_params(&path, &[("$expand", "Datastreams")])
        .map(|u| u.to_string())
        .map_err(|e| SyncError::InvalidUrl(format!("{path}: {e}")))
}

fn to_series(camera_id: &str, value: serde_json::Value) -> Option<Series> {
    match serde_json::from_value::<DatastreamRecord>(value) {
        Ok(record) => Some(Series {
            key: SeriesKey {
                scope: Scope {
                    camera_id: camera_id.to_string(),
                    zone: Zone::from_code(&record.properties.lane),
                },
                mode: record.properties.vehicle,
                measurement: record.properties.measurement,
                interval: record.properties.period_length,
            },
            datastream_id: record.id,
        }),
        Err(e) => {
            warn!(camera_id, error = %e, "Skipping datastream without usable properties");
            None
        }
    }
}

/// Loads every camera thing with all of its datastreams.
///
/// Both the thing collection and each thing's expanded datastream list are
/// paginated; all pages are followed.
#[tracing::instrument(skip(api))]
pub async fn load_cameras<A: CatalogApi + ?Sized>(api: &A) -> Result<Vec<Camera>> {
    let url = things_url(api.base_url())?;
    let things = collect_pages(api, &url).await?;

    let mut cameras = Vec::with_capacity(things.len());
    for value in things {
        let mut thing: ThingRecord = serde_json::from_value(value)
            .map_err(|e| SyncError::fetch(&url, format!("malformed thing: {e}")))?;

        let Some(camera_id) = thing.properties.camera_id.take() else {
            warn!(thing = %thing.id, "Skipping thing without cameraId");
            continue;
        };

        if let Some(next) = thing.datastreams_next_link.take() {
            let more = collect_pages(api, &next).await?;
            debug!(camera_id, extra = more.len(), "Followed datastream pagination");
            thing.datastreams.extend(more);
        }

        let series: Vec<Series> = thing
            .datastreams
            .into_iter()
            .filter_map(|ds| to_series(&camera_id, ds))
            .collect();

        cameras.push(Camera {
            thing_id: thing.id,
            camera_id,
            series,
        });
    }

    info!(
        cameras = cameras.len(),
        series = cameras.iter().map(|c| c.series.len()).sum::<usize>(),
        "Series registry loaded"
    );
    Ok(cameras)
}
