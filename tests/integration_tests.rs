use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Value, json};
use traffic_sync::engine::bucket::Calendar;
use traffic_sync::engine::dispatch::DispatchLimits;
use traffic_sync::engine::types::Mode;
use traffic_sync::error::{Result, SyncError};
use traffic_sync::pipeline::{self, RunSummary, SyncContext};
use traffic_sync::samples::{ModeTable, RawSample, SPEED_NOT_OBSERVED};
use traffic_sync::services::catalog_api::{
    BatchEntryResponse, BatchMethod, BatchRequest, BatchResponse, CatalogApi, Page,
};
use traffic_sync::services::telemetry_api::TelemetrySource;

const BASE: &str = "http://frost/v1.1";
const PAGE_SIZE: usize = 2;

#[derive(Debug, Clone)]
struct StoredObservation {
    id: i64,
    datastream: i64,
    phenomenon_time: String,
    result: Value,
}

#[derive(Default)]
struct FrostState {
    observations: Vec<StoredObservation>,
    next_id: i64,
    posts: usize,
    patches: usize,
    reject_datastream: Option<i64>,
}

/// In-memory FROST server: serves things and observations in pages of
/// [`PAGE_SIZE`] and applies `$batch` creates and patches.
#[derive(Clone, Default)]
struct FakeFrost {
    state: Arc<Mutex<FrostState>>,
}

impl FakeFrost {
    fn seed(&self, datastream: i64, phenomenon_time: &str, result: Value) {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = 1000 + state.next_id;
        state.observations.push(StoredObservation {
            id,
            datastream,
            phenomenon_time: phenomenon_time.to_string(),
            result,
        });
    }

    fn result_of(&self, datastream: i64, phenomenon_time: &str) -> Option<Value> {
        let state = self.state.lock().unwrap();
        state
            .observations
            .iter()
            .find(|o| o.datastream == datastream && o.phenomenon_time == phenomenon_time)
            .map(|o| o.result.clone())
    }

    fn counts(&self) -> (usize, usize) {
        let state = self.state.lock().unwrap();
        (state.posts, state.patches)
    }
}

fn datastream(id: i64, interval: &str, lane: &str, vehicle: &str, measurement: &str) -> Value {
    json!({
        "@iot.id": id,
        "properties": {
            "periodLength": interval,
            "lane": lane,
            "vehicle": vehicle,
            "measurement": measurement,
        }
    })
}

fn things() -> Vec<Value> {
    vec![
        json!({
            "@iot.id": 1,
            "properties": {"cameraId": "cam-1"},
            "Datastreams": [
                datastream(10, "5-Min", "MQ", "Car", "Anzahl"),
                datastream(11, "1-Stunde", "MQ", "Car", "Geschwindigkeit"),
            ],
            "Datastreams@iot.nextLink": format!("{BASE}/Things(1)/Datastreams?$skip=0"),
        }),
        json!({
            "@iot.id": 2,
            "properties": {"cameraId": "cam-2"},
            "Datastreams": [datastream(20, "5-Min", "MQ", "Car", "Anzahl")],
        }),
        json!({"@iot.id": 3, "properties": {"description": "not a camera"}}),
    ]
}

fn more_datastreams() -> Vec<Value> {
    vec![
        datastream(12, "1-Tag", "lane-1", "Car", "Anzahl"),
        datastream(13, "1-Monat", "MQ", "bike", "Anzahl"),
        datastream(14, "15-Min", "MQ", "Car", "Anzahl"),
    ]
}

fn entity_id(path: &str) -> Option<i64> {
    let start = path.find('(')? + 1;
    let end = path[start..].find(')')? + start;
    path[start..end].parse().ok()
}

fn with_skip(url: &url::Url, skip: usize) -> String {
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "$skip")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let mut next = url.clone();
    next.query_pairs_mut()
        .clear()
        .extend_pairs(pairs)
        .append_pair("$skip", &skip.to_string());
    next.to_string()
}

#[async_trait]
impl CatalogApi for FakeFrost {
    fn base_url(&self) -> &str {
        BASE
    }

    async fn get_page(&self, url: &str) -> Result<Page> {
        let parsed = url::Url::parse(url).map_err(|e| SyncError::fetch(url, e))?;
        let path = parsed.path().trim_start_matches("/v1.1/").to_string();
        let skip = parsed
            .query_pairs()
            .find(|(k, _)| k == "$skip")
            .and_then(|(_, v)| v.parse::<usize>().ok())
            .unwrap_or(0);

        let items = if path == "Things" {
            things()
        } else if path == "Things(1)/Datastreams" {
            more_datastreams()
        } else if path.starts_with("Datastreams(") && path.ends_with("/Observations") {
            let datastream = entity_id(&path).ok_or_else(|| SyncError::fetch(url, "bad id"))?;
            let state = self.state.lock().unwrap();
            state
                .observations
                .iter()
                .filter(|o| o.datastream == datastream)
                .map(|o| {
                    json!({
                        "@iot.id": o.id,
                        "phenomenonTime": o.phenomenon_time,
                        "result": o.result,
                    })
                })
                .collect()
        } else {
            return Err(SyncError::fetch(url, "status 404"));
        };

        let next_link = (skip + PAGE_SIZE < items.len()).then(|| with_skip(&parsed, skip + PAGE_SIZE));
        Ok(Page {
            value: items.into_iter().skip(skip).take(PAGE_SIZE).collect(),
            next_link,
        })
    }

    async fn post_batch(&self, batch: &BatchRequest) -> Result<BatchResponse> {
        let mut state = self.state.lock().unwrap();
        let mut responses = Vec::with_capacity(batch.requests.len());

        for entry in &batch.requests {
            let target = entity_id(&entry.url).expect("entity id in batch url");
            let status = match entry.method {
                BatchMethod::Post if state.reject_datastream == Some(target) => 400,
                BatchMethod::Post => {
                    state.next_id += 1;
                    let id = 1000 + state.next_id;
                    state.observations.push(StoredObservation {
                        id,
                        datastream: target,
                        phenomenon_time: entry.body["phenomenonTime"]
                            .as_str()
                            .expect("phenomenonTime")
                            .to_string(),
                        result: entry.body["result"].clone(),
                    });
                    state.posts += 1;
                    201
                }
                BatchMethod::Patch => {
                    let observation = state
                        .observations
                        .iter_mut()
                        .find(|o| o.id == target)
                        .expect("patched observation exists");
                    observation.result = entry.body["result"].clone();
                    assert!(entry.body.get("phenomenonTime").is_none());
                    state.patches += 1;
                    200
                }
            };
            responses.push(BatchEntryResponse {
                id: entry.id.clone(),
                status,
                body: Value::Null,
            });
        }

        Ok(BatchResponse { responses })
    }
}

#[derive(Clone, Default)]
struct FakeTelemetry {
    samples: Arc<Mutex<Vec<RawSample>>>,
}

impl FakeTelemetry {
    fn push(&self, sample: RawSample) {
        self.samples.lock().unwrap().push(sample);
    }
}

#[async_trait]
impl TelemetrySource for FakeTelemetry {
    async fn fetch_samples(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        camera_id: &str,
    ) -> Result<Vec<RawSample>> {
        Ok(self
            .samples
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.camera_id == camera_id)
            .filter(|s| (from..=to).contains(&s.timestamp.date_naive()))
            .cloned()
            .collect())
    }
}

fn utc(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

fn sample(at: &str, zone: &str, car: (u64, f64), bike: u64) -> RawSample {
    RawSample {
        camera_id: "cam-1".into(),
        zone_name: zone.into(),
        timestamp: utc(at),
        counts: ModeTable::filled(0)
            .with(Mode::Car, car.0)
            .with(Mode::Bike, bike),
        speeds: ModeTable::filled(SPEED_NOT_OBSERVED).with(Mode::Car, car.1),
    }
}

fn setup(limits: DispatchLimits) -> (FakeFrost, FakeTelemetry, SyncContext) {
    let frost = FakeFrost::default();
    let telemetry = FakeTelemetry::default();
    telemetry.push(sample("2024-05-01T10:02:00Z", "lane-1", (3, 30.0), 0));
    telemetry.push(sample("2024-05-01T10:03:00Z", "lane-2", (2, 45.0), 0));
    telemetry.push(sample("2024-05-01T10:07:00Z", "lane-1", (0, SPEED_NOT_OBSERVED), 4));

    let ctx = SyncContext {
        catalog: Box::new(frost.clone()),
        telemetry: Box::new(telemetry.clone()),
        calendar: Calendar::new(chrono_tz::Europe::Berlin),
        limits,
    };
    (frost, telemetry, ctx)
}

async fn archive(ctx: &SyncContext) -> Result<RunSummary> {
    pipeline::archive(ctx, utc("2024-05-01T00:00:00Z")).await
}

const FIVE_MIN_10: &str = "2024-05-01T10:00:00Z/2024-05-01T10:05:00Z";
const FIVE_MIN_1005: &str = "2024-05-01T10:05:00Z/2024-05-01T10:10:00Z";
const HOUR_10: &str = "2024-05-01T10:00:00Z/2024-05-01T11:00:00Z";
const DAY: &str = "2024-04-30T22:00:00Z/2024-05-01T22:00:00Z";
const MONTH: &str = "2024-04-30T22:00:00Z/2024-05-31T22:00:00Z";

#[tokio::test]
async fn test_import_publishes_aggregates_and_is_idempotent() {
    let (frost, _telemetry, ctx) = setup(DispatchLimits {
        soft_threshold: 2,
        hard_cap: 1,
    });

    let first = archive(&ctx).await.unwrap().into_result().unwrap();
    assert_eq!(first.report.operations_sent, 5);
    assert_eq!(first.report.batches_sent, 5);
    assert_eq!(frost.counts(), (5, 0));

    assert_eq!(frost.result_of(10, FIVE_MIN_10), Some(json!(5)));
    assert_eq!(frost.result_of(10, FIVE_MIN_1005), Some(json!(0)));
    assert_eq!(frost.result_of(11, HOUR_10), Some(json!(36.0)));
    assert_eq!(frost.result_of(12, DAY), Some(json!(3)));
    assert_eq!(frost.result_of(13, MONTH), Some(json!(4)));

    let second = archive(&ctx).await.unwrap().into_result().unwrap();
    assert_eq!(second.report.operations_sent, 0);
    assert_eq!(second.report.batches_sent, 0);
    assert_eq!(frost.counts(), (5, 0));
}

#[tokio::test]
async fn test_changed_telemetry_updates_only_affected_buckets() {
    let (frost, telemetry, ctx) = setup(DispatchLimits::default());
    archive(&ctx).await.unwrap();

    telemetry.push(sample("2024-05-01T10:04:00Z", "lane-2", (1, 60.0), 0));
    let summary = archive(&ctx).await.unwrap().into_result().unwrap();

    assert_eq!(summary.report.operations_sent, 2);
    assert_eq!(frost.counts(), (5, 2));
    assert_eq!(frost.result_of(10, FIVE_MIN_10), Some(json!(6)));
    assert_eq!(frost.result_of(11, HOUR_10), Some(json!(40.0)));
    assert_eq!(frost.result_of(12, DAY), Some(json!(3)));
}

#[tokio::test]
async fn test_existing_observations_match_across_time_renderings() {
    let (frost, _telemetry, ctx) = setup(DispatchLimits::default());
    frost.seed(
        10,
        "2024-05-01T12:00:00+02:00/2024-05-01T12:05:00.000+02:00",
        json!(5),
    );
    frost.seed(11, "2024-05-01T10:00:00/2024-05-01T11:00:00", json!(35.99));

    let summary = archive(&ctx).await.unwrap().into_result().unwrap();

    assert_eq!(summary.report.operations_sent, 4);
    assert_eq!(frost.counts(), (3, 1));
    assert_eq!(
        frost.result_of(11, "2024-05-01T10:00:00/2024-05-01T11:00:00"),
        Some(json!(36.0))
    );
}

#[tokio::test]
async fn test_rejected_operations_make_the_run_incomplete() {
    let (frost, _telemetry, ctx) = setup(DispatchLimits::default());
    frost.state.lock().unwrap().reject_datastream = Some(13);

    let summary = archive(&ctx).await.unwrap();
    assert_eq!(summary.report.rejected.len(), 1);
    assert_eq!(frost.counts(), (4, 0));

    match summary.into_result() {
        Err(SyncError::Incomplete {
            rejected,
            failed_batches,
        }) => {
            assert_eq!(rejected, 1);
            assert_eq!(failed_batches, 0);
        }
        other => panic!("expected incomplete run, got {other:?}"),
    }

    // The rejected bucket is retried on the next run.
    frost.state.lock().unwrap().reject_datastream = None;
    let retry = archive(&ctx).await.unwrap().into_result().unwrap();
    assert_eq!(retry.report.operations_sent, 1);
    assert_eq!(frost.result_of(13, MONTH), Some(json!(4)));
}

#[tokio::test]
async fn test_long_run_only_touches_long_intervals() {
    let (frost, _telemetry, ctx) = setup(DispatchLimits::default());

    let summary = pipeline::long_run(&ctx, utc("2024-05-01T00:00:00Z"))
        .await
        .unwrap();

    assert_eq!(summary.report.operations_sent, 1);
    assert_eq!(frost.result_of(13, MONTH), Some(json!(4)));
    assert_eq!(frost.result_of(10, FIVE_MIN_10), None);
}

#[tokio::test]
async fn test_daily_pass_keeps_early_local_hours_of_its_first_bucket() {
    let (frost, telemetry, ctx) = setup(DispatchLimits::default());
    // 00:30 local on May 1, still April 30 in UTC.
    telemetry.push(sample("2024-04-30T22:30:00Z", "lane-1", (7, 20.0), 0));

    pipeline::import_observations(&ctx, utc("2024-04-30T08:00:00Z"), &pipeline::DAILY_INTERVALS)
        .await
        .unwrap();
    assert_eq!(frost.result_of(12, DAY), Some(json!(10)));

    let next_day = pipeline::import_observations(
        &ctx,
        utc("2024-05-01T08:00:00Z"),
        &pipeline::DAILY_INTERVALS,
    )
    .await
    .unwrap();

    assert_eq!(next_day.report.operations_sent, 0);
    assert_eq!(frost.result_of(12, DAY), Some(json!(10)));
    assert_eq!(frost.counts(), (1, 0));
}
