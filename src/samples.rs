//! Raw per-tick telemetry samples.
//!
//! The telemetry API reports one flat record per camera, zone and tick, with a
//! `q<Mode>` count and a `v<Mode>` speed field for every mode of transport.
//! [`TelemetryRecord`] mirrors that wire shape; [`RawSample`] is the typed
//! form the engine works on.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::engine::types::Mode;

/// Speeds at or below this value mean "no speed observed".
pub const SPEED_NOT_OBSERVED: f64 = -1.0;

/// One value per [`Mode`], indexed by [`Mode::index`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeTable<T>([T; Mode::COUNT]);

impl<T: Copy> ModeTable<T> {
    pub fn filled(value: T) -> Self {
        Self([value; Mode::COUNT])
    }

    pub fn get(&self, mode: Mode) -> T {
        self.0[mode.index()]
    }

    pub fn set(&mut self, mode: Mode, value: T) {
        self.0[mode.index()] = value;
    }

    pub fn with(mut self, mode: Mode, value: T) -> Self {
        self.set(mode, value);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawSample {
    pub camera_id: String,
    pub zone_name: String,
    pub timestamp: DateTime<Utc>,
    pub counts: ModeTable<u64>,
    pub speeds: ModeTable<f64>,
}

impl RawSample {
    /// Speed for `mode`, or `None` when the sample carries the sentinel.
    pub fn observed_speed(&self, mode: Mode) -> Option<f64> {
        let speed = self.speeds.get(mode);
        (speed > SPEED_NOT_OBSERVED).then_some(speed)
    }
}

fn not_observed() -> f64 {
    SPEED_NOT_OBSERVED
}

/// A telemetry record as delivered by the upstream API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRecord {
    pub camera_id: String,
    pub zone_name: String,
    pub utc: DateTime<Utc>,

    #[serde(default, rename = "qPed")]
    pub q_ped: u64,
    #[serde(default, rename = "qBike")]
    pub q_bike: u64,
    #[serde(default, rename = "qCar")]
    pub q_car: u64,
    #[serde(default, rename = "qMotorbike")]
    pub q_motorbike: u64,
    #[serde(default, rename = "qVan")]
    pub q_van: u64,
    #[serde(default, rename = "qSmallTruck")]
    pub q_small_truck: u64,
    #[serde(default, rename = "qLargeTruck")]
    pub q_large_truck: u64,
    #[serde(default, rename = "qBus")]
    pub q_bus: u64,

    #[serde(default = "not_observed", rename = "vPed")]
    pub v_ped: f64,
    #[serde(default = "not_observed", rename = "vBike")]
    pub v_bike: f64,
    #[serde(default = "not_observed", rename = "vCar")]
    pub v_car: f64,
    #[serde(default = "not_observed", rename = "vMotorbike")]
    pub v_motorbike: f64,
    #[serde(default = "not_observed", rename = "vVan")]
    pub v_van: f64,
    #[serde(default = "not_observed", rename = "vSmallTruck")]
    pub v_small_truck: f64,
    #[serde(default = "not_observed", rename = "vLargeTruck")]
    pub v_large_truck: f64,
    #[serde(default = "not_observed", rename = "vBus")]
    pub v_bus: f64,
}

impl TelemetryRecord {
    /// The wire count and speed fields of `mode`.
    fn fields(&self, mode: Mode) -> (u64, f64) {
        match mode {
            Mode::Pedestrian => (self.q_ped, self.v_ped),
            Mode::Bike => (self.q_bike, self.v_bike),
            Mode::Car => (self.q_car, self.v_car),
            Mode::Motorbike => (self.q_motorbike, self.v_motorbike),
            Mode::Van => (self.q_van, self.v_van),
            Mode::SmallTruck => (self.q_small_truck, self.v_small_truck),
            Mode::LargeTruck => (self.q_large_truck, self.v_large_truck),
            Mode::Bus => (self.q_bus, self.v_bus),
        }
    }
}

impl From<TelemetryRecord> for RawSample {
    fn from(record: TelemetryRecord) -> Self {
        let mut counts = ModeTable::filled(0);
        let mut speeds = ModeTable::filled(SPEED_NOT_OBSERVED);
        for mode in Mode::ALL {
            let (count, speed) = record.fields(mode);
            counts.set(mode, count);
            speeds.set(mode, speed);
        }
        RawSample {
            camera_id: record.camera_id,
            zone_name: record.zone_name,
            timestamp: record.utc,
            counts,
            speeds,
        }
    }
}
