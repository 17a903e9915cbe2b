//! Data types shared by the aggregation and reconciliation engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Aggregation window of a target series.
///
/// The catalog stores the kind in a datastream's `periodLength` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IntervalKind {
    #[serde(rename = "5-Min")]
    FiveMinutes,
    #[serde(rename = "1-Stunde")]
    Hourly,
    #[serde(rename = "1-Tag")]
    Daily,
    #[serde(rename = "1-Woche")]
    Weekly,
    #[serde(rename = "1-Monat")]
    Monthly,
    #[serde(rename = "1-Jahr")]
    Yearly,
}

impl IntervalKind {
    pub const ALL: [IntervalKind; 6] = [
        IntervalKind::FiveMinutes,
        IntervalKind::Hourly,
        IntervalKind::Daily,
        IntervalKind::Weekly,
        IntervalKind::Monthly,
        IntervalKind::Yearly,
    ];

    pub fn code(self) -> &'static str {
        match self {
            IntervalKind::FiveMinutes => "5-Min",
            IntervalKind::Hourly => "1-Stunde",
            IntervalKind::Daily => "1-Tag",
            IntervalKind::Weekly => "1-Woche",
            IntervalKind::Monthly => "1-Monat",
            IntervalKind::Yearly => "1-Jahr",
        }
    }
}

impl fmt::Display for IntervalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Detected mode of transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Mode {
    #[serde(rename = "ped")]
    Pedestrian,
    #[serde(rename = "bike")]
    Bike,
    #[serde(rename = "Car")]
    Car,
    #[serde(rename = "motorbike")]
    Motorbike,
    #[serde(rename = "van")]
    Van,
    #[serde(rename = "smallTruck")]
    SmallTruck,
    #[serde(rename = "largeTruck")]
    LargeTruck,
    #[serde(rename = "bus")]
    Bus,
}

impl Mode {
    pub const COUNT: usize = 8;

    pub const ALL: [Mode; Mode::COUNT] = [
        Mode::Pedestrian,
        Mode::Bike,
        Mode::Car,
        Mode::Motorbike,
        Mode::Van,
        Mode::SmallTruck,
        Mode::LargeTruck,
        Mode::Bus,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn code(self) -> &'static str {
        match self {
            Mode::Pedestrian => "ped",
            Mode::Bike => "bike",
            Mode::Car => "Car",
            Mode::Motorbike => "motorbike",
            Mode::Van => "van",
            Mode::SmallTruck => "smallTruck",
            Mode::LargeTruck => "largeTruck",
            Mode::Bus => "bus",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// What a series measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Measurement {
    #[serde(rename = "Anzahl")]
    Count,
    #[serde(rename = "Geschwindigkeit")]
    AverageSpeed,
}

/// Lane code the catalog uses for the whole cross-section.
pub const WHOLE_CROSS_SECTION: &str = "MQ";

/// Spatial filter of a series: a single lane, or every lane of the camera.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Zone {
    WholeCrossSection,
    Lane(String),
}

impl Zone {
    pub fn from_code(code: &str) -> Self {
        if code == WHOLE_CROSS_SECTION {
            Zone::WholeCrossSection
        } else {
            Zone::Lane(code.to_string())
        }
    }

    pub fn matches(&self, zone_name: &str) -> bool {
        match self {
            Zone::WholeCrossSection => true,
            Zone::Lane(lane) => lane == zone_name,
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Zone::WholeCrossSection => f.write_str(WHOLE_CROSS_SECTION),
            Zone::Lane(lane) => f.write_str(lane),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope {
    pub camera_id: String,
    pub zone: Zone,
}

/// Identity of one target time series (one catalog datastream).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesKey {
    pub scope: Scope,
    pub mode: Mode,
    pub measurement: Measurement,
    pub interval: IntervalKind,
}

/// Catalog entity id. FROST servers use either integer or string ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Int(i64),
    Str(String),
}

impl EntityId {
    /// Renders the id as it appears inside an entity path, e.g.
    /// `Observations(42)` or `Observations('a-b')`.
    pub fn path_segment(&self) -> String {
        match self {
            EntityId::Int(id) => id.to_string(),
            EntityId::Str(id) => format!("'{}'", id.replace('\'', "''")),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Int(id) => write!(f, "{id}"),
            EntityId::Str(id) => f.write_str(id),
        }
    }
}

/// A series together with the datastream it is published to.
#[derive(Debug, Clone)]
pub struct Series {
    pub key: SeriesKey,
    pub datastream_id: EntityId,
}

/// Finalized value of one bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AggregateValue {
    Count(u64),
    Speed(f64),
}

impl AggregateValue {
    pub fn as_f64(self) -> f64 {
        match self {
            AggregateValue::Count(c) => c as f64,
            AggregateValue::Speed(s) => s,
        }
    }
}

impl Serialize for AggregateValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AggregateValue::Count(c) => serializer.serialize_u64(*c),
            AggregateValue::Speed(s) => serializer.serialize_f64(*s),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub value: AggregateValue,
}

/// A change to publish. Buckets are never retracted, so there is no delete.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Create {
        datastream_id: EntityId,
        bucket: Bucket,
    },
    Update {
        existing_id: EntityId,
        bucket: Bucket,
    },
}

impl Operation {
    pub fn bucket(&self) -> &Bucket {
        match self {
            Operation::Create { bucket, .. } | Operation::Update { bucket, .. } => bucket,
        }
    }
}
