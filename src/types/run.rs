//! Records derived from fused sensor data: the normalized run sample pushed
//! into the session, and the telemetry log built from it.

use serde::{Deserialize, Serialize};

use super::{HasPosition, LatLng, TimestampMs, Timestamped};

/// Normalized sample accepted by the run session.
///
/// `steps` and `distance` are deltas relative to the previously emitted
/// sample, not running totals.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSample {
    pub timestamp: TimestampMs,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub pressure: Option<f64>,
    pub steps: u64,
    /// Meters moved since the previous sample
    pub distance: f64,
    pub accuracy: f64,
    pub speed: Option<f64>,
    /// Heart rate from an external strap, when paired
    pub bpm: Option<u32>,
}

impl Timestamped for RunSample {
    fn timestamp(&self) -> TimestampMs {
        self.timestamp
    }
}

impl HasPosition for RunSample {
    fn position(&self) -> LatLng {
        LatLng::new(self.latitude, self.longitude)
    }
}

/// One derived running-state record. Serialized with compact keys because
/// the log is shipped as JSON lines.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Telemetry {
    #[serde(rename = "t")]
    pub time_stamp: TimestampMs,
    #[serde(rename = "la")]
    pub lat: f64,
    #[serde(rename = "ln")]
    pub lng: f64,
    /// Cumulative distance (km)
    #[serde(rename = "d")]
    pub dist: f64,
    /// Current pace (s/km)
    #[serde(rename = "p", skip_serializing_if = "Option::is_none")]
    pub pace: Option<f64>,
    #[serde(rename = "a", skip_serializing_if = "Option::is_none")]
    pub alt: Option<f64>,
    /// Steps per minute
    #[serde(rename = "c", skip_serializing_if = "Option::is_none")]
    pub cadence: Option<f64>,
    #[serde(rename = "b", skip_serializing_if = "Option::is_none")]
    pub bpm: Option<u32>,
    #[serde(rename = "r")]
    pub is_running: bool,
}

impl Telemetry {
    /// Bare map point, used for course polylines.
    pub fn point(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng,
            ..Default::default()
        }
    }
}

impl Timestamped for Telemetry {
    fn timestamp(&self) -> TimestampMs {
        self.time_stamp
    }
}

impl HasPosition for Telemetry {
    fn position(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}

/// Run-length view over the telemetry log's `is_running` flag.
/// Covers `[start, end)` of the log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMeta {
    pub start: usize,
    pub end: usize,
    pub is_running: bool,
}

impl SegmentMeta {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// Course checkpoint as authored by the course designer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(default)]
    pub name: Option<String>,
    pub lat: f64,
    pub lng: f64,
}

impl Checkpoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            name: None,
            lat,
            lng,
        }
    }
}

impl HasPosition for Checkpoint {
    fn position(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}
