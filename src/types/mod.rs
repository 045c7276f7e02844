pub mod run;

pub use run::*;

use serde::{Deserialize, Serialize};

/// Epoch milliseconds.
pub type TimestampMs = i64;

/// Anything stored in a sample ring buffer.
pub trait Timestamped {
    fn timestamp(&self) -> TimestampMs;
}

/// Anything that can be placed on the map.
pub trait HasPosition {
    fn position(&self) -> LatLng;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl HasPosition for LatLng {
    fn position(&self) -> LatLng {
        *self
    }
}

/// Raw location fix from the platform location service
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub timestamp: TimestampMs,
    pub lat: f64,
    pub lng: f64,
    /// Horizontal accuracy radius (m)
    pub accuracy: f64,
    pub altitude: Option<f64>,
    pub altitude_accuracy: Option<f64>,
    /// Instantaneous speed reported by the OS (m/s)
    pub speed: Option<f64>,
}

impl Timestamped for LocationSample {
    fn timestamp(&self) -> TimestampMs {
        self.timestamp
    }
}

impl HasPosition for LocationSample {
    fn position(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PressureSample {
    pub timestamp: TimestampMs,
    pub pressure_hpa: f64,
}

impl Timestamped for PressureSample {
    fn timestamp(&self) -> TimestampMs {
        self.timestamp
    }
}

/// Cumulative pedometer reading
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepSample {
    pub timestamp: TimestampMs,
    pub total_steps: u64,
}

impl Timestamped for StepSample {
    fn timestamp(&self) -> TimestampMs {
        self.timestamp
    }
}

/// One location fix with the nearest pressure/step readings attached
#[derive(Clone, Debug, PartialEq)]
pub struct JoinedSample {
    pub timestamp: TimestampMs,
    pub location: LocationSample,
    pub pressure: Option<PressureSample>,
    pub steps: Option<StepSample>,
}
