//! Session-scoped sensor pipeline.
//!
//! Owns the sample store and both filters for one session. Raw readings go
//! in through `on_*`; each location fix comes out as a [`RunSample`] with
//! filtered position, fused altitude and step/distance deltas. The latest
//! sample is handed to the foreground through a [`SampleFeed`].

use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::filters::{AltitudeConfig, AltitudeFuser, PositionFilter, PositionFilterConfig};
use crate::geometry::distance_m;
use crate::sample_store::{SampleStore, JOIN_WINDOW_MS};
use crate::types::{LatLng, LocationSample, PressureSample, RunSample, StepSample};

/// Sensors the device reports. A fix is only emitted when every available
/// sensor has a reading inside the join window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorAvailability {
    pub barometer: bool,
    pub pedometer: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub join_window_ms: i64,
    pub sensors: SensorAvailability,
    pub position: PositionFilterConfig,
    pub altitude: AltitudeConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            join_window_ms: JOIN_WINDOW_MS,
            sensors: SensorAvailability::default(),
            position: PositionFilterConfig::default(),
            altitude: AltitudeConfig::default(),
        }
    }
}

pub struct SensorPipeline {
    sensors: SensorAvailability,
    store: SampleStore,
    position: PositionFilter,
    altitude: AltitudeFuser,
    last_position: Option<LatLng>,
    last_total_steps: Option<u64>,
}

impl SensorPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        SensorPipeline {
            sensors: config.sensors,
            store: SampleStore::with_window(config.join_window_ms),
            position: PositionFilter::new(config.position),
            altitude: AltitudeFuser::new(config.altitude),
            last_position: None,
            last_total_steps: None,
        }
    }

    pub fn sensors(&self) -> SensorAvailability {
        self.sensors
    }

    pub fn on_pressure(&mut self, sample: PressureSample) {
        self.store.push_pressure(sample);
    }

    pub fn on_steps(&mut self, sample: StepSample) {
        self.store.push_steps(sample);
    }

    /// Fuse one location fix. Returns `None` when a sensor the device has
    /// produced nothing near the fix; missing readings are never invented.
    pub fn on_location(&mut self, location: LocationSample) -> Option<RunSample> {
        let joined = self.store.on_new_location(location);

        if self.sensors.barometer && joined.pressure.is_none() {
            debug!("fix at {} skipped: no pressure sample", joined.timestamp);
            return None;
        }
        if self.sensors.pedometer && joined.steps.is_none() {
            debug!("fix at {} skipped: no step sample", joined.timestamp);
            return None;
        }

        let fix = &joined.location;
        let filtered = self.position.update(fix);
        let position = LatLng::new(filtered.lat, filtered.lng);
        let pressure = joined.pressure.map(|p| p.pressure_hpa);
        let altitude = self.altitude.update(pressure, fix.altitude, fix.altitude_accuracy);

        let distance = self
            .last_position
            .map(|prev| distance_m(prev, position))
            .unwrap_or(0.0);
        self.last_position = Some(position);

        let steps = match (self.last_total_steps, joined.steps) {
            (Some(prev), Some(now)) => now.total_steps.saturating_sub(prev),
            _ => 0,
        };
        if let Some(now) = joined.steps {
            self.last_total_steps = Some(now.total_steps);
        }

        Some(RunSample {
            timestamp: joined.timestamp,
            latitude: filtered.lat,
            longitude: filtered.lng,
            altitude,
            pressure,
            steps,
            distance,
            accuracy: fix.accuracy,
            speed: fix.speed,
            bpm: None,
        })
    }

    /// A delivery batch may arrive out of order; fixes are fused oldest first.
    pub fn on_location_batch(&mut self, mut batch: Vec<LocationSample>) -> Vec<RunSample> {
        batch.sort_by_key(|loc| loc.timestamp);
        batch
            .into_iter()
            .filter_map(|loc| self.on_location(loc))
            .collect()
    }

    pub fn reset(&mut self) {
        self.store.reset();
        self.position.reset();
        self.altitude.reset();
        self.last_position = None;
        self.last_total_steps = None;
    }
}

impl Default for SensorPipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

/// Single-slot latest-value channel from the sensor task to the session.
/// No backlog: a subscriber that falls behind only sees the newest sample.
pub struct SampleFeed {
    tx: watch::Sender<Option<RunSample>>,
}

impl SampleFeed {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        SampleFeed { tx }
    }

    pub fn publish(&self, sample: RunSample) {
        self.tx.send_replace(Some(sample));
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<RunSample>> {
        self.tx.subscribe()
    }

    pub fn latest(&self) -> Option<RunSample> {
        self.tx.borrow().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for SampleFeed {
    fn default() -> Self {
        Self::new()
    }
}
