use serde::{Deserialize, Serialize};

use crate::geometry::{meters_per_degree_lat, meters_per_degree_lng};
use crate::types::{LocationSample, TimestampMs};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionFilterConfig {
    /// Process noise at standstill (m²/s)
    pub base_process_noise: f64,
    /// Extra process noise per (m/s)² of speed (m²/s)
    pub speed_process_gain: f64,
    /// Window after reset during which process noise is boosted
    pub warmup_ms: i64,
    pub warmup_boost: f64,
    /// First-sample variance = accuracy² × this
    pub init_variance_multiplier: f64,
    /// Accuracy floor so a bogus 0 m report cannot freeze the filter
    pub min_accuracy_m: f64,
}

impl Default for PositionFilterConfig {
    fn default() -> Self {
        Self {
            base_process_noise: 0.5,
            speed_process_gain: 1.0,
            warmup_ms: 3_000,
            warmup_boost: 10.0,
            init_variance_multiplier: 50.0,
            min_accuracy_m: 1.0,
        }
    }
}

/// 1-D Kalman state over one coordinate axis, in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AxisKalman {
    pub value: f64,
    /// Estimate variance (deg²)
    pub variance: f64,
    pub last_timestamp: TimestampMs,
}

impl AxisKalman {
    fn init(measurement: f64, r: f64, multiplier: f64, timestamp: TimestampMs) -> Self {
        AxisKalman {
            value: measurement,
            variance: r * multiplier,
            last_timestamp: timestamp,
        }
    }

    /// Predict with `q_per_s` (deg²/s) over the elapsed time, then correct.
    fn step(&mut self, measurement: f64, r: f64, q_per_s: f64, timestamp: TimestampMs) -> f64 {
        let dt = ((timestamp - self.last_timestamp) as f64 / 1000.0).max(0.0);
        self.variance += q_per_s * dt;

        let k = self.variance / (self.variance + r);
        self.value += k * (measurement - self.value);
        self.variance *= 1.0 - k;
        self.last_timestamp = timestamp;
        self.value
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilteredPosition {
    pub timestamp: TimestampMs,
    pub lat: f64,
    pub lng: f64,
}

/// Smooths raw fixes with an independent Kalman filter per axis.
///
/// Measurement noise comes from the fix's horizontal accuracy converted to
/// degrees (longitude scaled by cos(lat)). Process noise grows with speed so
/// the estimate keeps up with a runner instead of lagging behind.
#[derive(Clone, Debug)]
pub struct PositionFilter {
    config: PositionFilterConfig,
    lat: Option<AxisKalman>,
    lng: Option<AxisKalman>,
    warmup_started_at: Option<TimestampMs>,
}

impl PositionFilter {
    pub fn new(config: PositionFilterConfig) -> Self {
        PositionFilter {
            config,
            lat: None,
            lng: None,
            warmup_started_at: None,
        }
    }

    pub fn update(&mut self, fix: &LocationSample) -> FilteredPosition {
        let accuracy = fix.accuracy.max(self.config.min_accuracy_m);
        let m_per_deg_lat = meters_per_degree_lat();
        let m_per_deg_lng = meters_per_degree_lng(fix.lat).max(1e-6);

        let r_lat = (accuracy / m_per_deg_lat).powi(2);
        let r_lng = (accuracy / m_per_deg_lng).powi(2);

        let q_m2 = self.process_noise_m2(fix);
        let (lat, lng) = match (self.lat.as_mut(), self.lng.as_mut()) {
            (Some(lat_axis), Some(lng_axis)) => {
                let lat = lat_axis.step(fix.lat, r_lat, q_m2 / m_per_deg_lat.powi(2), fix.timestamp);
                let lng = lng_axis.step(fix.lng, r_lng, q_m2 / m_per_deg_lng.powi(2), fix.timestamp);
                (lat, lng)
            }
            _ => {
                let multiplier = self.config.init_variance_multiplier;
                self.lat = Some(AxisKalman::init(fix.lat, r_lat, multiplier, fix.timestamp));
                self.lng = Some(AxisKalman::init(fix.lng, r_lng, multiplier, fix.timestamp));
                self.warmup_started_at = Some(fix.timestamp);
                (fix.lat, fix.lng)
            }
        };

        FilteredPosition {
            timestamp: fix.timestamp,
            lat: round6(lat),
            lng: round6(lng),
        }
    }

    fn process_noise_m2(&self, fix: &LocationSample) -> f64 {
        let speed = fix.speed.filter(|s| s.is_finite() && *s > 0.0).unwrap_or(0.0);
        let q = self.config.base_process_noise + self.config.speed_process_gain * speed * speed;

        let warming_up = self
            .warmup_started_at
            .map(|start| fix.timestamp - start < self.config.warmup_ms)
            .unwrap_or(true);

        if warming_up {
            q * self.config.warmup_boost
        } else {
            q
        }
    }

    pub fn lat_axis(&self) -> Option<&AxisKalman> {
        self.lat.as_ref()
    }

    pub fn lng_axis(&self) -> Option<&AxisKalman> {
        self.lng.as_ref()
    }

    /// Latitude-axis variance expressed in m².
    pub fn lat_variance_m2(&self) -> Option<f64> {
        self.lat
            .map(|axis| axis.variance * meters_per_degree_lat().powi(2))
    }

    /// Forget all state, including the warm-up clock.
    pub fn reset(&mut self) {
        self.lat = None;
        self.lng = None;
        self.warmup_started_at = None;
    }
}

impl Default for PositionFilter {
    fn default() -> Self {
        Self::new(PositionFilterConfig::default())
    }
}

/// ~0.1 m resolution
fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}
