//! Running statistics as a pure transition: `update_stats(prev, sample)`
//! returns the next snapshot and never touches `prev`, so callers can run it
//! speculatively (previews, replays) without side effects.

use std::collections::VecDeque;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::types::{RunSample, TimestampMs};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Rolling window for current pace and cadence
    pub window_ms: i64,
    /// Distance deltas implying more than this speed are GPS glitches (m/s)
    pub max_speed_mps: f64,
    /// Distance deltas below this are jitter (m)
    pub min_distance_m: f64,
    /// Altitude deltas at or below this magnitude are ignored (m)
    pub elevation_threshold_m: f64,
    pub body_weight_kg: f64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            window_ms: 10_000,
            max_speed_mps: 15.0,
            min_distance_m: 0.3,
            elevation_threshold_m: 0.0,
            body_weight_kg: 65.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsOptions {
    /// Skip time, distance, steps and elevation for this sample. Used once
    /// after a resume so the pause gap is not counted as running.
    pub zero_dt: bool,
}

/// Contribution of one sample to the rolling window
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WindowEntry {
    pub timestamp: TimestampMs,
    pub distance_m: f64,
    pub steps: u64,
    pub dt_ms: i64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunningStats {
    pub total_time_ms: i64,
    pub total_distance_m: f64,
    pub total_steps: u64,
    /// Whole-session pace (s/km)
    pub avg_pace_sec_per_km: Option<f64>,
    /// Rolling-window pace (s/km)
    pub current_pace_sec_per_km: Option<f64>,
    pub cadence_spm: Option<f64>,
    pub calories: f64,
    pub gain_m: f64,
    pub loss_m: f64,
    pub bpm: Option<u32>,
    pub last: Option<RunSample>,
    pub rolling_window: VecDeque<WindowEntry>,
}

impl RunningStats {
    pub fn total_distance_km(&self) -> f64 {
        self.total_distance_m / 1000.0
    }
}

pub fn update_stats(
    prev: &RunningStats,
    sample: &RunSample,
    config: &StatsConfig,
    opts: StatsOptions,
) -> RunningStats {
    let mut next = prev.clone();

    let dt_ms = match (&prev.last, opts.zero_dt) {
        (Some(last), false) => (sample.timestamp - last.timestamp).max(0),
        _ => 0,
    };
    let dt_s = dt_ms as f64 / 1000.0;

    let distance_m = if dt_ms > 0 {
        accepted_distance(sample.distance, dt_s, config)
    } else {
        0.0
    };
    let steps = if opts.zero_dt { 0 } else { sample.steps };

    next.total_time_ms += dt_ms;
    next.total_distance_m += distance_m;
    next.total_steps += steps;

    if !opts.zero_dt {
        let prev_alt = prev.last.as_ref().and_then(|last| last.altitude);
        if let (Some(from), Some(to)) = (prev_alt, sample.altitude) {
            let delta = to - from;
            if delta > config.elevation_threshold_m {
                next.gain_m += delta;
            } else if delta < -config.elevation_threshold_m {
                next.loss_m += -delta;
            }
        }
    }

    next.rolling_window.push_back(WindowEntry {
        timestamp: sample.timestamp,
        distance_m,
        steps,
        dt_ms,
    });
    let cutoff = sample.timestamp - config.window_ms;
    while next
        .rolling_window
        .front()
        .map(|entry| entry.timestamp < cutoff)
        .unwrap_or(false)
    {
        next.rolling_window.pop_front();
    }

    let (window_dist, window_steps, window_dt_ms) = next.rolling_window.iter().fold(
        (0.0, 0u64, 0i64),
        |(dist, steps, dt), entry| (dist + entry.distance_m, steps + entry.steps, dt + entry.dt_ms),
    );
    let window_dt_s = window_dt_ms as f64 / 1000.0;

    // Sticky: an empty window keeps the previous reading
    next.current_pace_sec_per_km = if window_dist > 0.0 && window_dt_s > 0.0 {
        Some(1000.0 / (window_dist / window_dt_s))
    } else {
        prev.current_pace_sec_per_km
    };
    next.cadence_spm = if window_steps > 0 && window_dt_s > 0.0 {
        Some(window_steps as f64 / window_dt_s * 60.0)
    } else {
        prev.cadence_spm
    };
    next.avg_pace_sec_per_km = if next.total_distance_m > 0.0 && next.total_time_ms > 0 {
        Some((next.total_time_ms as f64 / 1000.0) / (next.total_distance_m / 1000.0))
    } else {
        prev.avg_pace_sec_per_km
    };

    // Standing or jitter-only running time still burns at the lowest band
    if dt_ms > 0 {
        let met = met_for_speed(distance_m / dt_s);
        next.calories += met * config.body_weight_kg * (dt_s / 3600.0);
    }

    next.bpm = sample.bpm.or(prev.bpm);
    next.last = Some(sample.clone());
    next
}

fn accepted_distance(delta_m: f64, dt_s: f64, config: &StatsConfig) -> f64 {
    if !delta_m.is_finite() || delta_m < config.min_distance_m {
        return 0.0;
    }
    let speed = delta_m / dt_s;
    if speed > config.max_speed_mps {
        debug!("distance glitch rejected: {:.1} m in {:.1} s", delta_m, dt_s);
        return 0.0;
    }
    delta_m
}

/// Metabolic equivalent for running/walking at `speed_mps`.
pub fn met_for_speed(speed_mps: f64) -> f64 {
    let kmh = speed_mps * 3.6;
    if kmh < 6.5 {
        4.5
    } else if kmh < 8.0 {
        7.0
    } else if kmh < 9.7 {
        9.0
    } else if kmh < 11.3 {
        11.0
    } else {
        13.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample(timestamp: i64, distance: f64, steps: u64, altitude: Option<f64>) -> RunSample {
        RunSample {
            timestamp,
            latitude: 37.0,
            longitude: 127.0,
            altitude,
            distance,
            steps,
            accuracy: 5.0,
            ..Default::default()
        }
    }

    fn feed(samples: &[RunSample]) -> RunningStats {
        let config = StatsConfig::default();
        samples.iter().fold(RunningStats::default(), |stats, s| {
            update_stats(&stats, s, &config, StatsOptions::default())
        })
    }

    #[test]
    fn test_first_sample_only_anchors() {
        let stats = feed(&[sample(0, 5.0, 3, Some(10.0))]);
        assert_eq!(stats.total_time_ms, 0);
        assert_eq!(stats.total_distance_m, 0.0);
        assert_eq!(stats.current_pace_sec_per_km, None);
        assert_eq!(stats.rolling_window.len(), 1);
    }

    #[test]
    fn test_steady_run_pace_and_cadence() {
        // 3 m/s, 3 steps/s
        let samples: Vec<_> = (0..20).map(|i| sample(i * 1_000, 3.0, 3, None)).collect();
        let stats = feed(&samples);

        assert_eq!(stats.total_time_ms, 19_000);
        assert_relative_eq!(stats.total_distance_m, 57.0);
        assert_relative_eq!(stats.current_pace_sec_per_km.unwrap(), 1000.0 / 3.0, epsilon = 1e-6);
        assert_relative_eq!(stats.avg_pace_sec_per_km.unwrap(), 1000.0 / 3.0, epsilon = 1e-6);
        assert_relative_eq!(stats.cadence_spm.unwrap(), 180.0, epsilon = 1e-6);
        assert!(stats.rolling_window.len() <= 11);
    }

    #[test]
    fn test_glitches_rejected() {
        let stats = feed(&[
            sample(0, 0.0, 0, None),
            sample(1_000, 40.0, 0, None), // 40 m/s
            sample(2_000, 0.1, 0, None),  // jitter
            sample(3_000, 4.0, 0, None),
        ]);
        assert_relative_eq!(stats.total_distance_m, 4.0);
        assert_eq!(stats.total_time_ms, 3_000);
    }

    #[test]
    fn test_pace_is_sticky() {
        let mut samples: Vec<_> = (0..5).map(|i| sample(i * 1_000, 3.0, 3, None)).collect();
        // standing still for longer than the window
        samples.extend((5..30).map(|i| sample(i * 1_000, 0.0, 0, None)));

        // t=14s is the last window that still holds the movement at t=4s
        let last_valid = feed(&samples[..15]);
        let stopped = feed(&samples);

        assert!(stopped.current_pace_sec_per_km.is_some());
        assert_eq!(stopped.current_pace_sec_per_km, last_valid.current_pace_sec_per_km);
        assert_eq!(stopped.cadence_spm, last_valid.cadence_spm);
    }

    #[test]
    fn test_zero_dt_skips_gap() {
        let config = StatsConfig::default();
        let before = feed(&[sample(0, 0.0, 0, Some(10.0)), sample(1_000, 3.0, 3, Some(11.0))]);

        let after = update_stats(
            &before,
            &sample(120_000, 250.0, 400, Some(30.0)),
            &config,
            StatsOptions { zero_dt: true },
        );

        assert_eq!(after.total_time_ms, before.total_time_ms);
        assert_eq!(after.total_distance_m, before.total_distance_m);
        assert_eq!(after.gain_m, before.gain_m);
        let anchor = after.rolling_window.back().unwrap();
        assert_eq!(anchor.distance_m, 0.0);
        assert_eq!(anchor.dt_ms, 0);
        assert_eq!(after.last.as_ref().unwrap().timestamp, 120_000);
        // prev untouched
        assert_eq!(before.last.as_ref().unwrap().timestamp, 1_000);
    }

    #[test]
    fn test_elevation_monotonic() {
        let alts = [10.0, 12.0, 11.0, 11.5, 9.0, 9.0];
        let samples: Vec<_> = alts
            .iter()
            .enumerate()
            .map(|(i, a)| sample(i as i64 * 1_000, 2.0, 2, Some(*a)))
            .collect();

        let config = StatsConfig::default();
        let mut stats = RunningStats::default();
        for s in &samples {
            let next = update_stats(&stats, s, &config, StatsOptions::default());
            assert!(next.gain_m >= stats.gain_m);
            assert!(next.loss_m >= stats.loss_m);
            assert!(next.total_distance_m >= stats.total_distance_m);
            stats = next;
        }
        assert_relative_eq!(stats.gain_m, 2.5);
        assert_relative_eq!(stats.loss_m, 3.5);
    }

    #[test]
    fn test_calories_by_speed_band() {
        assert_eq!(met_for_speed(1.0), 4.5);
        assert_eq!(met_for_speed(2.0), 7.0);
        assert_eq!(met_for_speed(2.5), 9.0);
        assert_eq!(met_for_speed(3.0), 11.0);
        assert_eq!(met_for_speed(4.0), 13.5);

        // one hour at 3 m/s for a 65 kg runner
        let samples: Vec<_> = (0..=3_600).map(|i| sample(i * 1_000, 3.0, 0, None)).collect();
        let stats = feed(&samples);
        assert_relative_eq!(stats.calories, 11.0 * 65.0, epsilon = 1e-6);
    }

    #[test]
    fn test_calories_accrue_while_barely_moving() {
        // a minute of 0.2 m deltas, all discarded as jitter
        let samples: Vec<_> = (0..=60).map(|i| sample(i * 1_000, 0.2, 0, None)).collect();
        let stats = feed(&samples);
        assert_eq!(stats.total_time_ms, 60_000);
        assert_eq!(stats.total_distance_m, 0.0);
        assert_relative_eq!(stats.calories, 4.5 * 65.0 * 60.0 / 3600.0, epsilon = 1e-9);

        // a rejected glitch still counts its time at the lowest band
        let glitch = feed(&[sample(0, 0.0, 0, None), sample(1_000, 40.0, 0, None)]);
        assert_relative_eq!(glitch.calories, 4.5 * 65.0 / 3600.0, epsilon = 1e-9);
    }

    #[test]
    fn test_bpm_carried() {
        let mut with_hr = sample(1_000, 3.0, 3, None);
        with_hr.bpm = Some(150);
        let stats = feed(&[sample(0, 0.0, 0, None), with_hr, sample(2_000, 3.0, 3, None)]);
        assert_eq!(stats.bpm, Some(150));
    }
}
