//! Live comparison against a prerecorded run.
//!
//! The ghost trace is replayed by elapsed session time. Both runners are
//! placed on the course with the same leg progress formula the course
//! tracker uses, so the lead/trail delta is measured along the course
//! rather than as the crow flies.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::course::{progress_along_course, CourseLeg};
use crate::error::{Result, TelemetryError};
use crate::events::{EventSink, RunEvent};
use crate::geometry::project_onto_polyline;
use crate::types::{HasPosition, LatLng, Telemetry, TimestampMs};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Leader {
    Tied,
    Ghost,
    Me,
}

impl Leader {
    /// `delta_m` is ghost progress minus mine.
    pub fn from_delta(delta_m: f64, tie_threshold_m: f64) -> Leader {
        if delta_m.abs() < tie_threshold_m {
            Leader::Tied
        } else if delta_m > 0.0 {
            Leader::Ghost
        } else {
            Leader::Me
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GhostConfig {
    /// Deltas smaller than this are a tie (m)
    pub tie_threshold_m: f64,
    /// Legs ahead of the ghost's current leg considered each sample
    pub candidate_window: usize,
    /// Candidate legs farther than this trigger a scan of every leg (m)
    pub fallback_radius_m: f64,
    /// Ghost playback speed; 1.0 is real time
    pub speed_multiplier: f64,
}

impl Default for GhostConfig {
    fn default() -> Self {
        Self {
            tie_threshold_m: 5.0,
            candidate_window: 2,
            fallback_radius_m: 1_000.0,
            speed_multiplier: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GhostCompareResult {
    pub elapsed_ms: i64,
    pub ghost_point: Telemetry,
    pub ghost_leg_index: usize,
    pub ghost_progress_m: f64,
    pub my_progress_m: f64,
    /// Positive when the ghost is ahead
    pub delta_m: f64,
    pub leader: Leader,
}

pub struct GhostCoordinator {
    config: GhostConfig,
    trace: Vec<Telemetry>,
    ghost_leg: usize,
    leader: Option<Leader>,
    last: Option<GhostCompareResult>,
}

impl GhostCoordinator {
    /// `trace` is a recorded telemetry log; it is sorted by time here.
    pub fn new(mut trace: Vec<Telemetry>, config: GhostConfig) -> Result<Self> {
        if trace.is_empty() {
            return Err(TelemetryError::EmptyGhostTrace);
        }
        if config.speed_multiplier.is_nan() || config.speed_multiplier <= 0.0 {
            return Err(TelemetryError::InvalidParameters(format!(
                "ghost speed multiplier must be positive, got {}",
                config.speed_multiplier
            )));
        }
        trace.sort_by_key(|t| t.time_stamp);
        info!("[ghost] trace of {} points", trace.len());
        Ok(GhostCoordinator {
            config,
            trace,
            ghost_leg: 0,
            leader: None,
            last: None,
        })
    }

    pub fn reset(&mut self) {
        self.ghost_leg = 0;
        self.leader = None;
        self.last = None;
    }

    pub fn leader(&self) -> Option<Leader> {
        self.leader
    }

    pub fn ghost_leg_index(&self) -> usize {
        self.ghost_leg
    }

    pub fn last_result(&self) -> Option<&GhostCompareResult> {
        self.last.as_ref()
    }

    /// Ghost trace point nearest to `elapsed_ms` into the session.
    pub fn sample_at(&self, elapsed_ms: i64) -> &Telemetry {
        let start = self.trace[0].time_stamp;
        let target = start + (elapsed_ms as f64 * self.config.speed_multiplier).round() as TimestampMs;
        let idx = self.trace.partition_point(|t| t.time_stamp < target);

        match (idx.checked_sub(1), self.trace.get(idx)) {
            (Some(before), Some(after)) => {
                let b = &self.trace[before];
                if target - b.time_stamp <= after.time_stamp - target {
                    b
                } else {
                    after
                }
            }
            (Some(before), None) => &self.trace[before],
            (None, Some(after)) => after,
            (None, None) => &self.trace[0],
        }
    }

    /// Leg the ghost occupies at `p`: best of the current leg and the next
    /// few by perpendicular distance, or of every leg when none of those is
    /// within the fallback radius. Never moves backward.
    fn estimate_leg(&mut self, legs: &[CourseLeg], p: LatLng) -> usize {
        let score = |leg: &CourseLeg| {
            project_onto_polyline(p, &leg.points)
                .map(|proj| proj.distance_m)
                .unwrap_or(f64::INFINITY)
        };
        let best_in = |range: std::ops::Range<usize>| {
            range
                .map(|i| (i, score(&legs[i])))
                .fold(None, |best: Option<(usize, f64)>, cand| match best {
                    Some(b) if b.1 <= cand.1 => Some(b),
                    _ => Some(cand),
                })
        };

        let window_end = (self.ghost_leg + self.config.candidate_window + 1).min(legs.len());
        let chosen = match best_in(self.ghost_leg..window_end) {
            Some((i, d)) if d <= self.config.fallback_radius_m => Some(i),
            _ => {
                debug!("[ghost] no nearby candidate leg, scanning all");
                best_in(0..legs.len()).map(|(i, _)| i)
            }
        };

        if let Some(i) = chosen {
            self.ghost_leg = self.ghost_leg.max(i);
        }
        self.ghost_leg
    }

    /// Compare the live runner at `me` on leg `my_leg` with the ghost at the
    /// same elapsed time. A repeated `elapsed_ms` returns the previous result
    /// without recomputing or announcing. A leader change after the first
    /// comparison is emitted to `events`.
    pub fn compare(
        &mut self,
        elapsed_ms: i64,
        me: LatLng,
        my_leg: usize,
        legs: &[CourseLeg],
        events: &mut dyn EventSink,
    ) -> GhostCompareResult {
        if let Some(last) = self.last.as_ref().filter(|last| last.elapsed_ms == elapsed_ms) {
            return last.clone();
        }

        let ghost_point = self.sample_at(elapsed_ms).clone();
        let ghost_leg_index = self.estimate_leg(legs, ghost_point.position());
        let ghost_progress_m = progress_along_course(legs, ghost_leg_index, ghost_point.position());
        let my_progress_m = progress_along_course(legs, my_leg, me);
        let delta_m = ghost_progress_m - my_progress_m;
        let leader = Leader::from_delta(delta_m, self.config.tie_threshold_m);

        match self.leader {
            Some(prev) if prev != leader => {
                info!("[ghost] leader {:?} -> {:?} ({:+.1} m)", prev, leader, delta_m);
                events.emit(RunEvent::GhostLeaderChanged { leader, delta_m });
            }
            _ => {}
        }
        self.leader = Some(leader);

        let result = GhostCompareResult {
            elapsed_ms,
            ghost_point,
            ghost_leg_index,
            ghost_progress_m,
            my_progress_m,
            delta_m,
            leader,
        };
        self.last = Some(result.clone());
        result
    }
}
