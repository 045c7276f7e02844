use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::legs::{progress_along_course, total_distance_m, CourseLeg};
use super::CourseDefinition;
use crate::error::{Result, TelemetryError};
use crate::events::RunEvent;
use crate::geometry::{distance_m, project_onto_polyline};
use crate::session::{RunAction, RunStatus};
use crate::types::{HasPosition, LatLng, RunSample, TimestampMs};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CourseConfig {
    /// Distance to the first checkpoint that starts the run (m)
    pub start_enter_m: f64,
    /// Perpendicular distance from the current leg that pauses the run (m)
    pub off_enter_m: f64,
    /// Distance back to the off-course anchor that resumes it (m)
    pub off_return_m: f64,
    /// Distance to the leg end that announces the next checkpoint (m)
    pub guidance_advance_m: f64,
    /// Distance to the leg end that counts as passing it (m)
    pub pass_checkpoint_m: f64,
    pub warning_interval_ms: i64,
    /// Continuous off-course time that force-stops the session
    pub auto_stop_ms: i64,
}

impl Default for CourseConfig {
    fn default() -> Self {
        Self {
            start_enter_m: 25.0,
            off_enter_m: 35.0,
            off_return_m: 18.0,
            guidance_advance_m: 40.0,
            pass_checkpoint_m: 15.0,
            warning_interval_ms: 4_000,
            auto_stop_ms: 10 * 60 * 1_000,
        }
    }
}

/// Decisions for one sample: session actions to dispatch and
/// notifications that do not change session state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CourseUpdate {
    pub actions: Vec<RunAction>,
    pub events: Vec<RunEvent>,
}

impl CourseUpdate {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.events.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct OffCourse {
    anchor: LatLng,
    since: TimestampMs,
    last_warning_at: Option<TimestampMs>,
}

/// Per-sample course progress tracker.
///
/// Reads the session status and proposes actions; it never mutates the
/// session itself. Leg index only moves forward and completion fires once.
#[derive(Clone, Debug)]
pub struct CourseTracker {
    config: CourseConfig,
    legs: Vec<CourseLeg>,
    leg_index: usize,
    approach_announced: Vec<bool>,
    completed: bool,
    off_course: Option<OffCourse>,
    warning_variant: u8,
    auto_stopped: bool,
}

impl CourseTracker {
    pub fn new(course: &CourseDefinition, config: CourseConfig) -> Result<Self> {
        Self::from_legs(course.legs()?, config)
    }

    pub fn from_legs(legs: Vec<CourseLeg>, config: CourseConfig) -> Result<Self> {
        if legs.is_empty() {
            return Err(TelemetryError::CourseTooShort {
                what: "legs",
                needed: 1,
                got: 0,
            });
        }
        info!(
            "[course] {} legs, {:.0} m",
            legs.len(),
            total_distance_m(&legs)
        );
        Ok(CourseTracker {
            config,
            approach_announced: vec![false; legs.len()],
            legs,
            leg_index: 0,
            completed: false,
            off_course: None,
            warning_variant: 0,
            auto_stopped: false,
        })
    }

    /// Back to the first leg for a new session on the same course.
    pub fn reset(&mut self) {
        self.leg_index = 0;
        self.approach_announced.iter_mut().for_each(|a| *a = false);
        self.completed = false;
        self.off_course = None;
        self.warning_variant = 0;
        self.auto_stopped = false;
    }

    pub fn legs(&self) -> &[CourseLeg] {
        &self.legs
    }

    pub fn leg_index(&self) -> usize {
        self.leg_index
    }

    pub fn current_leg(&self) -> &CourseLeg {
        &self.legs[self.leg_index]
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn off_course_anchor(&self) -> Option<LatLng> {
        self.off_course.map(|off| off.anchor)
    }

    pub fn total_distance_m(&self) -> f64 {
        total_distance_m(&self.legs)
    }

    /// Course distance covered at `p` on the current leg
    pub fn progress_m(&self, p: LatLng) -> f64 {
        progress_along_course(&self.legs, self.leg_index, p)
    }

    /// Covered fraction of the course, in [0, 1]
    pub fn progress_fraction(&self, p: LatLng) -> f64 {
        let total = self.total_distance_m();
        if total <= 0.0 {
            return 0.0;
        }
        (self.progress_m(p) / total).clamp(0.0, 1.0)
    }

    /// Evaluate one accepted sample against the course given the session
    /// status it was accepted under.
    pub fn observe(&mut self, status: RunStatus, sample: &RunSample) -> CourseUpdate {
        let p = sample.position();
        let at = sample.timestamp;
        let mut update = CourseUpdate::default();

        match status {
            RunStatus::Ready => {
                let start = self.legs[0].start.position();
                let d = distance_m(p, start);
                if d <= self.config.start_enter_m {
                    info!("[course] start line reached ({:.1} m)", d);
                    update.actions.push(RunAction::Begin { at });
                }
            }
            RunStatus::Running => {
                if self.check_off_course(p, at) {
                    update.actions.push(RunAction::OffCourse { at });
                } else {
                    self.advance(p, at, &mut update);
                }
            }
            RunStatus::PausedOffcourse => self.check_return(p, at, &mut update),
            _ => {}
        }
        update
    }

    fn check_off_course(&mut self, p: LatLng, at: TimestampMs) -> bool {
        let Some(proj) = project_onto_polyline(p, &self.current_leg().points) else {
            return false;
        };
        if proj.distance_m <= self.config.off_enter_m {
            return false;
        }
        warn!(
            "[course] off course: {:.1} m from leg {}",
            proj.distance_m, self.leg_index
        );
        self.off_course = Some(OffCourse {
            anchor: proj.foot,
            since: at,
            last_warning_at: None,
        });
        true
    }

    fn check_return(&mut self, p: LatLng, at: TimestampMs, update: &mut CourseUpdate) {
        let Some(mut off) = self.off_course else {
            return;
        };

        let d = distance_m(p, off.anchor);
        if d <= self.config.off_return_m {
            info!("[course] back on course ({:.1} m from anchor)", d);
            self.off_course = None;
            update.actions.push(RunAction::OnCourse { at });
            return;
        }

        let off_course_ms = at - off.since;
        if off_course_ms >= self.config.auto_stop_ms {
            if !self.auto_stopped {
                self.auto_stopped = true;
                warn!("[course] auto-stop after {} ms off course", off_course_ms);
                update.events.push(RunEvent::RunAutoStop { off_course_ms });
                update.actions.push(RunAction::Stop { at });
            }
            return;
        }

        let due = off
            .last_warning_at
            .map(|last| at - last >= self.config.warning_interval_ms)
            .unwrap_or(true);
        if due {
            update.events.push(RunEvent::NavOffCourseWarning {
                variant: self.warning_variant,
            });
            self.warning_variant ^= 1;
            off.last_warning_at = Some(at);
            self.off_course = Some(off);
        }
    }

    fn advance(&mut self, p: LatLng, at: TimestampMs, update: &mut CourseUpdate) {
        let leg_index = self.leg_index;
        let to_end = distance_m(p, self.legs[leg_index].end_position());

        if to_end <= self.config.guidance_advance_m && !self.approach_announced[leg_index] {
            self.approach_announced[leg_index] = true;
            update.events.push(RunEvent::NavApproachLeg { leg_index });
        }

        if to_end > self.config.pass_checkpoint_m {
            return;
        }
        if leg_index + 1 < self.legs.len() {
            self.leg_index += 1;
            debug!("[course] leg {} -> {}", leg_index, self.leg_index);
            update.events.push(RunEvent::NavLegAdvanced {
                leg_index: self.leg_index,
            });
        } else if !self.completed {
            self.completed = true;
            info!("[course] finish reached");
            update.actions.push(RunAction::Complete { at });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::course::build_legs;
    use crate::geometry::from_local;
    use crate::types::{Checkpoint, Telemetry};

    const ORIGIN: LatLng = LatLng {
        lat: 37.5,
        lng: 127.0,
    };

    /// Northbound 400 m course, checkpoints every 200 m
    fn tracker() -> CourseTracker {
        let points: Vec<_> = (0..=40)
            .map(|i| {
                let p = from_local(ORIGIN, 0.0, i as f64 * 10.0);
                Telemetry::point(p.lat, p.lng)
            })
            .collect();
        let cps: Vec<_> = [0, 20, 40]
            .iter()
            .map(|&i| Checkpoint::new(points[i].lat, points[i].lng))
            .collect();
        CourseTracker::from_legs(build_legs(&points, &cps).unwrap(), CourseConfig::default()).unwrap()
    }

    fn at(t: i64, east: f64, north: f64) -> RunSample {
        let p = from_local(ORIGIN, east, north);
        RunSample {
            timestamp: t,
            latitude: p.lat,
            longitude: p.lng,
            accuracy: 5.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_start_detection() {
        let mut tracker = tracker();
        assert!(tracker.observe(RunStatus::Ready, &at(0, 0.0, -40.0)).is_empty());
        let update = tracker.observe(RunStatus::Ready, &at(1_000, 0.0, -20.0));
        assert_eq!(update.actions, vec![RunAction::Begin { at: 1_000 }]);
    }

    #[test]
    fn test_guidance_once_then_advance() {
        let mut tracker = tracker();
        let first = tracker.observe(RunStatus::Running, &at(0, 0.0, 165.0));
        assert_eq!(first.events, vec![RunEvent::NavApproachLeg { leg_index: 0 }]);

        let again = tracker.observe(RunStatus::Running, &at(1_000, 0.0, 175.0));
        assert!(again.is_empty());

        let passed = tracker.observe(RunStatus::Running, &at(2_000, 0.0, 190.0));
        assert_eq!(passed.events, vec![RunEvent::NavLegAdvanced { leg_index: 1 }]);
        assert_eq!(tracker.leg_index(), 1);
    }

    #[test]
    fn test_complete_fires_once() {
        let mut tracker = tracker();
        tracker.observe(RunStatus::Running, &at(0, 0.0, 195.0));
        assert_eq!(tracker.leg_index(), 1);

        let finish = tracker.observe(RunStatus::Running, &at(1_000, 0.0, 395.0));
        assert!(finish.actions.contains(&RunAction::Complete { at: 1_000 }));
        assert!(tracker.is_completed());

        let after = tracker.observe(RunStatus::Running, &at(2_000, 0.0, 398.0));
        assert!(after.actions.is_empty());
        assert_eq!(tracker.leg_index(), 1);
    }

    #[test]
    fn test_off_course_hysteresis() {
        let mut tracker = tracker();
        assert!(tracker.observe(RunStatus::Running, &at(0, 30.0, 50.0)).actions.is_empty());

        let off = tracker.observe(RunStatus::Running, &at(1_000, 40.0, 50.0));
        assert_eq!(off.actions, vec![RunAction::OffCourse { at: 1_000 }]);
        assert!(tracker.off_course_anchor().is_some());

        let still_off = tracker.observe(RunStatus::PausedOffcourse, &at(2_000, 20.0, 50.0));
        assert!(still_off.actions.is_empty());

        let back = tracker.observe(RunStatus::PausedOffcourse, &at(3_000, 15.0, 50.0));
        assert_eq!(back.actions, vec![RunAction::OnCourse { at: 3_000 }]);
        assert!(tracker.off_course_anchor().is_none());
    }

    #[test]
    fn test_warnings_alternate_every_interval() {
        let mut tracker = tracker();
        tracker.observe(RunStatus::Running, &at(0, 60.0, 50.0));

        let variants: Vec<u8> = (1..=12)
            .flat_map(|s| tracker.observe(RunStatus::PausedOffcourse, &at(s * 1_000, 60.0, 50.0)).events)
            .filter_map(|e| match e {
                RunEvent::NavOffCourseWarning { variant } => Some(variant),
                _ => None,
            })
            .collect();
        // seconds 1, 5, 9
        assert_eq!(variants, vec![0, 1, 0]);
    }

    #[test]
    fn test_leg_index_never_regresses() {
        let mut tracker = tracker();
        tracker.observe(RunStatus::Running, &at(0, 0.0, 195.0));
        assert_eq!(tracker.leg_index(), 1);
        // back near the start of the course
        tracker.observe(RunStatus::Running, &at(1_000, 0.0, 5.0));
        assert_eq!(tracker.leg_index(), 1);
    }

    #[test]
    fn test_paused_user_is_ignored() {
        let mut tracker = tracker();
        let update = tracker.observe(RunStatus::PausedUser, &at(0, 500.0, 50.0));
        assert!(update.is_empty());
    }
}
