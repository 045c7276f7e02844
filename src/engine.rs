//! One tracking session end to end.
//!
//! `RunEngine` owns the session context and the course/ghost/live-activity
//! collaborators around it. Every sample is accepted by the session first;
//! the course tracker then looks at it under the status it was accepted in,
//! and its decisions are dispatched back as actions before the ghost and the
//! widget see the result.

use log::debug;

use crate::config::TrackerConfig;
use crate::course::CourseTracker;
use crate::events::{EventLog, EventSink, RunEvent};
use crate::ghost::{GhostCompareResult, GhostCoordinator};
use crate::live_activity::{LiveActivityPayload, LiveActivityThrottle, MessageType};
use crate::session::{RunAction, RunContext, RunMode, RunStatus, RunVariant};
use crate::types::{HasPosition, RunSample, TimestampMs};

pub struct RunEngine<S: EventSink = EventLog> {
    ctx: RunContext,
    course: Option<CourseTracker>,
    ghost: Option<GhostCoordinator>,
    ghost_result: Option<GhostCompareResult>,
    live: LiveActivityThrottle,
    live_pending: Option<LiveActivityPayload>,
    message: Option<(String, MessageType)>,
    sink: S,
}

impl RunEngine<EventLog> {
    pub fn with_event_log(config: &TrackerConfig) -> Self {
        Self::new(config, EventLog::new())
    }
}

impl<S: EventSink> RunEngine<S> {
    pub fn new(config: &TrackerConfig, sink: S) -> Self {
        RunEngine {
            ctx: RunContext::new(config.stats.clone()),
            course: None,
            ghost: None,
            ghost_result: None,
            live: LiveActivityThrottle::new(config.live_activity.clone()),
            live_pending: None,
            message: None,
            sink,
        }
    }

    pub fn with_course(mut self, course: CourseTracker) -> Self {
        self.course = Some(course);
        self
    }

    /// Ghost comparison only runs in course mode.
    pub fn with_ghost(mut self, ghost: GhostCoordinator) -> Self {
        self.ghost = Some(ghost);
        self
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub fn status(&self) -> RunStatus {
        self.ctx.status
    }

    pub fn course(&self) -> Option<&CourseTracker> {
        self.course.as_ref()
    }

    pub fn ghost_result(&self) -> Option<&GhostCompareResult> {
        self.ghost_result.as_ref()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Latest widget payload that passed the throttle, if not yet taken.
    pub fn take_live_activity(&mut self) -> Option<LiveActivityPayload> {
        self.live_pending.take()
    }

    /// Start a session in the mode implied by the attached collaborators.
    pub fn start(&mut self, at: TimestampMs) {
        let mode = if self.course.is_some() {
            RunMode::Course
        } else {
            RunMode::Solo
        };
        let variant = if mode == RunMode::Course && self.ghost.is_some() {
            RunVariant::Ghost
        } else {
            RunVariant::Standard
        };
        self.dispatch(RunAction::Start { mode, variant, at });
    }

    pub fn dispatch(&mut self, action: RunAction) {
        let from = self.ctx.status;
        let at = action.at();

        if matches!(action, RunAction::Start { .. } | RunAction::Reset) {
            self.reset_collaborators();
        }

        let is_start = matches!(action, RunAction::Start { .. });
        let event = transition_event(&action, from);
        let ctx = std::mem::take(&mut self.ctx);
        self.ctx = ctx.reduce(action);
        let to = self.ctx.status;

        if from == RunStatus::PausedOffcourse && to != from {
            self.message = None;
        }
        if let Some(event) = event.filter(|_| to != from || is_start) {
            self.sink.emit(event);
        }
        if let (Some(at), true) = (at, to != from) {
            self.refresh_live(at);
        }
    }

    /// Feed one fused sample through the session and its collaborators.
    pub fn on_sample(&mut self, sample: RunSample) {
        let accepted_in = self.ctx.status;
        let at = sample.timestamp;
        let position = sample.position();
        self.dispatch(RunAction::AcceptSample(sample.clone()));

        let update = self
            .course
            .as_mut()
            .map(|course| course.observe(accepted_in, &sample));
        if let Some(update) = update {
            for event in update.events {
                self.note_message(&event);
                self.sink.emit(event);
            }
            for action in update.actions {
                self.dispatch(action);
            }
        }

        if self.ctx.variant == RunVariant::Ghost && self.ctx.status.is_running() {
            if let (Some(ghost), Some(course)) = (self.ghost.as_mut(), self.course.as_ref()) {
                let before = ghost.leader();
                let elapsed = self.ctx.elapsed_ms(at);
                let result = ghost.compare(
                    elapsed,
                    position,
                    course.leg_index(),
                    course.legs(),
                    &mut self.sink,
                );
                if before.is_some() && before != Some(result.leader) {
                    let text = format!("run/ghost-change-leader:{:?}", result.leader);
                    self.message = Some((text, MessageType::Ghost));
                }
                self.ghost_result = Some(result);
            }
        }

        self.refresh_live(at);
    }

    fn note_message(&mut self, event: &RunEvent) {
        match event {
            RunEvent::NavOffCourseWarning { variant } => {
                self.message = Some((format!("{}:{}", event.key(), variant), MessageType::Warning));
            }
            RunEvent::NavApproachLeg { .. } | RunEvent::NavLegAdvanced { .. } => {
                self.message = Some((event.key().to_string(), MessageType::Navigation));
            }
            _ => {}
        }
    }

    fn refresh_live(&mut self, now: TimestampMs) {
        let progress = match (self.course.as_ref(), self.ctx.main_timeline.last()) {
            (Some(course), Some(last)) => Some(course.progress_fraction(last.position())),
            (Some(_), None) => Some(0.0),
            _ => None,
        };
        let Some(payload) = LiveActivityPayload::from_context(&self.ctx, progress, self.message.clone()) else {
            return;
        };
        if let Some(sent) = self.live.offer(payload, now) {
            self.live_pending = Some(sent);
        }
    }

    fn reset_collaborators(&mut self) {
        debug!("[engine] resetting collaborators");
        if let Some(course) = self.course.as_mut() {
            course.reset();
        }
        if let Some(ghost) = self.ghost.as_mut() {
            ghost.reset();
        }
        self.ghost_result = None;
        self.live.reset();
        self.live_pending = None;
        self.message = None;
    }
}

/// Notification for an action, given the status it was applied in. Only
/// emitted when the action actually changed the status.
fn transition_event(action: &RunAction, from: RunStatus) -> Option<RunEvent> {
    match action {
        RunAction::Start { mode: RunMode::Course, .. } | RunAction::Ready => Some(RunEvent::RunReady),
        RunAction::Start { .. } | RunAction::Begin { .. } => Some(RunEvent::RunStart),
        RunAction::PauseUser { .. } => Some(RunEvent::RunPause),
        RunAction::OffCourse { .. } => Some(RunEvent::RunOffCourse),
        RunAction::Complete { .. } => Some(RunEvent::RunComplete),
        RunAction::Resume { .. } | RunAction::OnCourse { .. } if from == RunStatus::PausedOffcourse => {
            Some(RunEvent::RunOnCourse)
        }
        RunAction::Resume { .. } | RunAction::OnCourse { .. } => Some(RunEvent::RunResume),
        RunAction::Extend { .. } => Some(RunEvent::RunExtend),
        RunAction::Stop { .. } => Some(RunEvent::RunStop),
        RunAction::Reset | RunAction::AcceptSample(_) => None,
    }
}
