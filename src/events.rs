use log::info;
use serde::Serialize;

use crate::ghost::Leader;

/// Semantic intents for the voice/notification layer. The engine emits what
/// happened; wording and delivery are the collaborator's concern.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    RunReady,
    RunStart,
    RunPause,
    RunResume,
    RunOffCourse,
    RunOnCourse,
    RunComplete,
    RunExtend,
    RunStop,
    /// Session force-stopped after too long off course
    RunAutoStop { off_course_ms: i64 },
    NavApproachLeg { leg_index: usize },
    NavLegAdvanced { leg_index: usize },
    /// Alternates between two warning messages while off course
    NavOffCourseWarning { variant: u8 },
    GhostLeaderChanged { leader: Leader, delta_m: f64 },
}

impl RunEvent {
    pub fn key(&self) -> &'static str {
        match self {
            RunEvent::RunReady => "run/ready",
            RunEvent::RunStart => "run/start",
            RunEvent::RunPause => "run/pause",
            RunEvent::RunResume => "run/resume",
            RunEvent::RunOffCourse => "run/off-course",
            RunEvent::RunOnCourse => "run/on-course",
            RunEvent::RunComplete => "run/complete",
            RunEvent::RunExtend => "run/extend",
            RunEvent::RunStop => "run/stop",
            RunEvent::RunAutoStop { .. } => "run/auto-stop",
            RunEvent::NavApproachLeg { .. } => "nav/approach-leg",
            RunEvent::NavLegAdvanced { .. } => "nav/leg-advanced",
            RunEvent::NavOffCourseWarning { .. } => "nav/off-course-warning",
            RunEvent::GhostLeaderChanged { .. } => "run/ghost-change-leader",
        }
    }
}

/// Outbound seam to the notification collaborator
pub trait EventSink {
    fn emit(&mut self, event: RunEvent);
}

/// In-memory sink; also logs every event.
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    events: Vec<RunEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[RunEvent] {
        &self.events
    }

    pub fn drain(&mut self) -> Vec<RunEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn count(&self, key: &str) -> usize {
        self.events.iter().filter(|e| e.key() == key).count()
    }
}

impl EventSink for EventLog {
    fn emit(&mut self, event: RunEvent) {
        info!("[event] {}", event.key());
        self.events.push(event);
    }
}
