use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::stats::{update_stats, RunningStats, StatsConfig, StatsOptions};
use crate::telemetry::{build_telemetry, extend_segments};
use crate::types::{RunSample, SegmentMeta, Telemetry, TimestampMs};

/// Session state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No session
    Idle,
    /// Course mode, waiting at the start line
    Ready,
    Running,
    PausedUser,
    PausedOffcourse,
    /// Finish reached; samples are held until the runner extends or stops
    CompletionPending,
    RunningExtended,
    Stopped,
}

impl RunStatus {
    pub fn is_running(self) -> bool {
        matches!(self, RunStatus::Running | RunStatus::RunningExtended)
    }

    pub fn is_paused(self) -> bool {
        matches!(self, RunStatus::PausedUser | RunStatus::PausedOffcourse)
    }

    pub fn has_session(self) -> bool {
        !matches!(self, RunStatus::Idle | RunStatus::Stopped)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    Solo,
    Course,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunVariant {
    #[default]
    Standard,
    /// Course run raced against a recorded ghost
    Ghost,
}

/// Inputs to the session reducer. `at` is wall-clock epoch ms.
#[derive(Debug, Clone, PartialEq)]
pub enum RunAction {
    Start {
        mode: RunMode,
        variant: RunVariant,
        at: TimestampMs,
    },
    Ready,
    /// Runner crossed the start line (course mode)
    Begin { at: TimestampMs },
    PauseUser { at: TimestampMs },
    OffCourse { at: TimestampMs },
    Complete { at: TimestampMs },
    Resume { at: TimestampMs },
    OnCourse { at: TimestampMs },
    Extend { at: TimestampMs },
    Stop { at: TimestampMs },
    Reset,
    AcceptSample(RunSample),
}

impl RunAction {
    pub fn name(&self) -> &'static str {
        match self {
            RunAction::Start { .. } => "START",
            RunAction::Ready => "READY",
            RunAction::Begin { .. } => "BEGIN",
            RunAction::PauseUser { .. } => "PAUSE_USER",
            RunAction::OffCourse { .. } => "OFFCOURSE",
            RunAction::Complete { .. } => "COMPLETE",
            RunAction::Resume { .. } => "RESUME",
            RunAction::OnCourse { .. } => "ONCOURSE",
            RunAction::Extend { .. } => "EXTEND",
            RunAction::Stop { .. } => "STOP",
            RunAction::Reset => "RESET",
            RunAction::AcceptSample(_) => "ACCEPT_SAMPLE",
        }
    }

    /// Wall-clock time the action happened, when it carries one.
    pub fn at(&self) -> Option<TimestampMs> {
        match self {
            RunAction::Start { at, .. }
            | RunAction::Begin { at }
            | RunAction::PauseUser { at }
            | RunAction::OffCourse { at }
            | RunAction::Complete { at }
            | RunAction::Resume { at }
            | RunAction::OnCourse { at }
            | RunAction::Extend { at }
            | RunAction::Stop { at } => Some(*at),
            RunAction::AcceptSample(sample) => Some(sample.timestamp),
            RunAction::Ready | RunAction::Reset => None,
        }
    }
}

/// Start/pause anchors for the OS live-activity widget. `started_at` is
/// shifted forward by every pause so widget elapsed time excludes pauses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveActivityAnchor {
    pub started_at: Option<TimestampMs>,
    pub paused_at: Option<TimestampMs>,
}

/// The session aggregate. Owns every buffer and the stats/telemetry logs;
/// only [`RunContext::reduce`] changes them.
#[derive(Debug, Clone, PartialEq)]
pub struct RunContext {
    pub session_id: Option<String>,
    pub mode: RunMode,
    pub variant: RunVariant,
    pub status: RunStatus,
    pub main_timeline: Vec<RunSample>,
    pub paused_buffer: Vec<RunSample>,
    pub muted_buffer: Vec<RunSample>,
    pub post_complete_buffer: Vec<RunSample>,
    pub stats: RunningStats,
    pub telemetries: Vec<Telemetry>,
    pub segments: Vec<SegmentMeta>,
    pub live_activity: LiveActivityAnchor,
    /// Next running sample contributes no elapsed time
    pub zero_dt_pending: bool,
    pub stats_config: StatsConfig,
}

impl RunContext {
    pub fn new(stats_config: StatsConfig) -> Self {
        RunContext {
            session_id: None,
            mode: RunMode::default(),
            variant: RunVariant::default(),
            status: RunStatus::Idle,
            main_timeline: Vec::new(),
            paused_buffer: Vec::new(),
            muted_buffer: Vec::new(),
            post_complete_buffer: Vec::new(),
            stats: RunningStats::default(),
            telemetries: Vec::new(),
            segments: Vec::new(),
            live_activity: LiveActivityAnchor::default(),
            zero_dt_pending: false,
            stats_config,
        }
    }

    /// Apply one action and return the next context. Actions whose
    /// precondition does not hold leave the context unchanged.
    pub fn reduce(mut self, action: RunAction) -> RunContext {
        let from = self.status;
        let name = action.name();

        match action {
            RunAction::Start { mode, variant, at } => {
                let mut next = RunContext::new(self.stats_config);
                next.session_id = Some(format!("run_{}", at));
                next.mode = mode;
                next.variant = variant;
                match mode {
                    RunMode::Course => next.status = RunStatus::Ready,
                    RunMode::Solo => {
                        next.status = RunStatus::Running;
                        next.live_activity.started_at = Some(at);
                    }
                }
                self = next;
            }
            RunAction::Ready if from.has_session() => self.status = RunStatus::Ready,
            RunAction::Begin { at } if from == RunStatus::Ready => {
                self.status = RunStatus::Running;
                self.live_activity.started_at.get_or_insert(at);
                self.muted_buffer.clear();
            }
            RunAction::PauseUser { at } if from.is_running() => {
                self.suspend(RunStatus::PausedUser, at)
            }
            RunAction::OffCourse { at } if from.is_running() => {
                self.suspend(RunStatus::PausedOffcourse, at)
            }
            RunAction::Complete { at } if from.is_running() => {
                self.suspend(RunStatus::CompletionPending, at)
            }
            RunAction::Resume { at } | RunAction::OnCourse { at } if from.is_paused() => {
                self.resume(at)
            }
            RunAction::Extend { .. } if from == RunStatus::CompletionPending => self.extend(),
            RunAction::Stop { .. } => self.status = RunStatus::Stopped,
            RunAction::Reset => self = RunContext::new(self.stats_config),
            RunAction::AcceptSample(sample) => self.accept(sample),
            _ => {
                debug!("{} ignored in {:?}", name, from);
                return self;
            }
        }

        if self.status != from {
            info!("[session] {} {:?} -> {:?}", name, from, self.status);
        }
        self
    }

    fn suspend(&mut self, status: RunStatus, at: TimestampMs) {
        self.status = status;
        self.live_activity.paused_at.get_or_insert(at);
    }

    fn resume(&mut self, at: TimestampMs) {
        self.status = RunStatus::Running;
        if let Some(paused_at) = self.live_activity.paused_at.take() {
            let paused_for = (at - paused_at).max(0);
            if let Some(started_at) = self.live_activity.started_at.as_mut() {
                *started_at += paused_for;
            }
        }
        self.main_timeline.append(&mut self.paused_buffer);
        self.muted_buffer.clear();
        self.zero_dt_pending = true;
    }

    fn extend(&mut self) {
        self.status = RunStatus::RunningExtended;
        self.live_activity.paused_at = None;
        let held = std::mem::take(&mut self.post_complete_buffer);
        debug!("replaying {} held samples", held.len());
        for sample in held {
            self.record_running(sample);
        }
    }

    fn accept(&mut self, sample: RunSample) {
        match self.status {
            RunStatus::Running | RunStatus::RunningExtended => self.record_running(sample),
            RunStatus::PausedUser => {
                let telemetry =
                    build_telemetry(&self.stats, &sample, self.telemetries.last(), false);
                self.push_telemetry(telemetry);
                self.paused_buffer.push(sample);
            }
            RunStatus::Ready | RunStatus::PausedOffcourse => self.muted_buffer.push(sample),
            RunStatus::CompletionPending => self.post_complete_buffer.push(sample),
            RunStatus::Idle | RunStatus::Stopped => {
                debug!("sample at {} rejected in {:?}", sample.timestamp, self.status)
            }
        }
    }

    fn record_running(&mut self, sample: RunSample) {
        let opts = StatsOptions {
            zero_dt: std::mem::take(&mut self.zero_dt_pending),
        };
        self.stats = update_stats(&self.stats, &sample, &self.stats_config, opts);
        let telemetry = build_telemetry(&self.stats, &sample, self.telemetries.last(), true);
        self.push_telemetry(telemetry);
        self.main_timeline.push(sample);
    }

    fn push_telemetry(&mut self, telemetry: Telemetry) {
        let is_running = telemetry.is_running;
        self.telemetries.push(telemetry);
        extend_segments(&mut self.segments, self.telemetries.len(), is_running);
    }

    /// Running time excluding pauses, as the live-activity widget shows it.
    pub fn elapsed_ms(&self, now: TimestampMs) -> i64 {
        match self.live_activity.started_at {
            Some(started_at) => {
                let until = self.live_activity.paused_at.unwrap_or(now);
                (until - started_at).max(0)
            }
            None => 0,
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new(StatsConfig::default())
    }
}
