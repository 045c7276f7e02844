use chrono::{SecondsFormat, TimeZone, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::session::RunContext;
use crate::types::TimestampMs;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Navigation,
    Warning,
    Ghost,
}

/// State pushed to the OS lock-screen widget
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveActivityPayload {
    #[serde(rename = "startedAtISO")]
    pub started_at_iso: String,
    #[serde(rename = "pausedAtISO", skip_serializing_if = "Option::is_none")]
    pub paused_at_iso: Option<String>,
    pub recent_pace: Option<f64>,
    pub distance_meters: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_type: Option<MessageType>,
}

impl LiveActivityPayload {
    /// `None` until the run has actually started.
    pub fn from_context(
        ctx: &RunContext,
        progress: Option<f64>,
        message: Option<(String, MessageType)>,
    ) -> Option<Self> {
        let started_at_iso = iso8601(ctx.live_activity.started_at?)?;
        let (message, message_type) = match message {
            Some((text, kind)) => (Some(text), Some(kind)),
            None => (None, None),
        };
        Some(LiveActivityPayload {
            started_at_iso,
            paused_at_iso: ctx.live_activity.paused_at.and_then(iso8601),
            recent_pace: ctx.stats.current_pace_sec_per_km,
            distance_meters: ctx.stats.total_distance_m,
            progress,
            message,
            message_type,
        })
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at_iso.is_some()
    }
}

/// Epoch ms as UTC RFC 3339 with millisecond precision.
pub fn iso8601(ms: TimestampMs) -> Option<String> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveActivityConfig {
    /// Minimum spacing of metric-only updates
    pub min_interval_ms: i64,
    pub distance_delta_m: f64,
    pub pace_delta_s: f64,
    pub progress_delta: f64,
}

impl Default for LiveActivityConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 1_000,
            distance_delta_m: 3.0,
            pace_delta_s: 5.0,
            progress_delta: 0.01,
        }
    }
}

/// Decides which payloads are worth sending to the widget.
#[derive(Clone, Debug, Default)]
pub struct LiveActivityThrottle {
    config: LiveActivityConfig,
    last_sent: Option<(TimestampMs, LiveActivityPayload)>,
}

impl LiveActivityThrottle {
    pub fn new(config: LiveActivityConfig) -> Self {
        LiveActivityThrottle {
            config,
            last_sent: None,
        }
    }

    /// Returns the payload when it should be sent now. Pause and message
    /// flips go out immediately; metric changes wait for the debounce.
    pub fn offer(&mut self, payload: LiveActivityPayload, now: TimestampMs) -> Option<LiveActivityPayload> {
        let send = match &self.last_sent {
            None => true,
            Some((sent_at, last)) => {
                if self.state_flipped(last, &payload) {
                    true
                } else if self.metrics_changed(last, &payload) {
                    now - sent_at >= self.config.min_interval_ms
                } else {
                    false
                }
            }
        };

        if !send {
            return None;
        }
        debug!("[live] update at {}", now);
        self.last_sent = Some((now, payload.clone()));
        Some(payload)
    }

    pub fn last_sent(&self) -> Option<&LiveActivityPayload> {
        self.last_sent.as_ref().map(|(_, payload)| payload)
    }

    pub fn reset(&mut self) {
        self.last_sent = None;
    }

    fn state_flipped(&self, last: &LiveActivityPayload, next: &LiveActivityPayload) -> bool {
        last.is_paused() != next.is_paused()
            || last.message != next.message
            || last.started_at_iso != next.started_at_iso
    }

    fn metrics_changed(&self, last: &LiveActivityPayload, next: &LiveActivityPayload) -> bool {
        let cfg = &self.config;
        (next.distance_meters - last.distance_meters).abs() >= cfg.distance_delta_m
            || option_delta(last.recent_pace, next.recent_pace, cfg.pace_delta_s)
            || option_delta(last.progress, next.progress, cfg.progress_delta)
    }
}

fn option_delta(a: Option<f64>, b: Option<f64>, threshold: f64) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => (a - b).abs() >= threshold,
        (None, None) => false,
        _ => true,
    }
}
