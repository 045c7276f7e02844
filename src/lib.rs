//! Real-time run telemetry: sensor fusion, running statistics, the run
//! session state machine, course progress and ghost comparison.

pub mod config;
pub mod course;
pub mod engine;
pub mod error;
pub mod events;
pub mod filters;
pub mod geometry;
pub mod ghost;
pub mod live_activity;
pub mod pipeline;
pub mod sample_store;
pub mod session;
pub mod stats;
pub mod storage;
pub mod telemetry;
pub mod types;

pub use config::TrackerConfig;
pub use engine::RunEngine;
pub use error::{Result, TelemetryError};
pub use events::{EventLog, EventSink, RunEvent};
pub use session::{RunAction, RunContext, RunMode, RunStatus, RunVariant};
