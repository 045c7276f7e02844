use thiserror::Error;

/// Run telemetry error types
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Checkpoint {index} could not be matched to the course polyline")]
    UnmatchedCheckpoint { index: usize },

    #[error("Course needs at least {needed} {what}, got {got}")]
    CourseTooShort {
        what: &'static str,
        needed: usize,
        got: usize,
    },

    #[error("Ghost trace is empty")]
    EmptyGhostTrace,

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for fallible engine operations
pub type Result<T> = std::result::Result<T, TelemetryError>;
