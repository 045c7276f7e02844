//! Course mode: a dense polyline split into legs at authored checkpoints,
//! and the per-sample tracker that drives start, off-course, guidance and
//! completion decisions.

pub mod legs;
pub mod tracker;

pub use legs::{build_legs, progress_along_course, total_distance_m, CourseLeg};
pub use tracker::{CourseConfig, CourseTracker, CourseUpdate};

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{Checkpoint, Telemetry};

/// Course as stored on disk: `{"name", "points": [...], "checkpoints": [...]}`.
/// Points use the compact telemetry keys (`la`, `ln`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CourseDefinition {
    #[serde(default)]
    pub name: String,
    pub points: Vec<Telemetry>,
    pub checkpoints: Vec<Checkpoint>,
}

impl CourseDefinition {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn legs(&self) -> Result<Vec<CourseLeg>> {
        build_legs(&self.points, &self.checkpoints)
    }
}
