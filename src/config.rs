use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::course::CourseConfig;
use crate::error::Result;
use crate::ghost::GhostConfig;
use crate::live_activity::LiveActivityConfig;
use crate::pipeline::PipelineConfig;
use crate::stats::StatsConfig;

/// Every tunable of a tracking session. Missing keys in a config file keep
/// their defaults.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub pipeline: PipelineConfig,
    pub stats: StatsConfig,
    pub course: CourseConfig,
    pub ghost: GhostConfig,
    pub live_activity: LiveActivityConfig,
}

impl TrackerConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
