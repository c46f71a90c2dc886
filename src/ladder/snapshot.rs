//! Monitoring snapshot with JSON persistence

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::LadderResult;
use super::pool::{JournalEntry, PoolSummary};
use super::types::{LevelUpdate, SlotStatus};

/// Point-in-time view of the whole ladder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LadderSnapshot {
    pub taken_at: DateTime<Utc>,
    pub session_open: bool,
    pub summary: PoolSummary,
    pub slots: Vec<SlotStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_levels: Option<LevelUpdate>,
    /// Most recent slot outcomes, oldest first
    #[serde(default)]
    pub recent_outcomes: Vec<JournalEntry>,
}

impl LadderSnapshot {
    pub fn load_from_file(path: impl AsRef<Path>) -> LadderResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write to a temp file then rename, so readers never see a partial file
    pub fn save_to_file_atomic(&self, path: impl AsRef<Path>) -> LadderResult<()> {
        let path = path.as_ref();
        let temp_path = path.with_extension("tmp");

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&temp_path, content)?;
        std::fs::rename(&temp_path, path)?;

        Ok(())
    }
}
