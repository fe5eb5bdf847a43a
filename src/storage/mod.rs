//! Storage module for persisting crawl progress
//!
//! This module handles checkpoint persistence for the crawler, including:
//! - Atomic checkpoint writes (temp file in the target directory, then rename)
//! - Loading checkpoints for resumption
//! - Rebuilding the frontier and dedup set from a checkpoint

mod checkpoint;

pub use checkpoint::{load_checkpoint, save_checkpoint, CheckpointError, CheckpointState};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a crawl run as recorded in its checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    /// Returns true if a run with this status left work to resume
    pub fn is_resumable(&self) -> bool {
        !matches!(self, Self::Completed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
