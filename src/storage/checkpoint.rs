//! Checkpoint file format and persistence
//!
//! A checkpoint is a single JSON document. Writes go to a temporary file in
//! the same directory which is then renamed over the target, so a reader
//! only ever sees the previous checkpoint or the new one.

use crate::crawler::Frontier;
use crate::state::{FrontierEntry, Identity};
use crate::storage::RunStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Errors that can occur while saving or loading a checkpoint
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint not found: {0}")]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid checkpoint JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Everything needed to resume a crawl
///
/// Every identity in `visited_identities` either has a record in the output
/// file or appears in `pending_entries`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    pub seed_identity: Identity,
    pub max_depth: u32,
    pub follower_cap: u64,
    pub visited_identities: Vec<Identity>,
    pub pending_entries: Vec<FrontierEntry>,
    pub scraped_count: u64,
    pub rate_limited_count: u64,
    pub status: RunStatus,
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub config_hash: Option<String>,
    #[serde(default)]
    pub output_path: Option<PathBuf>,
}

impl CheckpointState {
    /// Rebuilds the frontier and dedup set
    ///
    /// Pending identities are unclaimed and then re-enqueued, so each is
    /// claimed exactly once in the restored frontier.
    pub fn restore(&self, max_depth: u32) -> Frontier {
        Frontier::from_parts(
            max_depth,
            self.visited_identities.iter().cloned(),
            self.pending_entries.iter().cloned(),
        )
    }

    /// Returns true if the run finished with nothing left to do
    pub fn is_complete(&self) -> bool {
        !self.status.is_resumable() && self.pending_entries.is_empty()
    }
}

/// Atomically writes a checkpoint to `path`
pub fn save_checkpoint(path: &Path, state: &CheckpointState) -> Result<(), CheckpointError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut temp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, state)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    tracing::debug!(
        "Checkpoint saved to {} ({} visited, {} pending)",
        path.display(),
        state.visited_identities.len(),
        state.pending_entries.len()
    );
    Ok(())
}

/// Loads a checkpoint written by `save_checkpoint`
pub fn load_checkpoint(path: &Path) -> Result<CheckpointState, CheckpointError> {
    if !path.exists() {
        return Err(CheckpointError::NotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
