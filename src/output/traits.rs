//! Output sink trait and summary types
//!
//! This module defines the trait interface for record sinks and the
//! end-of-run summary handed back to the caller.

use crate::credentials::PoolStats;
use crate::output::CrawlStatistics;
use crate::state::{Identity, Record};
use crate::storage::RunStatus;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record writer is no longer running")]
    WriterClosed,

    #[error("Record writer panicked: {0}")]
    WriterPanicked(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Destination for terminal records
///
/// A sink is owned by exactly one writer, so implementations need no
/// internal locking.
pub trait RecordSink: Send {
    /// Appends one record
    fn write_record(&mut self, record: &Record) -> OutputResult<()>;

    /// Makes every record written so far durable
    fn flush(&mut self) -> OutputResult<()>;
}

/// Summary of a finished (or stopped) crawl
#[derive(Debug, Clone)]
pub struct CrawlSummary {
    // Run metadata
    pub status: RunStatus,
    pub seed: Identity,
    pub max_depth: u32,
    pub follower_cap: u64,
    pub elapsed_secs: f64,

    // Counters
    pub statistics: CrawlStatistics,
    pub pool: PoolStats,

    // Frontier state at close
    pub visited: usize,
    pub pending: usize,
    pub parked: usize,

    // Files
    pub records_path: PathBuf,
    pub checkpoint_path: PathBuf,
}
