//! Output module for terminal records and crawl reporting
//!
//! This module handles:
//! - The `RecordSink` abstraction and its JSON Lines implementation
//! - The dedicated writer task that owns the sink
//! - Crawl statistics and end-of-run summaries

mod jsonl;
pub mod stats;
mod traits;
mod writer;

pub use jsonl::{read_records, JsonLinesSink};
pub use stats::{print_checkpoint, print_statistics, CrawlStatistics};
pub use traits::{CrawlSummary, OutputError, OutputResult, RecordSink};
pub use writer::{RecordWriter, WriteProgress, WriterMessage, DEFAULT_CHANNEL_SIZE};
