//! Crawl metrics aggregation and reporting
//!
//! The coordinator feeds every record, retry, and attempt error into
//! `CrawlStatistics`; the binary prints the result at the end of a run or
//! from a saved checkpoint.

use crate::crawler::LeafReason;
use crate::output::CrawlSummary;
use crate::state::Record;
use crate::storage::CheckpointState;
use crate::ErrorCategory;
use std::collections::BTreeMap;

/// Counters collected during a crawl
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawlStatistics {
    /// Records handed to the writer in this run
    pub records_written: u64,

    /// Successful records, including those from earlier runs of a resumed crawl
    pub scraped: u64,

    /// Error records written in this run
    pub error_records: u64,

    /// Every attempt error seen, by category
    pub errors_by_category: BTreeMap<ErrorCategory, u64>,

    /// Entries requeued for another attempt
    pub retries: u64,

    /// Rate-limit responses, including those from earlier runs
    pub rate_limited: u64,

    /// Children accepted onto the frontier
    pub children_enqueued: u64,

    /// Completed entries that were not expanded, by reason
    pub leaves: BTreeMap<LeafReason, u64>,

    /// Deepest level a record was written at
    pub deepest: u32,
}

impl CrawlStatistics {
    /// Starts from the counters a checkpoint carried over
    pub fn resumed(scraped: u64, rate_limited: u64) -> Self {
        Self {
            scraped,
            rate_limited,
            ..Self::default()
        }
    }

    pub fn record_error(&mut self, category: ErrorCategory) {
        *self.errors_by_category.entry(category).or_insert(0) += 1;
        if category == ErrorCategory::RateLimited {
            self.rate_limited += 1;
        }
    }

    pub fn record_written(&mut self, record: &Record) {
        self.records_written += 1;
        if record.is_error() {
            self.error_records += 1;
        } else {
            self.scraped += 1;
        }
        self.deepest = self.deepest.max(record.depth);
    }

    /// Takes back a record the writer accepted but never flushed
    pub fn record_lost(&mut self, record_was_error: bool) {
        self.records_written = self.records_written.saturating_sub(1);
        if record_was_error {
            self.error_records = self.error_records.saturating_sub(1);
        } else {
            self.scraped = self.scraped.saturating_sub(1);
        }
    }

    pub fn record_leaf(&mut self, reason: LeafReason) {
        *self.leaves.entry(reason).or_insert(0) += 1;
    }

    pub fn record_retry(&mut self) {
        self.retries += 1;
    }

    pub fn record_child(&mut self) {
        self.children_enqueued += 1;
    }

    pub fn error_count(&self, category: ErrorCategory) -> u64 {
        self.errors_by_category.get(&category).copied().unwrap_or(0)
    }

    pub fn total_errors(&self) -> u64 {
        self.errors_by_category.values().sum()
    }

    /// Share of records written in this run that succeeded, in percent
    pub fn success_rate(&self) -> f64 {
        if self.records_written == 0 {
            return 0.0;
        }
        let successes = self.records_written - self.error_records;
        (successes as f64 / self.records_written as f64) * 100.0
    }
}

/// Prints an end-of-run summary to stdout
pub fn print_statistics(summary: &CrawlSummary) {
    let stats = &summary.statistics;

    println!("=== Crawl Statistics ===\n");

    println!("Run:");
    println!("  Seed: {}", summary.seed);
    println!("  Status: {}", summary.status);
    println!("  Max depth: {}", summary.max_depth);
    println!("  Follower cap: {}", summary.follower_cap);
    println!("  Elapsed: {:.1}s", summary.elapsed_secs);
    println!();

    println!("Records:");
    println!("  Written this run: {}", stats.records_written);
    println!("  Total scraped: {}", stats.scraped);
    println!("  Error records: {}", stats.error_records);
    println!("  Deepest level: {}", stats.deepest);
    println!("  Children enqueued: {}", stats.children_enqueued);
    println!("  Retries: {}", stats.retries);
    println!();

    if !stats.leaves.is_empty() {
        println!("Leaves:");
        for (reason, count) in &stats.leaves {
            println!("  {}: {}", reason, count);
        }
        println!();
    }

    if stats.total_errors() > 0 {
        println!("Attempt Errors:");
        let mut error_counts: Vec<_> = stats.errors_by_category.iter().collect();
        error_counts.sort_by(|a, b| b.1.cmp(a.1));
        for (category, count) in error_counts {
            println!("  {}: {}", category, count);
        }
        println!();
    }

    println!("Credentials:");
    println!("  Pool size at close: {}", summary.pool.size);
    println!("  Harvested: {}", summary.pool.harvested);
    println!("  Invalidated: {}", summary.pool.invalidated);
    println!("  Harvest failures: {}", summary.pool.harvest_failures);
    println!("  Rate limited: {}", stats.rate_limited);
    println!();

    println!("Frontier:");
    println!("  Visited: {}", summary.visited);
    println!("  Pending: {}", summary.pending);
    println!("  Parked: {}", summary.parked);
    println!();

    println!("Output: {}", summary.records_path.display());
    println!("Checkpoint: {}", summary.checkpoint_path.display());
    println!(
        "Success Rate: {:.1}% ({} / {} records this run)",
        stats.success_rate(),
        stats.records_written - stats.error_records,
        stats.records_written
    );
}

/// Prints what a saved checkpoint contains
pub fn print_checkpoint(state: &CheckpointState) {
    println!("=== Checkpoint ===\n");
    println!("  Seed: {}", state.seed_identity);
    println!("  Status: {}", state.status);
    println!("  Saved at: {}", state.saved_at.to_rfc3339());
    println!("  Max depth: {}", state.max_depth);
    println!("  Follower cap: {}", state.follower_cap);
    println!("  Scraped: {}", state.scraped_count);
    println!("  Rate limited: {}", state.rate_limited_count);
    println!("  Visited identities: {}", state.visited_identities.len());
    println!("  Pending entries: {}", state.pending_entries.len());

    if !state.pending_entries.is_empty() {
        let mut by_depth: BTreeMap<u32, usize> = BTreeMap::new();
        for entry in &state.pending_entries {
            *by_depth.entry(entry.depth).or_insert(0) += 1;
        }
        for (depth, count) in by_depth {
            println!("    depth {}: {}", depth, count);
        }
    }

    if let Some(path) = &state.output_path {
        println!("  Output: {}", path.display());
    }
    if let Some(hash) = &state.config_hash {
        println!("  Config hash: {}", hash);
    }
}
