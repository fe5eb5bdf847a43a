//! Crawler module for follower-graph traversal
//!
//! This module contains the core crawling logic, including:
//! - The frontier and dedup set
//! - Upstream requests and response classification
//! - Payload parsing and frontier expansion
//! - Overall crawl coordination and shutdown signals

mod coordinator;
mod fetcher;
mod parser;
mod processor;
mod scheduler;
mod shutdown;

pub use coordinator::{Coordinator, RunPaths};
pub use fetcher::{
    classify_status, dispatch, retry_delay, ApiClient, Attempt, AttemptResult, FetchResult,
    MAX_RETRY_DELAY,
};
pub use parser::{parse_followers, FollowersPage};
pub use processor::{
    process_completed, resolve_attempt, AttemptResolution, LeafReason, Processed, Resolution,
};
pub use scheduler::Frontier;
pub use shutdown::shutdown_signal;

use crate::config::CrawlerConfig;
use crate::state::Identity;
use std::time::Duration;

/// Command-line values that take precedence over config and checkpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlOverrides {
    pub max_depth: Option<u32>,
    pub follower_cap: Option<u64>,
}

/// Effective parameters of one crawl
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlSettings {
    pub seed: Identity,
    pub max_depth: u32,
    pub follower_cap: u64,
    pub retry_ceiling: u32,
    pub retry_backoff: Duration,
    pub max_concurrent: usize,
    pub progress_interval: u64,
}

impl CrawlSettings {
    /// Builds settings from the `[crawler]` section
    pub fn from_config(seed: Identity, config: &CrawlerConfig) -> Self {
        Self {
            seed,
            max_depth: config.max_depth,
            follower_cap: config.follower_cap,
            retry_ceiling: config.retry_ceiling,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            max_concurrent: config.max_concurrent_requests as usize,
            progress_interval: config.progress_interval.max(1),
        }
    }

    /// Applies whichever overrides are set
    pub fn with_overrides(mut self, overrides: CrawlOverrides) -> Self {
        if let Some(max_depth) = overrides.max_depth {
            self.max_depth = max_depth;
        }
        if let Some(follower_cap) = overrides.follower_cap {
            self.follower_cap = follower_cap;
        }
        self
    }
}
