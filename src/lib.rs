//! Follower-Frontier: a resumable follower-graph crawler
//!
//! This crate crawls the follower graph of an authenticated API breadth-first
//! from a seed identity. Requests are authorized with short-lived credentials
//! harvested out-of-band, upstream rate limiting is absorbed by a per-entry
//! retry state machine, and progress is checkpointed so an interrupted crawl
//! can resume without losing or duplicating work.

pub mod config;
pub mod crawler;
pub mod credentials;
pub mod output;
pub mod state;
pub mod storage;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Main error type for Follower-Frontier operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] storage::CheckpointError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("Credential harvester gave up after {failures} consecutive failures: {last}")]
    HarvesterExhausted { failures: u32, last: String },

    #[error("Invalid seed identity: {0:?}")]
    InvalidSeed(String),

    #[error("Invalid attempt transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::AttemptState,
        to: state::AttemptState,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Outcome of a single failed attempt against the upstream API
///
/// Every variant is either retryable (the entry goes back on the frontier)
/// or fatal (the entry resolves to an error record and its identity stays
/// sealed in the dedup set).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptError {
    #[error("credential rejected")]
    AuthExpired,

    #[error("forbidden")]
    Forbidden,

    #[error("rate limited")]
    RateLimited,

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("credential harvest failed: {0}")]
    HarvesterFailure(String),

    #[error("retry ceiling exceeded after {attempts} attempts ({last})")]
    RetryCeilingExceeded {
        attempts: u32,
        last: Box<AttemptError>,
    },
}

impl AttemptError {
    /// Returns true if the same entry may be attempted again
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::AuthExpired | Self::RateLimited | Self::Transient(_) | Self::HarvesterFailure(_) => {
                true
            }
            Self::Forbidden | Self::MalformedPayload(_) | Self::RetryCeilingExceeded { .. } => false,
        }
    }

    /// Returns true if the credential attached to the failing request must be
    /// removed from the pool
    pub fn invalidates_credential(&self) -> bool {
        match self {
            Self::AuthExpired | Self::RateLimited => true,
            Self::Forbidden
            | Self::Transient(_)
            | Self::MalformedPayload(_)
            | Self::HarvesterFailure(_)
            | Self::RetryCeilingExceeded { .. } => false,
        }
    }

    /// The metrics bucket this error is counted under
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::AuthExpired => ErrorCategory::AuthExpired,
            Self::Forbidden => ErrorCategory::Forbidden,
            Self::RateLimited => ErrorCategory::RateLimited,
            Self::Transient(_) => ErrorCategory::Transient,
            Self::MalformedPayload(_) => ErrorCategory::MalformedPayload,
            Self::HarvesterFailure(_) => ErrorCategory::HarvesterFailure,
            Self::RetryCeilingExceeded { .. } => ErrorCategory::RetryCeilingExceeded,
        }
    }
}

/// Error categories used for end-of-run reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    AuthExpired,
    Forbidden,
    RateLimited,
    Transient,
    MalformedPayload,
    HarvesterFailure,
    RetryCeilingExceeded,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthExpired => "auth_expired",
            Self::Forbidden => "forbidden",
            Self::RateLimited => "rate_limited",
            Self::Transient => "transient",
            Self::MalformedPayload => "malformed_payload",
            Self::HarvesterFailure => "harvester_failure",
            Self::RetryCeilingExceeded => "retry_ceiling_exceeded",
        }
    }

    /// Returns all categories in reporting order
    pub fn all() -> [Self; 7] {
        [
            Self::AuthExpired,
            Self::Forbidden,
            Self::RateLimited,
            Self::Transient,
            Self::MalformedPayload,
            Self::HarvesterFailure,
            Self::RetryCeilingExceeded,
        ]
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result type alias for Follower-Frontier operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Coordinator, CrawlSettings};
pub use credentials::{Credential, CredentialPool, Harvester};
pub use state::{AttemptState, FrontierEntry, Identity, Record};
