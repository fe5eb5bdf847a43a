//! Configuration module for Follower-Frontier
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use follower_frontier::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("follower-frontier.toml")).unwrap();
//! println!("Crawler will use max depth: {}", config.crawler.max_depth);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ApiConfig, Config, CrawlerConfig, CredentialsConfig, HarvesterConfig, OutputConfig,
};

// Re-export parser functions
pub use parser::{
    compute_config_hash, config_digest, load_config, load_config_with_hash, parse_config,
};

pub use validation::{validate, IDENTITY_PLACEHOLDER};
