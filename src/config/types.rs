use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure for Follower-Frontier
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    pub api: ApiConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    pub harvester: HarvesterConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Maximum depth to crawl from the seed identity
    #[serde(rename = "max-depth")]
    pub max_depth: u32,

    /// Nodes with more followers than this are recorded but not expanded
    #[serde(rename = "follower-cap")]
    pub follower_cap: u64,

    /// Maximum number of requests in flight at once
    #[serde(rename = "max-concurrent-requests")]
    pub max_concurrent_requests: u32,

    /// Retryable failures tolerated per entry before it becomes an error record
    #[serde(rename = "retry-ceiling")]
    pub retry_ceiling: u32,

    /// Base delay before a retried attempt (milliseconds), doubled per retry
    #[serde(rename = "retry-backoff-ms")]
    pub retry_backoff_ms: u64,

    /// Records written between progress log lines
    #[serde(rename = "progress-interval")]
    pub progress_interval: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_depth: 2,
            follower_cap: 100,
            max_concurrent_requests: 16,
            retry_ceiling: 3,
            retry_backoff_ms: 500,
            progress_interval: 25,
        }
    }
}

/// Upstream API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Followers endpoint; `{identity}` is replaced with the identity
    #[serde(rename = "followers-url")]
    pub followers_url: String,

    /// Prefix of profile URIs, e.g. `spotify:user:`
    #[serde(rename = "uri-namespace")]
    pub uri_namespace: String,

    /// Optional user agent; harvested credentials may carry their own
    #[serde(rename = "user-agent", default)]
    pub user_agent: Option<String>,

    /// Whole-request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Connection timeout (seconds)
    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

/// Credential pool configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Replenishment is triggered below this size
    #[serde(rename = "min-pool-size")]
    pub min_pool_size: usize,

    /// Harvested credentials beyond this size are discarded
    #[serde(rename = "max-pool-size")]
    pub max_pool_size: usize,

    /// Delay before retrying a failed harvest (milliseconds)
    #[serde(rename = "harvest-retry-delay-ms")]
    pub harvest_retry_delay_ms: u64,

    /// Consecutive harvest failures tolerated; unbounded when absent
    #[serde(rename = "max-harvest-failures")]
    pub max_harvest_failures: Option<u32>,

    /// Headers a harvested credential must carry to be accepted
    #[serde(rename = "required-headers")]
    pub required_headers: Vec<String>,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            min_pool_size: 5,
            max_pool_size: 15,
            harvest_retry_delay_ms: 2000,
            max_harvest_failures: None,
            required_headers: vec!["authorization".to_string()],
        }
    }
}

/// How new credentials are obtained
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum HarvesterConfig {
    /// Runs an external program that prints one JSON object of headers
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(rename = "timeout-secs", default = "default_harvest_timeout")]
        timeout_secs: u64,
    },

    /// Cycles through a fixed list of header sets, sent in the order written
    Static { headers: Vec<toml::Table> },
}

fn default_harvest_timeout() -> u64 {
    60
}

/// Output configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Newline-delimited JSON record file
    #[serde(rename = "records-path")]
    pub records_path: Option<PathBuf>,

    /// Checkpoint file; defaults to `<records-path>.checkpoint.json`
    #[serde(rename = "checkpoint-path")]
    pub checkpoint_path: Option<PathBuf>,
}
