//! Credential harvesters
//!
//! A harvester produces a fresh credential out-of-band. How it does so is
//! opaque to the crawl: the command harvester delegates to an external
//! program (typically browser automation that intercepts an authorized call
//! and prints its headers), the static harvester replays configured header
//! sets.

use crate::config::{CredentialsConfig, HarvesterConfig};
use crate::credentials::Credential;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Errors that can occur while harvesting a credential
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Failed to start harvester: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Harvester timed out after {0}s")]
    Timeout(u64),

    #[error("Harvester exited with {status}: {stderr}")]
    ExitStatus { status: String, stderr: String },

    #[error("Harvester output is not a JSON header object: {0}")]
    InvalidOutput(String),

    #[error("Harvested credential is missing required header '{0}'")]
    MissingHeader(String),
}

/// Produces new credentials on demand
#[async_trait]
pub trait Harvester: Send + Sync {
    /// Obtains one new credential; may take seconds
    async fn harvest(&self) -> Result<Credential, HarvestError>;

    /// Short name for log lines
    fn name(&self) -> &str;
}

fn check_required(credential: Credential, required: &[String]) -> Result<Credential, HarvestError> {
    match credential.missing_header(required) {
        Some(missing) => Err(HarvestError::MissingHeader(missing.to_string())),
        None => Ok(credential),
    }
}

/// Runs an external program and reads a header object from its stdout
///
/// The last non-empty stdout line must be a JSON object mapping header names
/// to string values.
pub struct CommandHarvester {
    program: String,
    args: Vec<String>,
    timeout_secs: u64,
    required_headers: Vec<String>,
}

impl CommandHarvester {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        timeout_secs: u64,
        required_headers: Vec<String>,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            timeout_secs,
            required_headers,
        }
    }

    /// Parses the program's stdout into a credential
    pub fn parse_output(stdout: &str) -> Result<Credential, HarvestError> {
        let line = stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .ok_or_else(|| HarvestError::InvalidOutput("empty output".to_string()))?;

        let value: serde_json::Value = serde_json::from_str(line)
            .map_err(|e| HarvestError::InvalidOutput(e.to_string()))?;
        let object = value
            .as_object()
            .ok_or_else(|| HarvestError::InvalidOutput("expected an object".to_string()))?;

        let mut headers = Vec::with_capacity(object.len());
        for (name, value) in object {
            let value = value.as_str().ok_or_else(|| {
                HarvestError::InvalidOutput(format!("header '{}' is not a string", name))
            })?;
            headers.push((name.clone(), value.to_string()));
        }

        Ok(Credential::new(headers))
    }
}

#[async_trait]
impl Harvester for CommandHarvester {
    async fn harvest(&self) -> Result<Credential, HarvestError> {
        tracing::debug!("Running harvester: {} {:?}", self.program, self.args);

        let child = Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(Duration::from_secs(self.timeout_secs), child)
            .await
            .map_err(|_| HarvestError::Timeout(self.timeout_secs))??;

        if !output.status.success() {
            return Err(HarvestError::ExitStatus {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let credential = Self::parse_output(&stdout)?;
        check_required(credential, &self.required_headers)
    }

    fn name(&self) -> &str {
        "command"
    }
}

/// Cycles through a fixed list of header sets
pub struct StaticHarvester {
    sets: Vec<Vec<(String, String)>>,
    next: AtomicUsize,
    required_headers: Vec<String>,
}

impl StaticHarvester {
    pub fn new(sets: Vec<Vec<(String, String)>>, required_headers: Vec<String>) -> Self {
        Self {
            sets,
            next: AtomicUsize::new(0),
            required_headers,
        }
    }

    /// Builds from configured header tables, keeping their order
    ///
    /// Non-string values are skipped; validation rejects them beforehand.
    pub fn from_tables(tables: &[toml::Table], required_headers: Vec<String>) -> Self {
        let sets = tables
            .iter()
            .map(|table| {
                table
                    .iter()
                    .filter_map(|(name, value)| {
                        value.as_str().map(|v| (name.clone(), v.to_string()))
                    })
                    .collect()
            })
            .collect();
        Self::new(sets, required_headers)
    }
}

#[async_trait]
impl Harvester for StaticHarvester {
    async fn harvest(&self) -> Result<Credential, HarvestError> {
        if self.sets.is_empty() {
            return Err(HarvestError::InvalidOutput("no header sets configured".to_string()));
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.sets.len();
        let credential = Credential::new(self.sets[index].clone());
        check_required(credential, &self.required_headers)
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Builds the harvester described by the configuration
pub fn build_harvester(
    config: &HarvesterConfig,
    credentials: &CredentialsConfig,
) -> Arc<dyn Harvester> {
    let required = credentials.required_headers.clone();
    match config {
        HarvesterConfig::Command {
            program,
            args,
            timeout_secs,
        } => Arc::new(CommandHarvester::new(
            program.clone(),
            args.clone(),
            *timeout_secs,
            required,
        )),
        HarvesterConfig::Static { headers } => {
            Arc::new(StaticHarvester::from_tables(headers, required))
        }
    }
}
