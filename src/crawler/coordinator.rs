//! Crawler coordinator - main crawl orchestration logic
//!
//! One loop owns the frontier, the dedup set, and the parked queue. Upstream
//! requests and credential harvests run as spawned tasks whose results come
//! back to the loop in arrival order, so none of that state needs a lock.
//! The loop handles:
//! - Filling free concurrency slots from the parked queue, then the frontier
//! - Parking entries while no credential is available
//! - Applying attempt outcomes uniformly as records, retries, or children
//! - Replenishing the credential pool when demand exists
//! - Interrupts, exhaustion, and checkpointing

use crate::config::{Config, OutputConfig};
use crate::credentials::{
    build_harvester, Credential, CredentialPool, HarvestError, Harvester, PoolInsert,
};
use crate::crawler::fetcher::{dispatch, ApiClient, Attempt, AttemptResult};
use crate::crawler::processor::{resolve_attempt, AttemptResolution};
use crate::crawler::scheduler::Frontier;
use crate::crawler::{CrawlOverrides, CrawlSettings};
use crate::output::{
    CrawlStatistics, CrawlSummary, JsonLinesSink, OutputError, RecordWriter, DEFAULT_CHANNEL_SIZE,
};
use crate::state::{FrontierEntry, Identity, Record};
use crate::storage::{save_checkpoint, CheckpointState, RunStatus};
use crate::{AttemptError, CrawlError, ErrorCategory, Result};
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{JoinError, JoinSet};

type HarvestOutcome = std::result::Result<Credential, HarvestError>;

/// Records the writer may hold without having flushed them: a full channel
/// plus the one being written
const UNFLUSHED_WINDOW: usize = DEFAULT_CHANNEL_SIZE + 1;

/// Files a crawl writes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    pub records: PathBuf,
    pub checkpoint: PathBuf,
}

impl RunPaths {
    pub fn new(records: impl Into<PathBuf>, checkpoint: impl Into<PathBuf>) -> Self {
        Self {
            records: records.into(),
            checkpoint: checkpoint.into(),
        }
    }

    /// Resolves paths for a new crawl
    ///
    /// Explicit paths win, then the `[output]` section, then
    /// `follower_graph_{seed}_{depth}.jsonl` with the checkpoint beside it.
    pub fn resolve(
        seed: &Identity,
        max_depth: u32,
        config: &OutputConfig,
        records: Option<PathBuf>,
        checkpoint: Option<PathBuf>,
    ) -> Self {
        let records = records
            .or_else(|| config.records_path.clone())
            .unwrap_or_else(|| PathBuf::from(format!("follower_graph_{}_{}.jsonl", seed, max_depth)));
        let checkpoint = checkpoint
            .or_else(|| config.checkpoint_path.clone())
            .unwrap_or_else(|| Self::checkpoint_beside(&records));
        Self { records, checkpoint }
    }

    /// `<records>.checkpoint.json`
    pub fn checkpoint_beside(records: &Path) -> PathBuf {
        let mut name = records.as_os_str().to_os_string();
        name.push(".checkpoint.json");
        PathBuf::from(name)
    }
}

/// Main crawler coordinator structure
pub struct Coordinator {
    settings: CrawlSettings,
    frontier: Frontier,
    parked: VecDeque<FrontierEntry>,
    in_flight: HashMap<Identity, FrontierEntry>,
    pool: Arc<CredentialPool>,
    harvester: Arc<dyn Harvester>,
    client: Arc<ApiClient>,
    stats: CrawlStatistics,
    paths: RunPaths,
    append_output: bool,
    config_hash: Option<String>,
    harvest_retry_delay: Duration,
    max_harvest_failures: Option<u32>,
    last_harvest_added: bool,
    unflushed: VecDeque<(FrontierEntry, bool)>,
    records_sent: u64,
}

impl Coordinator {
    /// Creates a coordinator for a fresh crawl from `seed`
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Ready to run, with only the seed on the frontier
    /// * `Err(CrawlError)` - Empty seed or HTTP client construction failed
    pub fn start(
        config: &Config,
        seed: Identity,
        overrides: CrawlOverrides,
        paths: RunPaths,
    ) -> Result<Self> {
        if seed.as_str().trim().is_empty() {
            return Err(CrawlError::InvalidSeed(seed.to_string()));
        }

        let settings = CrawlSettings::from_config(seed.clone(), &config.crawler).with_overrides(overrides);
        let mut frontier = Frontier::new(settings.max_depth);
        frontier.enqueue(FrontierEntry::seed(seed));

        Self::build(config, settings, frontier, CrawlStatistics::default(), paths, false)
    }

    /// Creates a coordinator that continues a checkpointed crawl
    ///
    /// Depth and cap come from the checkpoint unless overridden. Records are
    /// appended to the output file.
    pub fn resume(
        config: &Config,
        checkpoint: &CheckpointState,
        overrides: CrawlOverrides,
        paths: RunPaths,
    ) -> Result<Self> {
        let mut settings =
            CrawlSettings::from_config(checkpoint.seed_identity.clone(), &config.crawler);
        settings.max_depth = checkpoint.max_depth;
        settings.follower_cap = checkpoint.follower_cap;
        let settings = settings.with_overrides(overrides);

        let frontier = checkpoint.restore(settings.max_depth);
        tracing::info!(
            "Resuming crawl of {} ({}): {} visited, {} pending, {} scraped so far",
            checkpoint.seed_identity,
            checkpoint.status,
            frontier.visited_count(),
            frontier.len(),
            checkpoint.scraped_count
        );
        if checkpoint.is_complete() {
            tracing::info!("Checkpoint is already complete; nothing left to crawl");
        }

        let stats =
            CrawlStatistics::resumed(checkpoint.scraped_count, checkpoint.rate_limited_count);
        let coordinator = Self::build(config, settings, frontier, stats, paths, true)?;
        Ok(coordinator.with_config_hash(checkpoint.config_hash.clone()))
    }

    fn build(
        config: &Config,
        settings: CrawlSettings,
        frontier: Frontier,
        stats: CrawlStatistics,
        paths: RunPaths,
        append_output: bool,
    ) -> Result<Self> {
        let client = ApiClient::new(&config.api)?;

        Ok(Self {
            settings,
            frontier,
            parked: VecDeque::new(),
            in_flight: HashMap::new(),
            pool: Arc::new(CredentialPool::from_config(&config.credentials)),
            harvester: build_harvester(&config.harvester, &config.credentials),
            client: Arc::new(client),
            stats,
            paths,
            append_output,
            config_hash: None,
            harvest_retry_delay: Duration::from_millis(config.credentials.harvest_retry_delay_ms),
            max_harvest_failures: config.credentials.max_harvest_failures,
            last_harvest_added: true,
            unflushed: VecDeque::with_capacity(UNFLUSHED_WINDOW),
            records_sent: 0,
        })
    }

    /// Records the configuration hash written into checkpoints
    pub fn with_config_hash(mut self, hash: Option<String>) -> Self {
        if hash.is_some() {
            self.config_hash = hash;
        }
        self
    }

    /// Replaces the harvester built from configuration
    pub fn with_harvester(mut self, harvester: Arc<dyn Harvester>) -> Self {
        self.harvester = harvester;
        self
    }

    /// Shared handle to the credential pool
    pub fn pool(&self) -> Arc<CredentialPool> {
        Arc::clone(&self.pool)
    }

    pub fn settings(&self) -> &CrawlSettings {
        &self.settings
    }

    pub fn frontier(&self) -> &Frontier {
        &self.frontier
    }

    pub fn paths(&self) -> &RunPaths {
        &self.paths
    }

    /// Runs the crawl until the frontier is exhausted or `shutdown` resolves
    ///
    /// On shutdown no new attempts are dispatched; in-flight attempts finish,
    /// and their retries are requeued for the checkpoint rather than sent.
    /// The writer is flushed before the checkpoint is saved, so every
    /// identity the checkpoint marks as visited has its record on disk or is
    /// listed as pending.
    ///
    /// A writer, transition, or harvester failure stops dispatching the same
    /// way an interrupt does. The checkpoint is still saved, as `failed`, and
    /// the error is returned afterwards.
    pub async fn run<F>(mut self, shutdown: F) -> Result<CrawlSummary>
    where
        F: Future<Output = ()>,
    {
        let started = Instant::now();
        tracing::info!(
            "Starting crawl from {} with max depth {}, follower cap {}, {} concurrent requests",
            self.settings.seed,
            self.settings.max_depth,
            self.settings.follower_cap,
            self.settings.max_concurrent
        );

        let sink = JsonLinesSink::open(&self.paths.records, self.append_output)?;
        let writer = RecordWriter::spawn(Box::new(sink), DEFAULT_CHANNEL_SIZE);

        let mut attempts: JoinSet<AttemptResult> = JoinSet::new();
        let mut harvests: JoinSet<HarvestOutcome> = JoinSet::new();
        tokio::pin!(shutdown);

        let mut interrupted = false;
        let mut failure: Option<CrawlError> = None;

        loop {
            if !interrupted {
                self.fill_slots(&mut attempts);
                self.replenish(&mut harvests);
            }

            if attempts.is_empty() {
                if interrupted {
                    break;
                }
                if self.frontier.is_empty() && self.parked.is_empty() {
                    tracing::info!("Frontier is empty, crawl complete");
                    break;
                }
            }

            tokio::select! {
                _ = &mut shutdown, if !interrupted => {
                    tracing::info!(
                        "Interrupt received, waiting for {} in-flight requests",
                        attempts.len()
                    );
                    interrupted = true;
                }
                Some(joined) = attempts.join_next() => {
                    if let Err(e) = self.handle_attempt(joined, &writer).await {
                        keep_first_failure(&mut failure, e);
                        interrupted = true;
                    }
                }
                Some(joined) = harvests.join_next(), if !interrupted => {
                    if let Err(e) = self.handle_harvest(joined) {
                        keep_first_failure(&mut failure, e);
                        interrupted = true;
                    }
                }
                else => break,
            }
        }

        // Outstanding harvests are abandoned
        harvests.abort_all();

        let progress = writer.progress();
        match writer.finish().await {
            Ok(written) => tracing::debug!("Writer flushed {} records", written),
            Err(e) => {
                self.requeue_unflushed(progress.flushed());
                // The writer's own error explains any earlier closed-channel sends
                if matches!(failure, Some(CrawlError::Output(OutputError::WriterClosed))) {
                    failure = None;
                }
                keep_first_failure(&mut failure, e.into());
            }
        }

        let mut status = match (&failure, interrupted) {
            (Some(_), _) => RunStatus::Failed,
            (None, true) => RunStatus::Interrupted,
            (None, false) => RunStatus::Completed,
        };
        let mut state = self.snapshot(status);
        if status == RunStatus::Completed && !state.pending_entries.is_empty() {
            tracing::warn!(
                "{} entries never resolved; checkpoint left resumable",
                state.pending_entries.len()
            );
            status = RunStatus::Interrupted;
            state.status = status;
        }
        save_checkpoint(&self.paths.checkpoint, &state)?;
        tracing::info!(
            "Checkpoint saved to {} ({})",
            self.paths.checkpoint.display(),
            status
        );

        self.log_closing();

        if let Some(e) = failure {
            return Err(e);
        }

        Ok(self.summary(status, started, state.pending_entries.len()))
    }

    /// Dispatches as many entries as free slots and credentials allow
    ///
    /// Parked entries go first since they were waiting longest. A frontier
    /// entry that finds the pool empty is parked, up to one slot's worth of
    /// entries per free slot.
    fn fill_slots(&mut self, attempts: &mut JoinSet<AttemptResult>) {
        let max = self.settings.max_concurrent;

        while attempts.len() < max && !self.parked.is_empty() {
            let Some(credential) = self.pool.acquire() else {
                return;
            };
            if let Some(entry) = self.parked.pop_front() {
                self.spawn_attempt(attempts, entry, credential);
            }
        }

        while attempts.len() + self.parked.len() < max {
            let Some(entry) = self.frontier.dequeue() else {
                return;
            };
            match self.pool.acquire() {
                Some(credential) => self.spawn_attempt(attempts, entry, credential),
                None => {
                    tracing::debug!("No credential available, parking {}", entry.identity);
                    self.parked.push_back(entry);
                }
            }
        }
    }

    fn spawn_attempt(
        &mut self,
        attempts: &mut JoinSet<AttemptResult>,
        entry: FrontierEntry,
        credential: Credential,
    ) {
        tracing::trace!(
            "Dispatching {} (depth {}, attempt {}) with credential {}",
            entry.identity,
            entry.depth,
            entry.attempts(),
            credential.preview()
        );
        self.in_flight.insert(entry.identity.clone(), entry.clone());

        let client = Arc::clone(&self.client);
        let attempt = Attempt::new(entry, credential);
        attempts.spawn(dispatch(client, attempt, self.settings.retry_backoff));
    }

    /// Starts a harvest if the pool is low and work is waiting
    fn replenish(&mut self, harvests: &mut JoinSet<HarvestOutcome>) {
        let demand =
            !self.parked.is_empty() || !self.in_flight.is_empty() || !self.frontier.is_empty();
        if !self.pool.needs_replenishment(demand) || !self.pool.begin_replenishment() {
            return;
        }

        // Back off after a failure or a harvest that added nothing new
        let delay = if self.pool.consecutive_failures() > 0 || !self.last_harvest_added {
            self.harvest_retry_delay
        } else {
            Duration::ZERO
        };
        tracing::debug!(
            "Harvesting credential with {} harvester (pool {}/{}, {} parked)",
            self.harvester.name(),
            self.pool.size(),
            self.pool.min_size(),
            self.parked.len()
        );

        let harvester = Arc::clone(&self.harvester);
        harvests.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            harvester.harvest().await
        });
    }

    /// Applies a finished attempt: credential accounting, metrics, then the
    /// resolution items in order
    async fn handle_attempt(
        &mut self,
        joined: std::result::Result<AttemptResult, JoinError>,
        writer: &RecordWriter,
    ) -> Result<()> {
        let result = match joined {
            Ok(result) => result,
            Err(e) => {
                // The entry stays in `in_flight` and is checkpointed as pending
                tracing::error!("Attempt task failed: {}", e);
                return Ok(());
            }
        };
        self.in_flight.remove(&result.entry.identity);
        let entry = result.entry.clone();

        match &result.outcome {
            Ok(_) => {
                if self.pool.release(result.credential.clone()) {
                    tracing::debug!(
                        "Credential {} returned to pool",
                        result.credential.preview()
                    );
                }
            }
            Err(error) => self.account_error(&result.entry, &result.credential, error),
        }

        let resolution = match resolve_attempt(result, &self.settings) {
            Ok(resolution) => resolution,
            Err(e) => {
                self.frontier.requeue(entry);
                return Err(e);
            }
        };
        if resolution.ceiling_exceeded {
            self.stats.record_error(ErrorCategory::RetryCeilingExceeded);
        }
        if let Some(leaf) = resolution.leaf {
            self.stats.record_leaf(leaf);
        }

        for item in resolution.items {
            match item {
                AttemptResolution::Record(record) => {
                    if let Err(e) = self.emit(writer, &entry, record).await {
                        // Not written, so it stays pending
                        self.frontier.requeue(entry);
                        return Err(e);
                    }
                }
                AttemptResolution::RetryLater(entry) => {
                    self.stats.record_retry();
                    self.frontier.requeue(entry);
                }
                AttemptResolution::SpawnChild(entry) => {
                    if self.frontier.enqueue(entry) {
                        self.stats.record_child();
                    }
                }
            }
        }

        Ok(())
    }

    fn account_error(&mut self, entry: &FrontierEntry, credential: &Credential, error: &AttemptError) {
        self.stats.record_error(error.category());

        if error.invalidates_credential() {
            match self.pool.invalidate(credential.authorization()) {
                Some(removed) => tracing::warn!(
                    "{} for {} at depth {}, removed credential {} after {}s ({} left)",
                    error,
                    entry.identity,
                    entry.depth,
                    removed.preview(),
                    removed.age().num_seconds(),
                    self.pool.size()
                ),
                None => tracing::debug!(
                    "{} for {}, credential {} already removed",
                    error,
                    entry.identity,
                    credential.preview()
                ),
            }
        } else if matches!(error, AttemptError::Transient(_)) {
            self.pool.record_failure(credential.authorization());
            tracing::debug!("{} for {}", error, entry.identity);
        }

        if *error == AttemptError::RateLimited {
            tracing::warn!(
                "Rate limited for {} (#{}), pool size {}",
                entry.identity,
                self.stats.rate_limited,
                self.pool.size()
            );
        }
    }

    async fn emit(
        &mut self,
        writer: &RecordWriter,
        entry: &FrontierEntry,
        record: Record,
    ) -> Result<()> {
        let is_error = record.is_error();
        self.stats.record_written(&record);
        if !is_error {
            tracing::debug!(
                "[{}] Scraped {} at depth {}: {} followers",
                self.stats.scraped,
                record.identity,
                record.depth,
                record.follower_count.unwrap_or(0)
            );
        }

        if let Err(e) = writer.send(record).await {
            self.stats.record_lost(is_error);
            return Err(e.into());
        }
        self.records_sent += 1;
        if self.unflushed.len() == UNFLUSHED_WINDOW {
            self.unflushed.pop_front();
        }
        self.unflushed.push_back((entry.clone(), is_error));

        if self.stats.records_written % self.settings.progress_interval == 0 {
            self.log_progress();
        }
        Ok(())
    }

    /// Handles a finished harvest; fails once the consecutive failure bound
    /// is reached
    fn handle_harvest(
        &mut self,
        joined: std::result::Result<HarvestOutcome, JoinError>,
    ) -> Result<()> {
        let outcome = match joined {
            Ok(outcome) => outcome.map_err(|e| e.to_string()),
            Err(e) => Err(format!("harvest task failed: {}", e)),
        };

        match outcome {
            Ok(credential) => {
                let preview = credential.preview();
                let inserted = self.pool.complete_replenishment(credential);
                self.last_harvest_added = inserted == PoolInsert::Added;
                match inserted {
                    PoolInsert::Added => tracing::info!(
                        "Added credential {} to pool. Total: {}",
                        preview,
                        self.pool.size()
                    ),
                    PoolInsert::Duplicate => {
                        tracing::debug!("Harvested credential {} is already pooled", preview)
                    }
                    PoolInsert::Full => {
                        tracing::debug!("Pool is full, discarded credential {}", preview)
                    }
                    PoolInsert::Revoked => {
                        return self.harvest_failed(format!(
                            "harvester returned revoked credential {}",
                            preview
                        ));
                    }
                }
                Ok(())
            }
            Err(message) => {
                self.last_harvest_added = false;
                self.pool.fail_replenishment();
                self.harvest_failed(message)
            }
        }
    }

    fn harvest_failed(&mut self, message: String) -> Result<()> {
        let error = AttemptError::HarvesterFailure(message);
        self.stats.record_error(error.category());
        let failures = self.pool.consecutive_failures();
        tracing::warn!("{} ({} in a row)", error, failures);

        if let Some(max) = self.max_harvest_failures {
            if failures >= max {
                return Err(CrawlError::HarvesterExhausted {
                    failures,
                    last: error.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Puts back entries whose records reached the writer but not the sink
    fn requeue_unflushed(&mut self, flushed: u64) {
        let lost = self.records_sent.saturating_sub(flushed) as usize;
        let keep = self.unflushed.len().saturating_sub(lost);
        for (entry, was_error) in self.unflushed.drain(keep..) {
            tracing::warn!("Record for {} was not written, keeping it pending", entry.identity);
            self.stats.record_lost(was_error);
            self.frontier.requeue(entry);
        }
    }

    fn snapshot(&self, status: RunStatus) -> CheckpointState {
        let mut in_flight: Vec<FrontierEntry> = self.in_flight.values().cloned().collect();
        in_flight.sort_by(|a, b| a.identity.cmp(&b.identity));

        let mut pending: Vec<FrontierEntry> = self.parked.iter().cloned().collect();
        pending.extend(in_flight);
        pending.extend(self.frontier.pending_entries());

        CheckpointState {
            seed_identity: self.settings.seed.clone(),
            max_depth: self.settings.max_depth,
            follower_cap: self.settings.follower_cap,
            visited_identities: self.frontier.visited(),
            pending_entries: pending,
            scraped_count: self.stats.scraped,
            rate_limited_count: self.stats.rate_limited,
            status,
            saved_at: Utc::now(),
            config_hash: self.config_hash.clone(),
            output_path: Some(self.paths.records.clone()),
        }
    }

    fn log_progress(&self) {
        tracing::info!(
            "Progress: {} records ({} scraped total), {} queued, {} in flight, {} parked, {} credentials",
            self.stats.records_written,
            self.stats.scraped,
            self.frontier.len(),
            self.in_flight.len(),
            self.parked.len(),
            self.pool.size()
        );
    }

    fn log_closing(&self) {
        tracing::info!("Crawl closed. Total identities scraped: {}", self.stats.scraped);
        tracing::info!("Total rate limits encountered: {}", self.stats.rate_limited);
        tracing::info!("Final credential pool size: {}", self.pool.size());
        tracing::info!("Entries waiting for credentials: {}", self.parked.len());
    }

    fn summary(&self, status: RunStatus, started: Instant, pending: usize) -> CrawlSummary {
        CrawlSummary {
            status,
            seed: self.settings.seed.clone(),
            max_depth: self.settings.max_depth,
            follower_cap: self.settings.follower_cap,
            elapsed_secs: started.elapsed().as_secs_f64(),
            statistics: self.stats.clone(),
            pool: self.pool.stats(),
            visited: self.frontier.visited_count(),
            pending,
            parked: self.parked.len(),
            records_path: self.paths.records.clone(),
            checkpoint_path: self.paths.checkpoint.clone(),
        }
    }
}

fn keep_first_failure(failure: &mut Option<CrawlError>, error: CrawlError) {
    match failure {
        None => {
            tracing::error!("Stopping crawl: {}", error);
            *failure = Some(error);
        }
        Some(_) => tracing::debug!("Further error while stopping: {}", error),
    }
}
