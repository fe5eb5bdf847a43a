//! Follower-Frontier main entry point
//!
//! This is the command-line interface for the Follower-Frontier crawler.

use anyhow::Context;
use clap::{Parser, Subcommand};
use follower_frontier::config::{load_config_with_hash, Config};
use follower_frontier::crawler::{shutdown_signal, CrawlOverrides, RunPaths};
use follower_frontier::output::{print_checkpoint, print_statistics};
use follower_frontier::storage::load_checkpoint;
use follower_frontier::{Coordinator, Identity};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "follower-frontier.toml";

/// Follower-Frontier: a resumable follower-graph crawler
///
/// Crawls the follower graph of an authenticated API breadth-first from a
/// seed identity, writing one JSON record per identity and a checkpoint that
/// lets an interrupted crawl pick up where it stopped.
#[derive(Parser, Debug)]
#[command(name = "follower-frontier")]
#[command(version = "1.0.0")]
#[command(about = "A resumable follower-graph crawler", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a new crawl from a seed identity
    Start {
        /// Identity to start from
        #[arg(value_name = "SEED")]
        seed: String,

        /// Path to TOML configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,

        /// Maximum depth from the seed
        #[arg(long)]
        max_depth: Option<u32>,

        /// Do not expand identities with more followers than this
        #[arg(long)]
        follower_cap: Option<u64>,

        /// Record output file (JSON Lines)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Checkpoint file
        #[arg(long)]
        checkpoint: Option<PathBuf>,
    },

    /// Resume a crawl from its checkpoint
    Resume {
        /// Checkpoint written by a previous run
        #[arg(value_name = "CHECKPOINT")]
        checkpoint: PathBuf,

        /// Path to TOML configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,

        /// Record output file to append to
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Override the checkpoint's maximum depth
        #[arg(long)]
        max_depth: Option<u32>,

        /// Override the checkpoint's follower cap
        #[arg(long)]
        follower_cap: Option<u64>,
    },

    /// Show what a checkpoint contains and exit
    Stats {
        #[arg(value_name = "CHECKPOINT")]
        checkpoint: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    match cli.command {
        Command::Start {
            seed,
            config,
            max_depth,
            follower_cap,
            output,
            checkpoint,
        } => {
            let overrides = CrawlOverrides {
                max_depth,
                follower_cap,
            };
            handle_start(seed, &config, overrides, output, checkpoint).await
        }
        Command::Resume {
            checkpoint,
            config,
            output,
            max_depth,
            follower_cap,
        } => {
            let overrides = CrawlOverrides {
                max_depth,
                follower_cap,
            };
            handle_resume(&checkpoint, &config, overrides, output).await
        }
        Command::Stats { checkpoint } => handle_stats(&checkpoint),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("follower_frontier=info,warn"),
            1 => EnvFilter::new("follower_frontier=debug,info"),
            2 => EnvFilter::new("follower_frontier=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn load(path: &Path) -> anyhow::Result<(Config, String)> {
    tracing::info!("Loading configuration from: {}", path.display());
    let (config, hash) = load_config_with_hash(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);
    Ok((config, hash))
}

/// Handles `start`: a new crawl from a seed
async fn handle_start(
    seed: String,
    config_path: &Path,
    overrides: CrawlOverrides,
    output: Option<PathBuf>,
    checkpoint: Option<PathBuf>,
) -> anyhow::Result<()> {
    let (config, hash) = load(config_path)?;
    let seed = Identity::new(seed);

    let max_depth = overrides.max_depth.unwrap_or(config.crawler.max_depth);
    let paths = RunPaths::resolve(&seed, max_depth, &config.output, output, checkpoint);
    tracing::info!(
        "Writing records to {} (checkpoint {})",
        paths.records.display(),
        paths.checkpoint.display()
    );

    let coordinator =
        Coordinator::start(&config, seed, overrides, paths)?.with_config_hash(Some(hash));
    finish(coordinator).await
}

/// Handles `resume`: continues from a checkpoint, appending records
async fn handle_resume(
    checkpoint_path: &Path,
    config_path: &Path,
    overrides: CrawlOverrides,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let state = load_checkpoint(checkpoint_path)
        .with_context(|| format!("failed to load checkpoint {}", checkpoint_path.display()))?;
    let (config, hash) = load(config_path)?;

    if let Some(previous) = &state.config_hash {
        if previous != &hash {
            tracing::warn!("Configuration changed since the checkpoint was written");
        }
    }

    let max_depth = overrides.max_depth.unwrap_or(state.max_depth);
    let paths = RunPaths::resolve(
        &state.seed_identity,
        max_depth,
        &config.output,
        output.or_else(|| state.output_path.clone()),
        Some(checkpoint_path.to_path_buf()),
    );

    let coordinator =
        Coordinator::resume(&config, &state, overrides, paths)?.with_config_hash(Some(hash));
    finish(coordinator).await
}

async fn finish(coordinator: Coordinator) -> anyhow::Result<()> {
    match coordinator.run(shutdown_signal()).await {
        Ok(summary) => {
            if summary.status.is_resumable() {
                tracing::info!(
                    "Crawl interrupted; resume with: follower-frontier resume {}",
                    summary.checkpoint_path.display()
                );
            } else {
                tracing::info!("Crawl completed successfully");
            }
            print_statistics(&summary);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}

/// Handles `stats`: prints a checkpoint summary
fn handle_stats(checkpoint_path: &Path) -> anyhow::Result<()> {
    let state = load_checkpoint(checkpoint_path)
        .with_context(|| format!("failed to load checkpoint {}", checkpoint_path.display()))?;
    println!("Checkpoint: {}\n", checkpoint_path.display());
    print_checkpoint(&state);
    Ok(())
}
