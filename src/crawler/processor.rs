//! Response processing
//!
//! Turns a finished attempt into work items for the coordinator: a terminal
//! record, a retry of the same entry, or child entries for the frontier.
//! Every attempt outcome goes through `resolve_attempt`, so success, fatal
//! failure, and retry share one path.

use crate::crawler::fetcher::AttemptResult;
use crate::crawler::parser::FollowersPage;
use crate::crawler::CrawlSettings;
use crate::state::{AttemptState, FrontierEntry, Record};
use crate::{AttemptError, CrawlError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a completed entry was not expanded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeafReason {
    /// The entry sits at the maximum depth
    DepthLimit,

    /// Upstream listed no followers
    NoFollowers,

    /// The follower count exceeds the fan-out cap
    OverCap,
}

impl LeafReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DepthLimit => "depth_limit",
            Self::NoFollowers => "no_followers",
            Self::OverCap => "over_cap",
        }
    }
}

impl fmt::Display for LeafReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A completed entry's record and the children it spawns
#[derive(Debug)]
pub struct Processed {
    pub record: Record,
    pub children: Vec<FrontierEntry>,
    pub leaf: Option<LeafReason>,
}

/// Builds the record for a completed entry and decides whether to expand it
///
/// The follower count on the record is the number of profiles observed in
/// this response, not the count the parent's listing reported.
/// Expansion requires `depth < max_depth` and `1 <= count <= follower_cap`.
pub fn process_completed(
    entry: &FrontierEntry,
    page: FollowersPage,
    max_depth: u32,
    follower_cap: u64,
) -> Processed {
    let observed = page.observed_count();

    let leaf = if observed == 0 {
        Some(LeafReason::NoFollowers)
    } else if observed > follower_cap {
        Some(LeafReason::OverCap)
    } else if entry.depth >= max_depth {
        Some(LeafReason::DepthLimit)
    } else {
        None
    };

    let children = match leaf {
        None => page
            .profiles
            .iter()
            .map(|profile| FrontierEntry::child(profile, entry.depth))
            .collect(),
        Some(reason) => {
            tracing::debug!(
                "Not expanding {} at depth {}: {} ({} followers)",
                entry.identity,
                entry.depth,
                reason,
                observed
            );
            Vec::new()
        }
    };

    Processed {
        record: Record::success(entry, Some(observed), page.profiles),
        children,
        leaf,
    }
}

/// One unit of follow-up work produced by a finished attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptResolution {
    /// Terminal output for the attempted identity
    Record(Record),

    /// Requeue the same entry for another attempt
    RetryLater(FrontierEntry),

    /// Offer a newly discovered entry to the frontier
    SpawnChild(FrontierEntry),
}

/// Everything the coordinator needs to apply a finished attempt
#[derive(Debug, Default)]
pub struct Resolution {
    pub items: Vec<AttemptResolution>,
    pub leaf: Option<LeafReason>,
    pub ceiling_exceeded: bool,
}

/// Resolves a finished attempt against the retry ceiling
///
/// A retryable failure is requeued while the entry has made at most
/// `retry_ceiling` attempts, so an entry gets `retry_ceiling + 1` attempts
/// in total before it becomes a `RetryCeilingExceeded` error record.
pub fn resolve_attempt(
    mut result: AttemptResult,
    settings: &CrawlSettings,
) -> Result<Resolution, CrawlError> {
    let retry = match &result.outcome {
        Err(e) if e.is_retryable() => Some(result.entry.attempts() <= settings.retry_ceiling),
        _ => None,
    };

    match retry {
        Some(true) => result.settle(AttemptState::Pending)?,
        Some(false) => result.settle(AttemptState::Fatal)?,
        None => {
            let expected = if result.outcome.is_ok() {
                AttemptState::Completed
            } else {
                AttemptState::Fatal
            };
            if result.state != expected {
                return Err(CrawlError::InvalidTransition {
                    from: result.state,
                    to: expected,
                });
            }
        }
    }

    let AttemptResult { entry, outcome, .. } = result;
    let mut resolution = Resolution::default();

    match outcome {
        Ok(page) => {
            let processed =
                process_completed(&entry, page, settings.max_depth, settings.follower_cap);
            resolution.leaf = processed.leaf;
            resolution
                .items
                .push(AttemptResolution::Record(processed.record));
            resolution.items.extend(
                processed
                    .children
                    .into_iter()
                    .map(AttemptResolution::SpawnChild),
            );
        }
        Err(error) => match retry {
            Some(true) => {
                tracing::debug!(
                    "Retrying {} after attempt {}: {}",
                    entry.identity,
                    entry.attempts(),
                    error
                );
                resolution
                    .items
                    .push(AttemptResolution::RetryLater(entry.next_attempt()));
            }
            Some(false) => {
                let exceeded = AttemptError::RetryCeilingExceeded {
                    attempts: entry.attempts(),
                    last: Box::new(error),
                };
                tracing::warn!("Giving up on {}: {}", entry.identity, exceeded);
                resolution.ceiling_exceeded = true;
                resolution
                    .items
                    .push(AttemptResolution::Record(Record::failure(&entry, &exceeded)));
            }
            None => {
                tracing::warn!("Fatal error for {}: {}", entry.identity, error);
                resolution
                    .items
                    .push(AttemptResolution::Record(Record::failure(&entry, &error)));
            }
        },
    }

    Ok(resolution)
}
