//! Identity, frontier entry, and output record types

use crate::AttemptError;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Opaque key of a graph node; equality is exact string match
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Identity {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A unit of work on the frontier
///
/// `known_name` and `known_follower_count` are whatever the parent's listing
/// reported for this identity, carried down so the child never needs its own
/// profile request. `retry_count` is not persisted: a resumed entry starts a
/// fresh round of attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontierEntry {
    pub identity: Identity,
    pub depth: u32,
    #[serde(default)]
    pub known_name: Option<String>,
    #[serde(default)]
    pub known_follower_count: Option<u64>,
    #[serde(skip)]
    pub retry_count: u32,
}

impl FrontierEntry {
    /// Creates the depth-0 entry for a seed identity
    pub fn seed(identity: impl Into<Identity>) -> Self {
        Self {
            identity: identity.into(),
            depth: 0,
            known_name: None,
            known_follower_count: None,
            retry_count: 0,
        }
    }

    /// Creates a child entry one level below `parent_depth`, pre-seeded with
    /// the metadata the parent's listing reported
    pub fn child(profile: &FollowerProfile, parent_depth: u32) -> Self {
        Self {
            identity: profile.identity.clone(),
            depth: parent_depth + 1,
            known_name: profile.name.clone(),
            known_follower_count: profile.follower_count,
            retry_count: 0,
        }
    }

    /// Returns the same entry for its next attempt
    pub fn next_attempt(mut self) -> Self {
        self.retry_count += 1;
        self
    }

    /// Number of attempts made once the current one finishes
    pub fn attempts(&self) -> u32 {
        self.retry_count + 1
    }
}

/// One follower as reported in a parent's listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowerProfile {
    pub identity: Identity,
    pub name: Option<String>,
    pub follower_count: Option<u64>,
}

/// Terminal output for a resolved identity
///
/// Exactly one record is emitted per identity the crawl claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub identity: Identity,
    pub name: Option<String>,
    pub depth: u32,
    pub follower_count: Option<u64>,
    #[serde(default)]
    pub follower_profiles: Vec<FollowerProfile>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Record {
    /// Builds the success record for an entry whose followers were fetched
    pub fn success(
        entry: &FrontierEntry,
        follower_count: Option<u64>,
        follower_profiles: Vec<FollowerProfile>,
    ) -> Self {
        Self {
            identity: entry.identity.clone(),
            name: entry.known_name.clone(),
            depth: entry.depth,
            follower_count,
            follower_profiles,
            error: None,
        }
    }

    /// Builds the error record for an entry that resolved fatally
    pub fn failure(entry: &FrontierEntry, error: &AttemptError) -> Self {
        Self {
            identity: entry.identity.clone(),
            name: entry.known_name.clone(),
            depth: entry.depth,
            follower_count: entry.known_follower_count,
            follower_profiles: Vec::new(),
            error: Some(error.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
