//! Rotating credential pool
//!
//! The pool hands out credentials round-robin so load is spread across every
//! live credential. Invalidation is by authorization value, which resolves to
//! the exact credential a failing request used even while other requests keep
//! rotating the pool. A revoked value is never admitted again.

use crate::config::CredentialsConfig;
use crate::credentials::Credential;
use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// Result of offering a credential to the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolInsert {
    /// The credential is now available
    Added,
    /// A credential with the same authorization value is already pooled
    Duplicate,
    /// The value was invalidated earlier in this run
    Revoked,
    /// The pool is at `max_size`
    Full,
}

/// Counters reported at the end of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub size: usize,
    pub harvested: u64,
    pub invalidated: u64,
    pub harvest_failures: u64,
}

#[derive(Debug, Default)]
struct PoolInner {
    credentials: VecDeque<Credential>,
    revoked: HashSet<String>,
    replenishing: bool,
    consecutive_failures: u32,
    harvested: u64,
    invalidated: u64,
    harvest_failures: u64,
}

/// Thread-safe pool of usable credentials bounded to `[min_size, max_size]`
#[derive(Debug)]
pub struct CredentialPool {
    inner: Mutex<PoolInner>,
    min_size: usize,
    max_size: usize,
}

impl CredentialPool {
    /// Creates an empty pool
    pub fn new(min_size: usize, max_size: usize) -> Self {
        Self {
            inner: Mutex::new(PoolInner::default()),
            min_size,
            max_size: max_size.max(min_size),
        }
    }

    pub fn from_config(config: &CredentialsConfig) -> Self {
        Self::new(config.min_pool_size, config.max_pool_size)
    }

    fn lock(&self) -> MutexGuard<'_, PoolInner> {
        // A panic while holding the lock leaves the pool consistent: every
        // mutation below is a single container operation.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Offers a credential to the pool
    pub fn insert(&self, credential: Credential) -> PoolInsert {
        let mut inner = self.lock();
        let auth = credential.authorization();

        if inner.revoked.contains(auth) {
            return PoolInsert::Revoked;
        }
        if inner
            .credentials
            .iter()
            .any(|c| c.authorization() == auth)
        {
            return PoolInsert::Duplicate;
        }
        if inner.credentials.len() >= self.max_size {
            return PoolInsert::Full;
        }

        inner.credentials.push_back(credential);
        PoolInsert::Added
    }

    /// Returns the next credential in rotation, or `None` when the pool is empty
    ///
    /// The caller receives its own clone; the pooled credential moves to the
    /// back of the rotation.
    pub fn acquire(&self) -> Option<Credential> {
        let mut inner = self.lock();
        let credential = inner.credentials.pop_front()?;
        inner.credentials.push_back(credential.clone());
        Some(credential)
    }

    /// Hands a credential back after an attempt that did not fault it
    ///
    /// A pooled credential has its failure count cleared. A credential that
    /// is no longer pooled is re-admitted unless it was revoked or the pool is
    /// full. Returns true when the credential became newly available.
    pub fn release(&self, credential: Credential) -> bool {
        let mut inner = self.lock();
        let auth = credential.authorization().to_string();

        if let Some(pooled) = inner
            .credentials
            .iter_mut()
            .find(|c| c.authorization() == auth)
        {
            pooled.reset_failures();
            return false;
        }
        if inner.revoked.contains(&auth) || inner.credentials.len() >= self.max_size {
            return false;
        }

        let mut credential = credential;
        credential.reset_failures();
        inner.credentials.push_back(credential);
        true
    }

    /// Counts a failure against the pooled credential with this authorization
    /// value without removing it
    pub fn record_failure(&self, authorization: &str) {
        let mut inner = self.lock();
        if let Some(pooled) = inner
            .credentials
            .iter_mut()
            .find(|c| c.authorization() == authorization)
        {
            pooled.record_failure();
        }
    }

    /// Removes the credential whose authorization value matches
    ///
    /// Returns the removed credential, or `None` if no pooled credential
    /// matches (for example because a concurrent failure already removed it),
    /// so one physical failure is never accounted twice.
    pub fn invalidate(&self, authorization: &str) -> Option<Credential> {
        let mut inner = self.lock();
        let position = inner
            .credentials
            .iter()
            .position(|c| c.authorization() == authorization)?;

        let mut removed = inner.credentials.remove(position)?;
        removed.record_failure();
        inner.revoked.insert(authorization.to_string());
        inner.invalidated += 1;
        Some(removed)
    }

    /// Number of usable credentials
    pub fn size(&self) -> usize {
        self.lock().credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn min_size(&self) -> usize {
        self.min_size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Returns true if a harvest should start now
    ///
    /// Requires the pool to be below `min_size`, no harvest to be outstanding,
    /// and someone to actually need a credential.
    pub fn needs_replenishment(&self, has_demand: bool) -> bool {
        let inner = self.lock();
        has_demand && !inner.replenishing && inner.credentials.len() < self.min_size
    }

    /// Marks a harvest as outstanding; returns false if one already is
    pub fn begin_replenishment(&self) -> bool {
        let mut inner = self.lock();
        if inner.replenishing {
            return false;
        }
        inner.replenishing = true;
        true
    }

    /// Records a finished harvest and offers its credential to the pool
    ///
    /// A harvest that only reproduced a revoked value counts as a failure.
    pub fn complete_replenishment(&self, credential: Credential) -> PoolInsert {
        let result = self.insert(credential);

        let mut inner = self.lock();
        inner.replenishing = false;
        if result == PoolInsert::Revoked {
            inner.consecutive_failures += 1;
            inner.harvest_failures += 1;
        } else {
            inner.consecutive_failures = 0;
            inner.harvested += 1;
        }
        result
    }

    /// Records a failed harvest; returns the consecutive failure count
    pub fn fail_replenishment(&self) -> u32 {
        let mut inner = self.lock();
        inner.replenishing = false;
        inner.consecutive_failures += 1;
        inner.harvest_failures += 1;
        inner.consecutive_failures
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    pub fn stats(&self) -> PoolStats {
        let inner = self.lock();
        PoolStats {
            size: inner.credentials.len(),
            harvested: inner.harvested,
            invalidated: inner.invalidated,
            harvest_failures: inner.harvest_failures,
        }
    }
}
