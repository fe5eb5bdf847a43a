//! Frontier and dedup set
//!
//! This module handles:
//! - Priority ordering of pending entries (shallower entries first)
//! - Claiming identities at enqueue time so each is crawled at most once
//! - Requeueing retried entries without a second dedup check
//! - Rebuilding both structures from a checkpoint

use crate::state::{FrontierEntry, Identity};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

/// An entry queued for dispatch with its ordering keys
#[derive(Debug, Clone)]
struct QueuedEntry {
    entry: FrontierEntry,

    /// Remaining depth budget; higher is dispatched first
    priority: u32,

    /// Insertion order; lower is dispatched first among equal priorities
    sequence: u64,
}

impl Ord for QueuedEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for QueuedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for QueuedEntry {}

/// Priority queue of pending entries plus the set of claimed identities
///
/// An identity is claimed the moment it is first enqueued, not when it is
/// resolved, so two parents discovering the same follower concurrently still
/// produce a single entry.
#[derive(Debug)]
pub struct Frontier {
    heap: BinaryHeap<QueuedEntry>,
    visited: HashSet<Identity>,
    max_depth: u32,
    next_sequence: u64,
}

impl Frontier {
    /// Creates an empty frontier for a crawl bounded at `max_depth`
    pub fn new(max_depth: u32) -> Self {
        Self {
            heap: BinaryHeap::new(),
            visited: HashSet::new(),
            max_depth,
            next_sequence: 0,
        }
    }

    /// Rebuilds a frontier from checkpointed state
    ///
    /// Each pending identity is removed from the visited set and re-enqueued,
    /// which claims it again. Pending entries deeper than `max_depth` are
    /// dropped, leaving their identities unclaimed.
    pub fn from_parts<V, P>(max_depth: u32, visited: V, pending: P) -> Self
    where
        V: IntoIterator<Item = Identity>,
        P: IntoIterator<Item = FrontierEntry>,
    {
        let mut frontier = Self::new(max_depth);
        frontier.visited.extend(visited);

        for entry in pending {
            frontier.visited.remove(&entry.identity);
            if !frontier.enqueue(entry.clone()) {
                tracing::debug!(
                    "Dropping restored entry {} at depth {} (max depth {})",
                    entry.identity,
                    entry.depth,
                    max_depth
                );
            }
        }

        frontier
    }

    fn push(&mut self, entry: FrontierEntry) {
        let priority = self.max_depth.saturating_sub(entry.depth);
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(QueuedEntry {
            entry,
            priority,
            sequence,
        });
    }

    /// Claims the entry's identity and queues it
    ///
    /// Returns false, leaving the frontier untouched, if the identity is
    /// already claimed or the entry lies beyond the depth limit.
    pub fn enqueue(&mut self, entry: FrontierEntry) -> bool {
        if entry.depth > self.max_depth {
            return false;
        }
        if !self.visited.insert(entry.identity.clone()) {
            tracing::trace!("Skipping already claimed identity {}", entry.identity);
            return false;
        }
        self.push(entry);
        true
    }

    /// Puts a claimed entry back for another attempt, bypassing the dedup check
    pub fn requeue(&mut self, entry: FrontierEntry) {
        debug_assert!(self.visited.contains(&entry.identity));
        self.push(entry);
    }

    /// Pops the highest-priority entry
    pub fn dequeue(&mut self) -> Option<FrontierEntry> {
        self.heap.pop().map(|queued| queued.entry)
    }

    /// Number of queued entries
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Returns true if the identity has been claimed by this crawl
    pub fn is_claimed(&self, identity: &str) -> bool {
        self.visited.contains(identity)
    }

    /// Number of claimed identities
    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    /// Claimed identities in sorted order
    pub fn visited(&self) -> Vec<Identity> {
        let mut identities: Vec<Identity> = self.visited.iter().cloned().collect();
        identities.sort();
        identities
    }

    /// Queued entries in dispatch order, without draining the queue
    pub fn pending_entries(&self) -> Vec<FrontierEntry> {
        let mut queued: Vec<&QueuedEntry> = self.heap.iter().collect();
        queued.sort_by(|a, b| b.cmp(a));
        queued.into_iter().map(|q| q.entry.clone()).collect()
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }
}
