//! State module for tracking crawl progress
//!
//! This module provides the value types shared by every other component.
//!
//! # Components
//!
//! - `Identity`: opaque key of a graph node
//! - `FrontierEntry`: a unit of work waiting on the frontier
//! - `Record`: the terminal output for a resolved identity
//! - `AttemptState`: the per-attempt retry state machine

mod attempt_state;
mod record;

// Re-export main types
pub use attempt_state::AttemptState;
pub use record::{FollowerProfile, FrontierEntry, Identity, Record};
