/// Attempt state definitions for the dispatcher's retry state machine
///
/// Every time a frontier entry is handed to the dispatcher it walks
/// `Pending -> Dispatched -> {Completed, Retryable, Fatal}`. A retryable
/// attempt goes back to `Pending` when it is requeued, or to `Fatal` once the
/// retry ceiling is reached.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the current state of one attempt at resolving an identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    // ===== Active States =====
    /// Entry is waiting on the frontier or on the parked queue
    Pending,

    /// A credential is attached and the request is in flight
    Dispatched,

    // ===== Outcome States =====
    /// Upstream returned a usable follower page
    Completed,

    /// Failure that another attempt may fix
    Retryable,

    /// Failure that resolves the entry to an error record
    Fatal,
}

impl AttemptState {
    /// Returns true if the identity is resolved once this state is reached
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Fatal)
    }

    /// Returns true if the attempt is still waiting for an outcome
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Dispatched)
    }

    /// Checks whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: AttemptState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Dispatched)
                | (Self::Dispatched, Self::Completed)
                | (Self::Dispatched, Self::Retryable)
                | (Self::Dispatched, Self::Fatal)
                | (Self::Retryable, Self::Pending)
                | (Self::Retryable, Self::Fatal)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Dispatched => "dispatched",
            Self::Completed => "completed",
            Self::Retryable => "retryable",
            Self::Fatal => "fatal",
        }
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
