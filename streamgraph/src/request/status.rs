//! Request lifecycle status and its legal transitions.
//!
//! ```text
//! Pending ⇄ Queued ──► Processing ──► Completed
//!    │        │            │
//!    └────────┴────────────┴──────────► Canceled | Failed
//! ```
//!
//! `Completed` is only reachable from `Processing`. `Canceled` and `Failed`
//! can be entered from any non-terminal status, since a request may be aborted
//! or found unserviceable before a stage ever starts working on it. Nothing
//! leaves a terminal status.

use crate::graph::TransitionError;
use std::fmt;

/// Lifecycle status of a request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RequestStatus {
    /// Created, not yet handed to a stage queue.
    #[default]
    Pending,

    /// Waiting in a stage queue.
    Queued,

    /// A stage is actively servicing the request.
    Processing,

    /// Serviced successfully.
    Completed,

    /// Intentionally aborted. May represent partially transferred data.
    Canceled,

    /// Could not be serviced (missing file, decompression error, ...).
    Failed,
}

impl RequestStatus {
    /// Returns true for `Completed`, `Canceled` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Canceled | Self::Failed)
    }

    /// Returns true while the request has not finished.
    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }

    /// Returns true only for `Completed`.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Returns true if moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: RequestStatus) -> bool {
        use RequestStatus::*;
        match (self, next) {
            (Pending, Queued) | (Queued, Pending) | (Queued, Processing) => true,
            (Processing, Completed) => true,
            (from, Canceled | Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    /// Attempts the transition from `self` to `next`.
    ///
    /// Returns the new status on success. A terminal `self` always yields
    /// [`TransitionError::AlreadyTerminal`] so that racing finalizers can tell
    /// "somebody else won" apart from a genuinely illegal request.
    pub fn transition(self, next: RequestStatus) -> Result<RequestStatus, TransitionError> {
        if self.is_terminal() {
            return Err(TransitionError::AlreadyTerminal(self));
        }
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError::Illegal {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Queued => write!(f, "Queued"),
            Self::Processing => write!(f, "Processing"),
            Self::Completed => write!(f, "Completed"),
            Self::Canceled => write!(f, "Canceled"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}
