//! Error types for graph operations.
//!
//! Only recoverable conditions are represented here: handles that went stale
//! because the request was recycled, transitions that lost a race or were
//! never legal, and operations aimed at the wrong kind of request. Broken
//! preconditions (zero-size reads, resetting a live request, linking a caller
//! request twice) panic instead, since they indicate a bug in a stage.

use crate::request::{RequestId, RequestKind, RequestStatus};
use thiserror::Error;

/// A status change that could not be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The state machine does not allow this edge.
    #[error("illegal status transition {from} -> {to}")]
    Illegal {
        from: RequestStatus,
        to: RequestStatus,
    },

    /// The request already finished; whoever finished it first won.
    #[error("request already finished as {0}")]
    AlreadyTerminal(RequestStatus),

    /// The request still waits on unfinished children.
    #[error("request still has {0} unfinished dependencies")]
    PendingDependencies(u16),
}

/// Errors returned by [`RequestGraph`](super::RequestGraph) operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The handle refers to a request that has since been recycled.
    #[error("request {0} is no longer live")]
    StaleRequest(RequestId),

    /// The operation only applies to a different payload kind.
    #[error("request {id} is not a {expected} request")]
    WrongKind { id: RequestId, expected: RequestKind },

    /// A read range adjustment tried to grow or empty the range.
    #[error("read range of {id} can only be narrowed (current size {current}, requested {requested})")]
    InvalidRange {
        id: RequestId,
        current: u64,
        requested: u64,
    },

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl GraphError {
    /// Returns true if the error only means another party finished the request first.
    pub fn is_race(&self) -> bool {
        matches!(
            self,
            Self::StaleRequest(_) | Self::Transition(TransitionError::AlreadyTerminal(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_error_messages() {
        let err = TransitionError::Illegal {
            from: RequestStatus::Pending,
            to: RequestStatus::Completed,
        };
        assert_eq!(err.to_string(), "illegal status transition Pending -> Completed");
        assert_eq!(
            TransitionError::PendingDependencies(2).to_string(),
            "request still has 2 unfinished dependencies"
        );
    }

    #[test]
    fn test_graph_error_from_transition() {
        let err: GraphError = TransitionError::AlreadyTerminal(RequestStatus::Failed).into();
        assert_eq!(err.to_string(), "request already finished as Failed");
        assert!(err.is_race());
    }

    #[test]
    fn test_is_race() {
        assert!(GraphError::StaleRequest(RequestId::new(1, 2)).is_race());
        assert!(!GraphError::WrongKind {
            id: RequestId::new(1, 2),
            expected: RequestKind::Cancel
        }
        .is_race());
        assert!(!GraphError::Transition(TransitionError::PendingDependencies(1)).is_race());
    }
}
