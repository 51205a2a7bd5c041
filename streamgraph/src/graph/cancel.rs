//! Cancellation requests.
//!
//! A `Cancel` request names a target and is resolved against it once:
//!
//! | Target state | Outcome | Target | Cancel request |
//! |--------------|---------|--------|----------------|
//! | recycled or terminal | `NothingToCancel` | untouched | `Completed` |
//! | has unfinished children | `HasDependencies` | untouched | `Failed` |
//! | otherwise | `Applied` | `Canceled` | `Completed` |
//!
//! A request with live children is never forced terminal. Stages either
//! retry once the children are done, or cancel the children and let the
//! normal completion path finish the target; [`RequestGraph::cancel_subtree`]
//! does the latter.

use super::transition::{advance_to_processing, apply_status, check_transition, Effect};
use super::{descends_from, GraphError, RequestGraph, TransitionError};
use crate::request::{
    CancelData, RequestId, RequestKind, RequestPayload, RequestStatus, RequestUsage, StageId,
};
use crate::telemetry::TelemetryEvent;
use std::fmt;

/// Result of resolving a cancel request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The target was moved to `Canceled`.
    Applied,
    /// The target had already finished or was recycled.
    NothingToCancel,
    /// The target still waits on this many children and was left alone.
    HasDependencies(u16),
}

impl CancelOutcome {
    pub fn is_applied(self) -> bool {
        matches!(self, Self::Applied)
    }

    /// True if the target could not be canceled because of its children.
    pub fn is_rejected(self) -> bool {
        matches!(self, Self::HasDependencies(_))
    }

    /// Terminal status the cancel request itself finishes with.
    fn cancel_status(self) -> RequestStatus {
        if self.is_rejected() {
            RequestStatus::Failed
        } else {
            RequestStatus::Completed
        }
    }
}

impl fmt::Display for CancelOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applied => write!(f, "applied"),
            Self::NothingToCancel => write!(f, "nothing to cancel"),
            Self::HasDependencies(n) => write!(f, "rejected ({} dependencies)", n),
        }
    }
}

/// What [`RequestGraph::cancel_subtree`] did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubtreeCancel {
    /// Requests moved to `Canceled` directly.
    pub canceled: Vec<RequestId>,
    /// Requests with live children, flagged for their owners to cancel.
    pub deferred: Vec<RequestId>,
}

impl RequestGraph {
    /// Creates a root `Cancel` request aimed at `target`.
    ///
    /// The target may already be terminal; resolving the cancel then reports
    /// [`CancelOutcome::NothingToCancel`].
    ///
    /// # Panics
    ///
    /// Panics if `target` does not refer to a live request.
    pub fn create_cancel(&self, target: RequestId) -> RequestId {
        self.insert_cancel(None, target)
    }

    pub(crate) fn insert_cancel(&self, owner: Option<StageId>, target: RequestId) -> RequestId {
        assert!(
            self.is_live(target),
            "cancel aimed at request {} which does not exist",
            target
        );
        self.create(
            RequestPayload::Cancel(CancelData::new(target)),
            None,
            owner,
            RequestUsage::Internal,
        )
    }

    /// Evaluates a cancel request against its target and finishes it.
    ///
    /// The cancel request finishes as soon as the attempt is resolved; it
    /// never waits for the target.
    ///
    /// # Errors
    ///
    /// - [`GraphError::StaleRequest`] if `cancel` was recycled
    /// - [`GraphError::WrongKind`] if `cancel` is not a `Cancel` request
    /// - [`TransitionError::AlreadyTerminal`] if it was already resolved
    pub fn resolve_cancel(&self, cancel: RequestId) -> Result<CancelOutcome, GraphError> {
        let mut effects = Vec::new();
        let (target, outcome) = {
            let mut arena = self.arena.lock();
            let node = arena.get(cancel).ok_or(GraphError::StaleRequest(cancel))?;
            let target = node
                .payload()
                .as_cancel()
                .map(CancelData::target)
                .ok_or(GraphError::WrongKind {
                    id: cancel,
                    expected: RequestKind::Cancel,
                })?;
            let cancel_previous = node.status();
            if cancel_previous.is_terminal() {
                return Err(TransitionError::AlreadyTerminal(cancel_previous).into());
            }

            let outcome = match arena.get(target) {
                None => CancelOutcome::NothingToCancel,
                Some(node) if node.is_terminal() => CancelOutcome::NothingToCancel,
                Some(node) if node.dependencies() > 0 => {
                    CancelOutcome::HasDependencies(node.dependencies())
                }
                Some(_) => CancelOutcome::Applied,
            };

            if outcome.is_applied() {
                let previous = check_transition(&arena, target, RequestStatus::Canceled)?;
                apply_status(&mut arena, target, previous, RequestStatus::Canceled, &mut effects);
            }

            let running = advance_to_processing(&mut arena, cancel, &mut effects)?;
            apply_status(&mut arena, cancel, running, outcome.cancel_status(), &mut effects);
            (target, outcome)
        };

        effects.push(Effect::Telemetry(TelemetryEvent::CancelResolved {
            cancel,
            target,
            outcome,
        }));
        self.dispatch(effects);
        Ok(outcome)
    }

    /// Creates, resolves and recycles a cancel request for `target`.
    ///
    /// # Panics
    ///
    /// Panics if `target` does not refer to a live request.
    pub fn request_cancel(&self, target: RequestId) -> Result<CancelOutcome, GraphError> {
        let cancel = self.create_cancel(target);
        let outcome = self.resolve_cancel(cancel)?;
        self.release(cancel)?;
        Ok(outcome)
    }

    /// Cancels every active request in the subtree rooted at `target`.
    ///
    /// Requests without unfinished children are moved to `Canceled`
    /// immediately. Requests with children are flagged via
    /// [`FileRequest::is_cancel_requested`](crate::request::FileRequest::is_cancel_requested)
    /// and left for their owners, who are notified through the usual
    /// dependency path once the canceled children have drained.
    pub fn cancel_subtree(&self, target: RequestId) -> Result<SubtreeCancel, GraphError> {
        let mut effects = Vec::new();
        let mut result = SubtreeCancel::default();
        {
            let mut arena = self.arena.lock();
            if arena.get(target).is_none() {
                return Err(GraphError::StaleRequest(target));
            }

            let members: Vec<(RequestId, u16)> = arena
                .iter()
                .filter(|(id, node)| {
                    !node.is_terminal()
                        && (*id == target || descends_from(&arena, node.parent(), target))
                })
                .map(|(id, node)| (id, node.dependencies()))
                .collect();

            for (id, dependencies) in members {
                if dependencies == 0 {
                    let previous = check_transition(&arena, id, RequestStatus::Canceled)?;
                    apply_status(&mut arena, id, previous, RequestStatus::Canceled, &mut effects);
                    result.canceled.push(id);
                } else if let Some(node) = arena.get_mut(id) {
                    node.request_cancel();
                    result.deferred.push(id);
                }
            }
        }

        tracing::debug!(
            target = %target,
            canceled = result.canceled.len(),
            deferred = result.deferred.len(),
            "Subtree cancel applied"
        );
        self.dispatch(effects);
        Ok(result)
    }
}
