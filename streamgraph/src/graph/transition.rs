//! Status transitions and finalization side effects.
//!
//! Entering a terminal status does three things inside the graph lock:
//! - drops the request's borrowed output buffer
//! - charges off one dependency from its parent, if it has one
//! - captures the caller notification and cancel signal, if it is a link
//!
//! The captured [`Effect`]s are dispatched once the lock is released.

use super::arena::RequestArena;
use super::{GraphError, RequestGraph, TransitionError};
use crate::request::{ExternalRequest, RequestId, RequestStatus, StageId, SyncSignal};
use crate::telemetry::TelemetryEvent;
use std::time::Instant;

/// Work deferred until the graph lock is released.
pub(crate) enum Effect {
    /// A request's last unfinished child finished.
    DependenciesResolved {
        request: RequestId,
        owner: Option<StageId>,
    },
    /// Deliver the terminal status to the caller of a link.
    NotifyExternal {
        request: ExternalRequest,
        status: RequestStatus,
    },
    /// Fire a link's cancel signal.
    Signal {
        signal: SyncSignal,
        status: RequestStatus,
    },
    /// Mirror a non-terminal status to the caller of a link.
    MirrorStatus {
        request: ExternalRequest,
        status: RequestStatus,
    },
    /// Mirror a completion estimate to the caller of a link.
    MirrorEstimate {
        request: ExternalRequest,
        at: Instant,
    },
    Telemetry(TelemetryEvent),
}

impl RequestGraph {
    /// Moves a request to `next` if the state machine allows it.
    ///
    /// Returns the previous status. Entering a terminal status finalizes the
    /// request (see the module docs).
    ///
    /// # Errors
    ///
    /// - [`GraphError::StaleRequest`] if the request was recycled
    /// - [`TransitionError::AlreadyTerminal`] if somebody else finished it first
    /// - [`TransitionError::Illegal`] for edges the state machine forbids
    /// - [`TransitionError::PendingDependencies`] when finishing a request
    ///   that still has unfinished children
    pub fn try_transition(
        &self,
        id: RequestId,
        next: RequestStatus,
    ) -> Result<RequestStatus, GraphError> {
        let mut effects = Vec::new();
        let previous = {
            let mut arena = self.arena.lock();
            let previous = check_transition(&arena, id, next)?;
            apply_status(&mut arena, id, previous, next, &mut effects);
            previous
        };
        self.dispatch(effects);
        Ok(previous)
    }

    /// Moves a `Pending` or `Queued` request to `Processing`.
    ///
    /// Returns the previous status. A request already `Processing` is left as is.
    pub fn begin_processing(&self, id: RequestId) -> Result<RequestStatus, GraphError> {
        let mut effects = Vec::new();
        let previous = {
            let mut arena = self.arena.lock();
            let previous = arena.get(id).ok_or(GraphError::StaleRequest(id))?.status();
            if previous.is_terminal() {
                return Err(TransitionError::AlreadyTerminal(previous).into());
            }
            advance_to_processing(&mut arena, id, &mut effects)?;
            previous
        };
        self.dispatch(effects);
        Ok(previous)
    }

    /// Finishes a request with the terminal `status`.
    ///
    /// `Completed` is only entered from `Processing`, so a request still
    /// `Pending` or `Queued` is walked forward first. Returns the previous
    /// status. Errors as [`try_transition`](Self::try_transition).
    ///
    /// # Panics
    ///
    /// Panics if `status` is not terminal.
    pub fn finalize(&self, id: RequestId, status: RequestStatus) -> Result<RequestStatus, GraphError> {
        assert!(
            status.is_terminal(),
            "finalize of {} with non-terminal status {}",
            id,
            status
        );

        let mut effects = Vec::new();
        let previous = {
            let mut arena = self.arena.lock();
            let node = arena.get(id).ok_or(GraphError::StaleRequest(id))?;
            let previous = node.status();
            let from = if status == RequestStatus::Completed && previous.is_active() {
                RequestStatus::Processing
            } else {
                previous
            };
            if previous.is_terminal() {
                return Err(TransitionError::AlreadyTerminal(previous).into());
            }
            check_transition_from(&arena, id, from, status)?;

            if from != previous {
                advance_to_processing(&mut arena, id, &mut effects)?;
            }
            apply_status(&mut arena, id, from, status, &mut effects);
            previous
        };
        self.dispatch(effects);
        Ok(previous)
    }

    /// Runs deferred effects. Must be called without holding the arena lock.
    pub(crate) fn dispatch(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::DependenciesResolved { request, owner } => {
                    self.telemetry
                        .emit(TelemetryEvent::DependenciesResolved { request, owner });
                    self.notify_owner(request, owner);
                }
                Effect::NotifyExternal { request, status } => {
                    request.finish(status);
                }
                Effect::Signal { signal, status } => {
                    if !signal.signal(status) {
                        tracing::debug!(status = %status, "Cancel waiter dropped before link finished");
                    }
                }
                Effect::MirrorStatus { request, status } => request.update_status(status),
                Effect::MirrorEstimate { request, at } => request.set_estimated_completion(at),
                Effect::Telemetry(event) => self.telemetry.emit(event),
            }
        }
    }
}

/// Validates `current -> next` for a live request and returns `current`.
pub(super) fn check_transition(
    arena: &RequestArena,
    id: RequestId,
    next: RequestStatus,
) -> Result<RequestStatus, GraphError> {
    let current = arena.get(id).ok_or(GraphError::StaleRequest(id))?.status();
    check_transition_from(arena, id, current, next)?;
    Ok(current)
}

/// Validates `from -> next`, plus the dependency rule when `next` is terminal.
fn check_transition_from(
    arena: &RequestArena,
    id: RequestId,
    from: RequestStatus,
    next: RequestStatus,
) -> Result<(), GraphError> {
    let node = arena.get(id).ok_or(GraphError::StaleRequest(id))?;
    from.transition(next)?;
    if next.is_terminal() {
        let pending = node.dependencies();
        if pending > 0 {
            return Err(TransitionError::PendingDependencies(pending).into());
        }
        if let Some(parent) = node.parent() {
            assert!(
                arena.get(parent).is_some(),
                "{} request {} outlived its parent {}",
                node.kind(),
                id,
                parent
            );
        }
    }
    Ok(())
}

/// Writes an already validated status and collects its side effects.
pub(super) fn apply_status(
    arena: &mut RequestArena,
    id: RequestId,
    previous: RequestStatus,
    next: RequestStatus,
    effects: &mut Vec<Effect>,
) {
    let Some(node) = arena.get_mut(id) else {
        return;
    };
    node.set_status(next);
    if next.is_terminal() {
        settle(arena, id, next, effects);
    }
    push_status_effects(arena, id, previous, next, effects);
}

/// Steps a `Pending` or `Queued` request to `Processing` one edge at a time.
///
/// Every edge gets its own status effects. Returns the resulting status,
/// which is the current one if the request was not `Pending` or `Queued`.
pub(super) fn advance_to_processing(
    arena: &mut RequestArena,
    id: RequestId,
    effects: &mut Vec<Effect>,
) -> Result<RequestStatus, GraphError> {
    loop {
        let current = arena.get(id).ok_or(GraphError::StaleRequest(id))?.status();
        let next = match current {
            RequestStatus::Pending => RequestStatus::Queued,
            RequestStatus::Queued => RequestStatus::Processing,
            _ => return Ok(current),
        };
        current.transition(next)?;
        if let Some(node) = arena.get_mut(id) {
            node.set_status(next);
        }
        push_status_effects(arena, id, current, next, effects);
    }
}

fn push_status_effects(
    arena: &RequestArena,
    id: RequestId,
    from: RequestStatus,
    to: RequestStatus,
    effects: &mut Vec<Effect>,
) {
    if to.is_active() {
        let link = arena
            .get(id)
            .and_then(|node| node.payload().as_link())
            .map(|link| link.request().clone());
        if let Some(request) = link {
            effects.push(Effect::MirrorStatus {
                request,
                status: to,
            });
        }
    }
    effects.push(Effect::Telemetry(TelemetryEvent::StatusChanged {
        request: id,
        from,
        to,
    }));
}

/// Finalization bookkeeping for a request that just became terminal.
fn settle(arena: &mut RequestArena, id: RequestId, status: RequestStatus, effects: &mut Vec<Effect>) {
    let (parent, link) = {
        let Some(node) = arena.get_mut(id) else {
            return;
        };
        node.payload_mut().release_borrows();
        let link = node
            .payload_mut()
            .as_link_mut()
            .map(|link| (link.request().clone(), link.take_cancel_signal()));
        (node.parent(), link)
    };

    if let Some((request, signal)) = link {
        effects.push(Effect::NotifyExternal { request, status });
        if let Some(signal) = signal {
            effects.push(Effect::Signal { signal, status });
        }
    }

    if let Some(parent) = parent {
        release_dependency(arena, parent, effects);
    }
}

/// Removes one dependency from `parent`, queueing a notification at zero.
///
/// # Panics
///
/// Panics if `parent` is stale or has no outstanding dependencies.
pub(super) fn release_dependency(arena: &mut RequestArena, parent: RequestId, effects: &mut Vec<Effect>) {
    let Some(node) = arena.get_mut(parent) else {
        panic!("dependency released on request {} which is no longer live", parent);
    };
    if node.remove_dependency() == 0 {
        effects.push(Effect::DependenciesResolved {
            request: parent,
            owner: node.owner(),
        });
    }
}
