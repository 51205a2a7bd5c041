//! Telemetry for request graph observability.
//!
//! The graph emits structured events through a sink abstraction and does not
//! know how they are consumed. Stages, dashboards or tests decide how to
//! present or aggregate them.
//!
//! Events are emitted after the graph lock is released, so a sink may call
//! back into the graph.
//!
//! # Example
//!
//! ```ignore
//! use streamgraph::telemetry::{TelemetryEvent, TelemetrySink};
//!
//! struct CountingSink(AtomicUsize);
//!
//! impl TelemetrySink for CountingSink {
//!     fn emit(&self, event: TelemetryEvent) {
//!         if let TelemetryEvent::DependenciesResolved { .. } = event {
//!             self.0.fetch_add(1, Ordering::Relaxed);
//!         }
//!     }
//! }
//! ```

use crate::graph::CancelOutcome;
use crate::request::{RequestId, RequestKind, RequestStatus, StageId};
use std::sync::Arc;
use std::time::Instant;

// =============================================================================
// Telemetry Events
// =============================================================================

/// Events emitted by a [`RequestGraph`](crate::graph::RequestGraph).
#[derive(Clone, Debug)]
pub enum TelemetryEvent {
    // -------------------------------------------------------------------------
    // Request Lifecycle Events
    // -------------------------------------------------------------------------
    /// A request was configured in a graph slot.
    RequestCreated {
        request: RequestId,
        kind: RequestKind,
        parent: Option<RequestId>,
        owner: Option<StageId>,
    },

    /// A request moved between statuses.
    StatusChanged {
        request: RequestId,
        from: RequestStatus,
        to: RequestStatus,
    },

    /// The last unfinished child of a request finished.
    DependenciesResolved {
        request: RequestId,
        owner: Option<StageId>,
    },

    /// A slot was reset and returned to the free list.
    RequestRecycled { request: RequestId, kind: RequestKind },

    // -------------------------------------------------------------------------
    // Cancellation and Estimation Events
    // -------------------------------------------------------------------------
    /// A cancel request was evaluated against its target.
    CancelResolved {
        cancel: RequestId,
        target: RequestId,
        outcome: CancelOutcome,
    },

    /// A completion estimate was raised.
    EstimateUpdated {
        request: RequestId,
        estimate: Instant,
        /// Number of ancestors whose estimate was raised as a result.
        ancestors_raised: usize,
    },

    // -------------------------------------------------------------------------
    // Stage Events
    // -------------------------------------------------------------------------
    /// A pipeline stage registered with the graph.
    StageRegistered { stage: StageId, name: String },
}

impl TelemetryEvent {
    /// Returns the request this event is about, if any.
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            Self::RequestCreated { request, .. }
            | Self::StatusChanged { request, .. }
            | Self::DependenciesResolved { request, .. }
            | Self::RequestRecycled { request, .. }
            | Self::EstimateUpdated { request, .. } => Some(*request),
            Self::CancelResolved { target, .. } => Some(*target),
            Self::StageRegistered { .. } => None,
        }
    }

    /// Stable snake_case name, suitable as a metric or log key.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RequestCreated { .. } => "request_created",
            Self::StatusChanged { .. } => "status_changed",
            Self::DependenciesResolved { .. } => "dependencies_resolved",
            Self::RequestRecycled { .. } => "request_recycled",
            Self::CancelResolved { .. } => "cancel_resolved",
            Self::EstimateUpdated { .. } => "estimate_updated",
            Self::StageRegistered { .. } => "stage_registered",
        }
    }
}

// =============================================================================
// Telemetry Sink Trait
// =============================================================================

/// Receives every event a graph emits.
///
/// Called from whichever stage thread drove the operation, never under the
/// graph lock.
pub trait TelemetrySink: Send + Sync {
    /// Must not block: it runs inline on the stage's thread.
    fn emit(&self, event: TelemetryEvent);
}

// =============================================================================
// Sinks
// =============================================================================

/// Discards events. Used unless `[graph] trace_events` is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTelemetrySink;

impl TelemetrySink for NullTelemetrySink {
    fn emit(&self, _event: TelemetryEvent) {}
}

/// Logs lifecycle events at trace level and resolutions at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetrySink;

impl TelemetrySink for TracingTelemetrySink {
    fn emit(&self, event: TelemetryEvent) {
        match &event {
            TelemetryEvent::RequestCreated {
                request,
                kind,
                parent,
                owner,
            } => {
                tracing::trace!(
                    request = %request,
                    kind = %kind,
                    parent = ?parent,
                    owner = ?owner,
                    "Request created"
                );
            }
            TelemetryEvent::StatusChanged { request, from, to } => {
                tracing::trace!(request = %request, from = %from, to = %to, "Status changed");
            }
            TelemetryEvent::DependenciesResolved { request, owner } => {
                tracing::debug!(request = %request, owner = ?owner, "Dependencies resolved");
            }
            TelemetryEvent::RequestRecycled { request, kind } => {
                tracing::trace!(request = %request, kind = %kind, "Request recycled");
            }
            TelemetryEvent::CancelResolved {
                cancel,
                target,
                outcome,
            } => {
                tracing::debug!(
                    cancel = %cancel,
                    target = %target,
                    outcome = %outcome,
                    "Cancel resolved"
                );
            }
            TelemetryEvent::EstimateUpdated {
                request,
                estimate,
                ancestors_raised,
            } => {
                tracing::trace!(
                    request = %request,
                    remaining_ms = estimate.saturating_duration_since(Instant::now()).as_millis(),
                    ancestors_raised = ancestors_raised,
                    "Estimate updated"
                );
            }
            TelemetryEvent::StageRegistered { stage, name } => {
                tracing::debug!(stage = %stage, name = %name, "Stage registered");
            }
        }
    }
}

/// Clones each event into every registered sink, in registration order.
pub struct MultiplexTelemetrySink {
    sinks: Vec<Arc<dyn TelemetrySink>>,
}

impl MultiplexTelemetrySink {
    pub fn new(sinks: Vec<Arc<dyn TelemetrySink>>) -> Self {
        Self { sinks }
    }

    pub fn add_sink(&mut self, sink: Arc<dyn TelemetrySink>) {
        self.sinks.push(sink);
    }
}

impl TelemetrySink for MultiplexTelemetrySink {
    fn emit(&self, event: TelemetryEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}

impl std::fmt::Debug for MultiplexTelemetrySink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiplexTelemetrySink")
            .field("sink_count", &self.sinks.len())
            .finish()
    }
}
