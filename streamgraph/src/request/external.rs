//! Caller-side objects bridged into the graph through request links.
//!
//! An external caller owns an [`ExternalRequest`] and hands it to
//! [`RequestGraph::create_request_link`](crate::graph::RequestGraph::create_request_link).
//! The caller observes progress through a [`CompletionHandle`] and, if it asked
//! to wait synchronously for a cancellation, through a [`SyncWaiter`].
//!
//! # Example
//!
//! ```ignore
//! use streamgraph::request::{sync_signal, ExternalRequest};
//!
//! let request = ExternalRequest::new("textures/rock.dds");
//! let mut handle = request.subscribe();
//! let (signal, waiter) = sync_signal();
//!
//! let link = graph.create_request_link(request, Some(signal));
//! // ... stages do their work ...
//! let status = handle.wait().await;
//! ```

use super::status::RequestStatus;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{oneshot, watch};

// =============================================================================
// External Request
// =============================================================================

/// A request object owned by a caller outside the pipeline.
///
/// Clones refer to the same underlying request. A request can be linked into
/// a graph once; it receives exactly one terminal status notification.
#[derive(Clone)]
pub struct ExternalRequest {
    inner: Arc<ExternalInner>,
}

struct ExternalInner {
    label: String,
    linked: AtomicBool,
    notifications: AtomicU32,
    status_tx: watch::Sender<RequestStatus>,
    estimated_completion: Mutex<Option<Instant>>,
}

impl ExternalRequest {
    /// Creates an unlinked request with a human-readable label.
    pub fn new(label: impl Into<String>) -> Self {
        let (status_tx, _status_rx) = watch::channel(RequestStatus::Pending);
        Self {
            inner: Arc::new(ExternalInner {
                label: label.into(),
                linked: AtomicBool::new(false),
                notifications: AtomicU32::new(0),
                status_tx,
                estimated_completion: Mutex::new(None),
            }),
        }
    }

    /// Returns the label given at construction.
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Returns the most recent status mirrored from the graph.
    pub fn status(&self) -> RequestStatus {
        *self.inner.status_tx.borrow()
    }

    /// Returns a handle for observing status changes and awaiting completion.
    pub fn subscribe(&self) -> CompletionHandle {
        CompletionHandle {
            label: self.inner.label.clone(),
            status_rx: self.inner.status_tx.subscribe(),
        }
    }

    /// Returns true once the request has been linked into a graph.
    pub fn is_linked(&self) -> bool {
        self.inner.linked.load(Ordering::Acquire)
    }

    /// Number of terminal notifications delivered. Never exceeds one.
    pub fn notification_count(&self) -> u32 {
        self.inner.notifications.load(Ordering::Acquire)
    }

    /// Advisory completion estimate of the link wrapping this request.
    pub fn estimated_completion(&self) -> Option<Instant> {
        *self.inner.estimated_completion.lock()
    }

    /// Marks the request as linked. Returns false if it already was.
    pub(crate) fn mark_linked(&self) -> bool {
        !self.inner.linked.swap(true, Ordering::AcqRel)
    }

    /// Mirrors a non-terminal status. Ignored once a terminal status was delivered.
    pub(crate) fn update_status(&self, status: RequestStatus) {
        self.inner.status_tx.send_if_modified(|current| {
            if current.is_terminal() || *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    /// Delivers the terminal status. Only the first call has any effect.
    pub(crate) fn finish(&self, status: RequestStatus) -> bool {
        debug_assert!(status.is_terminal(), "finish() requires a terminal status");
        let delivered = self.inner.status_tx.send_if_modified(|current| {
            if current.is_terminal() {
                false
            } else {
                *current = status;
                true
            }
        });

        if delivered {
            self.inner.notifications.fetch_add(1, Ordering::AcqRel);
            tracing::debug!(label = %self.inner.label, status = %status, "External request finished");
        } else {
            tracing::warn!(
                label = %self.inner.label,
                status = %status,
                "Suppressed duplicate completion notification"
            );
        }
        delivered
    }

    pub(crate) fn set_estimated_completion(&self, at: Instant) {
        *self.inner.estimated_completion.lock() = Some(at);
    }
}

impl fmt::Debug for ExternalRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalRequest")
            .field("label", &self.inner.label)
            .field("status", &self.status())
            .field("linked", &self.is_linked())
            .finish()
    }
}

// =============================================================================
// Completion Handle
// =============================================================================

/// Caller-side view of an [`ExternalRequest`]'s progress.
///
/// Cloneable; all clones observe the same request.
#[derive(Clone)]
pub struct CompletionHandle {
    label: String,
    status_rx: watch::Receiver<RequestStatus>,
}

impl CompletionHandle {
    /// Returns the label of the observed request.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the current status without waiting.
    pub fn status(&self) -> RequestStatus {
        *self.status_rx.borrow()
    }

    /// Returns true once a terminal status was delivered.
    pub fn is_finished(&self) -> bool {
        self.status().is_terminal()
    }

    /// Waits until the request reaches a terminal status and returns it.
    ///
    /// If every [`ExternalRequest`] clone is dropped before that happens, the
    /// last observed status is returned instead.
    pub async fn wait(&mut self) -> RequestStatus {
        loop {
            let status = *self.status_rx.borrow_and_update();
            if status.is_terminal() {
                return status;
            }
            if self.status_rx.changed().await.is_err() {
                return *self.status_rx.borrow();
            }
        }
    }
}

impl fmt::Debug for CompletionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionHandle")
            .field("label", &self.label)
            .field("status", &self.status())
            .finish()
    }
}

// =============================================================================
// Synchronous Cancellation Signal
// =============================================================================

/// Creates a connected signal/waiter pair.
///
/// The signal travels with a request link; the waiter stays with the caller.
pub fn sync_signal() -> (SyncSignal, SyncWaiter) {
    let (tx, rx) = oneshot::channel();
    (SyncSignal { tx }, SyncWaiter { rx })
}

/// One-shot notification carried by a request link.
///
/// Signaling consumes the value, so it can fire at most once.
pub struct SyncSignal {
    tx: oneshot::Sender<RequestStatus>,
}

impl SyncSignal {
    /// Sends the final status. Returns false if the waiter was dropped.
    pub(crate) fn signal(self, status: RequestStatus) -> bool {
        self.tx.send(status).is_ok()
    }
}

impl fmt::Debug for SyncSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncSignal")
            .field("waiter_alive", &!self.tx.is_closed())
            .finish()
    }
}

/// Receiving side of a [`SyncSignal`].
#[derive(Debug)]
pub struct SyncWaiter {
    rx: oneshot::Receiver<RequestStatus>,
}

impl SyncWaiter {
    /// Blocks the current thread until the link is finalized.
    ///
    /// Must not be called from within an async runtime. Returns `None` if the
    /// signal was dropped without firing.
    pub fn wait_blocking(self) -> Option<RequestStatus> {
        self.rx.blocking_recv().ok()
    }

    /// Waits asynchronously until the link is finalized.
    pub async fn wait(self) -> Option<RequestStatus> {
        self.rx.await.ok()
    }

    /// Returns the final status if it has already been signaled.
    pub fn try_status(&mut self) -> Option<RequestStatus> {
        self.rx.try_recv().ok()
    }
}
