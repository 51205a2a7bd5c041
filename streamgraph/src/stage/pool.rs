//! Per-stage request pool.

use super::owner::RequestOwner;
use crate::graph::{GraphError, RequestGraph};
use crate::request::{CompressionInfo, OutputBuffer, RequestId, StageId};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Snapshot of a pool's counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Requests created through this pool.
    pub created: u64,
    /// Requests returned to the graph through this pool.
    pub recycled: u64,
}

impl PoolStats {
    /// Requests created but not yet recycled.
    pub fn outstanding(&self) -> u64 {
        self.created.saturating_sub(self.recycled)
    }
}

/// A pipeline stage's handle for creating and recycling its own requests.
///
/// Every request created through the pool is owned by the pool's stage, so
/// the stage is the one notified when the request's children finish and the
/// only one allowed to recycle it.
///
/// # Example
///
/// ```ignore
/// let graph = Arc::new(RequestGraph::new(config.graph.clone()));
/// let device = StagePool::new(Arc::clone(&graph), "device");
///
/// let read = device.create_read(Some(link), buffer, "maps/harbor.pak", 0, 4096);
/// device.update_estimate(read, Instant::now() + Duration::from_millis(8))?;
/// graph.finalize(read, RequestStatus::Completed)?;
/// device.recycle(read)?;
/// ```
pub struct StagePool {
    graph: Arc<RequestGraph>,
    stage: StageId,
    name: String,
    estimate_delay: Duration,
    created: AtomicU64,
    recycled: AtomicU64,
}

impl StagePool {
    /// Registers a stage named `name` and takes its estimate delay from the
    /// graph's configuration.
    pub fn new(graph: Arc<RequestGraph>, name: impl Into<String>) -> Self {
        let name = name.into();
        let stage = graph.register_stage(name.clone());
        let estimate_delay = graph.config().stage_delay(&name);
        tracing::debug!(
            stage = %stage,
            name = %name,
            estimate_delay_ms = estimate_delay.as_millis(),
            "Stage pool created"
        );
        Self {
            graph,
            stage,
            name,
            estimate_delay,
            created: AtomicU64::new(0),
            recycled: AtomicU64::new(0),
        }
    }

    /// Like [`new`](Self::new), also attaching the stage's callback target.
    pub fn with_owner(
        graph: Arc<RequestGraph>,
        name: impl Into<String>,
        owner: Weak<dyn RequestOwner>,
    ) -> Self {
        let pool = Self::new(graph, name);
        pool.attach_owner(owner);
        pool
    }

    pub fn attach_owner(&self, owner: Weak<dyn RequestOwner>) {
        self.graph.attach_owner(self.stage, owner);
    }

    /// Overrides the configured estimate delay.
    pub fn with_estimate_delay(mut self, delay: Duration) -> Self {
        self.estimate_delay = delay;
        self
    }

    pub fn stage(&self) -> StageId {
        self.stage
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn graph(&self) -> &Arc<RequestGraph> {
        &self.graph
    }

    pub fn estimate_delay(&self) -> Duration {
        self.estimate_delay
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// See [`RequestGraph::create_read`].
    pub fn create_read(
        &self,
        parent: Option<RequestId>,
        output: OutputBuffer,
        path: impl Into<Arc<Path>>,
        offset: u64,
        size: u64,
    ) -> RequestId {
        let id = self
            .graph
            .create_read(Some(self.stage), parent, output, path, offset, size);
        self.created.fetch_add(1, Ordering::Relaxed);
        id
    }

    /// See [`RequestGraph::create_compressed_read`].
    pub fn create_compressed_read(
        &self,
        parent: Option<RequestId>,
        compression: Arc<CompressionInfo>,
        output: OutputBuffer,
        read_offset: u64,
        read_size: u64,
    ) -> RequestId {
        let id = self.graph.create_compressed_read(
            Some(self.stage),
            parent,
            compression,
            output,
            read_offset,
            read_size,
        );
        self.created.fetch_add(1, Ordering::Relaxed);
        id
    }

    /// See [`RequestGraph::create_wait`].
    pub fn create_wait(&self, parent: Option<RequestId>) -> RequestId {
        let id = self.graph.create_wait(Some(self.stage), parent);
        self.created.fetch_add(1, Ordering::Relaxed);
        id
    }

    /// See [`RequestGraph::create_cancel`].
    pub fn create_cancel(&self, target: RequestId) -> RequestId {
        let id = self.graph.insert_cancel(Some(self.stage), target);
        self.created.fetch_add(1, Ordering::Relaxed);
        id
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Records an estimate for `id`, bubbling it up with this stage's delay.
    pub fn update_estimate(&self, id: RequestId, at: Instant) -> Result<(), GraphError> {
        self.graph
            .set_estimated_completion(id, at, self.estimate_delay)
    }

    /// Resets a finished request owned by this stage and returns its slot.
    ///
    /// # Panics
    ///
    /// Panics if the request belongs to another stage, and under the
    /// conditions of [`RequestGraph::release`].
    pub fn recycle(&self, id: RequestId) -> Result<(), GraphError> {
        let owner = self.graph.owner(id)?;
        assert!(
            owner == Some(self.stage),
            "stage '{}' cannot recycle request {} owned by {:?}",
            self.name,
            id,
            owner
        );
        self.graph.release(id)?;
        self.recycled.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.created.load(Ordering::Relaxed),
            recycled: self.recycled.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for StagePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagePool")
            .field("stage", &self.stage)
            .field("name", &self.name)
            .field("estimate_delay", &self.estimate_delay)
            .field("stats", &self.stats())
            .finish()
    }
}
