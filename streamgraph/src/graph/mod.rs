//! The request graph: live requests, their parent links and dependency counts.
//!
//! [`RequestGraph`] owns every live [`FileRequest`] in a generation-checked
//! slot arena. Stages refer to requests by [`RequestId`]; once a request is
//! recycled its id goes stale and every operation on it reports
//! [`GraphError::StaleRequest`] instead of touching the slot's next occupant.
//!
//! # Locking
//!
//! All nodes sit behind one `parking_lot::Mutex`. A status change, the
//! matching parent decrement and the capture of any external notification
//! happen in the same critical section, which makes finalization
//! first-writer-wins: a racing finalizer observes
//! [`TransitionError::AlreadyTerminal`] and does nothing. Side effects (owner
//! callbacks, caller notifications, telemetry) run after the lock is released.
//!
//! # Submodules
//!
//! | Module | Operations |
//! |--------|------------|
//! | `transition` | `try_transition`, `begin_processing`, `finalize` |
//! | `dependency` | `add_dependency`, `remove_dependency`, `summarize_children` |
//! | `estimate` | `set_estimated_completion` |
//! | `cancel` | `create_cancel`, `resolve_cancel`, `request_cancel`, `cancel_subtree` |

mod arena;
mod cancel;
mod dependency;
mod error;
mod estimate;
mod transition;

pub use cancel::{CancelOutcome, SubtreeCancel};
pub use dependency::ChildSummary;
pub use error::{GraphError, TransitionError};

use crate::config::GraphConfig;
use crate::request::{
    CompressedReadData, CompressionInfo, ExternalRequest, FileRequest, OutputBuffer, ReadData,
    RequestId, RequestKind, RequestLinkData, RequestPayload, RequestStatus, RequestUsage, StageId,
    SyncSignal,
};
use crate::stage::RequestOwner;
use crate::telemetry::{NullTelemetrySink, TelemetryEvent, TelemetrySink, TracingTelemetrySink};
use arena::RequestArena;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Weak};
use std::time::Instant;

/// Point-in-time counters for a graph.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GraphStats {
    /// Requests currently occupying a slot.
    pub live: usize,
    /// Vacant slots ready for reuse.
    pub free_slots: usize,
    /// Total slots ever built.
    pub capacity: usize,
    /// Slots returned to the free list since creation.
    pub recycled: u64,
    pub pending: usize,
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub canceled: usize,
    pub failed: usize,
}

struct StageEntry {
    name: String,
    owner: Option<Weak<dyn RequestOwner>>,
}

/// Shared coordination structure for every request in a streaming pipeline.
///
/// Typically wrapped in an `Arc` and shared by all stages. See the module
/// documentation for the locking model.
pub struct RequestGraph {
    arena: Mutex<RequestArena>,
    stages: RwLock<Vec<StageEntry>>,
    scheduler: RwLock<Option<Weak<dyn RequestOwner>>>,
    telemetry: Arc<dyn TelemetrySink>,
    config: GraphConfig,
}

impl RequestGraph {
    /// Creates a graph with the telemetry sink selected by `config.trace_events`.
    pub fn new(config: GraphConfig) -> Self {
        let telemetry: Arc<dyn TelemetrySink> = if config.trace_events {
            Arc::new(TracingTelemetrySink)
        } else {
            Arc::new(NullTelemetrySink)
        };
        Self::with_telemetry(config, telemetry)
    }

    pub fn with_telemetry(config: GraphConfig, telemetry: Arc<dyn TelemetrySink>) -> Self {
        tracing::debug!(
            initial_capacity = config.initial_capacity,
            "Creating request graph"
        );
        Self {
            arena: Mutex::new(RequestArena::with_capacity(config.initial_capacity)),
            stages: RwLock::new(Vec::new()),
            scheduler: RwLock::new(None),
            telemetry,
            config,
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    // =========================================================================
    // Stages
    // =========================================================================

    /// Registers a pipeline stage and returns its id.
    ///
    /// Most stages go through [`StagePool`](crate::stage::StagePool), which
    /// calls this on construction.
    pub fn register_stage(&self, name: impl Into<String>) -> StageId {
        let name = name.into();
        let stage = {
            let mut stages = self.stages.write();
            let stage = match u32::try_from(stages.len()) {
                Ok(index) => StageId::new(index),
                Err(_) => panic!("too many stages registered"),
            };
            stages.push(StageEntry {
                name: name.clone(),
                owner: None,
            });
            stage
        };
        self.telemetry
            .emit(TelemetryEvent::StageRegistered { stage, name });
        stage
    }

    /// Sets the callback target for requests owned by `stage`.
    ///
    /// # Panics
    ///
    /// Panics if `stage` was not registered with this graph.
    pub fn attach_owner(&self, stage: StageId, owner: Weak<dyn RequestOwner>) {
        let mut stages = self.stages.write();
        match stages.get_mut(stage.index()) {
            Some(entry) => entry.owner = Some(owner),
            None => panic!("{} is not registered with this graph", stage),
        }
    }

    /// Sets the callback target for requests without an owning stage.
    ///
    /// Request links have no owner, so the scheduler is the party that
    /// finalizes them once their children are done.
    pub fn set_scheduler(&self, scheduler: Weak<dyn RequestOwner>) {
        *self.scheduler.write() = Some(scheduler);
    }

    /// Returns the name a stage registered with.
    pub fn stage_name(&self, stage: StageId) -> Option<String> {
        self.stages
            .read()
            .get(stage.index())
            .map(|entry| entry.name.clone())
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Wraps a caller-owned request in a new root `RequestLink`.
    ///
    /// `cancel_signal` is fired exactly once with the link's terminal status.
    ///
    /// # Panics
    ///
    /// Panics if `caller` is already linked into a graph.
    pub fn create_request_link(
        &self,
        caller: ExternalRequest,
        cancel_signal: Option<SyncSignal>,
    ) -> RequestId {
        assert!(
            caller.mark_linked(),
            "external request '{}' is already linked",
            caller.label()
        );
        self.create(
            RequestPayload::RequestLink(RequestLinkData::new(caller, cancel_signal)),
            None,
            None,
            RequestUsage::External,
        )
    }

    /// Creates a byte-range read of `size` bytes at `offset` in `path`.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero, if `output` is shorter than `size`, or if
    /// `parent` is stale or already finished.
    pub fn create_read(
        &self,
        owner: Option<StageId>,
        parent: Option<RequestId>,
        output: OutputBuffer,
        path: impl Into<Arc<Path>>,
        offset: u64,
        size: u64,
    ) -> RequestId {
        let path = path.into();
        assert!(size > 0, "read of {} has zero size", path.display());
        assert!(
            output.len() as u64 >= size,
            "read of {} bytes from {} into a {} byte buffer",
            size,
            path.display(),
            output.len()
        );
        self.create(
            RequestPayload::Read(ReadData::new(output, path, offset, size)),
            parent,
            owner,
            RequestUsage::Internal,
        )
    }

    /// Creates a read of `read_size` bytes at `read_offset` in the decompressed
    /// stream described by `compression`.
    ///
    /// The window is not checked against the decompressed size; that is up to
    /// the stage that understands the codec (see [`CompressionInfo::covers`]).
    ///
    /// # Panics
    ///
    /// Same conditions as [`create_read`](Self::create_read).
    pub fn create_compressed_read(
        &self,
        owner: Option<StageId>,
        parent: Option<RequestId>,
        compression: Arc<CompressionInfo>,
        output: OutputBuffer,
        read_offset: u64,
        read_size: u64,
    ) -> RequestId {
        assert!(
            read_size > 0,
            "compressed read of {} has zero size",
            compression.archive_path.display()
        );
        assert!(
            output.len() as u64 >= read_size,
            "compressed read of {} bytes into a {} byte buffer",
            read_size,
            output.len()
        );
        self.create(
            RequestPayload::CompressedRead(CompressedReadData::new(
                compression,
                output,
                read_offset,
                read_size,
            )),
            parent,
            owner,
            RequestUsage::Internal,
        )
    }

    /// Creates a synchronization point that stays open until its owner finishes it.
    pub fn create_wait(&self, owner: Option<StageId>, parent: Option<RequestId>) -> RequestId {
        self.create(RequestPayload::Wait, parent, owner, RequestUsage::Internal)
    }

    /// Allocates and configures a node, charging one dependency to `parent`.
    fn create(
        &self,
        payload: RequestPayload,
        parent: Option<RequestId>,
        owner: Option<StageId>,
        usage: RequestUsage,
    ) -> RequestId {
        let kind = payload.kind();
        let id = {
            let mut arena = self.arena.lock();
            if let Some(parent) = parent {
                match arena.get_mut(parent) {
                    Some(node) => node.add_dependency(),
                    None => panic!("parent {} of new {} request is not live", parent, kind),
                }
            }
            let (id, node) = arena.allocate();
            node.configure(payload, parent, owner, usage);
            id
        };

        self.telemetry.emit(TelemetryEvent::RequestCreated {
            request: id,
            kind,
            parent,
            owner,
        });
        id
    }

    // =========================================================================
    // Recycling
    // =========================================================================

    /// Resets a finished request and returns its slot for reuse.
    ///
    /// # Errors
    ///
    /// [`GraphError::StaleRequest`] if the request was already released.
    ///
    /// # Panics
    ///
    /// Panics, leaving the request untouched, if it is not terminal or still
    /// has unfinished children (see [`FileRequest::reset`]).
    pub fn release(&self, id: RequestId) -> Result<(), GraphError> {
        let kind = {
            let mut arena = self.arena.lock();
            let node = arena.get_mut(id).ok_or(GraphError::StaleRequest(id))?;
            let kind = node.kind();
            node.reset();
            arena.release(id);
            kind
        };

        self.telemetry
            .emit(TelemetryEvent::RequestRecycled { request: id, kind });
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Runs `f` against a live request while holding the graph lock.
    ///
    /// `f` must not call back into the graph.
    pub fn inspect<R>(
        &self,
        id: RequestId,
        f: impl FnOnce(&FileRequest) -> R,
    ) -> Result<R, GraphError> {
        let arena = self.arena.lock();
        arena.get(id).map(f).ok_or(GraphError::StaleRequest(id))
    }

    pub fn status(&self, id: RequestId) -> Result<RequestStatus, GraphError> {
        self.inspect(id, FileRequest::status)
    }

    pub fn kind(&self, id: RequestId) -> Result<RequestKind, GraphError> {
        self.inspect(id, FileRequest::kind)
    }

    pub fn dependencies(&self, id: RequestId) -> Result<u16, GraphError> {
        self.inspect(id, FileRequest::dependencies)
    }

    pub fn parent(&self, id: RequestId) -> Result<Option<RequestId>, GraphError> {
        self.inspect(id, FileRequest::parent)
    }

    pub fn owner(&self, id: RequestId) -> Result<Option<StageId>, GraphError> {
        self.inspect(id, FileRequest::owner)
    }

    pub fn usage(&self, id: RequestId) -> Result<RequestUsage, GraphError> {
        self.inspect(id, FileRequest::usage)
    }

    pub fn estimated_completion(&self, id: RequestId) -> Result<Option<Instant>, GraphError> {
        self.inspect(id, FileRequest::estimated_completion)
    }

    pub fn is_cancel_requested(&self, id: RequestId) -> Result<bool, GraphError> {
        self.inspect(id, FileRequest::is_cancel_requested)
    }

    /// Returns true if `id` still refers to an occupied slot.
    pub fn is_live(&self, id: RequestId) -> bool {
        self.arena.lock().get(id).is_some()
    }

    /// Returns true if `ancestor` is reachable from `id` through parent links.
    ///
    /// A request is not its own descendant.
    pub fn is_descendant_of(&self, id: RequestId, ancestor: RequestId) -> Result<bool, GraphError> {
        let arena = self.arena.lock();
        let node = arena.get(id).ok_or(GraphError::StaleRequest(id))?;
        Ok(descends_from(&arena, node.parent(), ancestor))
    }

    /// Live requests whose direct parent is `parent`.
    pub fn children_of(&self, parent: RequestId) -> Vec<RequestId> {
        let arena = self.arena.lock();
        arena
            .iter()
            .filter(|(_, node)| node.parent() == Some(parent))
            .map(|(id, _)| id)
            .collect()
    }

    pub fn live_count(&self) -> usize {
        self.arena.lock().live()
    }

    pub fn stats(&self) -> GraphStats {
        let arena = self.arena.lock();
        let mut stats = GraphStats {
            live: arena.live(),
            free_slots: arena.free_slots(),
            capacity: arena.capacity(),
            recycled: arena.recycled(),
            ..GraphStats::default()
        };
        for (_, node) in arena.iter() {
            match node.status() {
                RequestStatus::Pending => stats.pending += 1,
                RequestStatus::Queued => stats.queued += 1,
                RequestStatus::Processing => stats.processing += 1,
                RequestStatus::Completed => stats.completed += 1,
                RequestStatus::Canceled => stats.canceled += 1,
                RequestStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    // =========================================================================
    // Payload adjustment
    // =========================================================================

    /// Narrows the byte range of a live read to `[offset, offset + size)`.
    ///
    /// The new range must lie inside the current one and be non-empty. Used
    /// by stages that satisfied part of a read, e.g. from a cache.
    pub fn adjust_read_range(&self, id: RequestId, offset: u64, size: u64) -> Result<(), GraphError> {
        let mut arena = self.arena.lock();
        let node = arena.get_mut(id).ok_or(GraphError::StaleRequest(id))?;
        if node.is_terminal() {
            return Err(TransitionError::AlreadyTerminal(node.status()).into());
        }
        let Some((current_offset, current_size)) = node.payload().range() else {
            return Err(GraphError::WrongKind {
                id,
                expected: RequestKind::Read,
            });
        };

        let inside = offset >= current_offset
            && offset
                .checked_add(size)
                .zip(current_offset.checked_add(current_size))
                .is_some_and(|(end, current_end)| end <= current_end);
        if size == 0 || !inside {
            return Err(GraphError::InvalidRange {
                id,
                current: current_size,
                requested: size,
            });
        }

        node.payload_mut().narrow_range(offset, size);
        tracing::trace!(request = %id, offset, size, "Read range narrowed");
        Ok(())
    }

    // =========================================================================
    // Internal
    // =========================================================================

    /// Calls the owner of a request whose dependencies all finished.
    fn notify_owner(&self, request: RequestId, owner: Option<StageId>) {
        let target = match owner {
            Some(stage) => self
                .stages
                .read()
                .get(stage.index())
                .and_then(|entry| entry.owner.clone()),
            None => self.scheduler.read().clone(),
        };

        match target.and_then(|weak| weak.upgrade()) {
            Some(owner) => owner.on_dependencies_resolved(self, request),
            None => {
                tracing::debug!(request = %request, owner = ?owner, "No owner to notify");
            }
        }
    }
}

impl Default for RequestGraph {
    fn default() -> Self {
        Self::new(GraphConfig::default())
    }
}

impl fmt::Debug for RequestGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arena = self.arena.lock();
        f.debug_struct("RequestGraph")
            .field("live", &arena.live())
            .field("capacity", &arena.capacity())
            .field("stages", &self.stages.read().len())
            .finish()
    }
}

/// Walks parent links from `start` looking for `ancestor`.
///
/// Parents are always created before their children, so the chain cannot
/// loop; the walk is still bounded by the number of live requests.
pub(super) fn descends_from(arena: &RequestArena, start: Option<RequestId>, ancestor: RequestId) -> bool {
    let mut current = start;
    for _ in 0..=arena.live() {
        match current {
            Some(id) if id == ancestor => return true,
            Some(id) => current = arena.get(id).and_then(FileRequest::parent),
            None => return false,
        }
    }
    false
}
