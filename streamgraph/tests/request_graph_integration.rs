//! Integration tests for the request graph.
//!
//! These tests drive the graph the way a pipeline does:
//! - caller requests linked in, stages creating and finishing children
//! - owners and the scheduler finalizing parents when notified
//! - cancellation of leaves, dependent requests and whole subtrees
//! - concurrent child creation and finalization from several threads
//! - configuration-driven estimate delays

use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Weak};
use std::time::{Duration, Instant};
use streamgraph::config::{ConfigFile, GraphConfig};
use streamgraph::graph::{CancelOutcome, GraphError, RequestGraph};
use streamgraph::request::{
    sync_signal, CompressionInfo, ExternalRequest, OutputBuffer, RequestId, RequestKind,
    RequestStatus,
};
use streamgraph::stage::{RequestOwner, StagePool};
use streamgraph::telemetry::{TelemetryEvent, TelemetrySink};

// =============================================================================
// Test Helpers
// =============================================================================

/// Terminal status an owner gives a request whose children all finished.
fn decide(graph: &RequestGraph, request: RequestId) -> RequestStatus {
    if graph.is_cancel_requested(request).unwrap_or(false) {
        return RequestStatus::Canceled;
    }
    graph
        .summarize_children(request)
        .ok()
        .and_then(|summary| summary.aggregate_status())
        .unwrap_or(RequestStatus::Failed)
}

/// Finalizes request links once their children are done.
#[derive(Default)]
struct LinkScheduler {
    finalized: Mutex<Vec<(RequestId, RequestStatus)>>,
}

impl RequestOwner for LinkScheduler {
    fn on_dependencies_resolved(&self, graph: &RequestGraph, request: RequestId) {
        let status = decide(graph, request);
        if graph.finalize(request, status).is_ok() {
            self.finalized.lock().push((request, status));
        }
    }
}

/// A stage that groups reads under a wait request and finishes the wait itself.
struct Assembler {
    pool: StagePool,
    notifications: AtomicUsize,
}

impl Assembler {
    fn new(graph: &Arc<RequestGraph>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Assembler>| Assembler {
            pool: StagePool::with_owner(
                Arc::clone(graph),
                "assembler",
                weak.clone() as Weak<dyn RequestOwner>,
            ),
            notifications: AtomicUsize::new(0),
        })
    }
}

impl RequestOwner for Assembler {
    fn on_dependencies_resolved(&self, graph: &RequestGraph, request: RequestId) {
        self.notifications.fetch_add(1, Ordering::SeqCst);
        let _ = graph.finalize(request, decide(graph, request));
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl RecordingSink {
    fn count(&self, event_type: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| event.event_type() == event_type)
            .count()
    }
}

impl TelemetrySink for RecordingSink {
    fn emit(&self, event: TelemetryEvent) {
        self.events.lock().push(event);
    }
}

fn graph_with_scheduler() -> (Arc<RequestGraph>, Arc<LinkScheduler>) {
    let graph = Arc::new(RequestGraph::new(GraphConfig::default()));
    let scheduler = Arc::new(LinkScheduler::default());
    graph.set_scheduler(Arc::downgrade(&scheduler) as Weak<dyn RequestOwner>);
    (graph, scheduler)
}

fn read_into(pool: &StagePool, parent: RequestId, size: u64) -> RequestId {
    pool.create_read(
        Some(parent),
        OutputBuffer::with_len(size as usize),
        PathBuf::from("maps/harbor.pak"),
        0,
        size,
    )
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_single_read_completes_link() {
    let (graph, scheduler) = graph_with_scheduler();
    let device = StagePool::new(Arc::clone(&graph), "device");

    let caller = ExternalRequest::new("harbor");
    let mut handle = caller.subscribe();
    let (signal, waiter) = sync_signal();
    let link = graph.create_request_link(caller.clone(), Some(signal));

    let read = read_into(&device, link, 100);
    assert_eq!(graph.dependencies(link), Ok(1));

    graph.begin_processing(read).unwrap();
    graph.finalize(read, RequestStatus::Completed).unwrap();

    assert_eq!(graph.dependencies(link), Ok(0));
    assert_eq!(*scheduler.finalized.lock(), vec![(link, RequestStatus::Completed)]);
    assert_eq!(waiter.wait().await, Some(RequestStatus::Completed));
    assert_eq!(handle.wait().await, RequestStatus::Completed);
    assert_eq!(caller.notification_count(), 1);

    device.recycle(read).unwrap();
    graph.release(link).unwrap();
    assert_eq!(graph.live_count(), 0);
}

#[test]
fn test_mixed_children_finalize_link_as_canceled() {
    let (graph, scheduler) = graph_with_scheduler();
    let device = StagePool::new(Arc::clone(&graph), "device");
    let caller = ExternalRequest::new("harbor");
    let link = graph.create_request_link(caller.clone(), None);

    let first = read_into(&device, link, 100);
    let second = read_into(&device, link, 100);
    assert_eq!(graph.dependencies(link), Ok(2));

    assert_eq!(graph.request_cancel(first), Ok(CancelOutcome::Applied));
    assert_eq!(graph.status(first), Ok(RequestStatus::Canceled));
    assert_eq!(graph.dependencies(link), Ok(1));
    assert!(scheduler.finalized.lock().is_empty());

    graph.begin_processing(second).unwrap();
    graph.finalize(second, RequestStatus::Completed).unwrap();

    assert_eq!(graph.dependencies(link), Ok(0));
    assert_eq!(graph.status(link), Ok(RequestStatus::Canceled));
    assert_eq!(caller.status(), RequestStatus::Canceled);
    assert_eq!(caller.notification_count(), 1);
}

#[test]
fn test_release_with_live_child_is_rejected() {
    let graph = RequestGraph::new(GraphConfig::default());
    let parent = graph.create_wait(None, None);
    let child = graph.create_wait(None, Some(parent));
    let before = graph.stats();

    let result = catch_unwind(AssertUnwindSafe(|| graph.release(parent)));

    assert!(result.is_err());
    assert_eq!(graph.stats(), before);
    assert_eq!(graph.dependencies(parent), Ok(1));
    assert_eq!(graph.status(parent), Ok(RequestStatus::Pending));
    assert_eq!(graph.kind(parent), Ok(RequestKind::Wait));

    // The graph stays usable after the caught panic.
    graph.finalize(child, RequestStatus::Completed).unwrap();
    graph.finalize(parent, RequestStatus::Completed).unwrap();
    graph.release(child).unwrap();
    graph.release(parent).unwrap();
}

#[test]
fn test_cancel_of_request_with_two_children_changes_nothing() {
    let graph = RequestGraph::new(GraphConfig::default());
    let target = graph.create_wait(None, None);
    graph.try_transition(target, RequestStatus::Queued).unwrap();
    let children = [
        graph.create_wait(None, Some(target)),
        graph.create_wait(None, Some(target)),
    ];

    let cancel = graph.create_cancel(target);
    assert_eq!(
        graph.resolve_cancel(cancel),
        Ok(CancelOutcome::HasDependencies(2))
    );

    assert_eq!(graph.status(target), Ok(RequestStatus::Queued));
    assert_eq!(graph.dependencies(target), Ok(2));
    for child in children {
        assert_eq!(graph.status(child), Ok(RequestStatus::Pending));
        assert_eq!(graph.dependencies(child), Ok(0));
    }
    assert_eq!(graph.status(cancel), Ok(RequestStatus::Failed));
}

#[test]
fn test_estimates_bubble_with_configured_stage_delay() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.ini");
    std::fs::write(
        &config_path,
        r#"
[graph]
initial_capacity = 8

[stage.device]
delay_ms = 30
"#,
    )
    .unwrap();
    let config = ConfigFile::load_from(&config_path).unwrap();
    let graph = Arc::new(RequestGraph::new(config.graph));
    let device = StagePool::new(Arc::clone(&graph), "device");
    let delay = Duration::from_millis(30);
    assert_eq!(device.estimate_delay(), delay);

    let caller = ExternalRequest::new("harbor");
    let link = graph.create_request_link(caller.clone(), None);
    let slow = read_into(&device, link, 10);
    let fast = read_into(&device, link, 10);
    let t = Instant::now() + Duration::from_secs(1);

    device.update_estimate(slow, t).unwrap();
    assert_eq!(graph.estimated_completion(link), Ok(Some(t + delay)));

    device
        .update_estimate(fast, t - Duration::from_millis(200))
        .unwrap();
    assert_eq!(graph.estimated_completion(link), Ok(Some(t + delay)));
    assert_eq!(caller.estimated_completion(), Some(t + delay));
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_finalize_and_cancel_race_notifies_once() {
    for _ in 0..200 {
        let graph = RequestGraph::new(GraphConfig::default());
        let caller = ExternalRequest::new("race");
        let (signal, mut waiter) = sync_signal();
        let link = graph.create_request_link(caller.clone(), Some(signal));
        graph.begin_processing(link).unwrap();

        let barrier = Barrier::new(2);
        let (finished, canceled) = std::thread::scope(|s| {
            let finisher = s.spawn(|| {
                barrier.wait();
                graph.finalize(link, RequestStatus::Completed)
            });
            let canceler = s.spawn(|| {
                barrier.wait();
                graph.request_cancel(link)
            });
            (finisher.join().unwrap(), canceler.join().unwrap())
        });

        let expected = match (finished, canceled.unwrap()) {
            (Ok(_), CancelOutcome::NothingToCancel) => RequestStatus::Completed,
            (Err(err), CancelOutcome::Applied) => {
                assert!(err.is_race());
                RequestStatus::Canceled
            }
            other => panic!("both finalizers claimed the link: {:?}", other),
        };

        assert_eq!(graph.status(link), Ok(expected));
        assert_eq!(caller.status(), expected);
        assert_eq!(caller.notification_count(), 1);
        assert_eq!(waiter.try_status(), Some(expected));
    }
}

#[test]
fn test_concurrent_children_notify_owner_exactly_once() {
    let graph = Arc::new(RequestGraph::new(GraphConfig::default()));
    let assembler = Assembler::new(&graph);
    let parent = assembler.pool.create_wait(None);
    let children: Vec<RequestId> = (0..64)
        .map(|_| assembler.pool.create_wait(Some(parent)))
        .collect();
    assert_eq!(graph.dependencies(parent), Ok(64));

    std::thread::scope(|s| {
        for chunk in children.chunks(8) {
            let graph = &graph;
            s.spawn(move || {
                for &child in chunk {
                    graph.finalize(child, RequestStatus::Completed).unwrap();
                }
            });
        }
    });

    assert_eq!(assembler.notifications.load(Ordering::SeqCst), 1);
    assert_eq!(graph.dependencies(parent), Ok(0));
    assert_eq!(graph.status(parent), Ok(RequestStatus::Completed));

    for child in children {
        assembler.pool.recycle(child).unwrap();
    }
    assembler.pool.recycle(parent).unwrap();
    assert_eq!(assembler.pool.stats().outstanding(), 0);
}

#[test]
fn test_concurrent_child_creation_keeps_counts_exact() {
    let graph = Arc::new(RequestGraph::new(GraphConfig::default()));
    let assembler = Assembler::new(&graph);
    let parent = assembler.pool.create_wait(None);
    // Held open until every worker has finished spawning.
    graph.add_dependency(parent);

    let left_open: Vec<RequestId> = std::thread::scope(|s| {
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let graph = &graph;
                let pool = &assembler.pool;
                s.spawn(move || {
                    let mut open = Vec::new();
                    for i in 0..32 {
                        let child = pool.create_wait(Some(parent));
                        if i % 2 == 0 {
                            graph.finalize(child, RequestStatus::Completed).unwrap();
                        } else {
                            open.push(child);
                        }
                    }
                    open
                })
            })
            .collect();
        workers
            .into_iter()
            .flat_map(|worker| worker.join().unwrap())
            .collect()
    });

    let summary = graph.summarize_children(parent).unwrap();
    assert_eq!(summary.completed, 128);
    assert_eq!(summary.active, left_open.len());
    assert_eq!(graph.dependencies(parent), Ok(summary.active as u16 + 1));
    assert_eq!(assembler.notifications.load(Ordering::SeqCst), 0);

    for child in left_open {
        graph.finalize(child, RequestStatus::Completed).unwrap();
    }
    assert_eq!(graph.dependencies(parent), Ok(1));
    assert_eq!(assembler.notifications.load(Ordering::SeqCst), 0);

    graph.remove_dependency(parent);

    assert_eq!(assembler.notifications.load(Ordering::SeqCst), 1);
    assert_eq!(graph.status(parent), Ok(RequestStatus::Completed));
    assert_eq!(graph.summarize_children(parent).unwrap().completed, 256);
}

// =============================================================================
// Cancellation Strategies
// =============================================================================

#[tokio::test]
async fn test_cancel_subtree_drains_to_canceled_link() {
    let (graph, scheduler) = graph_with_scheduler();
    let assembler = Assembler::new(&graph);
    let device = StagePool::new(Arc::clone(&graph), "device");

    let caller = ExternalRequest::new("harbor");
    let mut handle = caller.subscribe();
    let (signal, waiter) = sync_signal();
    let link = graph.create_request_link(caller, Some(signal));
    let group = assembler.pool.create_wait(Some(link));
    let reads = [read_into(&device, group, 64), read_into(&device, group, 64)];
    graph.begin_processing(reads[0]).unwrap();

    // Direct cancellation of the group is refused while reads are in flight.
    assert_eq!(
        graph.request_cancel(group),
        Ok(CancelOutcome::HasDependencies(2))
    );

    let result = graph.cancel_subtree(link).unwrap();
    assert_eq!(result.canceled.len(), 2);
    assert_eq!(result.deferred.len(), 2);

    for read in reads {
        assert_eq!(graph.status(read), Ok(RequestStatus::Canceled));
    }
    assert_eq!(graph.status(group), Ok(RequestStatus::Canceled));
    assert_eq!(graph.status(link), Ok(RequestStatus::Canceled));
    assert_eq!(*scheduler.finalized.lock(), vec![(link, RequestStatus::Canceled)]);
    assert_eq!(waiter.wait().await, Some(RequestStatus::Canceled));
    assert_eq!(handle.wait().await, RequestStatus::Canceled);
}

#[test]
fn test_failed_child_propagates_through_owner_policy() {
    let (graph, _scheduler) = graph_with_scheduler();
    let device = StagePool::new(Arc::clone(&graph), "device");
    let caller = ExternalRequest::new("harbor");
    let link = graph.create_request_link(caller.clone(), None);
    let info = Arc::new(CompressionInfo::new("zstd", PathBuf::from("maps.pak"), 512, 200, 800));

    let ok = read_into(&device, link, 16);
    let broken = device.create_compressed_read(Some(link), info, OutputBuffer::with_len(32), 780, 32);
    let window_fits = graph
        .inspect(broken, |node| {
            let read = node.payload().as_compressed_read().unwrap();
            read.compression().covers(read.read_offset(), read.read_size())
        })
        .unwrap();
    assert!(!window_fits);

    graph.finalize(broken, RequestStatus::Failed).unwrap();
    graph.begin_processing(ok).unwrap();
    graph.finalize(ok, RequestStatus::Completed).unwrap();

    assert_eq!(caller.status(), RequestStatus::Failed);
}

// =============================================================================
// Recycling and Observability
// =============================================================================

#[test]
fn test_recycled_slot_rejects_stale_handle() {
    let graph = Arc::new(RequestGraph::new(GraphConfig::default().with_initial_capacity(1)));
    let device = StagePool::new(Arc::clone(&graph), "device");

    let old = device.create_wait(None);
    graph.finalize(old, RequestStatus::Failed).unwrap();
    device.recycle(old).unwrap();

    let new = device.create_wait(None);
    assert_ne!(old, new);
    assert_eq!(graph.stats().capacity, 1);
    assert_eq!(graph.status(old), Err(GraphError::StaleRequest(old)));
    assert_eq!(
        graph.finalize(old, RequestStatus::Completed),
        Err(GraphError::StaleRequest(old))
    );
    assert_eq!(graph.status(new), Ok(RequestStatus::Pending));
    assert!(!graph.is_descendant_of(new, old).unwrap());
}

#[test]
fn test_telemetry_reports_graph_activity() {
    let sink = Arc::new(RecordingSink::default());
    let graph = Arc::new(RequestGraph::with_telemetry(
        GraphConfig::default(),
        Arc::clone(&sink) as Arc<dyn TelemetrySink>,
    ));
    let device = StagePool::new(Arc::clone(&graph), "device");

    let parent = device.create_wait(None);
    let child = device.create_wait(Some(parent));
    graph.request_cancel(child).unwrap();
    graph
        .set_estimated_completion(parent, Instant::now(), Duration::ZERO)
        .unwrap();

    assert_eq!(sink.count("stage_registered"), 1);
    assert_eq!(sink.count("request_created"), 3);
    assert_eq!(sink.count("cancel_resolved"), 1);
    assert_eq!(sink.count("dependencies_resolved"), 1);
    assert_eq!(sink.count("request_recycled"), 1);
    assert_eq!(sink.count("estimate_updated"), 1);
}

#[tokio::test]
async fn test_caller_sees_intermediate_statuses() {
    let graph = RequestGraph::new(GraphConfig::default());
    let caller = ExternalRequest::new("harbor");
    let mut handle = caller.subscribe();
    let link = graph.create_request_link(caller, None);

    graph.try_transition(link, RequestStatus::Queued).unwrap();
    assert_eq!(handle.status(), RequestStatus::Queued);
    graph.begin_processing(link).unwrap();
    assert_eq!(handle.status(), RequestStatus::Processing);
    assert!(!handle.is_finished());

    graph.finalize(link, RequestStatus::Completed).unwrap();
    assert_eq!(handle.wait().await, RequestStatus::Completed);
}
