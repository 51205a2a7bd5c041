//! Streamgraph - request graph for a multi-stage streaming I/O pipeline
//!
//! This library tracks units of pending file I/O (reads, compressed reads,
//! wait barriers, cancellations, and links to caller-owned requests) as nodes
//! of a dependency graph. Pipeline stages create child requests under a
//! parent, finish them as they do the work, and are told when a parent's
//! children have all finished. External callers receive exactly one terminal
//! status per request they submitted.
//!
//! The library does no I/O itself; stages bridge between real I/O results
//! and the status transitions modeled here.
//!
//! # Example
//!
//! ```ignore
//! use streamgraph::config::ConfigFile;
//! use streamgraph::graph::RequestGraph;
//! use streamgraph::request::{ExternalRequest, OutputBuffer, RequestStatus};
//! use streamgraph::stage::StagePool;
//!
//! let config = ConfigFile::load()?;
//! let graph = Arc::new(RequestGraph::new(config.graph));
//! let device = StagePool::new(Arc::clone(&graph), "device");
//!
//! let caller = ExternalRequest::new("maps/harbor.pak");
//! let mut handle = caller.subscribe();
//! let link = graph.create_request_link(caller, None);
//!
//! let read = device.create_read(Some(link), OutputBuffer::with_len(4096), "maps/harbor.pak", 0, 4096);
//! graph.finalize(read, RequestStatus::Completed)?;
//! graph.finalize(link, RequestStatus::Completed)?;
//!
//! assert_eq!(handle.wait().await, RequestStatus::Completed);
//! ```

pub mod config;
pub mod graph;
pub mod logging;
pub mod request;
pub mod stage;
pub mod telemetry;

/// Version of the streamgraph library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
