//! Pipeline stage integration.
//!
//! Stages are the collaborators that do the real work (caching, throttling,
//! device I/O). They interact with the graph through two pieces:
//!
//! - [`StagePool`]: creates requests owned by the stage and recycles them
//! - [`RequestOwner`]: receives "dependencies resolved" callbacks for the
//!   stage's requests and decides their terminal status
//!
//! A stage that is its own owner is usually built with `Arc::new_cyclic`:
//!
//! ```ignore
//! struct Device {
//!     pool: StagePool,
//! }
//!
//! impl RequestOwner for Device {
//!     fn on_dependencies_resolved(&self, graph: &RequestGraph, request: RequestId) {
//!         let status = graph
//!             .summarize_children(request)
//!             .ok()
//!             .and_then(|summary| summary.aggregate_status())
//!             .unwrap_or(RequestStatus::Failed);
//!         let _ = graph.finalize(request, status);
//!     }
//! }
//!
//! let device = Arc::new_cyclic(|weak: &Weak<Device>| Device {
//!     pool: StagePool::with_owner(Arc::clone(&graph), "device", weak.clone()),
//! });
//! ```

mod owner;
mod pool;

pub use owner::RequestOwner;
pub use pool::{PoolStats, StagePool};
