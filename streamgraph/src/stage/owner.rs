//! Callback interface between the graph and pipeline stages.

use crate::graph::RequestGraph;
use crate::request::RequestId;

/// A pipeline stage (or scheduler) that finalizes the requests it owns.
///
/// The graph never finalizes a parent on its own. When the last unfinished
/// child of a request finishes, the graph calls
/// [`on_dependencies_resolved`](Self::on_dependencies_resolved) on the owner
/// of that request; the owner decides which terminal status the request gets
/// (see [`RequestGraph::summarize_children`]).
///
/// Callbacks run on whichever thread finished the last child, after the graph
/// lock has been released. Implementations may call back into the graph.
pub trait RequestOwner: Send + Sync {
    /// Called once each time `request`'s dependency count drops to zero.
    fn on_dependencies_resolved(&self, graph: &RequestGraph, request: RequestId);
}
