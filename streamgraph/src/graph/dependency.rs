//! Explicit dependency counting and child aggregation.
//!
//! Children created through the graph charge and release their parent
//! automatically. The operations here are for stages that hold a parent open
//! for work that is not itself a request, e.g. while they are still deciding
//! how many children to spawn.

use super::transition::{release_dependency, Effect};
use super::{GraphError, RequestGraph};
use crate::request::{RequestId, RequestStatus};

/// Outcome counts of a request's children still present in the graph.
///
/// Children that were already recycled are not counted, so owners should
/// summarize before recycling children.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChildSummary {
    pub completed: usize,
    pub canceled: usize,
    pub failed: usize,
    /// Children not yet terminal.
    pub active: usize,
}

impl ChildSummary {
    pub fn total(&self) -> usize {
        self.completed + self.canceled + self.failed + self.active
    }

    /// Suggested terminal status for the parent, or `None` while children are active.
    ///
    /// Any failure wins over any cancellation, which wins over completion.
    /// A request without children aggregates to `Completed`.
    pub fn aggregate_status(&self) -> Option<RequestStatus> {
        if self.active > 0 {
            None
        } else if self.failed > 0 {
            Some(RequestStatus::Failed)
        } else if self.canceled > 0 {
            Some(RequestStatus::Canceled)
        } else {
            Some(RequestStatus::Completed)
        }
    }
}

impl RequestGraph {
    /// Adds one dependency to `parent` without creating a child.
    ///
    /// Every call must be matched by a [`remove_dependency`](Self::remove_dependency).
    ///
    /// # Panics
    ///
    /// Panics if `parent` is stale or already terminal.
    pub fn add_dependency(&self, parent: RequestId) {
        let mut arena = self.arena.lock();
        match arena.get_mut(parent) {
            Some(node) => node.add_dependency(),
            None => panic!("dependency added to request {} which is no longer live", parent),
        }
    }

    /// Removes one dependency from `parent`.
    ///
    /// When the count reaches zero the parent's owner is notified; the parent
    /// itself is not finished.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is stale or has no outstanding dependencies.
    pub fn remove_dependency(&self, parent: RequestId) {
        let mut effects: Vec<Effect> = Vec::new();
        release_dependency(&mut self.arena.lock(), parent, &mut effects);
        self.dispatch(effects);
    }

    /// Counts the outcomes of `parent`'s children.
    pub fn summarize_children(&self, parent: RequestId) -> Result<ChildSummary, GraphError> {
        let arena = self.arena.lock();
        if arena.get(parent).is_none() {
            return Err(GraphError::StaleRequest(parent));
        }

        let mut summary = ChildSummary::default();
        for (_, node) in arena.iter().filter(|(_, node)| node.parent() == Some(parent)) {
            match node.status() {
                RequestStatus::Completed => summary.completed += 1,
                RequestStatus::Canceled => summary.canceled += 1,
                RequestStatus::Failed => summary.failed += 1,
                _ => summary.active += 1,
            }
        }
        Ok(summary)
    }
}
