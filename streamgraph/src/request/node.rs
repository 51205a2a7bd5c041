//! The request node stored in each graph slot.

use super::id::{RequestId, StageId};
use super::payload::{RequestKind, RequestPayload};
use super::status::RequestStatus;
use std::time::Instant;

/// Whether a request is pipeline-private or visible to an external caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RequestUsage {
    /// Scratch node owned and recycled by a pipeline stage.
    #[default]
    Internal,
    /// Request link an external caller holds a handle to.
    External,
}

/// One unit of pending I/O work.
///
/// Nodes live inside a [`RequestGraph`](crate::graph::RequestGraph) and are
/// only mutated through it. Read access is available via
/// [`RequestGraph::inspect`](crate::graph::RequestGraph::inspect).
#[derive(Debug, Default)]
pub struct FileRequest {
    status: RequestStatus,
    payload: RequestPayload,
    parent: Option<RequestId>,
    owner: Option<StageId>,
    dependencies: u16,
    estimated_completion: Option<Instant>,
    usage: RequestUsage,
    cancel_requested: bool,
}

impl FileRequest {
    pub fn status(&self) -> RequestStatus {
        self.status
    }

    pub fn payload(&self) -> &RequestPayload {
        &self.payload
    }

    pub fn kind(&self) -> RequestKind {
        self.payload.kind()
    }

    /// The request waiting on this one, if any. Roots have no parent.
    pub fn parent(&self) -> Option<RequestId> {
        self.parent
    }

    /// Stage responsible for recycling this request. `None` for caller-owned links.
    pub fn owner(&self) -> Option<StageId> {
        self.owner
    }

    /// Number of unfinished children this request is waiting on.
    pub fn dependencies(&self) -> u16 {
        self.dependencies
    }

    pub fn estimated_completion(&self) -> Option<Instant> {
        self.estimated_completion
    }

    pub fn usage(&self) -> RequestUsage {
        self.usage
    }

    /// True if a subtree cancellation asked the owner to finish this request as canceled.
    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// True if the node is in the state of a freshly constructed request.
    pub fn is_fresh(&self) -> bool {
        self.status == RequestStatus::Pending
            && self.payload.is_none()
            && self.parent.is_none()
            && self.owner.is_none()
            && self.dependencies == 0
            && self.estimated_completion.is_none()
            && self.usage == RequestUsage::Internal
            && !self.cancel_requested
    }

    /// Returns the node to its freshly constructed state.
    ///
    /// # Panics
    ///
    /// Panics if the request has not reached a terminal status or still has
    /// unfinished children. Reusing such a node would corrupt the dependency
    /// counts of everything attached to it. Nothing is modified on panic.
    pub fn reset(&mut self) {
        assert!(
            self.status.is_terminal(),
            "reset of a {} request in non-terminal status {}",
            self.kind(),
            self.status
        );
        assert!(
            self.dependencies == 0,
            "reset of a {} request that still has {} unfinished dependencies",
            self.kind(),
            self.dependencies
        );
        *self = Self::default();
    }

    /// Fills a fresh node with its payload and links.
    pub(crate) fn configure(
        &mut self,
        payload: RequestPayload,
        parent: Option<RequestId>,
        owner: Option<StageId>,
        usage: RequestUsage,
    ) {
        assert!(self.is_fresh(), "request slot configured before being reset");
        assert!(!payload.is_none(), "requests must be created with a payload");
        self.payload = payload;
        self.parent = parent;
        self.owner = owner;
        self.usage = usage;
    }

    pub(crate) fn set_status(&mut self, status: RequestStatus) {
        self.status = status;
    }

    pub(crate) fn payload_mut(&mut self) -> &mut RequestPayload {
        &mut self.payload
    }

    pub(crate) fn request_cancel(&mut self) {
        self.cancel_requested = true;
    }

    /// # Panics
    ///
    /// Panics if the request is terminal or the counter would overflow.
    pub(crate) fn add_dependency(&mut self) {
        assert!(
            !self.status.is_terminal(),
            "dependency added to a {} request that already finished as {}",
            self.kind(),
            self.status
        );
        self.dependencies = match self.dependencies.checked_add(1) {
            Some(count) => count,
            None => panic!("dependency count overflow on a {} request", self.kind()),
        };
    }

    /// Returns the remaining count.
    ///
    /// # Panics
    ///
    /// Panics if the count is already zero.
    pub(crate) fn remove_dependency(&mut self) -> u16 {
        assert!(
            self.dependencies > 0,
            "dependency removed from a {} request with none outstanding",
            self.kind()
        );
        self.dependencies -= 1;
        self.dependencies
    }

    /// Raises the estimate to `at` if that is later. Returns true if it changed.
    pub(crate) fn raise_estimate(&mut self, at: Instant) -> bool {
        match self.estimated_completion {
            Some(current) if current >= at => false,
            _ => {
                self.estimated_completion = Some(at);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::time::Duration;

    fn wait_request() -> FileRequest {
        let mut request = FileRequest::default();
        request.configure(
            RequestPayload::Wait,
            Some(RequestId::new(0, 0)),
            Some(StageId::new(1)),
            RequestUsage::Internal,
        );
        request
    }

    #[test]
    fn test_default_is_fresh() {
        let request = FileRequest::default();
        assert!(request.is_fresh());
        assert_eq!(request.status(), RequestStatus::Pending);
        assert_eq!(request.kind(), RequestKind::None);
    }

    #[test]
    fn test_configure_sets_links() {
        let request = wait_request();
        assert!(!request.is_fresh());
        assert_eq!(request.kind(), RequestKind::Wait);
        assert_eq!(request.parent(), Some(RequestId::new(0, 0)));
        assert_eq!(request.owner(), Some(StageId::new(1)));
    }

    #[test]
    #[should_panic(expected = "configured before being reset")]
    fn test_configure_twice_panics() {
        let mut request = wait_request();
        request.configure(RequestPayload::Wait, None, None, RequestUsage::Internal);
    }

    #[test]
    fn test_reset_terminal_request_is_fresh() {
        let mut request = wait_request();
        request.raise_estimate(Instant::now());
        request.request_cancel();
        request.set_status(RequestStatus::Failed);

        request.reset();

        assert!(request.is_fresh());
    }

    #[test]
    fn test_reset_rejects_dependent_request_without_changes() {
        let mut request = wait_request();
        request.add_dependency();
        request.set_status(RequestStatus::Canceled);

        let result = catch_unwind(AssertUnwindSafe(|| request.reset()));

        assert!(result.is_err());
        assert_eq!(request.dependencies(), 1);
        assert_eq!(request.status(), RequestStatus::Canceled);
        assert_eq!(request.kind(), RequestKind::Wait);
    }

    #[test]
    #[should_panic(expected = "non-terminal status")]
    fn test_reset_rejects_active_request() {
        let mut request = wait_request();
        request.reset();
    }

    #[test]
    fn test_dependency_counting() {
        let mut request = wait_request();
        request.add_dependency();
        request.add_dependency();
        assert_eq!(request.dependencies(), 2);
        assert_eq!(request.remove_dependency(), 1);
        assert_eq!(request.remove_dependency(), 0);
    }

    #[test]
    #[should_panic(expected = "already finished")]
    fn test_add_dependency_to_terminal_panics() {
        let mut request = wait_request();
        request.set_status(RequestStatus::Completed);
        request.add_dependency();
    }

    #[test]
    #[should_panic(expected = "none outstanding")]
    fn test_remove_dependency_underflow_panics() {
        let mut request = wait_request();
        request.remove_dependency();
    }

    #[test]
    fn test_raise_estimate_never_decreases() {
        let mut request = wait_request();
        let now = Instant::now();
        assert!(request.raise_estimate(now + Duration::from_millis(10)));
        assert!(!request.raise_estimate(now));
        assert_eq!(
            request.estimated_completion(),
            Some(now + Duration::from_millis(10))
        );
    }
}
