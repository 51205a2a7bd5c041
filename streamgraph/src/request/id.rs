//! Identifiers for requests and pipeline stages.

use std::fmt;

/// Handle to a request slot in a [`RequestGraph`](crate::graph::RequestGraph).
///
/// A handle is a slot index plus the slot's generation at the time the request
/// was created. Releasing a request bumps the generation, so a handle kept past
/// that point no longer resolves instead of silently aliasing whatever request
/// reuses the slot.
#[derive(Clone, Copy, Hash, Eq, PartialEq)]
pub struct RequestId {
    index: u32,
    generation: u32,
}

impl RequestId {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub(crate) fn index(self) -> usize {
        self.index as usize
    }

    /// Returns the slot generation this handle was issued for.
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestId({}@{})", self.index, self.generation)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}@{}", self.index, self.generation)
    }
}

/// Identifier of a pipeline stage registered with the graph.
///
/// Stages own the requests they create; see [`StagePool`](crate::stage::StagePool).
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct StageId(u32);

impl StageId {
    pub(crate) fn new(id: u32) -> Self {
        Self(id)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns the numeric value of this stage ID.
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage-{}", self.0)
    }
}
