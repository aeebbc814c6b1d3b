//! Graph Vertices
//!
//! Topics and detectors are both vertices of the dependency graph. An edge
//! runs from a publisher to the topic it publishes within the pass, and
//! from a topic to each of its subscribers.

use indexmap::IndexSet;

use crate::detector::DetectorId;
use crate::topic::TopicId;

/// Position of a vertex in registration sequence.
///
/// The ordering of vertex ids is the scheduler's tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId(usize);

impl VertexId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

/// What a vertex stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexKind {
    Topic(TopicId),
    Detector(DetectorId),
}

/// A vertex with its ordering edges.
#[derive(Debug)]
pub struct Vertex {
    id: VertexId,
    kind: VertexKind,

    /// Vertices that must be walked before this one.
    dependencies: IndexSet<VertexId>,

    /// Vertices that must be walked after this one.
    dependents: IndexSet<VertexId>,
}

impl Vertex {
    pub(crate) fn new(id: VertexId, kind: VertexKind) -> Self {
        Self {
            id,
            kind,
            dependencies: IndexSet::new(),
            dependents: IndexSet::new(),
        }
    }

    pub fn id(&self) -> VertexId {
        self.id
    }

    pub fn kind(&self) -> VertexKind {
        self.kind
    }

    pub(crate) fn add_dependency(&mut self, vertex: VertexId) {
        self.dependencies.insert(vertex);
    }

    pub fn dependencies(&self) -> &IndexSet<VertexId> {
        &self.dependencies
    }

    pub(crate) fn add_dependent(&mut self, vertex: VertexId) {
        self.dependents.insert(vertex);
    }

    pub fn dependents(&self) -> &IndexSet<VertexId> {
        &self.dependents
    }
}
