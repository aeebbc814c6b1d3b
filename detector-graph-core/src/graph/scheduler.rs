//! Evaluation Order
//!
//! The scheduler turns the registry's edge set into the fixed order in which
//! a pass walks the graph. It runs once, when the graph is sealed.
//!
//! # Algorithm
//!
//! Kahn's algorithm over topic and detector vertices:
//!
//! 1. Every vertex receives an id from its registration sequence
//! 2. Immediate publishers gain an edge to their topic, topics gain an edge
//!    to each subscriber (delayed edges are left out)
//! 3. Vertices with no unsatisfied dependency wait in a min-heap keyed by id,
//!    so independent detectors keep their construction order
//! 4. Any vertex never released belongs to, or hangs off, a cycle that no
//!    lag breaks, and sealing fails
//!
//! Because the order is topological, a single front-to-back walk reaches the
//! fixed point of a pass.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::vertex::{Vertex, VertexId, VertexKind};
use crate::detector::DetectorId;
use crate::error::WiringError;
use crate::topic::{EdgeKind, TopicId, TopicRegistry};

/// A graph's fixed topological order.
#[derive(Debug, Default)]
pub struct EvaluationOrder {
    /// All vertices, indexed by id.
    vertices: Vec<Vertex>,
    order: Vec<VertexId>,
    /// Position of each vertex in `order`, indexed by id.
    ranks: Vec<usize>,
    topic_vertices: Vec<VertexId>,
    detector_vertices: Vec<VertexId>,
}

impl EvaluationOrder {
    /// Sort the registry's vertices.
    ///
    /// # Errors
    ///
    /// Returns `WiringError::Cycle` naming every vertex that could not be
    /// ordered.
    pub fn compute(registry: &TopicRegistry) -> Result<Self, WiringError> {
        let mut keyed: Vec<(usize, VertexKind)> = registry
            .topics()
            .map(|topic| (topic.sequence(), VertexKind::Topic(topic.id())))
            .chain(
                registry
                    .detectors()
                    .map(|detector| (detector.sequence(), VertexKind::Detector(detector.id()))),
            )
            .collect();
        keyed.sort_by_key(|(sequence, _)| *sequence);

        let mut vertices = Vec::with_capacity(keyed.len());
        let mut topic_vertices = vec![VertexId::new(0); registry.topic_count()];
        let mut detector_vertices = vec![VertexId::new(0); registry.detector_count()];
        for (index, (_, kind)) in keyed.into_iter().enumerate() {
            let id = VertexId::new(index);
            match kind {
                VertexKind::Topic(topic) => topic_vertices[topic.index()] = id,
                VertexKind::Detector(detector) => detector_vertices[detector.index()] = id,
            }
            vertices.push(Vertex::new(id, kind));
        }

        for topic in registry.topics() {
            let topic_vertex = topic_vertices[topic.id().index()];
            for &(publisher, kind) in topic.publishers() {
                if kind == EdgeKind::Immediate {
                    add_edge(&mut vertices, detector_vertices[publisher.index()], topic_vertex);
                }
            }
            for &subscriber in topic.subscribers() {
                add_edge(&mut vertices, topic_vertex, detector_vertices[subscriber.index()]);
            }
        }

        let order = topological_sort(&vertices);
        if order.len() < vertices.len() {
            let mut sorted = vec![false; vertices.len()];
            for id in &order {
                sorted[id.index()] = true;
            }
            let unsorted = vertices
                .iter()
                .filter(|vertex| !sorted[vertex.id().index()])
                .map(|vertex| vertex_name(registry, vertex.kind()).to_string())
                .collect();
            return Err(WiringError::Cycle { vertices: unsorted });
        }

        let mut ranks = vec![0; vertices.len()];
        for (rank, id) in order.iter().enumerate() {
            ranks[id.index()] = rank;
        }

        Ok(Self {
            vertices,
            order,
            ranks,
            topic_vertices,
            detector_vertices,
        })
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Vertex ids in walk order.
    pub fn order(&self) -> &[VertexId] {
        &self.order
    }

    /// Vertices in walk order.
    pub fn iter(&self) -> impl Iterator<Item = &Vertex> + '_ {
        self.order.iter().map(|id| &self.vertices[id.index()])
    }

    pub fn vertex(&self, id: VertexId) -> Option<&Vertex> {
        self.vertices.get(id.index())
    }

    /// Position of a vertex in walk order.
    pub fn rank(&self, id: VertexId) -> Option<usize> {
        self.ranks.get(id.index()).copied()
    }

    pub fn topic_vertex(&self, topic: TopicId) -> Option<VertexId> {
        self.topic_vertices.get(topic.index()).copied()
    }

    pub fn detector_vertex(&self, detector: DetectorId) -> Option<VertexId> {
        self.detector_vertices.get(detector.index()).copied()
    }

    /// Detectors in walk order.
    pub fn detectors(&self) -> impl Iterator<Item = DetectorId> + '_ {
        self.iter().filter_map(|vertex| match vertex.kind() {
            VertexKind::Detector(detector) => Some(detector),
            VertexKind::Topic(_) => None,
        })
    }
}

fn add_edge(vertices: &mut [Vertex], from: VertexId, to: VertexId) {
    vertices[from.index()].add_dependent(to);
    vertices[to.index()].add_dependency(from);
}

fn topological_sort(vertices: &[Vertex]) -> Vec<VertexId> {
    let mut in_degree: Vec<usize> = vertices
        .iter()
        .map(|vertex| vertex.dependencies().len())
        .collect();
    let mut ready: BinaryHeap<Reverse<VertexId>> = vertices
        .iter()
        .filter(|vertex| vertex.dependencies().is_empty())
        .map(|vertex| Reverse(vertex.id()))
        .collect();

    let mut order = Vec::with_capacity(vertices.len());
    while let Some(Reverse(id)) = ready.pop() {
        order.push(id);
        for &dependent in vertices[id.index()].dependents() {
            let degree = &mut in_degree[dependent.index()];
            *degree = degree.saturating_sub(1);
            if *degree == 0 {
                ready.push(Reverse(dependent));
            }
        }
    }
    order
}

pub(crate) fn vertex_name(registry: &TopicRegistry, kind: VertexKind) -> &str {
    match kind {
        VertexKind::Topic(topic) => registry.topic_name(topic),
        VertexKind::Detector(detector) => registry.detector_name(detector),
    }
}
