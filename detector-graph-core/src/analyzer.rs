//! Graph Analysis
//!
//! Read-only views of a graph's topology for external tooling: a
//! serializable [`TopologySnapshot`] and a Graphviz rendering of it.
//!
//! Vertices are listed in evaluation order and labelled `rank:Name`. Topics
//! are classified by their edges:
//!
//! - input topics have no same-pass publisher (lightblue)
//! - output topics have no subscriber (limegreen)
//! - every other topic is internal (red)
//!
//! Detectors are drawn in blue and delayed edges (lags, future and timeout
//! publishers) as dotted lines that do not constrain the layout.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::graph::{vertex_name, EvaluationOrder, Graph, Vertex, VertexKind};
use crate::topic::{EdgeKind, TopicInfo, TopicRegistry};

/// What a vertex is, as far as tooling is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VertexRole {
    InputTopic,
    InternalTopic,
    OutputTopic,
    Detector,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexSnapshot {
    /// Position in evaluation order.
    pub rank: usize,
    pub name: String,
    pub role: VertexRole,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeSnapshot {
    /// Rank of the source vertex.
    pub from: usize,
    /// Rank of the target vertex.
    pub to: usize,
    pub delayed: bool,
}

/// The topology of one graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologySnapshot {
    pub name: String,
    /// Whether `vertices` follows a computed evaluation order. When false,
    /// the wiring has a cycle and vertices are in registration order.
    pub ordered: bool,
    pub vertices: Vec<VertexSnapshot>,
    pub edges: Vec<EdgeSnapshot>,
}

impl TopologySnapshot {
    pub fn vertex(&self, name: &str) -> Option<&VertexSnapshot> {
        self.vertices.iter().find(|vertex| vertex.name == name)
    }
}

/// Read-only analyzer over a graph.
#[derive(Debug, Clone, Copy)]
pub struct GraphAnalyzer<'g> {
    graph: &'g Graph,
}

impl<'g> GraphAnalyzer<'g> {
    pub fn new(graph: &'g Graph) -> Self {
        Self { graph }
    }

    /// Capture the topology.
    ///
    /// An unsealed graph is ordered on the fly without sealing it.
    pub fn snapshot(&self) -> TopologySnapshot {
        let registry = self.graph.registry();
        let computed;
        let order = match self.graph.evaluation_order() {
            Some(order) => Some(order),
            None => {
                computed = EvaluationOrder::compute(registry).ok();
                computed.as_ref()
            }
        };

        let walk: Vec<VertexKind> = match order {
            Some(order) => order.iter().map(Vertex::kind).collect(),
            None => registration_order(registry),
        };

        let mut topic_ranks = vec![0; registry.topic_count()];
        let mut detector_ranks = vec![0; registry.detector_count()];
        for (rank, kind) in walk.iter().enumerate() {
            match *kind {
                VertexKind::Topic(topic) => topic_ranks[topic.index()] = rank,
                VertexKind::Detector(detector) => detector_ranks[detector.index()] = rank,
            }
        }

        let mut vertices = Vec::with_capacity(walk.len());
        let mut edges = Vec::new();
        for (rank, kind) in walk.iter().enumerate() {
            let role = match *kind {
                VertexKind::Topic(topic) => {
                    let Some(info) = registry.topic_info(topic) else {
                        continue;
                    };
                    edges.extend(info.subscribers().iter().map(|subscriber| EdgeSnapshot {
                        from: rank,
                        to: detector_ranks[subscriber.index()],
                        delayed: false,
                    }));
                    topic_role(&info)
                }
                VertexKind::Detector(detector) => {
                    for topic in registry.topics() {
                        for &(publisher, edge) in topic.publishers() {
                            if publisher == detector {
                                edges.push(EdgeSnapshot {
                                    from: rank,
                                    to: topic_ranks[topic.id().index()],
                                    delayed: edge == EdgeKind::Delayed,
                                });
                            }
                        }
                    }
                    VertexRole::Detector
                }
            };
            vertices.push(VertexSnapshot {
                rank,
                name: vertex_name(registry, *kind).to_string(),
                role,
            });
        }

        TopologySnapshot {
            name: self.graph.config().name.clone(),
            ordered: order.is_some(),
            vertices,
            edges,
        }
    }

    /// The snapshot as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, GraphError> {
        Ok(serde_json::to_string_pretty(&self.snapshot())?)
    }

    /// The topology in Graphviz DOT syntax.
    pub fn to_dot(&self) -> String {
        DotGraph(&self.snapshot()).to_string()
    }

    /// Write the DOT rendering to `path`.
    pub fn write_dot(&self, path: impl AsRef<Path>) -> Result<(), GraphError> {
        std::fs::write(path, self.to_dot())?;
        Ok(())
    }
}

fn registration_order(registry: &TopicRegistry) -> Vec<VertexKind> {
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
    keyed.into_iter().map(|(_, kind)| kind).collect()
}

fn topic_role(info: &TopicInfo<'_>) -> VertexRole {
    if !info.has_immediate_publisher() {
        VertexRole::InputTopic
    } else if info.subscribers().is_empty() {
        VertexRole::OutputTopic
    } else {
        VertexRole::InternalTopic
    }
}

/// DOT identifier: the name without generic punctuation.
fn dot_id(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect()
}

struct DotGraph<'a>(&'a TopologySnapshot);

impl fmt::Display for DotGraph<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.0;
        writeln!(f, "digraph GraphAnalyzer {{")?;
        writeln!(f, "    rankdir = \"LR\";")?;
        writeln!(f, "    node[fontname=Helvetica];")?;
        writeln!(f, "    size=\"12,5\";")?;
        writeln!(f)?;

        for vertex in &snapshot.vertices {
            let id = dot_id(&vertex.name);
            let style = match vertex.role {
                VertexRole::InputTopic => "style=filled, shape=box, color=lightblue",
                VertexRole::InternalTopic => "style=filled, shape=box, color=red",
                VertexRole::OutputTopic => "style=filled, shape=box, color=limegreen",
                VertexRole::Detector => "color=blue",
            };
            writeln!(
                f,
                "    \"{id}\" [label=\"{}:{}\", {style}];",
                vertex.rank, vertex.name
            )?;

            for edge in snapshot.edges.iter().filter(|edge| edge.from == vertex.rank) {
                let Some(target) = snapshot.vertices.iter().find(|v| v.rank == edge.to) else {
                    continue;
                };
                let target = dot_id(&target.name);
                if edge.delayed {
                    writeln!(
                        f,
                        "        \"{id}\" -> \"{target}\" [style=dotted, color=red, constraint=false];"
                    )?;
                } else {
                    writeln!(f, "        \"{id}\" -> \"{target}\";")?;
                }
            }
        }
        writeln!(f, "}}")
    }
}
