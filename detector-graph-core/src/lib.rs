//! Detector Graph Core
//!
//! A deterministic, single-threaded reactive dataflow engine. Applications
//! are built from typed data cells ("topics") and pure evaluation nodes
//! ("detectors"); the graph re-evaluates to a fixed point every time one
//! external input arrives.
//!
//! It implements:
//!
//! - Graph-scoped topics, one per payload type
//! - Detectors wired through declared subscriptions and publications
//! - A fixed topological evaluation order with construction-order tie-break
//! - One-pass delays ([`Lag`]) as the only way to close a feedback loop
//! - A reentrant input queue and a clock-driven timeout service
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `topic`: topics and the registry of producer/consumer edges
//! - `detector`: the detector traits, wiring and evaluation context
//! - `graph`: ordering and the pass driver
//! - `lag`: the one-pass delay detector
//! - `input_queue`: FIFO of inputs waiting for their own pass
//! - `timeout`: deferred input scheduled against an external clock
//! - `processor`: wrappers that react to every pass
//! - `analyzer`: read-only topology export (JSON, Graphviz)
//!
//! # Example
//!
//! ```rust,ignore
//! use detector_graph_core::prelude::*;
//!
//! #[derive(Clone)]
//! struct Celsius(f64);
//!
//! #[derive(Clone)]
//! struct Freezing(bool);
//!
//! struct FrostDetector;
//!
//! impl Detector for FrostDetector {
//!     fn wire(wiring: &mut Wiring<'_, Self>) -> Result<(), WiringError> {
//!         wiring.subscribe::<Celsius>()?.setup_publishing::<Freezing>()?;
//!         Ok(())
//!     }
//! }
//!
//! impl Subscriber<Celsius> for FrostDetector {
//!     fn evaluate(&mut self, value: &Celsius, ctx: &mut Context<'_, Self>) {
//!         ctx.publish(Freezing(value.0 <= 0.0));
//!     }
//! }
//!
//! impl Publisher<Freezing> for FrostDetector {}
//!
//! let mut graph = Graph::new();
//! graph.add_detector(FrostDetector)?;
//! graph.process_data(Celsius(-3.0))?;
//! assert!(graph.topic::<Freezing>().and_then(Topic::new_value).is_some_and(|f| f.0));
//! ```

pub mod analyzer;
pub mod config;
pub mod detector;
pub mod error;
pub mod graph;
pub mod input_queue;
pub mod lag;
pub mod processor;
pub mod timeout;
pub mod topic;

pub use analyzer::{GraphAnalyzer, TopologySnapshot, VertexRole};
pub use config::GraphConfig;
pub use detector::{
    Context, Detector, DetectorId, FuturePublisher, Publisher, Subscriber, TimeoutPublisher,
    Wiring,
};
pub use error::{GraphError, WiringError};
pub use graph::{EvaluationOrder, Graph};
pub use input_queue::{GraphInputQueue, PendingInput};
pub use lag::{Lag, LagState, Lagged};
pub use processor::ProcessorContainer;
pub use timeout::{TimeOffset, TimeoutHandle, TimeoutPublisherService};
pub use topic::{Topic, TopicId, TopicRegistry, TopicState};

/// Everything needed to write detectors and drive a graph.
pub mod prelude {
    pub use crate::{
        Context, Detector, FuturePublisher, Graph, GraphError, Lag, Lagged, ProcessorContainer,
        Publisher, Subscriber, TimeoutPublisher, TimeoutPublisherService, Topic, TopicState,
        Wiring, WiringError,
    };
}
