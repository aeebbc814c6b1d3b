//! Error types for graph wiring and evaluation.

use thiserror::Error;

/// Errors raised while detectors are wired into a graph.
///
/// Every variant points at a defect in the static graph definition. None of
/// them is recoverable at runtime.
#[derive(Debug, Error)]
pub enum WiringError {
    /// A detector subscribes to a topic it also publishes within the same pass.
    #[error("detector {detector} both subscribes to and publishes topic {topic}")]
    SelfSubscription {
        /// Detector name.
        detector: String,
        /// Topic name.
        topic: String,
    },

    /// A detector subscribes to the same topic twice.
    #[error("detector {detector} subscribes to topic {topic} more than once")]
    DuplicateSubscription {
        /// Detector name.
        detector: String,
        /// Topic name.
        topic: String,
    },

    /// A detector declares publishing of the same topic twice.
    #[error("detector {detector} declares publishing of topic {topic} more than once")]
    DuplicatePublisher {
        /// Detector name.
        detector: String,
        /// Topic name.
        topic: String,
    },

    /// The producer/consumer edges contain a cycle that no lag breaks.
    #[error("cycle not broken by a lag; unsortable vertices: {}", vertices.join(", "))]
    Cycle {
        /// Names of every vertex left unsorted.
        vertices: Vec<String>,
    },

    /// Registration attempted after the graph was sealed.
    #[error("graph is sealed; cannot register {0}")]
    Sealed(String),
}

/// Errors returned while feeding or evaluating a graph.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Sealing the graph failed.
    #[error(transparent)]
    Wiring(#[from] WiringError),

    /// A value was injected for a payload type that has no topic.
    #[error("no topic registered for {topic}")]
    UnknownTopic {
        /// Short type name of the payload.
        topic: String,
    },

    /// A detector published a topic it never declared.
    #[error("detector {detector} published undeclared topic {topic}")]
    UndeclaredPublish {
        /// Detector name.
        detector: String,
        /// Short type name of the payload.
        topic: String,
    },

    /// The input queue reached its configured bound.
    #[error("input queue is full (capacity {capacity})")]
    InputQueueFull {
        /// Configured capacity.
        capacity: usize,
    },

    /// Lag feedback kept producing follow-up passes.
    #[error("lag feedback did not settle within {passes} follow-up passes")]
    FeedbackLimit {
        /// Configured bound on consecutive lag-only passes.
        passes: usize,
    },

    /// Configuration or diagnostics (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Writing diagnostics output failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
