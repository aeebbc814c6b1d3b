//! Detector Graph
//!
//! The graph owns every topic and detector and drives evaluation passes.
//!
//! # Overview
//!
//! Detectors are added one by one and declare their edges as they join.
//! Sealing the graph freezes the wiring and computes a topological order
//! over topic and detector vertices. From then on each pass:
//!
//! 1. Clears every topic's "new value" flag
//! 2. Delivers values captured by armed lags, then exactly one queued input
//! 3. Walks the order once. A topic holding a new value is handed to each
//!    subscriber; a detector that received anything runs its
//!    `complete_evaluation` when the walk reaches it
//!
//! Publishes are applied as soon as the publishing detector returns. The
//! order guarantees every consumer of a topic is reached after all of its
//! producers, so one walk settles the pass.
//!
//! # Stepping
//!
//! [`Graph::push_data`] enqueues an input and [`Graph::evaluate_graph`] runs
//! a single pass. [`Graph::process_data`] does both and keeps evaluating
//! until nothing is pending.

mod scheduler;
mod vertex;

pub use scheduler::EvaluationOrder;
pub use vertex::{Vertex, VertexId, VertexKind};

pub(crate) use scheduler::vertex_name;

use smallvec::SmallVec;

use crate::config::GraphConfig;
use crate::detector::{Detector, DetectorId, DetectorSlot, Outbox, Wiring};
use crate::error::{GraphError, WiringError};
use crate::input_queue::{GraphInputQueue, PendingInput};
use crate::lag::Lag;
use crate::topic::{short_type_name, EdgeKind, Topic, TopicId, TopicRegistry, TopicState};

/// A reactive dataflow graph of topics and detectors.
pub struct Graph {
    config: GraphConfig,
    registry: TopicRegistry,
    /// Indexed by `DetectorId`.
    detectors: Vec<DetectorSlot>,
    order: EvaluationOrder,
    queue: GraphInputQueue,
    outbox: Outbox,
    /// Consecutive passes driven only by lag feedback.
    feedback_passes: usize,
    pass_count: u64,
}

impl Graph {
    /// Create an empty graph with the default configuration.
    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    pub fn with_config(config: GraphConfig) -> Self {
        let queue = GraphInputQueue::with_capacity(config.max_pending_inputs);
        Self {
            config,
            registry: TopicRegistry::new(),
            detectors: Vec::new(),
            order: EvaluationOrder::default(),
            queue,
            outbox: Outbox::default(),
            feedback_passes: 0,
            pass_count: 0,
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Add a detector and record the edges it declares.
    ///
    /// Construction order is the tie-break between detectors the topology
    /// leaves unordered.
    ///
    /// # Errors
    ///
    /// Returns the first `WiringError` raised by the detector's `wire`.
    /// Edges declared before the failure are removed again.
    pub fn add_detector<D: Detector>(&mut self, detector: D) -> Result<DetectorId, WiringError> {
        let name = short_type_name(std::any::type_name::<D>());
        let id = self.registry.register_detector(name)?;

        let mut wiring = Wiring::new(&mut self.registry, id);
        if let Err(err) = D::wire(&mut wiring) {
            drop(wiring);
            self.registry.rollback_detector(id);
            tracing::warn!(graph = %self.config.name, error = %err, "detector wiring failed");
            return Err(err);
        }
        self.detectors.push(wiring.finish(detector));

        tracing::debug!(
            graph = %self.config.name,
            detector = self.registry.detector_name(id),
            "detector wired"
        );
        Ok(id)
    }

    /// Add a [`Lag`] delaying `T` by one pass.
    pub fn add_lag<T: TopicState>(&mut self) -> Result<DetectorId, WiringError> {
        self.add_detector(Lag::<T>::new())
    }

    /// Return the topic for `T`, creating it if no detector referenced it.
    ///
    /// Used by the application to register inputs nothing subscribes to yet
    /// and outputs it wants to observe.
    pub fn resolve_topic<T: TopicState>(&mut self) -> Result<TopicId, WiringError> {
        self.registry.get_or_create_topic::<T>()
    }

    /// Freeze the wiring and compute the evaluation order.
    ///
    /// Sealing an already sealed graph does nothing. The first call to
    /// [`Graph::evaluate_graph`] seals implicitly.
    ///
    /// # Errors
    ///
    /// Returns `WiringError::Cycle` when the edges contain a cycle no lag
    /// breaks. The graph stays unsealed.
    pub fn seal(&mut self) -> Result<(), WiringError> {
        if self.registry.is_sealed() {
            return Ok(());
        }

        self.order = EvaluationOrder::compute(&self.registry)?;
        self.registry.seal();

        tracing::info!(
            graph = %self.config.name,
            vertices = self.order.len(),
            topics = self.registry.topic_count(),
            detectors = self.detectors.len(),
            "graph sealed"
        );
        Ok(())
    }

    pub fn is_sealed(&self) -> bool {
        self.registry.is_sealed()
    }

    /// Read-only access to topics and edges.
    pub fn registry(&self) -> &TopicRegistry {
        &self.registry
    }

    /// The evaluation order, once sealed.
    pub fn evaluation_order(&self) -> Option<&EvaluationOrder> {
        self.registry.is_sealed().then_some(&self.order)
    }

    /// Observe the topic for `T`.
    pub fn topic<T: TopicState>(&self) -> Option<&Topic<T>> {
        self.registry.topic::<T>()
    }

    /// Borrow a detector by id, if it has type `D`.
    pub fn detector<D: Detector>(&self, id: DetectorId) -> Option<&D> {
        self.detectors.get(id.index())?.instance::<D>()
    }

    /// First detector of type `D`, in construction order.
    pub fn find_detector<D: Detector>(&self) -> Option<&D> {
        self.detectors.iter().find_map(DetectorSlot::instance::<D>)
    }

    pub fn detector_count(&self) -> usize {
        self.detectors.len()
    }

    /// A handle to this graph's input queue.
    ///
    /// Handles can be stored in detectors or timeout services. Inputs they
    /// submit are evaluated by later passes, never inline.
    pub fn input_queue(&self) -> GraphInputQueue {
        self.queue.clone()
    }

    /// Queue `value` for its own pass.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::UnknownTopic` when no topic exists for `T` and
    /// `GraphError::InputQueueFull` when the queue is at capacity.
    pub fn push_data<T: TopicState>(&mut self, value: T) -> Result<(), GraphError> {
        if self.registry.topic_id::<T>().is_none() {
            return Err(GraphError::UnknownTopic {
                topic: short_type_name(std::any::type_name::<T>()),
            });
        }
        self.queue.submit(value)
    }

    /// Whether another pass has work: a queued input or an armed lag.
    pub fn has_data_pending(&self) -> bool {
        !self.queue.is_empty() || self.detectors.iter().any(DetectorSlot::lag_armed)
    }

    /// Run exactly one pass. Returns `false` if nothing was pending.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::Wiring` if sealing fails, `GraphError::FeedbackLimit`
    /// if lags keep re-arming without new input, and the errors of a failed
    /// publish or injection. A failed pass is abandoned where it stopped.
    pub fn evaluate_graph(&mut self) -> Result<bool, GraphError> {
        self.seal()?;

        let input = self.queue.pop_front();
        if input.is_some() {
            self.feedback_passes = 0;
        } else if self.detectors.iter().any(DetectorSlot::lag_armed) {
            self.feedback_passes += 1;
            if self.feedback_passes > self.config.max_feedback_passes {
                let passes = self.config.max_feedback_passes;
                for slot in &mut self.detectors {
                    slot.take_lagged();
                }
                self.feedback_passes = 0;
                tracing::warn!(graph = %self.config.name, passes, "lag feedback did not settle");
                return Err(GraphError::FeedbackLimit { passes });
            }
        } else {
            return Ok(false);
        }

        self.queue.set_evaluating(true);
        let result = self.run_pass(input);
        self.queue.set_evaluating(false);
        result.map(|()| true)
    }

    /// Run passes until nothing is pending. Returns the number of passes.
    pub fn evaluate_pending(&mut self) -> Result<usize, GraphError> {
        let mut passes = 0;
        while self.evaluate_graph()? {
            passes += 1;
        }
        Ok(passes)
    }

    /// Queue `value` and evaluate until the graph settles.
    ///
    /// When lag follow-up passes run, topics published only by the input's
    /// own pass no longer report a new value on return. Observe every pass
    /// through [`ProcessorContainer::process_output`](crate::ProcessorContainer::process_output).
    pub fn process_data<T: TopicState>(&mut self, value: T) -> Result<usize, GraphError> {
        self.push_data(value)?;
        self.evaluate_pending()
    }

    /// Number of passes run so far.
    pub fn pass_count(&self) -> u64 {
        self.pass_count
    }

    fn run_pass(&mut self, input: Option<PendingInput>) -> Result<(), GraphError> {
        let Self {
            config,
            registry,
            detectors,
            order,
            queue,
            outbox,
            pass_count,
            ..
        } = self;

        *pass_count += 1;
        let pass = *pass_count;

        registry.clear_new_values();
        outbox.clear();
        for slot in detectors.iter_mut() {
            slot.reset();
        }

        // Lagged values belong to this pass, ahead of the input.
        for slot in detectors.iter_mut() {
            if let Some(lagged) = slot.take_lagged() {
                tracing::debug!(pass, topic = lagged.type_name(), "lagged value delivered");
                inject(registry, lagged)?;
            }
        }
        match input {
            Some(input) => {
                tracing::debug!(graph = %config.name, pass, topic = input.type_name(), "pass started");
                inject(registry, input)?;
            }
            None => tracing::debug!(graph = %config.name, pass, "lag feedback pass started"),
        }

        let mut completed = 0usize;
        for vertex in order.iter() {
            match vertex.kind() {
                VertexKind::Topic(topic) => {
                    if !registry.has_new_value(topic) {
                        continue;
                    }
                    let subscribers: SmallVec<[DetectorId; 8]> =
                        SmallVec::from_slice(registry.subscribers(topic));
                    for detector in subscribers {
                        let (Some(slot), Some(value)) =
                            (detectors.get_mut(detector.index()), registry.topic_any(topic))
                        else {
                            continue;
                        };
                        tracing::trace!(
                            topic = registry.topic_name(topic),
                            detector = registry.detector_name(detector),
                            "dispatch"
                        );
                        slot.evaluate(topic, value, registry, outbox);
                        apply_outbox(registry, queue, detector, outbox)?;
                    }
                }
                VertexKind::Detector(detector) => {
                    let Some(slot) = detectors.get_mut(detector.index()) else {
                        continue;
                    };
                    if slot.complete(registry, outbox) {
                        completed += 1;
                        apply_outbox(registry, queue, slot.id(), outbox)?;
                    }
                }
            }
        }

        tracing::debug!(graph = %config.name, pass, detectors = completed, "pass settled");
        Ok(())
    }
}

/// Publish an injected value into its topic.
fn inject(registry: &mut TopicRegistry, input: PendingInput) -> Result<(), GraphError> {
    let name = input.type_name();
    let unknown = || GraphError::UnknownTopic {
        topic: short_type_name(name),
    };
    let topic = registry.topic_id_of(input.type_id()).ok_or_else(unknown)?;
    registry
        .publish_boxed(topic, input.into_value())
        .map_err(|_| unknown())
}

/// Apply what a detector published, checking every value against its
/// declared edges.
fn apply_outbox(
    registry: &mut TopicRegistry,
    queue: &GraphInputQueue,
    detector: DetectorId,
    outbox: &mut Outbox,
) -> Result<(), GraphError> {
    if let Some(name) = outbox.rejected.drain(..).next() {
        return Err(GraphError::UndeclaredPublish {
            detector: registry.detector_name(detector).to_string(),
            topic: short_type_name(name),
        });
    }

    for value in outbox.published.drain(..) {
        let Some(topic) = registry.declared_topic(detector, value.type_id(), EdgeKind::Immediate)
        else {
            return Err(undeclared(registry, detector, &value));
        };
        let name = value.type_name();
        registry
            .publish_boxed(topic, value.into_value())
            .map_err(|_| GraphError::UnknownTopic {
                topic: short_type_name(name),
            })?;
    }

    for value in outbox.future.drain(..) {
        if registry
            .declared_topic(detector, value.type_id(), EdgeKind::Delayed)
            .is_none()
        {
            return Err(undeclared(registry, detector, &value));
        }
        tracing::trace!(
            detector = registry.detector_name(detector),
            topic = value.type_name(),
            "future publish queued"
        );
        queue.submit_pending(value)?;
    }
    Ok(())
}

fn undeclared(registry: &TopicRegistry, detector: DetectorId, value: &PendingInput) -> GraphError {
    GraphError::UndeclaredPublish {
        detector: registry.detector_name(detector).to_string(),
        topic: short_type_name(value.type_name()),
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("name", &self.config.name)
            .field("topics", &self.registry.topic_count())
            .field("detectors", &self.detectors.len())
            .field("sealed", &self.registry.is_sealed())
            .field("pending_inputs", &self.queue.len())
            .field("pass_count", &self.pass_count)
            .finish_non_exhaustive()
    }
}
