//! Topic Registry
//!
//! The registry is the graph-scoped catalog of topics. It maps each payload
//! type to its single `Topic<T>` instance and records, for every topic, the
//! detectors that publish it and the detectors that subscribe to it.
//!
//! The registry performs no ordering. It is the data source from which the
//! graph's scheduler derives the evaluation order once wiring is complete.
//!
//! Every topic and detector receives a sequence number when it is first
//! registered. Sequence numbers give the scheduler its deterministic
//! tie-break.

use std::any::{Any, TypeId};

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::{short_type_name, AnyTopic, Topic, TopicId, TopicState};
use crate::detector::DetectorId;
use crate::error::WiringError;

/// How a publisher feeds a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Values land in the topic during the publisher's own pass.
    /// These edges constrain the evaluation order.
    Immediate,

    /// Values land in a later pass (lags, future and timeout publishers).
    /// These edges are excluded from ordering.
    Delayed,
}

struct TopicEntry {
    topic: Box<dyn AnyTopic>,
    name: String,
    sequence: usize,
    publishers: SmallVec<[(DetectorId, EdgeKind); 2]>,
    subscribers: SmallVec<[DetectorId; 4]>,
}

struct DetectorEntry {
    name: String,
    sequence: usize,
}

/// Graph-scoped catalog of topics and producer/consumer edges.
pub struct TopicRegistry {
    topics: IndexMap<TypeId, TopicEntry>,
    detectors: Vec<DetectorEntry>,
    next_sequence: usize,
    sealed: bool,
}

/// Read-only view of one registered topic.
#[derive(Clone, Copy)]
pub struct TopicInfo<'r> {
    id: TopicId,
    entry: &'r TopicEntry,
}

impl<'r> TopicInfo<'r> {
    pub fn id(&self) -> TopicId {
        self.id
    }

    /// Short type name of the payload.
    pub fn name(&self) -> &'r str {
        &self.entry.name
    }

    /// Registration sequence shared with detectors.
    pub fn sequence(&self) -> usize {
        self.entry.sequence
    }

    pub fn publishers(&self) -> &'r [(DetectorId, EdgeKind)] {
        &self.entry.publishers
    }

    pub fn subscribers(&self) -> &'r [DetectorId] {
        &self.entry.subscribers
    }

    /// Whether any detector publishes this topic within the same pass.
    pub fn has_immediate_publisher(&self) -> bool {
        self.entry
            .publishers
            .iter()
            .any(|(_, kind)| *kind == EdgeKind::Immediate)
    }
}

/// Read-only view of one registered detector.
#[derive(Clone, Copy)]
pub struct DetectorInfo<'r> {
    id: DetectorId,
    entry: &'r DetectorEntry,
}

impl<'r> DetectorInfo<'r> {
    pub fn id(&self) -> DetectorId {
        self.id
    }

    pub fn name(&self) -> &'r str {
        &self.entry.name
    }

    pub fn sequence(&self) -> usize {
        self.entry.sequence
    }
}

impl TopicRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            topics: IndexMap::new(),
            detectors: Vec::new(),
            next_sequence: 0,
            sealed: false,
        }
    }

    fn next_sequence(&mut self) -> usize {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }

    /// Return the topic for `T`, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns `WiringError::Sealed` if the topic does not exist yet and the
    /// registry no longer accepts registrations.
    pub fn get_or_create_topic<T: TopicState>(&mut self) -> Result<TopicId, WiringError> {
        if let Some(index) = self.topics.get_index_of(&TypeId::of::<T>()) {
            return Ok(TopicId::new(index));
        }

        let name = short_type_name(std::any::type_name::<T>());
        if self.sealed {
            return Err(WiringError::Sealed(format!("topic {name}")));
        }

        let id = TopicId::new(self.topics.len());
        let sequence = self.next_sequence();
        tracing::trace!(topic = %name, sequence, "topic created");
        self.topics.insert(
            TypeId::of::<T>(),
            TopicEntry {
                topic: Box::new(Topic::<T>::new(id)),
                name,
                sequence,
                publishers: SmallVec::new(),
                subscribers: SmallVec::new(),
            },
        );
        Ok(id)
    }

    /// Look up the topic id for `T` without creating it.
    pub fn topic_id<T: TopicState>(&self) -> Option<TopicId> {
        self.topic_id_of(TypeId::of::<T>())
    }

    pub(crate) fn topic_id_of(&self, type_id: TypeId) -> Option<TopicId> {
        self.topics.get_index_of(&type_id).map(TopicId::new)
    }

    /// Read-only access to the topic for `T`.
    pub fn topic<T: TopicState>(&self) -> Option<&Topic<T>> {
        self.topics
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.topic.as_any().downcast_ref::<Topic<T>>())
    }

    pub(crate) fn register_detector(&mut self, name: String) -> Result<DetectorId, WiringError> {
        if self.sealed {
            return Err(WiringError::Sealed(format!("detector {name}")));
        }
        let id = DetectorId::new(self.detectors.len());
        let sequence = self.next_sequence();
        self.detectors.push(DetectorEntry { name, sequence });
        Ok(id)
    }

    /// Remove every edge of a detector whose wiring failed.
    ///
    /// Topics created on its behalf remain as unconnected vertices.
    pub(crate) fn rollback_detector(&mut self, detector: DetectorId) {
        for entry in self.topics.values_mut() {
            entry.publishers.retain(|(publisher, _)| *publisher != detector);
            entry.subscribers.retain(|subscriber| *subscriber != detector);
        }
        if detector.index() + 1 == self.detectors.len() {
            self.detectors.pop();
        }
    }

    fn entry_for<T: TopicState>(
        &mut self,
        detector: DetectorId,
    ) -> Result<(TopicId, &mut TopicEntry, &str), WiringError> {
        if self.sealed {
            let name = self.detector_name(detector).to_string();
            return Err(WiringError::Sealed(format!("edges of detector {name}")));
        }
        let id = self.get_or_create_topic::<T>()?;
        let detector_name = self
            .detectors
            .get(detector.index())
            .map_or("<unknown>", |entry| entry.name.as_str());
        let (_, entry) = self
            .topics
            .get_index_mut(id.index())
            .ok_or_else(|| WiringError::Sealed(format!("topic #{}", id.index())))?;
        Ok((id, entry, detector_name))
    }

    /// Record that `detector` publishes `T`.
    ///
    /// # Errors
    ///
    /// Returns `WiringError::SelfSubscription` for an immediate publish of a
    /// topic the detector subscribes to, `WiringError::DuplicatePublisher`
    /// when declared twice, and `WiringError::Sealed` after sealing.
    pub fn register_publisher<T: TopicState>(
        &mut self,
        detector: DetectorId,
        kind: EdgeKind,
    ) -> Result<TopicId, WiringError> {
        let (id, entry, detector_name) = self.entry_for::<T>(detector)?;

        if kind == EdgeKind::Immediate && entry.subscribers.contains(&detector) {
            return Err(WiringError::SelfSubscription {
                detector: detector_name.to_string(),
                topic: entry.name.clone(),
            });
        }
        if entry.publishers.iter().any(|(publisher, _)| *publisher == detector) {
            return Err(WiringError::DuplicatePublisher {
                detector: detector_name.to_string(),
                topic: entry.name.clone(),
            });
        }

        entry.publishers.push((detector, kind));
        Ok(id)
    }

    /// Record that `detector` subscribes to `T`.
    ///
    /// # Errors
    ///
    /// Returns `WiringError::SelfSubscription` if the detector already
    /// publishes `T` immediately, `WiringError::DuplicateSubscription` when
    /// declared twice, and `WiringError::Sealed` after sealing.
    pub fn register_subscriber<T: TopicState>(
        &mut self,
        detector: DetectorId,
    ) -> Result<TopicId, WiringError> {
        let (id, entry, detector_name) = self.entry_for::<T>(detector)?;

        if entry.publishers.contains(&(detector, EdgeKind::Immediate)) {
            return Err(WiringError::SelfSubscription {
                detector: detector_name.to_string(),
                topic: entry.name.clone(),
            });
        }
        if entry.subscribers.contains(&detector) {
            return Err(WiringError::DuplicateSubscription {
                detector: detector_name.to_string(),
                topic: entry.name.clone(),
            });
        }

        entry.subscribers.push(detector);
        Ok(id)
    }

    /// Topic that `detector` may publish into with the given edge kind.
    pub(crate) fn declared_topic(
        &self,
        detector: DetectorId,
        type_id: TypeId,
        kind: EdgeKind,
    ) -> Option<TopicId> {
        let index = self.topics.get_index_of(&type_id)?;
        let entry = &self.topics[index];
        entry
            .publishers
            .contains(&(detector, kind))
            .then(|| TopicId::new(index))
    }

    pub(crate) fn seal(&mut self) {
        self.sealed = true;
    }

    /// Whether the registry still accepts new topics and edges.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    pub fn detector_count(&self) -> usize {
        self.detectors.len()
    }

    /// All topics, in registration order.
    pub fn topics(&self) -> impl Iterator<Item = TopicInfo<'_>> + '_ {
        self.topics
            .values()
            .enumerate()
            .map(|(index, entry)| TopicInfo {
                id: TopicId::new(index),
                entry,
            })
    }

    /// All detectors, in construction order.
    pub fn detectors(&self) -> impl Iterator<Item = DetectorInfo<'_>> + '_ {
        self.detectors
            .iter()
            .enumerate()
            .map(|(index, entry)| DetectorInfo {
                id: DetectorId::new(index),
                entry,
            })
    }

    pub fn topic_info(&self, id: TopicId) -> Option<TopicInfo<'_>> {
        self.topics
            .get_index(id.index())
            .map(|(_, entry)| TopicInfo { id, entry })
    }

    pub fn detector_info(&self, id: DetectorId) -> Option<DetectorInfo<'_>> {
        self.detectors
            .get(id.index())
            .map(|entry| DetectorInfo { id, entry })
    }

    pub fn topic_name(&self, id: TopicId) -> &str {
        self.topics
            .get_index(id.index())
            .map_or("<unknown>", |(_, entry)| entry.name.as_str())
    }

    pub fn detector_name(&self, id: DetectorId) -> &str {
        self.detectors
            .get(id.index())
            .map_or("<unknown>", |entry| entry.name.as_str())
    }

    pub(crate) fn subscribers(&self, id: TopicId) -> &[DetectorId] {
        self.topics
            .get_index(id.index())
            .map(|(_, entry)| entry.subscribers.as_slice())
            .unwrap_or_default()
    }

    pub(crate) fn has_new_value(&self, id: TopicId) -> bool {
        self.topics
            .get_index(id.index())
            .is_some_and(|(_, entry)| entry.topic.has_new_value())
    }

    /// Erased topic, for handing to a subscription dispatcher.
    pub(crate) fn topic_any(&self, id: TopicId) -> Option<&dyn Any> {
        self.topics
            .get_index(id.index())
            .map(|(_, entry)| entry.topic.as_any())
    }

    pub(crate) fn publish_boxed(
        &mut self,
        id: TopicId,
        value: Box<dyn Any + Send>,
    ) -> Result<(), Box<dyn Any + Send>> {
        match self.topics.get_index_mut(id.index()) {
            Some((_, entry)) => entry.topic.publish_boxed(value),
            None => Err(value),
        }
    }

    /// Clear every "has new value" flag at the start of a pass.
    pub(crate) fn clear_new_values(&mut self) {
        for entry in self.topics.values_mut() {
            entry.topic.clear_new_value();
        }
    }
}

impl Default for TopicRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TopicRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicRegistry")
            .field("topic_count", &self.topics.len())
            .field("detector_count", &self.detectors.len())
            .field("sealed", &self.sealed)
            .finish_non_exhaustive()
    }
}
