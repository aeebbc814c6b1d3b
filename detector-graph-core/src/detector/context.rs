//! Evaluation Context
//!
//! The handle a detector receives while it runs. Publishing does not touch
//! topics directly: values are collected in an outbox and the graph applies
//! them once the detector returns.
//!
//! Timeouts are the exception: they are handed to the timeout service right
//! away so the detector gets a handle it can cancel later. The declared
//! edge is checked first; an undeclared schedule is recorded in the outbox
//! and reported by the graph like an undeclared publish.

use std::any::TypeId;
use std::marker::PhantomData;

use super::{Detector, DetectorId, FuturePublisher, Publisher, TimeoutPublisher};
use crate::input_queue::PendingInput;
use crate::timeout::{TimeOffset, TimeoutHandle, TimeoutPublisherService};
use crate::topic::{EdgeKind, TopicRegistry, TopicState};

/// Values produced by the running detector.
#[derive(Debug, Default)]
pub(crate) struct Outbox {
    /// Values for topics of the current pass.
    pub(crate) published: Vec<PendingInput>,
    /// Values for the input queue.
    pub(crate) future: Vec<PendingInput>,
    /// Type names of timeouts scheduled without a declared edge.
    pub(crate) rejected: Vec<&'static str>,
}

impl Outbox {
    pub(crate) fn clear(&mut self) {
        self.published.clear();
        self.future.clear();
        self.rejected.clear();
    }
}

/// Context handed to [`Subscriber::evaluate`](super::Subscriber::evaluate)
/// and [`Detector::complete_evaluation`].
pub struct Context<'a, D> {
    detector: DetectorId,
    registry: &'a TopicRegistry,
    outbox: &'a mut Outbox,
    _detector: PhantomData<fn(&mut D)>,
}

impl<'a, D: Detector> Context<'a, D> {
    pub(crate) fn new(
        detector: DetectorId,
        registry: &'a TopicRegistry,
        outbox: &'a mut Outbox,
    ) -> Self {
        Self {
            detector,
            registry,
            outbox,
            _detector: PhantomData,
        }
    }

    /// Identifier of the running detector.
    pub fn detector_id(&self) -> DetectorId {
        self.detector
    }

    /// Publish `value` into the current pass.
    ///
    /// Subscribers ordered after this detector observe it in this pass. A
    /// later publish of the same type within the pass replaces this one.
    pub fn publish<T>(&mut self, value: T)
    where
        T: TopicState,
        D: Publisher<T>,
    {
        self.outbox.published.push(PendingInput::new(value));
    }

    /// Queue `value` as input for a later pass.
    ///
    /// The value is never evaluated inline; it waits behind any input that
    /// is already queued.
    pub fn publish_on_future_evaluation<T>(&mut self, value: T)
    where
        T: TopicState,
        D: FuturePublisher<T>,
    {
        self.outbox.future.push(PendingInput::new(value));
    }

    /// Schedule `value` to be submitted once, `delay` after the service's
    /// current time.
    ///
    /// Returns `None` if the detector never called
    /// [`Wiring::setup_timeout_publishing`](super::Wiring::setup_timeout_publishing)
    /// for `T`; the graph then fails the pass with
    /// `GraphError::UndeclaredPublish`.
    pub fn schedule_timeout<T>(
        &mut self,
        timeouts: &TimeoutPublisherService,
        value: T,
        delay: TimeOffset,
    ) -> Option<TimeoutHandle>
    where
        T: TopicState,
        D: TimeoutPublisher<T>,
    {
        self.timeout_declared::<T>()
            .then(|| timeouts.schedule_timeout(value, delay))
    }

    /// Schedule `value` every `period` until the handle is cancelled.
    ///
    /// Checked like [`Context::schedule_timeout`].
    pub fn schedule_periodic<T>(
        &mut self,
        timeouts: &TimeoutPublisherService,
        value: T,
        period: TimeOffset,
    ) -> Option<TimeoutHandle>
    where
        T: TopicState,
        D: TimeoutPublisher<T>,
    {
        self.timeout_declared::<T>()
            .then(|| timeouts.schedule_periodic(value, period))
    }

    fn timeout_declared<T: TopicState>(&mut self) -> bool {
        let declared = self
            .registry
            .declared_topic(self.detector, TypeId::of::<T>(), EdgeKind::Delayed)
            .is_some();
        if !declared {
            self.outbox.rejected.push(std::any::type_name::<T>());
        }
        declared
    }
}
