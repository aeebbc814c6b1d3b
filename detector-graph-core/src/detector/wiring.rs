//! Wiring and Subscription Dispatch
//!
//! When a detector joins a graph, its [`Detector::wire`] declarations are
//! recorded twice: as edges in the topic registry (for ordering) and as a
//! per-detector dispatch table mapping each subscribed topic to a
//! monomorphized handler (for delivery).
//!
//! The graph stores detectors type-erased. The dispatch table holds plain
//! function pointers that restore the concrete detector and payload types
//! before calling [`Subscriber::evaluate`].

use std::any::Any;
use std::marker::PhantomData;

use smallvec::SmallVec;

use super::{
    Context, Detector, DetectorId, FuturePublisher, Outbox, Publisher, Subscriber,
    TimeoutPublisher,
};
use crate::error::WiringError;
use crate::input_queue::PendingInput;
use crate::topic::{EdgeKind, Topic, TopicId, TopicRegistry, TopicState};

type EvaluateFn = fn(DetectorId, &mut dyn Any, &dyn Any, &TopicRegistry, &mut Outbox);
type CompleteFn = fn(DetectorId, &mut dyn Any, &TopicRegistry, &mut Outbox);

/// One row of a detector's dispatch table.
#[derive(Clone, Copy)]
struct Subscription {
    topic: TopicId,
    evaluate: EvaluateFn,
}

/// Hooks the graph uses to drain a lag before a pass.
#[derive(Clone, Copy)]
pub(crate) struct LagHooks {
    pub(crate) armed: fn(&dyn Any) -> bool,
    pub(crate) take: fn(&mut dyn Any) -> Option<PendingInput>,
}

fn evaluate_erased<D, T>(
    detector: DetectorId,
    instance: &mut dyn Any,
    topic: &dyn Any,
    registry: &TopicRegistry,
    outbox: &mut Outbox,
) where
    D: Subscriber<T>,
    T: TopicState,
{
    let (Some(instance), Some(topic)) = (
        instance.downcast_mut::<D>(),
        topic.downcast_ref::<Topic<T>>(),
    ) else {
        tracing::error!(?detector, "dispatch table does not match detector or topic type");
        return;
    };

    if let Some(value) = topic.new_value() {
        let mut ctx = Context::new(detector, registry, outbox);
        instance.evaluate(value, &mut ctx);
    }
}

fn complete_erased<D: Detector>(
    detector: DetectorId,
    instance: &mut dyn Any,
    registry: &TopicRegistry,
    outbox: &mut Outbox,
) {
    if let Some(instance) = instance.downcast_mut::<D>() {
        let mut ctx = Context::new(detector, registry, outbox);
        instance.complete_evaluation(&mut ctx);
    }
}

/// Declaration surface handed to [`Detector::wire`].
pub struct Wiring<'g, D> {
    registry: &'g mut TopicRegistry,
    detector: DetectorId,
    subscriptions: SmallVec<[Subscription; 4]>,
    lag: Option<LagHooks>,
    _detector: PhantomData<fn(&mut D)>,
}

impl<'g, D: Detector> Wiring<'g, D> {
    pub(crate) fn new(registry: &'g mut TopicRegistry, detector: DetectorId) -> Self {
        Self {
            registry,
            detector,
            subscriptions: SmallVec::new(),
            lag: None,
            _detector: PhantomData,
        }
    }

    /// Identifier the detector will have in the graph.
    pub fn detector_id(&self) -> DetectorId {
        self.detector
    }

    /// Subscribe to `T`.
    ///
    /// Subscription order does not affect delivery order, which follows
    /// the graph's topic order.
    pub fn subscribe<T>(&mut self) -> Result<&mut Self, WiringError>
    where
        T: TopicState,
        D: Subscriber<T>,
    {
        let topic = self.registry.register_subscriber::<T>(self.detector)?;
        self.subscriptions.push(Subscription {
            topic,
            evaluate: evaluate_erased::<D, T>,
        });
        Ok(self)
    }

    /// Declare that the detector publishes `T` within a pass.
    pub fn setup_publishing<T>(&mut self) -> Result<&mut Self, WiringError>
    where
        T: TopicState,
        D: Publisher<T>,
    {
        self.registry
            .register_publisher::<T>(self.detector, EdgeKind::Immediate)?;
        Ok(self)
    }

    /// Declare that the detector publishes `T` into future passes.
    pub fn setup_future_publishing<T>(&mut self) -> Result<&mut Self, WiringError>
    where
        T: TopicState,
        D: FuturePublisher<T>,
    {
        self.registry
            .register_publisher::<T>(self.detector, EdgeKind::Delayed)?;
        Ok(self)
    }

    /// Declare that the detector schedules `T` through a timeout service.
    pub fn setup_timeout_publishing<T>(&mut self) -> Result<&mut Self, WiringError>
    where
        T: TopicState,
        D: TimeoutPublisher<T>,
    {
        self.registry
            .register_publisher::<T>(self.detector, EdgeKind::Delayed)?;
        Ok(self)
    }

    pub(crate) fn register_delayed<T: TopicState>(&mut self) -> Result<TopicId, WiringError> {
        self.registry
            .register_publisher::<T>(self.detector, EdgeKind::Delayed)
    }

    pub(crate) fn install_lag_hooks(&mut self, hooks: LagHooks) {
        self.lag = Some(hooks);
    }

    /// Turn the declarations into the detector's graph slot.
    pub(crate) fn finish(self, instance: D) -> DetectorSlot {
        DetectorSlot {
            id: self.detector,
            instance: Box::new(instance),
            subscriptions: self.subscriptions,
            complete: complete_erased::<D>,
            lag: self.lag,
            pending_completion: false,
        }
    }
}

/// A type-erased detector owned by the graph, with its dispatch table.
pub(crate) struct DetectorSlot {
    id: DetectorId,
    instance: Box<dyn Any>,
    subscriptions: SmallVec<[Subscription; 4]>,
    complete: CompleteFn,
    lag: Option<LagHooks>,
    /// Set by `evaluate`, consumed by `complete`.
    pending_completion: bool,
}

impl DetectorSlot {
    pub(crate) fn id(&self) -> DetectorId {
        self.id
    }

    /// Deliver the new value of `topic`. Returns false if not subscribed.
    pub(crate) fn evaluate(
        &mut self,
        topic: TopicId,
        value: &dyn Any,
        registry: &TopicRegistry,
        outbox: &mut Outbox,
    ) -> bool {
        let Some(subscription) = self.subscriptions.iter().find(|s| s.topic == topic).copied() else {
            return false;
        };
        (subscription.evaluate)(self.id, self.instance.as_mut(), value, registry, outbox);
        self.pending_completion = true;
        true
    }

    /// Run `complete_evaluation` if anything was delivered this pass.
    pub(crate) fn complete(&mut self, registry: &TopicRegistry, outbox: &mut Outbox) -> bool {
        if !std::mem::take(&mut self.pending_completion) {
            return false;
        }
        (self.complete)(self.id, self.instance.as_mut(), registry, outbox);
        true
    }

    pub(crate) fn reset(&mut self) {
        self.pending_completion = false;
    }

    pub(crate) fn lag_armed(&self) -> bool {
        self.lag
            .is_some_and(|hooks| (hooks.armed)(self.instance.as_ref()))
    }

    pub(crate) fn take_lagged(&mut self) -> Option<PendingInput> {
        let hooks = self.lag?;
        (hooks.take)(self.instance.as_mut())
    }

    pub(crate) fn instance<D: Detector>(&self) -> Option<&D> {
        self.instance.downcast_ref::<D>()
    }

    #[cfg(test)]
    pub(crate) fn subscribed_topics(&self) -> impl Iterator<Item = TopicId> + '_ {
        self.subscriptions.iter().map(|s| s.topic)
    }
}
