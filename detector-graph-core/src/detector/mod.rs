//! Detectors
//!
//! A detector is a pure evaluation node. It declares, when it is added to a
//! graph, which topics it reads and which it writes. The graph uses those
//! declarations to order detectors and to route new topic values to them.
//!
//! # Capabilities
//!
//! Capabilities are expressed as traits, one per payload type:
//!
//! - [`Subscriber<T>`] receives `T` through [`Subscriber::evaluate`].
//! - [`Publisher<T>`] may publish `T` within the current pass.
//! - [`FuturePublisher<T>`] may publish `T` into a later pass.
//! - [`TimeoutPublisher<T>`] may schedule `T` through a timeout service.
//!
//! A detector states which of its capabilities are wired in
//! [`Detector::wire`]:
//!
//! ```rust,ignore
//! impl Detector for Thermostat {
//!     fn wire(wiring: &mut Wiring<'_, Self>) -> Result<(), WiringError> {
//!         wiring
//!             .subscribe::<Temperature>()?
//!             .setup_publishing::<HeaterCommand>()?;
//!         Ok(())
//!     }
//!
//!     fn complete_evaluation(&mut self, ctx: &mut Context<'_, Self>) {
//!         ctx.publish(HeaterCommand { on: self.too_cold });
//!     }
//! }
//! ```
//!
//! # Evaluation
//!
//! During a pass, `evaluate` runs once for every subscribed topic that
//! received a new value, in topic order. `complete_evaluation` then runs
//! once, after all of the detector's `evaluate` calls for that pass.

mod context;
mod wiring;

pub use context::Context;
pub use wiring::Wiring;

pub(crate) use context::Outbox;
pub(crate) use wiring::{DetectorSlot, LagHooks};

use crate::error::WiringError;
use crate::topic::TopicState;

/// Identifier of a detector within one graph, in construction order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DetectorId(usize);

impl DetectorId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Position of the detector in construction order.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A node of the graph.
pub trait Detector: Sized + 'static {
    /// Declare subscriptions and publications.
    ///
    /// Called exactly once, when the detector is added to a graph.
    fn wire(wiring: &mut Wiring<'_, Self>) -> Result<(), WiringError>;

    /// Runs once per pass after every `evaluate` call of that pass.
    fn complete_evaluation(&mut self, _ctx: &mut Context<'_, Self>) {}
}

/// Capability to receive values of `T`.
pub trait Subscriber<T: TopicState>: Detector {
    /// Handle a new value of `T` published during the current pass.
    fn evaluate(&mut self, value: &T, ctx: &mut Context<'_, Self>);
}

/// Capability to publish `T` within the current pass.
pub trait Publisher<T: TopicState>: Detector {}

/// Capability to publish `T` into a future pass through the input queue.
pub trait FuturePublisher<T: TopicState>: Detector {}

/// Capability to publish `T` from a timeout service.
pub trait TimeoutPublisher<T: TopicState>: Detector {}
