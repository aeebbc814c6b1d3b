//! One-Pass Delay
//!
//! [`Lag<T>`] is the only legal way to feed a value back into the graph. It
//! subscribes to `T` and republishes the value as [`Lagged<T>`], a distinct
//! topic, at the start of the following pass.
//!
//! ```text
//!   pass N:    ... -> T -> Lag<T>          (captured, lag armed)
//!   pass N+1:  Lagged<T> -> ... -> input   (delivered before the input)
//! ```
//!
//! Because `Lagged<T>` is published through a delayed edge, it does not
//! constrain the evaluation order. A detector may therefore publish `T`
//! and subscribe to `Lagged<T>` without forming a cycle.

use std::any::Any;
use std::fmt;

use crate::detector::{Context, Detector, LagHooks, Subscriber, Wiring};
use crate::error::WiringError;
use crate::input_queue::PendingInput;
use crate::topic::TopicState;

/// The value of `T` as it stood at the end of the previous pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lagged<T> {
    pub data: T,
}

impl<T> Lagged<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Capture state of a lag between passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LagState<T> {
    /// Nothing captured since the last delivery.
    Unarmed,
    /// Holds the value to deliver at the start of the next pass.
    Armed(T),
}

/// Detector delaying `T` by exactly one pass.
pub struct Lag<T> {
    latest: Option<T>,
    state: LagState<T>,
}

impl<T: TopicState> Lag<T> {
    pub fn new() -> Self {
        Self {
            latest: None,
            state: LagState::Unarmed,
        }
    }

    pub fn state(&self) -> &LagState<T> {
        &self.state
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, LagState::Armed(_))
    }

    fn take(&mut self) -> Option<T> {
        match std::mem::replace(&mut self.state, LagState::Unarmed) {
            LagState::Armed(value) => Some(value),
            LagState::Unarmed => None,
        }
    }
}

impl<T: TopicState> Default for Lag<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Lag<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lag")
            .field("armed", &matches!(self.state, LagState::Armed(_)))
            .finish()
    }
}

impl<T: TopicState> Detector for Lag<T> {
    fn wire(wiring: &mut Wiring<'_, Self>) -> Result<(), WiringError> {
        wiring.subscribe::<T>()?;
        wiring.setup_lagged_publishing()?;
        Ok(())
    }

    fn complete_evaluation(&mut self, _ctx: &mut Context<'_, Self>) {
        if let Some(value) = self.latest.take() {
            self.state = LagState::Armed(value);
        }
    }
}

impl<T: TopicState> Subscriber<T> for Lag<T> {
    fn evaluate(&mut self, value: &T, _ctx: &mut Context<'_, Self>) {
        self.latest = Some(value.clone());
    }
}

impl<T: TopicState> Wiring<'_, Lag<T>> {
    /// Declare the delayed `Lagged<T>` output and hand the graph the hooks
    /// it drains the lag through.
    fn setup_lagged_publishing(&mut self) -> Result<&mut Self, WiringError> {
        self.register_delayed::<Lagged<T>>()?;
        self.install_lag_hooks(LagHooks {
            armed: lag_armed::<T>,
            take: take_lagged::<T>,
        });
        Ok(self)
    }
}

fn lag_armed<T: TopicState>(instance: &dyn Any) -> bool {
    instance
        .downcast_ref::<Lag<T>>()
        .is_some_and(Lag::is_armed)
}

fn take_lagged<T: TopicState>(instance: &mut dyn Any) -> Option<PendingInput> {
    let lag = instance.downcast_mut::<Lag<T>>()?;
    lag.take().map(|data| PendingInput::new(Lagged { data }))
}
