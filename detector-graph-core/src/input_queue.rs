//! Graph Input Queue
//!
//! External stimuli reach a graph one at a time. The queue buffers inputs in
//! submission order; the graph removes exactly one per pass and runs that
//! pass to its fixed point before looking at the next.
//!
//! # Reentrancy
//!
//! Submitting while a pass is running never evaluates anything inline. The
//! queue only stores values; the graph removes one between passes, so a
//! value submitted mid-pass waits behind the inputs already queued and is
//! processed by a later pass. This is what makes it safe for detector logic
//! (or a timeout service) to feed the graph it is running in.
//!
//! The graph marks the queue while a pass runs. The mark is observational:
//! it backs [`GraphInputQueue::is_evaluating`] and a trace event, and has no
//! effect on where a submitted value goes.
//!
//! # Sharing
//!
//! The queue is a cheap cloneable handle. Clones may be held by detectors or
//! by other threads that only enqueue; evaluation stays with the graph owner.

use std::any::{Any, TypeId};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::GraphError;
use crate::topic::TopicState;

/// A type-erased value waiting to be published into a topic.
pub struct PendingInput {
    type_id: TypeId,
    type_name: &'static str,
    value: Box<dyn Any + Send>,
}

impl PendingInput {
    /// Wrap a topic value.
    pub fn new<T: TopicState>(value: T) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            value: Box::new(value),
        }
    }

    /// Type identity of the payload, which is also its topic identity.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Full type name of the payload.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Recover the typed payload.
    pub fn downcast<T: TopicState>(self) -> Result<T, Self> {
        let Self {
            type_id,
            type_name,
            value,
        } = self;
        match value.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(value) => Err(Self {
                type_id,
                type_name,
                value,
            }),
        }
    }

    pub(crate) fn into_value(self) -> Box<dyn Any + Send> {
        self.value
    }
}

impl fmt::Debug for PendingInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingInput")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<PendingInput>,
    capacity: Option<usize>,
    evaluating: bool,
}

/// FIFO of inputs waiting for their own evaluation pass.
#[derive(Clone, Default)]
pub struct GraphInputQueue {
    shared: Arc<Mutex<QueueState>>,
}

impl GraphInputQueue {
    /// Create an unbounded queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a queue holding at most `capacity` inputs, or unbounded.
    pub fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            shared: Arc::new(Mutex::new(QueueState {
                capacity,
                ..QueueState::default()
            })),
        }
    }

    /// Append `value` behind every input already waiting.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::InputQueueFull` when a bounded queue is full.
    pub fn submit<T: TopicState>(&self, value: T) -> Result<(), GraphError> {
        self.submit_pending(PendingInput::new(value))
    }

    /// Append an already type-erased input.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::InputQueueFull` when a bounded queue is full.
    pub fn submit_pending(&self, input: PendingInput) -> Result<(), GraphError> {
        let mut state = self.shared.lock();
        if let Some(capacity) = state.capacity {
            if state.pending.len() >= capacity {
                return Err(GraphError::InputQueueFull { capacity });
            }
        }
        if state.evaluating {
            tracing::trace!(topic = input.type_name(), "pass in progress; input deferred");
        }
        state.pending.push_back(input);
        Ok(())
    }

    /// Number of inputs waiting.
    pub fn len(&self) -> usize {
        self.shared.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.lock().pending.is_empty()
    }

    /// Whether the owning graph is in the middle of a pass.
    ///
    /// Informational only; submissions behave the same either way.
    pub fn is_evaluating(&self) -> bool {
        self.shared.lock().evaluating
    }

    pub(crate) fn pop_front(&self) -> Option<PendingInput> {
        self.shared.lock().pending.pop_front()
    }

    pub(crate) fn set_evaluating(&self, evaluating: bool) {
        self.shared.lock().evaluating = evaluating;
    }
}

impl fmt::Debug for GraphInputQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("GraphInputQueue")
            .field("pending", &state.pending.len())
            .field("capacity", &state.capacity)
            .field("evaluating", &state.evaluating)
            .finish()
    }
}
