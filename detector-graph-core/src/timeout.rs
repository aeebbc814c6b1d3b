//! Timeout Publishing
//!
//! A timeout service turns the passage of time into graph input. Detectors
//! that implement [`TimeoutPublisher<T>`](crate::TimeoutPublisher) and wire
//! `setup_timeout_publishing::<T>()` schedule a topic value with a delay
//! through their [`Context`](crate::Context); when the application's clock
//! reaches the due time, the value is submitted to the graph's input queue
//! exactly like any external input.
//!
//! The service owns no thread and no clock. The embedding application calls
//! [`TimeoutPublisherService::tick`] (or [`TimeoutPublisherService::fire_due`]
//! followed by its own evaluation) with its notion of "now".
//!
//! ```rust,ignore
//! impl Subscriber<DoorOpened> for DoorMonitor {
//!     fn evaluate(&mut self, _value: &DoorOpened, ctx: &mut Context<'_, Self>) {
//!         self.pending = ctx.schedule_timeout(&self.timeouts, DoorOpenTooLong, 5);
//!     }
//! }
//!
//! timeouts.tick(4, &mut graph)?; // nothing
//! timeouts.tick(5, &mut graph)?; // DoorOpenTooLong evaluated once
//! ```

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::error::GraphError;
use crate::graph::Graph;
use crate::input_queue::{GraphInputQueue, PendingInput};
use crate::topic::TopicState;

/// Point in time, in units chosen by the embedding application.
pub type TimeOffset = u64;

/// Identifies one scheduled timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeoutHandle(u64);

impl TimeoutHandle {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

struct ScheduledTimeout {
    due: TimeOffset,
    period: Option<TimeOffset>,
    make: Box<dyn Fn() -> PendingInput + Send>,
}

#[derive(Default)]
struct TimerTable {
    now: TimeOffset,
    next_handle: u64,
    timers: IndexMap<TimeoutHandle, ScheduledTimeout>,
}

impl TimerTable {
    fn insert(&mut self, timer: ScheduledTimeout) -> TimeoutHandle {
        let handle = TimeoutHandle(self.next_handle);
        self.next_handle += 1;
        self.timers.insert(handle, timer);
        handle
    }

    /// Handles due at `now`, ordered by due time, then by scheduling order.
    fn due(&self, now: TimeOffset) -> Vec<TimeoutHandle> {
        let mut ready: Vec<(TimeOffset, TimeoutHandle)> = self
            .timers
            .iter()
            .filter(|(_, timer)| timer.due <= now)
            .map(|(handle, timer)| (timer.due, *handle))
            .collect();
        ready.sort_unstable();
        ready.into_iter().map(|(_, handle)| handle).collect()
    }

    /// Retire a timer whose value was accepted: remove a one-shot timer,
    /// move a periodic one to its next deadline after `now`.
    ///
    /// Missed periods collapse into the firing that just happened. A
    /// periodic timer whose next deadline does not fit in `TimeOffset` is
    /// removed.
    fn retire(&mut self, handle: TimeoutHandle, now: TimeOffset) {
        let Some(timer) = self.timers.get_mut(&handle) else {
            return;
        };
        let next = timer.period.and_then(|period| {
            let missed = now.saturating_sub(timer.due) / period;
            missed
                .checked_add(1)?
                .checked_mul(period)?
                .checked_add(timer.due)
        });
        match next {
            Some(due) => timer.due = due,
            None => {
                if timer.period.is_some() {
                    tracing::debug!(handle = handle.0, "periodic timeout past the end of time");
                }
                self.timers.shift_remove(&handle);
            }
        }
    }
}

/// Schedules deferred graph input driven by an external clock.
#[derive(Clone)]
pub struct TimeoutPublisherService {
    table: Arc<Mutex<TimerTable>>,
    queue: GraphInputQueue,
}

impl TimeoutPublisherService {
    /// Create a service feeding `queue`, with its clock at zero.
    pub fn new(queue: GraphInputQueue) -> Self {
        Self {
            table: Arc::new(Mutex::new(TimerTable::default())),
            queue,
        }
    }

    /// Create a service feeding `graph`'s input queue.
    pub fn for_graph(graph: &Graph) -> Self {
        Self::new(graph.input_queue())
    }

    /// The latest time passed to [`fire_due`](Self::fire_due).
    pub fn now(&self) -> TimeOffset {
        self.table.lock().now
    }

    /// Publish `value` once, `delay` after the current time.
    ///
    /// Detectors go through [`Context::schedule_timeout`](crate::Context::schedule_timeout).
    pub(crate) fn schedule_timeout<T: TopicState>(&self, value: T, delay: TimeOffset) -> TimeoutHandle {
        let mut table = self.table.lock();
        let due = table.now.saturating_add(delay);
        let handle = table.insert(ScheduledTimeout {
            due,
            period: None,
            make: Box::new(move || PendingInput::new(value.clone())),
        });
        tracing::debug!(handle = handle.0, due, "timeout scheduled");
        handle
    }

    /// Publish `value` every `period` until cancelled.
    ///
    /// A period of zero is treated as one.
    pub(crate) fn schedule_periodic<T: TopicState>(&self, value: T, period: TimeOffset) -> TimeoutHandle {
        let period = period.max(1);
        let mut table = self.table.lock();
        let due = table.now.saturating_add(period);
        let handle = table.insert(ScheduledTimeout {
            due,
            period: Some(period),
            make: Box::new(move || PendingInput::new(value.clone())),
        });
        tracing::debug!(handle = handle.0, due, period, "periodic timeout scheduled");
        handle
    }

    /// Cancel a timeout. Returns whether it was still pending.
    ///
    /// Cancelling a fired, cancelled or unknown handle does nothing.
    pub fn cancel(&self, handle: TimeoutHandle) -> bool {
        let removed = self.table.lock().timers.shift_remove(&handle).is_some();
        if removed {
            tracing::debug!(handle = handle.0, "timeout cancelled");
        } else {
            tracing::trace!(handle = handle.0, "cancel of inactive timeout ignored");
        }
        removed
    }

    pub fn is_pending(&self, handle: TimeoutHandle) -> bool {
        self.table.lock().timers.contains_key(&handle)
    }

    pub fn pending_count(&self) -> usize {
        self.table.lock().timers.len()
    }

    /// Earliest due time among pending timeouts.
    pub fn next_deadline(&self) -> Option<TimeOffset> {
        self.table.lock().timers.values().map(|timer| timer.due).min()
    }

    /// Advance the clock to `now` and submit every due value to the input
    /// queue. Returns how many values were submitted.
    ///
    /// The clock never moves backwards. A timer leaves the table (or moves
    /// to its next period) only once its value has been accepted.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::InputQueueFull` if the queue rejects a value.
    /// That timer and every later one stay pending and are retried by the
    /// next call.
    pub fn fire_due(&self, now: TimeOffset) -> Result<usize, GraphError> {
        // Lock order: timer table, then input queue.
        let mut table = self.table.lock();
        table.now = table.now.max(now);
        let now = table.now;

        let mut fired = 0;
        for handle in table.due(now) {
            let Some(timer) = table.timers.get(&handle) else {
                continue;
            };
            let input = (timer.make)();
            let topic = input.type_name();
            self.queue.submit_pending(input)?;
            tracing::debug!(handle = handle.0, topic, "timeout fired");
            table.retire(handle, now);
            fired += 1;
        }
        Ok(fired)
    }

    /// Fire due timeouts and evaluate `graph` until it settles. Returns the
    /// number of passes run.
    pub fn tick(&self, now: TimeOffset, graph: &mut Graph) -> Result<usize, GraphError> {
        self.fire_due(now)?;
        graph.evaluate_pending()
    }
}

impl fmt::Debug for TimeoutPublisherService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table.lock();
        f.debug_struct("TimeoutPublisherService")
            .field("now", &table.now)
            .field("pending", &table.timers.len())
            .finish_non_exhaustive()
    }
}
