//! Processor Containers
//!
//! Applications usually wrap a graph in a struct that also keeps the
//! handles it reports from. [`ProcessorContainer`] gives such a wrapper the
//! input loop: every input is evaluated to completion, and
//! [`ProcessorContainer::process_output`] runs after each pass so the
//! wrapper can inspect topics while their "new value" flags still hold.
//!
//! ```rust,ignore
//! struct Thermostat {
//!     graph: Graph,
//!     commands: Vec<HeaterCommand>,
//! }
//!
//! impl ProcessorContainer for Thermostat {
//!     fn graph(&self) -> &Graph { &self.graph }
//!     fn graph_mut(&mut self) -> &mut Graph { &mut self.graph }
//!
//!     fn process_output(&mut self) {
//!         if let Some(cmd) = self.graph.topic::<HeaterCommand>().and_then(Topic::new_value) {
//!             self.commands.push(cmd.clone());
//!         }
//!     }
//! }
//! ```

use crate::error::GraphError;
use crate::graph::Graph;
use crate::timeout::{TimeOffset, TimeoutPublisherService};
use crate::topic::TopicState;

/// An owner of a graph that reacts to the output of every pass.
pub trait ProcessorContainer {
    fn graph(&self) -> &Graph;

    fn graph_mut(&mut self) -> &mut Graph;

    /// Called after every pass.
    fn process_output(&mut self) {}

    /// Queue `value` and evaluate until the graph settles, calling
    /// `process_output` after each pass. Returns the number of passes.
    fn process_data<T: TopicState>(&mut self, value: T) -> Result<usize, GraphError>
    where
        Self: Sized,
    {
        self.graph_mut().push_data(value)?;
        self.process_pending()
    }

    /// Evaluate everything already pending.
    fn process_pending(&mut self) -> Result<usize, GraphError> {
        let mut passes = 0;
        while self.graph_mut().evaluate_graph()? {
            passes += 1;
            self.process_output();
        }
        Ok(passes)
    }

    /// Fire the timeouts due at `now` and evaluate them.
    fn process_timeouts(
        &mut self,
        timeouts: &TimeoutPublisherService,
        now: TimeOffset,
    ) -> Result<usize, GraphError> {
        timeouts.fire_due(now)?;
        self.process_pending()
    }
}
