//! Graph Configuration
//!
//! Runtime knobs for a [`Graph`](crate::graph::Graph). Every field has a
//! default, so a configuration file only needs to name what it changes:
//!
//! ```json
//! { "name": "vending", "max_pending_inputs": 32 }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// Default bound on consecutive lag-only follow-up passes.
pub const DEFAULT_MAX_FEEDBACK_PASSES: usize = 64;

/// Configuration of one graph instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Label used in logs and diagnostics output.
    pub name: String,

    /// Upper bound on inputs waiting in the input queue. `None` is unbounded.
    pub max_pending_inputs: Option<usize>,

    /// Maximum number of consecutive passes driven only by lag feedback
    /// before evaluation reports [`GraphError::FeedbackLimit`].
    pub max_feedback_passes: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            name: "graph".to_string(),
            max_pending_inputs: None,
            max_feedback_passes: DEFAULT_MAX_FEEDBACK_PASSES,
        }
    }
}

impl GraphConfig {
    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set the graph's label.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Bound the input queue.
    pub fn with_max_pending_inputs(mut self, capacity: usize) -> Self {
        self.max_pending_inputs = Some(capacity);
        self
    }

    /// Bound consecutive lag-only passes.
    pub fn with_max_feedback_passes(mut self, passes: usize) -> Self {
        self.max_feedback_passes = passes;
        self
    }
}
