//! Topics
//!
//! A topic is a typed, single-slot broadcast cell. It holds the latest value
//! published for its payload type and a flag telling whether that value was
//! published during the most recent evaluation pass.
//!
//! # Identity
//!
//! Topics are identified by the Rust type of their payload. Each graph owns
//! exactly one `Topic<T>` per payload type `T`, created lazily the first time
//! a detector (or the application) references it. Nothing is global: two
//! graphs never share a topic.
//!
//! # Observation
//!
//! After a pass settles, the application may inspect any topic through
//! [`Topic::has_new_value`] and [`Topic::new_value`]. Detectors never read
//! topics this way; they receive values through their subscriptions.

mod registry;

pub use registry::{DetectorInfo, EdgeKind, TopicInfo, TopicRegistry};

use std::any::Any;

/// Payload contract for values carried by a topic.
///
/// Any cloneable, sendable, owned type qualifies. Published values are
/// logically immutable snapshots; large payloads that should be shared
/// between passes belong behind an `Arc`.
pub trait TopicState: Clone + Send + 'static {}

impl<T> TopicState for T where T: Clone + Send + 'static {}

/// Identifier of a topic within one graph's registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicId(usize);

impl TopicId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Position of the topic in registration order.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A typed single-slot broadcast cell.
#[derive(Debug)]
pub struct Topic<T> {
    id: TopicId,
    value: Option<T>,
    has_new_value: bool,
}

impl<T: TopicState> Topic<T> {
    pub(crate) fn new(id: TopicId) -> Self {
        Self {
            id,
            value: None,
            has_new_value: false,
        }
    }

    /// Get the topic's identifier.
    pub fn id(&self) -> TopicId {
        self.id
    }

    /// Whether a value was published during the latest pass.
    pub fn has_new_value(&self) -> bool {
        self.has_new_value
    }

    /// The value published during the latest pass, if any.
    pub fn new_value(&self) -> Option<&T> {
        if self.has_new_value {
            self.value.as_ref()
        } else {
            None
        }
    }

    /// The most recently published value, regardless of when it arrived.
    pub fn current_value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Store a new value. A second publish within the same pass overwrites
    /// the first.
    pub(crate) fn publish(&mut self, value: T) {
        self.value = Some(value);
        self.has_new_value = true;
    }
}

/// Type-erased view of a topic used by the registry and the graph.
pub(crate) trait AnyTopic: Any {
    fn as_any(&self) -> &dyn Any;

    fn has_new_value(&self) -> bool;

    fn clear_new_value(&mut self);

    /// Publish a boxed payload. Returns the payload back on type mismatch.
    fn publish_boxed(&mut self, value: Box<dyn Any + Send>) -> Result<(), Box<dyn Any + Send>>;
}

impl<T: TopicState> AnyTopic for Topic<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn has_new_value(&self) -> bool {
        self.has_new_value
    }

    fn clear_new_value(&mut self) {
        self.has_new_value = false;
    }

    fn publish_boxed(&mut self, value: Box<dyn Any + Send>) -> Result<(), Box<dyn Any + Send>> {
        let value = value.downcast::<T>()?;
        self.publish(*value);
        Ok(())
    }
}

/// Strip module paths from a type name, keeping generic structure.
///
/// `my_app::topics::Lagged<my_app::Sale>` becomes `Lagged<Sale>`.
pub(crate) fn short_type_name(full: &str) -> String {
    fn last_segment(path: &str) -> &str {
        path.rsplit("::").next().unwrap_or(path)
    }

    let mut out = String::with_capacity(full.len());
    let mut start = 0;
    for (index, ch) in full.char_indices() {
        if matches!(ch, '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | ';' | '&') {
            out.push_str(last_segment(&full[start..index]));
            out.push(ch);
            start = index + ch.len_utf8();
        }
    }
    out.push_str(last_segment(&full[start..]));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_topic_has_no_value() {
        let topic: Topic<u32> = Topic::new(TopicId::new(0));
        assert!(!topic.has_new_value());
        assert!(topic.new_value().is_none());
        assert!(topic.current_value().is_none());
    }

    #[test]
    fn last_publish_wins() {
        let mut topic = Topic::new(TopicId::new(3));
        topic.publish(1);
        topic.publish(2);
        assert_eq!(topic.new_value(), Some(&2));
        assert_eq!(topic.id().index(), 3);
    }

    #[test]
    fn cleared_topic_keeps_current_value() {
        let mut topic = Topic::new(TopicId::new(0));
        topic.publish("on".to_string());
        topic.clear_new_value();

        assert!(!topic.has_new_value());
        assert!(topic.new_value().is_none());
        assert_eq!(topic.current_value().map(String::as_str), Some("on"));
    }

    #[test]
    fn boxed_publish_rejects_wrong_type() {
        let mut topic: Topic<u8> = Topic::new(TopicId::new(0));
        assert!(topic.publish_boxed(Box::new("nope")).is_err());
        assert!(topic.publish_boxed(Box::new(7u8)).is_ok());
        assert_eq!(topic.new_value(), Some(&7));
    }

    #[test]
    fn short_names_drop_module_paths() {
        assert_eq!(short_type_name("u32"), "u32");
        assert_eq!(short_type_name("app::topics::Coin"), "Coin");
        assert_eq!(
            short_type_name("detector_graph_core::lag::Lagged<app::Sale>"),
            "Lagged<Sale>"
        );
        assert_eq!(
            short_type_name("core::option::Option<(a::B, c::D)>"),
            "Option<(B, D)>"
        );
    }
}
