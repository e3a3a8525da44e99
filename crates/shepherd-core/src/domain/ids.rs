//! Strongly-typed identifiers for external resources.
//!
//! Message ids come from the queue and task references from the cluster
//! scheduler; both are opaque strings. `Id<T>` keeps them from being mixed up
//! at compile time while staying a plain `String` at runtime.

use std::borrow::Borrow;
use std::fmt;
use std::marker::PhantomData;

/// Marker trait naming the kind of resource an `Id<T>` refers to.
pub trait IdMarker: Send + Sync + 'static {
    /// Short label used by `Debug`.
    fn label() -> &'static str;
}

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id<T: IdMarker> {
    value: String,
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _marker: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn into_string(self) -> String {
        self.value
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl<T: IdMarker> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", T::label(), self.value)
    }
}

impl<T: IdMarker> From<&str> for Id<T> {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl<T: IdMarker> From<String> for Id<T> {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl<T: IdMarker> Borrow<str> for Id<T> {
    fn borrow(&self) -> &str {
        &self.value
    }
}

/// Marker for queue messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Message {}

impl IdMarker for Message {
    fn label() -> &'static str {
        "MessageId"
    }
}

/// Marker for cluster tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl IdMarker for Task {
    fn label() -> &'static str {
        "TaskRef"
    }
}

/// Identifier of a work item, stable across redeliveries.
pub type MessageId = Id<Message>;

/// Reference to a task started on the cluster.
pub type TaskRef = Id<Task>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn debug_names_the_resource_kind() {
        let id = MessageId::new("m-1");
        let task = TaskRef::new("arn:task/1");
        assert_eq!(format!("{id:?}"), "MessageId(m-1)");
        assert_eq!(format!("{task:?}"), "TaskRef(arn:task/1)");
        assert_eq!(task.to_string(), "arn:task/1");
    }

    #[test]
    fn map_lookup_by_str() {
        let mut map = HashMap::new();
        map.insert(MessageId::new("m-1"), 1);
        assert_eq!(map.get("m-1"), Some(&1));
    }
}
