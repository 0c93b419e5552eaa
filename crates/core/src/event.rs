//! Events and model identity
//!
//! - Event: an immutable, externally ordered fact with a numeric id
//! - ModelId: name + version of a projection, which fixes its collection name
//! - Interests: the event types a model declares it cares about

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// =============================================================================
// Event
// =============================================================================

/// An event delivered to the projection engine
///
/// `id` is non-decreasing across the log but may recur on redelivery.
/// The payload is opaque to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Position of the event in the log
    pub id: u64,
    /// Event type name
    #[serde(rename = "type")]
    pub event_type: String,
    /// Opaque event body
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Event {
    /// Create an event
    pub fn new(id: u64, event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Event {
            id,
            event_type: event_type.into(),
            payload,
        }
    }

    /// Create an event with an empty object payload
    pub fn bare(id: u64, event_type: impl Into<String>) -> Self {
        Self::new(id, event_type, serde_json::Value::Object(Default::default()))
    }
}

// =============================================================================
// ModelId
// =============================================================================

/// Identity of a projection model
///
/// A model's materialized collection is named `<name>_v<version>`, so bumping
/// the version projects into a fresh collection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModelId {
    /// Model name
    pub name: String,
    /// Model version
    pub version: String,
}

impl ModelId {
    /// Create a model identity
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        ModelId {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Name of the collection backing this model
    pub fn collection_name(&self) -> String {
        format!("{}_v{}", self.name, self.version)
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_v{}", self.name, self.version)
    }
}

// =============================================================================
// Interests
// =============================================================================

/// Event types a model (or a whole store) wants delivered
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Interests {
    /// Every event type
    #[default]
    All,
    /// Only the listed event types
    Only(BTreeSet<String>),
}

impl Interests {
    /// Interests limited to the given event types
    ///
    /// An empty list means "no restriction" and yields [`Interests::All`].
    pub fn only<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = types.into_iter().map(Into::into).collect();
        if set.is_empty() {
            Interests::All
        } else {
            Interests::Only(set)
        }
    }

    /// True if an event of this type is of interest
    pub fn includes(&self, event_type: &str) -> bool {
        match self {
            Interests::All => true,
            Interests::Only(set) => set.contains(event_type),
        }
    }

    /// Union of two interest sets; `All` absorbs everything
    pub fn union(self, other: &Interests) -> Interests {
        match (self, other) {
            (Interests::All, _) | (_, Interests::All) => Interests::All,
            (Interests::Only(mut a), Interests::Only(b)) => {
                a.extend(b.iter().cloned());
                Interests::Only(a)
            }
        }
    }

    /// Sorted event types, empty for `All`
    pub fn event_types(&self) -> Vec<String> {
        match self {
            Interests::All => Vec::new(),
            Interests::Only(set) => set.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collection_name() {
        let id = ModelId::new("model_1", "1");
        assert_eq!(id.collection_name(), "model_1_v1");
        assert_eq!(id.to_string(), "model_1_v1");
    }

    #[test]
    fn test_event_serde_uses_type_key() {
        let event: Event = serde_json::from_value(json!({
            "id": 3,
            "type": "created",
            "payload": {"x": 1}
        }))
        .unwrap();
        assert_eq!(event.id, 3);
        assert_eq!(event.event_type, "created");

        let back = serde_json::to_value(&event).unwrap();
        assert_eq!(back["type"], json!("created"));
    }

    #[test]
    fn test_event_payload_defaults_to_null() {
        let event: Event = serde_json::from_value(json!({"id": 1, "type": "t"})).unwrap();
        assert!(event.payload.is_null());
    }

    #[test]
    fn test_interests_only_and_includes() {
        let interests = Interests::only(["event_3", "event_2"]);
        assert!(interests.includes("event_2"));
        assert!(!interests.includes("event_1"));
        assert_eq!(interests.event_types(), vec!["event_2", "event_3"]);

        assert_eq!(Interests::only(Vec::<String>::new()), Interests::All);
        assert!(Interests::All.includes("anything"));
    }

    #[test]
    fn test_interests_union() {
        let a = Interests::only(["event_3", "event_2"]);
        let b = Interests::only(["event_1", "event_2"]);
        let merged = a.union(&b);
        assert_eq!(merged.event_types(), vec!["event_1", "event_2", "event_3"]);

        let with_all = Interests::only(["x"]).union(&Interests::All);
        assert_eq!(with_all, Interests::All);
    }
}
