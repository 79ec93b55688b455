//! Entity state cache.
//!
//! [`EntityStore`] is the dashboard's authoritative copy of hub entity state.
//! Records are merged, never replaced: attributes are merged key-wise and
//! top-level fields absent from an update keep their previous value. Records
//! are never deleted.
//!
//! # Concurrency design
//!
//! The store is a `DashMap` keyed by entity id. A merge happens while holding
//! the entry's shard write lock, so readers see either the old or the new
//! record, never a partial merge. The event router is the only writer.

use std::collections::HashMap;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{Map, Value};

// ─────────────────────────────────────────────────────────────────────────────
// Entity Record
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level keys parsed into dedicated fields.
const KNOWN_FIELDS: [&str; 5] = [
    "entity_id",
    "state",
    "attributes",
    "last_changed",
    "last_updated",
];

/// A single hub entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntityRecord {
    pub entity_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub attributes: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_changed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    /// Other top-level fields from the hub (e.g. `context`).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EntityRecord {
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            ..Default::default()
        }
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Parses a hub entity object.
    ///
    /// Returns `None` unless the value is an object with a non-empty string
    /// `entity_id`. Non-string scalar states are stringified.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let entity_id = obj.get("entity_id")?.as_str()?;
        if entity_id.is_empty() {
            return None;
        }

        let state = match obj.get("state") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Null) | None => None,
            Some(Value::Bool(b)) => Some(b.to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(other) => Some(other.to_string()),
        };

        let attributes = obj
            .get("attributes")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let timestamp = |key: &str| obj.get(key).and_then(Value::as_str).map(str::to_string);

        let extra = obj
            .iter()
            .filter(|(k, _)| !KNOWN_FIELDS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Some(Self {
            entity_id: entity_id.to_string(),
            state,
            attributes,
            last_changed: timestamp("last_changed"),
            last_updated: timestamp("last_updated"),
            extra,
        })
    }

    /// Merges `update` into this record.
    ///
    /// Attributes merge key-wise; fields absent from the update are kept.
    pub fn merge(&mut self, update: EntityRecord) {
        if update.state.is_some() {
            self.state = update.state;
        }
        if update.last_changed.is_some() {
            self.last_changed = update.last_changed;
        }
        if update.last_updated.is_some() {
            self.last_updated = update.last_updated;
        }
        self.attributes.extend(update.attributes);
        self.extra.extend(update.extra);
    }

    /// Returns an attribute as a string slice.
    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    /// Returns an attribute as a float.
    pub fn attr_f64(&self, key: &str) -> Option<f64> {
        self.attributes.get(key).and_then(Value::as_f64)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Entity Store
// ─────────────────────────────────────────────────────────────────────────────

/// Concurrent entity id → record map with merge semantics.
#[derive(Default)]
pub struct EntityStore {
    entities: DashMap<String, EntityRecord>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges `record` into the store.
    ///
    /// Returns `false` (and changes nothing) if the record has no id.
    pub fn update(&self, record: EntityRecord) -> bool {
        if record.entity_id.is_empty() {
            return false;
        }
        match self.entities.entry(record.entity_id.clone()) {
            Entry::Occupied(mut entry) => entry.get_mut().merge(record),
            Entry::Vacant(entry) => {
                entry.insert(record);
            }
        }
        true
    }

    /// Parses and merges a hub entity object.
    ///
    /// Returns the entity id if the value was applied. Values without an id are
    /// ignored.
    pub fn update_from_value(&self, value: &Value) -> Option<String> {
        let record = EntityRecord::from_value(value)?;
        let entity_id = record.entity_id.clone();
        self.update(record).then_some(entity_id)
    }

    /// Merges `attributes` into an entity, creating the record if needed.
    pub fn merge_attributes(&self, entity_id: &str, attributes: Map<String, Value>) -> bool {
        let mut record = EntityRecord::new(entity_id);
        record.attributes = attributes;
        self.update(record)
    }

    /// Returns a copy of the current record.
    #[must_use]
    pub fn get(&self, entity_id: &str) -> Option<EntityRecord> {
        self.entities.get(entity_id).map(|r| r.value().clone())
    }

    /// Returns a copy of every record.
    #[must_use]
    pub fn get_all(&self) -> HashMap<String, EntityRecord> {
        self.entities
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Serializes the store as a JSON object keyed by entity id.
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .entities
            .iter()
            .filter_map(|r| {
                serde_json::to_value(r.value())
                    .ok()
                    .map(|v| (r.key().clone(), v))
            })
            .collect();
        Value::Object(map)
    }
}
