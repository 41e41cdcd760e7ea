//! The per-event record shared by all stages during one pipeline pass.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mutable state for a single event.
///
/// Stages read and write named collections. The record is created fresh for
/// each input event, handed to every stage in pipeline order, and dropped once
/// the skim decision has been applied. Collections are kept in a `BTreeMap` so
/// that serialization is byte-for-byte deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Zero-based position of the event in the concatenated input stream.
    #[serde(default)]
    pub index: u64,

    /// Named collections produced by the input or by earlier stages.
    #[serde(default)]
    pub collections: BTreeMap<String, serde_json::Value>,
}

impl EventRecord {
    /// Creates an empty record.
    #[must_use]
    pub fn new(index: u64) -> Self {
        Self {
            index,
            collections: BTreeMap::new(),
        }
    }

    /// Adds a collection, builder-style.
    #[must_use]
    pub fn with_collection(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.collections.insert(name.into(), value);
        self
    }

    /// Gets a collection.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.collections.get(name)
    }

    /// Gets a collection mutably.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut serde_json::Value> {
        self.collections.get_mut(name)
    }

    /// Inserts or replaces a collection, returning the previous value.
    pub fn put(
        &mut self,
        name: impl Into<String>,
        value: serde_json::Value,
    ) -> Option<serde_json::Value> {
        self.collections.insert(name.into(), value)
    }

    /// Appends to an array collection, creating it if absent.
    ///
    /// A non-array value under `name` is replaced by a one-element array
    /// holding the previous value followed by `item`.
    pub fn append(&mut self, name: &str, item: serde_json::Value) {
        let slot = self
            .collections
            .entry(name.to_string())
            .or_insert_with(|| serde_json::Value::Array(Vec::new()));
        match slot {
            serde_json::Value::Array(items) => items.push(item),
            other => {
                let previous = std::mem::take(other);
                *other = serde_json::Value::Array(vec![previous, item]);
            }
        }
    }

    /// Checks if a collection exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    /// Returns the collection names in sorted order.
    #[must_use]
    pub fn collection_names(&self) -> Vec<&str> {
        self.collections.keys().map(String::as_str).collect()
    }
}
