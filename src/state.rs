// SPDX-License-Identifier: MIT

//! Run-scoped state storage
//!
//! One `RunState` is exclusively owned by one executor invocation. Node
//! outputs are merged *namespaced* under the node's own id, so later
//! conditions can reference `node_id.field` without collisions.

use serde_json::{Map, Value};

/// Mutable key/value state for a single run.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    fields: Map<String, Value>,
}

impl RunState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self { fields: Map::new() }
    }

    /// Seed a state from an initial mapping.
    pub fn from_map(initial: Map<String, Value>) -> Self {
        Self { fields: initial }
    }

    /// Set a top-level field (used for seeding, e.g. the run id).
    pub fn insert(&mut self, key: &str, value: Value) {
        self.fields.insert(key.to_string(), value);
    }

    /// Merge a completed node's output under its own id.
    pub fn merge_node_output(&mut self, node_id: &str, output: Value) {
        self.fields.insert(node_id.to_string(), output);
    }

    /// Get a top-level field value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Get a nested value using dot notation (e.g. "triage.severity").
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.fields.get(parts.next()?)?;
        for part in parts {
            current = current.get(part)?;
        }
        Some(current)
    }

    /// Borrow the underlying map, the shape expression evaluation runs against.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Convert state to a JSON object.
    pub fn to_json(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }
}
