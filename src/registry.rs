// SPDX-License-Identifier: MIT

//! Capability contract and factory registry
//!
//! The engine never knows what a node *does*; it calls the [`Capability`]
//! contract and nothing else. Concrete capabilities (LLM agents, script
//! verifiers, extractors) live outside this crate and are registered
//! explicitly at process startup, one factory per node type. The registry is
//! read-only once built, so concurrent runs share one `Arc` without locking.

use crate::error::BoxError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// A unit of work bound to one node of the graph.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Execute against the current run state and produce this node's output.
    /// May block on network or subprocess I/O of unbounded duration.
    async fn execute(&self, state: &Map<String, Value>) -> Result<Value, BoxError>;

    /// Check this instance's config; each problem becomes a validation issue.
    fn validate_config(&self) -> Vec<String> {
        Vec::new()
    }
}

impl std::fmt::Debug for dyn Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Capability")
    }
}

/// Builds capability instances for nodes of one registered type.
pub trait CapabilityFactory: Send + Sync {
    fn create(
        &self,
        node_id: &str,
        config: &Map<String, Value>,
    ) -> Result<Arc<dyn Capability>, BoxError>;

    /// Whether nodes of this type act as decision points, the property the
    /// loop classifier uses to tell a controlled loop from an infinite one.
    fn is_decision(&self) -> bool {
        false
    }
}

/// Explicit, constructed-at-startup lookup table of node types.
#[derive(Default)]
pub struct CapabilityRegistry {
    factories: HashMap<String, Arc<dyn CapabilityFactory>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a factory under a node-type key. Re-registering overwrites.
    pub fn register(&mut self, node_type: &str, factory: Arc<dyn CapabilityFactory>) {
        self.factories.insert(node_type.to_string(), factory);
    }

    pub fn is_registered(&self, node_type: &str) -> bool {
        self.factories.contains_key(node_type)
    }

    pub fn is_decision_type(&self, node_type: &str) -> bool {
        self.factories
            .get(node_type)
            .map(|f| f.is_decision())
            .unwrap_or(false)
    }

    /// Instantiate a capability for one node.
    pub fn create(
        &self,
        node_id: &str,
        node_type: &str,
        config: &Map<String, Value>,
    ) -> Result<Arc<dyn Capability>, BoxError> {
        let factory = self
            .factories
            .get(node_type)
            .ok_or_else(|| format!("node type '{}' is not registered", node_type))?;
        factory.create(node_id, config)
    }

    pub fn registered_types(&self) -> impl Iterator<Item = &String> {
        self.factories.keys()
    }
}
