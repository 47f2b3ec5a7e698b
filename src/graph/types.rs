// SPDX-License-Identifier: MIT

//! Graph definition types
//!
//! `NodeSpec` / `EdgeSpec` / `GraphDefinition` are the declarative form of a
//! workflow, the shape handed in from persistence and back out for
//! inspection. Structural invariants (unique ids, declared endpoints, no
//! self-loops) are enforced at construction, not just at validation, and the
//! serde path funnels through the same checked constructors so a
//! deserialized graph can never violate them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

use crate::error::GraphError;

/// Reserved edge target meaning "terminate the run".
pub const END: &str = "END";

/// Default iteration budget multiplier for graphs with controlled loops.
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// One declared unit of work in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawNodeSpec")]
pub struct NodeSpec {
    pub id: String,
    /// Key into the capability registry
    #[serde(rename = "type")]
    pub node_type: String,
    /// Opaque configuration handed to the capability at execution time
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub config: Map<String, Value>,
}

impl NodeSpec {
    pub fn new(
        id: impl Into<String>,
        node_type: impl Into<String>,
        config: Map<String, Value>,
    ) -> Result<Self, GraphError> {
        let id = id.into();
        let node_type = node_type.into();
        if id.is_empty() || node_type.is_empty() {
            return Err(GraphError::EmptyNodeField(if id.is_empty() {
                "<unnamed>".to_string()
            } else {
                id
            }));
        }
        Ok(Self {
            id,
            node_type,
            config,
        })
    }
}

#[derive(Deserialize)]
struct RawNodeSpec {
    id: String,
    #[serde(rename = "type")]
    node_type: String,
    #[serde(default)]
    config: Map<String, Value>,
}

impl TryFrom<RawNodeSpec> for NodeSpec {
    type Error = GraphError;

    fn try_from(raw: RawNodeSpec) -> Result<Self, GraphError> {
        NodeSpec::new(raw.id, raw.node_type, raw.config)
    }
}

/// A directed connection between two nodes, optionally guarded by a condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEdgeSpec")]
pub struct EdgeSpec {
    pub id: String,
    pub source: String,
    /// Target node id, or [`END`] to terminate the run
    pub target: String,
    /// Sandbox expression; the edge is followed when it evaluates truthy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl EdgeSpec {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Result<Self, GraphError> {
        let id = id.into();
        let source = source.into();
        let target = target.into();
        if id.is_empty() || source.is_empty() || target.is_empty() {
            return Err(GraphError::EmptyEdgeField(if id.is_empty() {
                "<unnamed>".to_string()
            } else {
                id
            }));
        }
        if source == target {
            return Err(GraphError::SelfLoop(id));
        }
        Ok(Self {
            id,
            source,
            target,
            condition: None,
        })
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn is_conditional(&self) -> bool {
        self.condition.is_some()
    }
}

#[derive(Deserialize)]
struct RawEdgeSpec {
    id: String,
    source: String,
    target: String,
    #[serde(default)]
    condition: Option<String>,
}

impl TryFrom<RawEdgeSpec> for EdgeSpec {
    type Error = GraphError;

    fn try_from(raw: RawEdgeSpec) -> Result<Self, GraphError> {
        let edge = EdgeSpec::new(raw.id, raw.source, raw.target)?;
        Ok(match raw.condition {
            Some(condition) => edge.with_condition(condition),
            None => edge,
        })
    }
}

/// The complete declarative definition of one workflow graph.
///
/// Constructed once per workflow version and immutable thereafter;
/// re-validate after any edit by building a new definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGraphDefinition")]
pub struct GraphDefinition {
    pub name: String,
    pub nodes: Vec<NodeSpec>,
    pub edges: Vec<EdgeSpec>,
    #[serde(rename = "entryPoint", skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<String>,
    #[serde(rename = "maxIterations")]
    pub max_iterations: u32,
}

impl GraphDefinition {
    pub fn new(
        name: impl Into<String>,
        nodes: Vec<NodeSpec>,
        edges: Vec<EdgeSpec>,
    ) -> Result<Self, GraphError> {
        let mut node_ids = HashSet::new();
        for node in &nodes {
            if !node_ids.insert(node.id.as_str()) {
                return Err(GraphError::DuplicateNodeId(node.id.clone()));
            }
        }

        let mut edge_ids = HashSet::new();
        for edge in &edges {
            if !edge_ids.insert(edge.id.as_str()) {
                return Err(GraphError::DuplicateEdgeId(edge.id.clone()));
            }
            if !node_ids.contains(edge.source.as_str()) {
                return Err(GraphError::UnknownEndpoint {
                    edge_id: edge.id.clone(),
                    node_id: edge.source.clone(),
                });
            }
            if edge.target != END && !node_ids.contains(edge.target.as_str()) {
                return Err(GraphError::UnknownEndpoint {
                    edge_id: edge.id.clone(),
                    node_id: edge.target.clone(),
                });
            }
        }

        Ok(Self {
            name: name.into(),
            nodes,
            edges,
            entry_point: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        })
    }

    pub fn with_entry_point(mut self, entry: impl Into<String>) -> Self {
        self.entry_point = Some(entry.into());
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Outgoing edges of a node, in declaration order.
    pub fn outgoing(&self, node_id: &str) -> Vec<&EdgeSpec> {
        self.edges.iter().filter(|e| e.source == node_id).collect()
    }

    /// Incoming edges of a node, in declaration order.
    pub fn incoming(&self, node_id: &str) -> Vec<&EdgeSpec> {
        self.edges.iter().filter(|e| e.target == node_id).collect()
    }

    /// Adjacency over all edges whose target is not [`END`].
    pub fn adjacency(&self) -> HashMap<&str, Vec<&str>> {
        let mut adj: HashMap<&str, Vec<&str>> = HashMap::new();
        for node in &self.nodes {
            adj.entry(node.id.as_str()).or_default();
        }
        for edge in &self.edges {
            if edge.target != END {
                adj.entry(edge.source.as_str())
                    .or_default()
                    .push(edge.target.as_str());
            }
        }
        adj
    }

    /// Resolve the node a run starts at.
    ///
    /// Explicit entry point wins. Otherwise the unique node with zero
    /// incoming edges; if several or zero such nodes exist, the first
    /// declared node is used. Only empty graphs resolve to `None`.
    pub fn resolved_entry_point(&self) -> Option<&str> {
        if let Some(entry) = &self.entry_point {
            return Some(entry.as_str());
        }
        let mut without_incoming = self
            .nodes
            .iter()
            .filter(|n| self.incoming(&n.id).is_empty());
        match (without_incoming.next(), without_incoming.next()) {
            (Some(only), None) => Some(only.id.as_str()),
            _ => self.nodes.first().map(|n| n.id.as_str()),
        }
    }

    /// Reconstruct from the wire/storage representation, re-running every
    /// construction invariant.
    pub fn from_wire(value: Value) -> Result<Self, GraphError> {
        serde_json::from_value::<GraphDefinition>(value)
            .map_err(|e| GraphError::Malformed(e.to_string()))
    }
}

#[derive(Deserialize)]
struct RawGraphDefinition {
    name: String,
    #[serde(default)]
    nodes: Vec<NodeSpec>,
    #[serde(default)]
    edges: Vec<EdgeSpec>,
    #[serde(rename = "entryPoint", default)]
    entry_point: Option<String>,
    #[serde(rename = "maxIterations", default)]
    max_iterations: Option<u32>,
}

impl TryFrom<RawGraphDefinition> for GraphDefinition {
    type Error = GraphError;

    fn try_from(raw: RawGraphDefinition) -> Result<Self, GraphError> {
        let mut def = GraphDefinition::new(raw.name, raw.nodes, raw.edges)?;
        def.entry_point = raw.entry_point;
        if let Some(max) = raw.max_iterations {
            def = def.with_max_iterations(max);
        }
        Ok(def)
    }
}
