// SPDX-License-Identifier: MIT

//! Multi-rule graph validation
//!
//! Every rule contributes independently: validation never short-circuits, so
//! the author of a broken graph sees all problems in one pass. Issues carry a
//! machine-readable code and a free-form `context` value; `valid` is true iff
//! no error-severity issue was produced. Warnings never block compilation.

use serde::Serialize;
use serde_json::{json, Value};

use crate::expr;
use crate::graph::loops::detect_loops;
use crate::graph::types::GraphDefinition;
use crate::registry::CapabilityRegistry;

/// Stable issue codes, part of the public contract.
pub mod codes {
    pub const INVALID_NODE_TYPE: &str = "INVALID_NODE_TYPE";
    pub const CIRCULAR_DEPENDENCY: &str = "CIRCULAR_DEPENDENCY";
    pub const CONTROLLED_LOOP: &str = "CONTROLLED_LOOP";
    pub const INVALID_NODE_CONFIG: &str = "INVALID_NODE_CONFIG";
    pub const DANGLING_NODE: &str = "DANGLING_NODE";
    pub const NO_OUTGOING_EDGE: &str = "NO_OUTGOING_EDGE";
    pub const INVALID_CONDITION: &str = "INVALID_CONDITION";
    pub const MIXED_EDGE_TYPES: &str = "MIXED_EDGE_TYPES";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// One finding from one rule.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationIssue {
    pub code: String,
    pub message: String,
    pub severity: Severity,
    /// Nodes the issue is about, empty when not node-specific
    #[serde(rename = "nodeIds")]
    pub node_ids: Vec<String>,
    /// Rule-specific detail, e.g. `cyclePath` or `suggestions`
    #[serde(skip_serializing_if = "Value::is_null")]
    pub context: Value,
}

impl ValidationIssue {
    fn error(code: &str, message: String, node_ids: Vec<String>, context: Value) -> Self {
        Self {
            code: code.to_string(),
            message,
            severity: Severity::Error,
            node_ids,
            context,
        }
    }

    fn warning(code: &str, message: String, node_ids: Vec<String>, context: Value) -> Self {
        Self {
            code: code.to_string(),
            message,
            severity: Severity::Warning,
            node_ids,
            context,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// One line per blocking error, for compile-failure messages.
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|i| i.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Validates graph definitions against a capability registry.
pub struct Validator<'a> {
    registry: &'a CapabilityRegistry,
}

impl<'a> Validator<'a> {
    pub fn new(registry: &'a CapabilityRegistry) -> Self {
        Self { registry }
    }

    pub fn validate(&self, def: &GraphDefinition) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        self.check_node_types(def, &mut errors);
        self.check_loops(def, &mut errors, &mut warnings);
        self.check_node_configs(def, &mut errors);
        self.check_connectivity(def, &mut warnings);
        self.check_conditions(def, &mut errors);
        self.check_mixed_edges(def, &mut warnings);

        ValidationResult {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    fn check_node_types(&self, def: &GraphDefinition, errors: &mut Vec<ValidationIssue>) {
        for node in &def.nodes {
            if !self.registry.is_registered(&node.node_type) {
                errors.push(ValidationIssue::error(
                    codes::INVALID_NODE_TYPE,
                    format!(
                        "Node '{}' has unregistered type '{}'",
                        node.id, node.node_type
                    ),
                    vec![node.id.clone()],
                    json!({ "nodeType": node.node_type }),
                ));
            }
        }
    }

    fn check_loops(
        &self,
        def: &GraphDefinition,
        errors: &mut Vec<ValidationIssue>,
        warnings: &mut Vec<ValidationIssue>,
    ) {
        for info in detect_loops(def, self.registry) {
            let path = info.cycle_path();
            if let Some(controller) = &info.controlling_node {
                warnings.push(ValidationIssue::warning(
                    codes::CONTROLLED_LOOP,
                    format!(
                        "Loop through {:?} is bounded by decision node '{}'",
                        path, controller
                    ),
                    info.nodes.clone(),
                    json!({ "cyclePath": path, "conditionNodeId": controller }),
                ));
            } else {
                errors.push(ValidationIssue::error(
                    codes::CIRCULAR_DEPENDENCY,
                    format!("Circular dependency with no controlled exit: {:?}", path),
                    info.nodes.clone(),
                    json!({ "cyclePath": path }),
                ));
            }
        }
    }

    fn check_node_configs(&self, def: &GraphDefinition, errors: &mut Vec<ValidationIssue>) {
        for node in &def.nodes {
            if !self.registry.is_registered(&node.node_type) {
                continue;
            }
            match self.registry.create(&node.id, &node.node_type, &node.config) {
                Ok(capability) => {
                    for issue in capability.validate_config() {
                        errors.push(ValidationIssue::error(
                            codes::INVALID_NODE_CONFIG,
                            format!("Node '{}': {}", node.id, issue),
                            vec![node.id.clone()],
                            Value::Null,
                        ));
                    }
                }
                Err(e) => {
                    errors.push(ValidationIssue::error(
                        codes::INVALID_NODE_CONFIG,
                        format!("Node '{}' could not be instantiated: {}", node.id, e),
                        vec![node.id.clone()],
                        Value::Null,
                    ));
                }
            }
        }
    }

    fn check_connectivity(&self, def: &GraphDefinition, warnings: &mut Vec<ValidationIssue>) {
        for node in &def.nodes {
            let outgoing = def.outgoing(&node.id);
            let incoming = def.incoming(&node.id);
            if incoming.is_empty() && outgoing.is_empty() {
                let suggestions: Vec<&str> = def
                    .nodes
                    .iter()
                    .filter(|n| n.id != node.id)
                    .take(2)
                    .map(|n| n.id.as_str())
                    .collect();
                let hint = if suggestions.is_empty() {
                    String::new()
                } else {
                    format!(" (consider connecting it to {})", suggestions.join(" or "))
                };
                warnings.push(ValidationIssue::warning(
                    codes::DANGLING_NODE,
                    format!("Node '{}' has no edges{}", node.id, hint),
                    vec![node.id.clone()],
                    json!({ "suggestions": suggestions }),
                ));
            } else if outgoing.is_empty() {
                // possibly an intentional terminal node
                warnings.push(ValidationIssue::warning(
                    codes::NO_OUTGOING_EDGE,
                    format!("Node '{}' has no outgoing edge", node.id),
                    vec![node.id.clone()],
                    Value::Null,
                ));
            }
        }
    }

    fn check_conditions(&self, def: &GraphDefinition, errors: &mut Vec<ValidationIssue>) {
        for edge in &def.edges {
            let Some(condition) = &edge.condition else {
                continue;
            };
            let issues = expr::static_check(condition);
            if !issues.is_empty() {
                errors.push(ValidationIssue::error(
                    codes::INVALID_CONDITION,
                    format!(
                        "Edge '{}' has an invalid condition: {}",
                        edge.id,
                        issues.join("; ")
                    ),
                    vec![edge.source.clone()],
                    json!({ "edgeId": edge.id, "issues": issues }),
                ));
            }
        }
    }

    fn check_mixed_edges(&self, def: &GraphDefinition, warnings: &mut Vec<ValidationIssue>) {
        for node in &def.nodes {
            let outgoing = def.outgoing(&node.id);
            let conditional = outgoing.iter().filter(|e| e.is_conditional()).count();
            let unconditional = outgoing.len() - conditional;
            if conditional > 0 && unconditional > 0 {
                warnings.push(ValidationIssue::warning(
                    codes::MIXED_EDGE_TYPES,
                    format!(
                        "Node '{}' mixes conditional and unconditional edges; the first \
                         unconditional edge becomes the fallback route",
                        node.id
                    ),
                    vec![node.id.clone()],
                    json!({ "unconditionalEdges": unconditional }),
                ));
            }
        }
    }
}
