// SPDX-License-Identifier: MIT

//! Graph compilation and the step driver
//!
//! `compile` turns a validated [`GraphDefinition`] into an [`ExecutableGraph`]:
//! capabilities instantiated, conditions pre-parsed, routing resolved per
//! source node, and a step budget fixed up front. The executable graph then
//! drives runs through [`ExecutableGraph::stream`], yielding one completed
//! node at a time over a channel.
//!
//! Routing semantics: a source with only unconditional edges fans out to
//! every target. A source with conditional edges evaluates them in
//! declaration order against the enriched state; the first truthy condition
//! wins and later ones are never evaluated. A condition that errors counts
//! as a non-match. When nothing matches, the first unconditional edge is the
//! fallback, or [`END`] if there is none.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{CompileError, ExecutionError};
use crate::expr::{self, Expr};
use crate::graph::loops::detect_loops;
use crate::graph::types::{GraphDefinition, END};
use crate::graph::validator::Validator;
use crate::registry::{Capability, CapabilityRegistry};

/// Step budget for graphs without loops.
pub const DEFAULT_STEP_BUDGET: usize = 100;

/// One completed step: the node that ran and its output.
pub type Step = Result<(String, Value), ExecutionError>;

#[derive(Debug)]
struct CompiledNode {
    id: String,
    capability: Arc<dyn Capability>,
}

/// A pre-parsed conditional edge.
#[derive(Debug)]
struct Branch {
    edge_id: String,
    raw: String,
    condition: Expr,
    target: String,
}

#[derive(Debug)]
enum Routing {
    /// Unconditional fan-out, declaration order
    Direct(Vec<String>),
    /// First truthy branch wins; `default` catches non-matches
    Conditional {
        branches: Vec<Branch>,
        default: String,
    },
}

/// A graph compiled for execution. Immutable and shareable across runs.
#[derive(Debug)]
pub struct ExecutableGraph {
    name: String,
    entry_point: Option<String>,
    nodes: HashMap<String, CompiledNode>,
    node_ids: Vec<String>,
    routing: HashMap<String, Routing>,
    step_budget: usize,
}

/// Re-validate and compile a graph definition.
///
/// Fails with the concatenation of every blocking validation error;
/// warnings are logged and do not block.
pub fn compile(
    def: &GraphDefinition,
    registry: &CapabilityRegistry,
) -> Result<ExecutableGraph, CompileError> {
    let result = Validator::new(registry).validate(def);
    for warning in &result.warnings {
        log::warn!("graph '{}': {}", def.name, warning.message);
    }
    if !result.valid {
        return Err(CompileError::Validation {
            name: def.name.clone(),
            summary: result.error_summary(),
        });
    }

    let mut nodes = HashMap::new();
    for node in &def.nodes {
        let capability = registry
            .create(&node.id, &node.node_type, &node.config)
            .map_err(|e| CompileError::Capability {
                node_id: node.id.clone(),
                message: e.to_string(),
            })?;
        nodes.insert(
            node.id.clone(),
            CompiledNode {
                id: node.id.clone(),
                capability,
            },
        );
    }

    let mut routing = HashMap::new();
    for node in &def.nodes {
        let outgoing = def.outgoing(&node.id);
        if outgoing.is_empty() {
            continue;
        }
        let has_conditional = outgoing.iter().any(|e| e.is_conditional());
        let entry = if has_conditional {
            let mut branches = Vec::new();
            for edge in outgoing.iter().filter(|e| e.is_conditional()) {
                let raw = edge.condition.clone().unwrap_or_default();
                let condition =
                    expr::parse(&raw).map_err(|e| CompileError::Condition {
                        edge_id: edge.id.clone(),
                        message: e.to_string(),
                    })?;
                branches.push(Branch {
                    edge_id: edge.id.clone(),
                    raw,
                    condition,
                    target: edge.target.clone(),
                });
            }
            let default = outgoing
                .iter()
                .find(|e| !e.is_conditional())
                .map(|e| e.target.clone())
                .unwrap_or_else(|| END.to_string());
            Routing::Conditional { branches, default }
        } else {
            Routing::Direct(outgoing.iter().map(|e| e.target.clone()).collect())
        };
        routing.insert(node.id.clone(), entry);
    }

    let step_budget = if detect_loops(def, registry).is_empty() {
        DEFAULT_STEP_BUDGET
    } else {
        let n = def.nodes.len();
        def.max_iterations as usize * n + n
    };

    Ok(ExecutableGraph {
        name: def.name.clone(),
        entry_point: def.resolved_entry_point().map(|s| s.to_string()),
        nodes,
        node_ids: def.nodes.iter().map(|n| n.id.clone()).collect(),
        routing,
        step_budget,
    })
}

impl ExecutableGraph {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry_point(&self) -> Option<&str> {
        self.entry_point.as_deref()
    }

    /// Declared node ids, declaration order.
    pub fn node_ids(&self) -> &[String] {
        &self.node_ids
    }

    pub fn step_budget(&self) -> usize {
        self.step_budget
    }

    /// Drive the graph from `initial` state, yielding one completed node per
    /// step. The driver owns a private working copy of the state; callers
    /// mirror the `{nodeId: output}` merges from the yielded steps.
    ///
    /// The stream ends after yielding at most one `Err`: a capability
    /// failure or a step-budget overrun terminates the run.
    pub fn stream(self: Arc<Self>, initial: Map<String, Value>) -> ReceiverStream<Step> {
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            self.drive(initial, tx).await;
        });
        ReceiverStream::new(rx)
    }

    async fn drive(&self, mut state: Map<String, Value>, tx: mpsc::Sender<Step>) {
        let Some(entry) = self.entry_point.clone() else {
            // empty graph: nothing to run
            return;
        };
        let mut queue: VecDeque<String> = VecDeque::new();
        let mut queued: HashSet<String> = HashSet::new();
        queued.insert(entry.clone());
        queue.push_back(entry);

        let mut steps = 0usize;
        while let Some(node_id) = queue.pop_front() {
            queued.remove(&node_id);
            steps += 1;
            if steps > self.step_budget {
                let _ = tx
                    .send(Err(ExecutionError::StepBudgetExceeded {
                        limit: self.step_budget,
                    }))
                    .await;
                return;
            }

            let Some(node) = self.nodes.get(&node_id) else {
                let _ = tx
                    .send(Err(ExecutionError::NodeFailed {
                        node_id: node_id.clone(),
                        message: "node is not part of the compiled graph".to_string(),
                    }))
                    .await;
                return;
            };

            let output = match node.capability.execute(&state).await {
                Ok(output) => output,
                Err(e) => {
                    let _ = tx
                        .send(Err(ExecutionError::NodeFailed {
                            node_id: node.id.clone(),
                            message: e.to_string(),
                        }))
                        .await;
                    return;
                }
            };

            // merge happens-before the completion is emitted, so conditions
            // on later edges see this node's output
            state.insert(node_id.clone(), output.clone());
            if tx.send(Ok((node_id.clone(), output.clone()))).await.is_err() {
                // receiver gone, stop driving
                return;
            }

            for target in self.route(&node_id, &state, &output) {
                if target == END {
                    continue;
                }
                // a node already waiting in the queue is not enqueued again;
                // once it has run it may be re-enqueued by a loop edge
                if queued.insert(target.clone()) {
                    queue.push_back(target);
                }
            }
        }
    }

    fn route(&self, node_id: &str, state: &Map<String, Value>, output: &Value) -> Vec<String> {
        match self.routing.get(node_id) {
            None => Vec::new(),
            Some(Routing::Direct(targets)) => targets.clone(),
            Some(Routing::Conditional { branches, default }) => {
                let context = enrich(state, output);
                for branch in branches {
                    match expr::evaluate(&branch.condition, &context) {
                        Ok(value) if expr::is_truthy(&value) => {
                            return vec![branch.target.clone()];
                        }
                        Ok(_) => {}
                        Err(e) => {
                            // an erroring condition is a non-match, not a failure
                            log::debug!(
                                "condition '{}' on edge '{}' did not match: {}",
                                branch.raw,
                                branch.edge_id,
                                e
                            );
                        }
                    }
                }
                vec![default.clone()]
            }
        }
    }
}

/// Build the evaluation context for a source node's conditions: the full
/// state, the node's own output as `result`, and the well-known decision
/// fields `condition_result` / `branch_taken` promoted to top level.
fn enrich(state: &Map<String, Value>, output: &Value) -> Map<String, Value> {
    let mut context = state.clone();
    context.insert("result".to_string(), output.clone());
    if let Value::Object(fields) = output {
        for key in ["condition_result", "branch_taken"] {
            if let Some(value) = fields.get(key) {
                context.insert(key.to_string(), value.clone());
            }
        }
    }
    context
}
