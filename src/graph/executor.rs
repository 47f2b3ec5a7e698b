// SPDX-License-Identifier: MIT

//! Streaming run executor
//!
//! Consumes the compiled graph's step stream one completion at a time and
//! turns it into observer notifications plus a final [`RunReport`]. The
//! executor never propagates a failure to its caller: a capability error or
//! budget overrun becomes a terminal notification and a partial report, with
//! every output merged so far still inspectable.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tokio_stream::StreamExt;

use crate::graph::compiler::ExecutableGraph;
use crate::observer::{RunObserver, RunStatus};
use crate::state::RunState;

/// Longest serialized output echoed in a `completed` notification.
const PREVIEW_LIMIT: usize = 200;

/// Outcome of one run.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: String,
    /// Final state, partial when the run failed
    pub state: RunState,
    pub success: bool,
    pub error: Option<String>,
}

/// Drives runs of compiled graphs and reports progress to an observer.
pub struct Executor {
    observer: Arc<dyn RunObserver>,
}

impl Executor {
    pub fn new(observer: Arc<dyn RunObserver>) -> Self {
        Self { observer }
    }

    /// Run a compiled graph to completion or failure.
    ///
    /// Notification order: `workflow_start`, `pending` for every declared
    /// node, then per completion `running` (first sight only) and
    /// `completed`; state merge happens before the `completed`
    /// notification. Terminal event is `workflow_complete` or
    /// `workflow_error`.
    pub async fn run(
        &self,
        graph: Arc<ExecutableGraph>,
        initial: Map<String, Value>,
        run_id: &str,
    ) -> RunReport {
        let mut state = RunState::from_map(initial);
        state.insert("run_id", json!(run_id));

        self.notify(run_id, RunStatus::WorkflowStart, None, None).await;
        for node_id in graph.node_ids() {
            self.notify(run_id, RunStatus::Pending, Some(node_id), None)
                .await;
        }

        let mut seen: HashSet<String> = HashSet::new();
        let mut steps = graph.clone().stream(state.as_map().clone());
        while let Some(step) = steps.next().await {
            match step {
                Ok((node_id, output)) => {
                    // the driver only reports completions; synthesize the
                    // running transition the first time a node shows up
                    if seen.insert(node_id.clone()) {
                        self.notify(run_id, RunStatus::Running, Some(&node_id), None)
                            .await;
                    }
                    state.merge_node_output(&node_id, output.clone());
                    let preview = preview(&output);
                    self.notify(run_id, RunStatus::Completed, Some(&node_id), Some(&preview))
                        .await;
                }
                Err(e) => {
                    let message = e.to_string();
                    let detail = json!({ "error": message });
                    if let Some(node_id) = e.node_id() {
                        self.notify(run_id, RunStatus::Error, Some(node_id), Some(&detail))
                            .await;
                    }
                    self.notify(run_id, RunStatus::WorkflowError, None, Some(&detail))
                        .await;
                    return RunReport {
                        run_id: run_id.to_string(),
                        state,
                        success: false,
                        error: Some(message),
                    };
                }
            }
        }

        self.notify(run_id, RunStatus::WorkflowComplete, None, None)
            .await;
        RunReport {
            run_id: run_id.to_string(),
            state,
            success: true,
            error: None,
        }
    }

    /// Best-effort: an observer failure is logged, never surfaced.
    async fn notify(
        &self,
        run_id: &str,
        status: RunStatus,
        node_id: Option<&str>,
        output: Option<&Value>,
    ) {
        if let Err(e) = self.observer.notify(run_id, status, node_id, output).await {
            log::warn!("observer notification failed for run {}: {}", run_id, e);
        }
    }
}

fn preview(output: &Value) -> Value {
    let serialized = output.to_string();
    if serialized.len() <= PREVIEW_LIMIT {
        return Value::String(serialized);
    }
    let cut = serialized
        .char_indices()
        .take_while(|(i, _)| *i <= PREVIEW_LIMIT)
        .last()
        .map(|(i, _)| i)
        .unwrap_or(0);
    Value::String(format!("{}...", &serialized[..cut]))
}
