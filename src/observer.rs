// SPDX-License-Identifier: MIT

//! Run lifecycle notifications
//!
//! The executor reports per-node progress to a [`RunObserver`], typically
//! the durable-execution/transport layer pushing SSE frames to a UI.
//! Notification is strictly best-effort: an observer failure is logged and
//! the run continues.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BoxError;

/// Lifecycle statuses emitted during one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Node declared, not yet started. Sent for every node up front so an
    /// observer can render the whole graph before anything executes
    Pending,
    Running,
    Completed,
    /// Node-scoped failure
    Error,
    WorkflowStart,
    WorkflowComplete,
    /// Terminal run failure, carries the failure message as output
    WorkflowError,
}

/// Receiver of run progress events.
#[async_trait]
pub trait RunObserver: Send + Sync {
    async fn notify(
        &self,
        run_id: &str,
        status: RunStatus,
        node_id: Option<&str>,
        output: Option<&Value>,
    ) -> Result<(), BoxError>;
}

/// Observer that logs every notification. Useful in the CLI and as the
/// default when no transport is wired up.
#[derive(Debug, Default)]
pub struct LogObserver;

#[async_trait]
impl RunObserver for LogObserver {
    async fn notify(
        &self,
        run_id: &str,
        status: RunStatus,
        node_id: Option<&str>,
        output: Option<&Value>,
    ) -> Result<(), BoxError> {
        match (node_id, output) {
            (Some(node), Some(out)) => {
                log::info!("[{}] {:?} node={} output={}", run_id, status, node, out)
            }
            (Some(node), None) => log::info!("[{}] {:?} node={}", run_id, status, node),
            (None, Some(out)) => log::info!("[{}] {:?} {}", run_id, status, out),
            (None, None) => log::info!("[{}] {:?}", run_id, status),
        }
        Ok(())
    }
}
