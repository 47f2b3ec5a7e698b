// SPDX-License-Identifier: MIT

//! Typed error handling for taskflow-rs
//!
//! Each phase of the engine has its own error enum: graph construction,
//! expression evaluation, compilation, and execution. Validation problems are
//! deliberately *not* errors; they are collected into a `ValidationResult`
//! so a graph author sees every issue in one pass.

use thiserror::Error;

/// Boxed error type used by the external capability contract.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Structural errors raised synchronously while constructing graph specs.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GraphError {
    /// Node declared with an empty id or type
    #[error("Node {0}: id and type must be non-empty")]
    EmptyNodeField(String),

    /// Edge declared with an empty id, source or target
    #[error("Edge {0}: id, source and target must be non-empty")]
    EmptyEdgeField(String),

    /// Two nodes share an id
    #[error("Duplicate node id: '{0}'")]
    DuplicateNodeId(String),

    /// Two edges share an id
    #[error("Duplicate edge id: '{0}'")]
    DuplicateEdgeId(String),

    /// Edge endpoint refers to a node that was never declared
    #[error("Edge '{edge_id}' refers to undeclared node '{node_id}'")]
    UnknownEndpoint { edge_id: String, node_id: String },

    /// Edge with source == target
    #[error("Edge '{0}' is a self-loop (source == target)")]
    SelfLoop(String),

    /// The graph contains an uncontrolled cycle and cannot be ordered
    #[error("Circular dependency with no controlled exit: {0:?}")]
    CircularDependency(Vec<String>),

    /// Stored/wire form could not be decoded into a graph definition
    #[error("Malformed graph definition: {0}")]
    Malformed(String),
}

/// Errors raised by the expression sandbox.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
    #[error("Expression is empty")]
    Empty,

    #[error("Expression exceeds the {max}-character limit ({len} chars)")]
    TooLong { len: usize, max: usize },

    #[error("Syntax error at position {position}: {message}")]
    Syntax { position: usize, message: String },

    /// A construct outside the allow-list (function call, lambda, ...)
    #[error("Disallowed construct: {0}")]
    Disallowed(String),

    #[error("Undefined name '{0}'")]
    UndefinedName(String),

    #[error("Type mismatch in '{operation}': expected {expected}, found {found}")]
    TypeMismatch {
        operation: String,
        expected: String,
        found: String,
    },

    /// Subscript or attribute lookup that resolved to nothing
    #[error("Lookup failed: {0}")]
    LookupFailed(String),
}

/// Raised when a graph is compiled for execution while invalid.
#[derive(Debug, Error, Clone)]
pub enum CompileError {
    /// Concatenation of every blocking validation error
    #[error("Graph '{name}' failed validation: {summary}")]
    Validation { name: String, summary: String },

    /// A capability factory refused to build a node that passed validation
    #[error("Node '{node_id}' could not be compiled: {message}")]
    Capability { node_id: String, message: String },

    /// An edge condition that passed static checks still failed to parse
    #[error("Edge '{edge_id}' condition failed to parse: {message}")]
    Condition { edge_id: String, message: String },
}

/// Fatal failures of one run, caught by the executor.
#[derive(Debug, Error, Clone)]
pub enum ExecutionError {
    #[error("Node '{node_id}' failed: {message}")]
    NodeFailed { node_id: String, message: String },

    #[error("Step budget of {limit} exceeded; the graph is likely looping without an exit")]
    StepBudgetExceeded { limit: usize },
}

impl ExecutionError {
    /// The failing node, when the failure is attributable to one.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            ExecutionError::NodeFailed { node_id, .. } => Some(node_id),
            ExecutionError::StepBudgetExceeded { .. } => None,
        }
    }
}
