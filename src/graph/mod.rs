// SPDX-License-Identifier: MIT

//! Graph definition, validation, compilation and execution
//!
//! This module covers the whole life of a workflow graph: the declarative
//! [`types::GraphDefinition`], the multi-rule [`validator::Validator`], loop
//! classification in [`loops`], compilation into an
//! [`compiler::ExecutableGraph`] and the streaming [`executor::Executor`].

pub mod compiler;
pub mod executor;
pub mod loops;
pub mod types;
pub mod validator;

pub use compiler::{compile, ExecutableGraph, Step, DEFAULT_STEP_BUDGET};
pub use executor::{Executor, RunReport};
pub use loops::{detect_loops, topological_order, LoopInfo};
pub use types::{EdgeSpec, GraphDefinition, NodeSpec, DEFAULT_MAX_ITERATIONS, END};
pub use validator::{ValidationIssue, ValidationResult, Validator};
