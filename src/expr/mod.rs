// SPDX-License-Identifier: MIT

//! Sandboxed expression evaluation for edge conditions
//!
//! Conditions are authored by end users, so this module is built as a small,
//! closed interpreter: its own lexer, a recursive-descent parser producing a
//! tagged-union AST, and a tree walker with an explicit allow-list of safe
//! operations. Expressions look like:
//!
//! - `triage.severity == 'high'`
//! - `attempts < 3 and verify.passed == false`
//! - `'regression' in triage.labels`
//! - `'retry' if verify.passed == false else 'done'`
//!
//! Two entry points: [`evaluate`] runs an expression against a state mapping,
//! [`static_check`] parses without evaluating and reports every disallowed
//! construct, so edge conditions can be validated before any run exists.

mod ast;
mod evaluator;
mod parser;

pub use ast::{BinaryOp, BoolOp, CompareOp, Expr, Literal, UnaryOp};
pub use evaluator::{evaluate, is_truthy};
pub use parser::{parse, static_check};

use crate::error::EvalError;
use serde_json::{Map, Value};

/// Hard cap on expression length, in bytes.
pub const MAX_EXPRESSION_LEN: usize = 500;

/// Parse and evaluate an expression string in one step.
pub fn evaluate_str(expression: &str, context: &Map<String, Value>) -> Result<Value, EvalError> {
    let expr = parse(expression)?;
    evaluate(&expr, context)
}
