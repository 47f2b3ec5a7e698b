// SPDX-License-Identifier: MIT

//! Tree-walking evaluator for the condition language
//!
//! Evaluates a parsed `Expr` against a state mapping. Every operation here is
//! on the allow-list by construction: the walker matches the closed AST and
//! nothing else, so user-authored conditions can never reach host runtime
//! facilities.

use super::ast::{BinaryOp, BoolOp, CompareOp, Expr, Literal, UnaryOp};
use crate::error::EvalError;
use serde_json::{Map, Number, Value};

/// Python-like truthiness: `null`, `false`, `0`, `""`, `[]` and `{}` are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Evaluate an expression AST against a context mapping.
pub fn evaluate(expr: &Expr, context: &Map<String, Value>) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(lit) => Ok(literal_value(lit)),

        Expr::Name(name) => {
            // `true` / `false` / `none` are case-insensitive built-ins;
            // everything else must exist in the context.
            match name.to_ascii_lowercase().as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                "none" | "null" => Ok(Value::Null),
                _ => context
                    .get(name)
                    .cloned()
                    .ok_or_else(|| EvalError::UndefinedName(name.clone())),
            }
        }

        Expr::Compare { left, comparators } => {
            // Chained comparisons evaluate pairwise: a < b < c == (a < b) and (b < c)
            let mut current = evaluate(left, context)?;
            for (op, rhs) in comparators {
                let next = evaluate(rhs, context)?;
                if !compare(&current, *op, &next)? {
                    return Ok(Value::Bool(false));
                }
                current = next;
            }
            Ok(Value::Bool(true))
        }

        Expr::BoolOp { op, values } => {
            // Operand-returning short-circuit, like the source language:
            // `and` yields the first falsy operand, `or` the first truthy one.
            let mut last = Value::Null;
            for (i, v) in values.iter().enumerate() {
                last = evaluate(v, context)?;
                let decisive = match op {
                    BoolOp::And => !is_truthy(&last),
                    BoolOp::Or => is_truthy(&last),
                };
                if decisive && i + 1 < values.len() {
                    return Ok(last);
                }
            }
            Ok(last)
        }

        Expr::Unary { op, operand } => {
            let value = evaluate(operand, context)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!is_truthy(&value))),
                UnaryOp::Neg => match as_number(&value) {
                    Some(n) => Ok(number(-n)),
                    None => Err(type_mismatch("-", "Number", &value)),
                },
                UnaryOp::Pos => match as_number(&value) {
                    Some(n) => Ok(number(n)),
                    None => Err(type_mismatch("+", "Number", &value)),
                },
            }
        }

        Expr::Binary { op, left, right } => {
            let l = evaluate(left, context)?;
            let r = evaluate(right, context)?;
            binary_op(*op, &l, &r)
        }

        Expr::Subscript { value, index } => {
            let container = evaluate(value, context)?;
            let key = evaluate(index, context)?;
            subscript(&container, &key)
        }

        Expr::Attribute { value, attr } => {
            let container = evaluate(value, context)?;
            match container {
                Value::Object(map) => map
                    .get(attr)
                    .cloned()
                    .ok_or_else(|| EvalError::LookupFailed(format!("no field '{}'", attr))),
                other => Err(type_mismatch(
                    &format!(".{}", attr),
                    "map (attribute access is only legal on maps)",
                    &other,
                )),
            }
        }

        Expr::List(items) | Expr::Tuple(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(evaluate(item, context)?);
            }
            Ok(Value::Array(out))
        }

        Expr::Dict(pairs) => {
            let mut map = Map::new();
            for (key_expr, value_expr) in pairs {
                let key = evaluate(key_expr, context)?;
                let key = match key {
                    Value::String(s) => s,
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    other => {
                        return Err(type_mismatch("dict key", "String", &other));
                    }
                };
                map.insert(key, evaluate(value_expr, context)?);
            }
            Ok(Value::Object(map))
        }

        Expr::Ternary {
            condition,
            then,
            otherwise,
        } => {
            let cond = evaluate(condition, context)?;
            if is_truthy(&cond) {
                evaluate(then, context)
            } else {
                evaluate(otherwise, context)
            }
        }
    }
}

fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::String(s) => Value::String(s.clone()),
        Literal::Number(n) => number(*n),
        Literal::Boolean(b) => Value::Bool(*b),
        Literal::Null => Value::Null,
    }
}

/// Integral results are kept as integer JSON numbers so they round-trip
/// cleanly against numbers that entered the state as integers.
fn number(n: f64) -> Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

fn as_number(value: &Value) -> Option<f64> {
    value.as_f64()
}

fn type_mismatch(operation: &str, expected: &str, found: &Value) -> EvalError {
    EvalError::TypeMismatch {
        operation: operation.to_string(),
        expected: expected.to_string(),
        found: type_name(found).to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "Null",
        Value::Bool(_) => "Bool",
        Value::Number(_) => "Number",
        Value::String(_) => "String",
        Value::Array(_) => "Array",
        Value::Object(_) => "Map",
    }
}

/// Equality with numeric normalization: `1` and `1.0` compare equal.
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) if left.is_number() && right.is_number() => {
            (l - r).abs() < f64::EPSILON
        }
        _ => left == right,
    }
}

fn compare(left: &Value, op: CompareOp, right: &Value) -> Result<bool, EvalError> {
    match op {
        CompareOp::Eq | CompareOp::Is => Ok(values_equal(left, right)),
        CompareOp::NotEq | CompareOp::IsNot => Ok(!values_equal(left, right)),
        CompareOp::Gt => ordered(left, right, op, |o| o == std::cmp::Ordering::Greater),
        CompareOp::Gte => ordered(left, right, op, |o| o != std::cmp::Ordering::Less),
        CompareOp::Lt => ordered(left, right, op, |o| o == std::cmp::Ordering::Less),
        CompareOp::Lte => ordered(left, right, op, |o| o != std::cmp::Ordering::Greater),
        CompareOp::In => membership(left, right),
        CompareOp::NotIn => membership(left, right).map(|b| !b),
    }
}

fn ordered<F>(left: &Value, right: &Value, op: CompareOp, check: F) -> Result<bool, EvalError>
where
    F: Fn(std::cmp::Ordering) -> bool,
{
    match (left, right) {
        (Value::Number(_), Value::Number(_)) => {
            let (l, r) = (left.as_f64().unwrap_or(0.0), right.as_f64().unwrap_or(0.0));
            Ok(check(l.partial_cmp(&r).unwrap_or(std::cmp::Ordering::Equal)))
        }
        (Value::String(l), Value::String(r)) => Ok(check(l.cmp(r))),
        _ => Err(EvalError::TypeMismatch {
            operation: op.to_string(),
            expected: "two Numbers or two Strings".to_string(),
            found: format!("{} and {}", type_name(left), type_name(right)),
        }),
    }
}

/// `needle in haystack`: array element, substring, or map key.
fn membership(needle: &Value, haystack: &Value) -> Result<bool, EvalError> {
    match haystack {
        Value::Array(items) => Ok(items.iter().any(|v| values_equal(v, needle))),
        Value::String(s) => match needle {
            Value::String(sub) => Ok(s.contains(sub.as_str())),
            other => Err(type_mismatch("in", "String", other)),
        },
        Value::Object(map) => match needle {
            Value::String(key) => Ok(map.contains_key(key)),
            other => Err(type_mismatch("in", "String", other)),
        },
        other => Err(type_mismatch("in", "Array, String or Map", other)),
    }
}

fn binary_op(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    match op {
        BinaryOp::Add => match (left, right) {
            (Value::Number(_), Value::Number(_)) => Ok(number(
                left.as_f64().unwrap_or(0.0) + right.as_f64().unwrap_or(0.0),
            )),
            (Value::String(l), Value::String(r)) => Ok(Value::String(format!("{}{}", l, r))),
            (Value::Array(l), Value::Array(r)) => {
                let mut out = l.clone();
                out.extend(r.iter().cloned());
                Ok(Value::Array(out))
            }
            _ => Err(EvalError::TypeMismatch {
                operation: "+".to_string(),
                expected: "matching Numbers, Strings or Arrays".to_string(),
                found: format!("{} and {}", type_name(left), type_name(right)),
            }),
        },
        BinaryOp::Sub | BinaryOp::Mul => match (as_number(left), as_number(right)) {
            (Some(l), Some(r)) if left.is_number() && right.is_number() => Ok(number(match op {
                BinaryOp::Sub => l - r,
                BinaryOp::Mul => l * r,
                BinaryOp::Add => unreachable!(),
            })),
            _ => Err(EvalError::TypeMismatch {
                operation: op.to_string(),
                expected: "Number".to_string(),
                found: format!("{} and {}", type_name(left), type_name(right)),
            }),
        },
    }
}

fn subscript(container: &Value, key: &Value) -> Result<Value, EvalError> {
    match (container, key) {
        (Value::Array(items), Value::Number(_)) => {
            let raw = key.as_f64().unwrap_or(0.0);
            let idx = if raw < 0.0 {
                let adjusted = items.len() as f64 + raw;
                if adjusted < 0.0 {
                    return Err(EvalError::LookupFailed(format!("index {} out of range", raw)));
                }
                adjusted as usize
            } else {
                raw as usize
            };
            items
                .get(idx)
                .cloned()
                .ok_or_else(|| EvalError::LookupFailed(format!("index {} out of range", raw)))
        }
        (Value::Object(map), Value::String(k)) => map
            .get(k)
            .cloned()
            .ok_or_else(|| EvalError::LookupFailed(format!("no key '{}'", k))),
        (Value::String(s), Value::Number(_)) => {
            let idx = key.as_f64().unwrap_or(0.0) as usize;
            s.chars()
                .nth(idx)
                .map(|c| Value::String(c.to_string()))
                .ok_or_else(|| EvalError::LookupFailed(format!("index {} out of range", idx)))
        }
        _ => Err(EvalError::TypeMismatch {
            operation: "[]".to_string(),
            expected: "Array[Number], Map[String] or String[Number]".to_string(),
            found: format!("{}[{}]", type_name(container), type_name(key)),
        }),
    }
}
