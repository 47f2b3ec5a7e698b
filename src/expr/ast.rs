// SPDX-License-Identifier: MIT

//! Abstract Syntax Tree for sandboxed condition expressions
//!
//! This is a closed tagged union: the parser can only ever produce these
//! shapes, so the evaluator has a finite allow-list of operations and nothing
//! outside it is expressible.

use std::fmt;

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal value: string, number, bool or null
    Literal(Literal),
    /// Name lookup against the evaluation context
    Name(String),
    /// Comparison chain: `left op1 e1 op2 e2 ...`, pairwise-ANDed
    Compare {
        left: Box<Expr>,
        comparators: Vec<(CompareOp, Expr)>,
    },
    /// `and` / `or` over two or more operands, short-circuiting
    BoolOp { op: BoolOp, values: Vec<Expr> },
    /// Unary `not`, `-`, `+`
    Unary { op: UnaryOp, operand: Box<Expr> },
    /// Binary `+`, `-`, `*`
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Subscript access `a[b]`
    Subscript { value: Box<Expr>, index: Box<Expr> },
    /// Attribute access `a.b`, only legal when `a` evaluates to a map
    Attribute { value: Box<Expr>, attr: String },
    /// List literal `[a, b]`
    List(Vec<Expr>),
    /// Tuple literal `(a, b)`, evaluates to the same array shape as a list
    Tuple(Vec<Expr>),
    /// Dict literal `{'k': v}`
    Dict(Vec<(Expr, Expr)>),
    /// Ternary conditional `a if cond else b`
    Ternary {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

/// Literal values in expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Number(f64),
    Boolean(bool),
    Null,
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompareOp {
    /// ==
    Eq,
    /// !=
    NotEq,
    /// >
    Gt,
    /// >=
    Gte,
    /// <
    Lt,
    /// <=
    Lte,
    /// is (value equality; JSON values carry no identity)
    Is,
    /// is not
    IsNot,
    /// in (membership: array element, substring, map key)
    In,
    /// not in
    NotIn,
}

/// Boolean connectives
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoolOp {
    And,
    Or,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    Not,
    Neg,
    Pos,
}

/// Binary arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareOp::Eq => write!(f, "=="),
            CompareOp::NotEq => write!(f, "!="),
            CompareOp::Gt => write!(f, ">"),
            CompareOp::Gte => write!(f, ">="),
            CompareOp::Lt => write!(f, "<"),
            CompareOp::Lte => write!(f, "<="),
            CompareOp::Is => write!(f, "is"),
            CompareOp::IsNot => write!(f, "is not"),
            CompareOp::In => write!(f, "in"),
            CompareOp::NotIn => write!(f, "not in"),
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryOp::Add => write!(f, "+"),
            BinaryOp::Sub => write!(f, "-"),
            BinaryOp::Mul => write!(f, "*"),
        }
    }
}
