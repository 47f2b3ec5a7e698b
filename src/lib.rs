// SPDX-License-Identifier: MIT

//! taskflow-rs: a dynamic task-graph execution engine
//!
//! Workflows are declared as graphs of typed nodes connected by optionally
//! conditional edges, validated against a capability registry, compiled into
//! an executable form and run one node-completion at a time while an
//! observer watches progress.
//!
//! The crate deliberately knows nothing about what nodes *do*: capabilities
//! are registered at startup through [`registry::CapabilityRegistry`] and
//! invoked through the [`registry::Capability`] contract. Edge conditions
//! are written in a small sandboxed expression language ([`expr`]) that can
//! never call functions or reach outside the supplied state.

pub mod error;
pub mod expr;
pub mod graph;
pub mod observer;
pub mod registry;
pub mod state;
