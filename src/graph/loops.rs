// SPDX-License-Identifier: MIT

//! Cycle detection and classification
//!
//! Loops are legal as long as something can break them: a cycle is
//! *controlled* when it passes through a decision-typed node that has at
//! least one edge leaving the cycle (including an edge to [`END`]). Ordering
//! falls back from a strict topological sort to traversal discovery order
//! for the nodes caught in controlled loops.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::error::GraphError;
use crate::graph::types::{GraphDefinition, END};
use crate::registry::CapabilityRegistry;

/// One cycle found in the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopInfo {
    /// Node ids along the cycle, in traversal order
    pub nodes: Vec<String>,
    /// Whether a decision node inside the cycle can route out of it
    pub controlled: bool,
    /// The decision node that can break the cycle, when one exists
    pub controlling_node: Option<String>,
}

impl LoopInfo {
    /// The cycle as a closed path, `[A, B, A]` style.
    pub fn cycle_path(&self) -> Vec<String> {
        let mut path = self.nodes.clone();
        if let Some(first) = self.nodes.first() {
            path.push(first.clone());
        }
        path
    }
}

/// Find every distinct cycle in the graph and classify it.
///
/// Cycles are deduplicated by their node sets, so `A -> B -> A` is reported
/// once regardless of which node the traversal entered it from.
pub fn detect_loops(def: &GraphDefinition, registry: &CapabilityRegistry) -> Vec<LoopInfo> {
    let adjacency = def.adjacency();
    let mut loops: Vec<LoopInfo> = Vec::new();
    let mut seen_sets: HashSet<BTreeSet<String>> = HashSet::new();

    for start in &def.nodes {
        let mut path: Vec<&str> = Vec::new();
        let mut on_path: HashSet<&str> = HashSet::new();
        walk(
            start.id.as_str(),
            &adjacency,
            &mut path,
            &mut on_path,
            &mut |cycle: &[&str]| {
                let set: BTreeSet<String> = cycle.iter().map(|s| s.to_string()).collect();
                if seen_sets.insert(set) {
                    let nodes: Vec<String> = cycle.iter().map(|s| s.to_string()).collect();
                    let controlling_node = controlling_node(&nodes, def, registry);
                    loops.push(LoopInfo {
                        nodes,
                        controlled: controlling_node.is_some(),
                        controlling_node,
                    });
                }
            },
        );
    }
    loops
}

fn walk<'a>(
    node: &'a str,
    adjacency: &HashMap<&'a str, Vec<&'a str>>,
    path: &mut Vec<&'a str>,
    on_path: &mut HashSet<&'a str>,
    found: &mut impl FnMut(&[&str]),
) {
    if on_path.contains(node) {
        if let Some(start) = path.iter().position(|&n| n == node) {
            found(&path[start..]);
        }
        return;
    }
    path.push(node);
    on_path.insert(node);
    if let Some(next) = adjacency.get(node) {
        for &target in next {
            walk(target, adjacency, path, on_path, found);
        }
    }
    path.pop();
    on_path.remove(node);
}

/// A cycle is controlled when it contains a decision node with an edge
/// whose target lies outside the cycle (or is [`END`]). Returns the first
/// such node along the cycle.
fn controlling_node(
    cycle: &[String],
    def: &GraphDefinition,
    registry: &CapabilityRegistry,
) -> Option<String> {
    let in_cycle: HashSet<&str> = cycle.iter().map(|s| s.as_str()).collect();
    cycle
        .iter()
        .find(|node_id| {
            let Some(node) = def.node(node_id) else {
                return false;
            };
            registry.is_decision_type(&node.node_type)
                && def
                    .outgoing(node_id)
                    .iter()
                    .any(|e| e.target == END || !in_cycle.contains(e.target.as_str()))
        })
        .cloned()
}

/// Compute an execution-friendly ordering of the graph's nodes.
///
/// Kahn's algorithm first; nodes it can order come out in dependency order
/// with declaration order breaking ties. Nodes trapped in cycles are
/// appended in traversal discovery order from the entry point, provided
/// every detected cycle is controlled. An uncontrolled cycle is a hard
/// error.
pub fn topological_order(
    def: &GraphDefinition,
    registry: &CapabilityRegistry,
) -> Result<Vec<String>, GraphError> {
    let adjacency = def.adjacency();
    let mut in_degree: HashMap<&str, usize> = def
        .nodes
        .iter()
        .map(|n| (n.id.as_str(), 0))
        .collect();
    for targets in adjacency.values() {
        for &t in targets {
            if let Some(d) = in_degree.get_mut(t) {
                *d += 1;
            }
        }
    }

    let mut order: Vec<String> = Vec::new();
    let mut placed: HashSet<&str> = HashSet::new();
    loop {
        // declaration order breaks ties between ready nodes
        let next = def.nodes.iter().find(|n| {
            !placed.contains(n.id.as_str()) && in_degree[n.id.as_str()] == 0
        });
        let Some(node) = next else { break };
        placed.insert(node.id.as_str());
        order.push(node.id.clone());
        if let Some(targets) = adjacency.get(node.id.as_str()) {
            for &t in targets {
                if let Some(d) = in_degree.get_mut(t) {
                    *d = d.saturating_sub(1);
                }
            }
        }
    }

    if placed.len() == def.nodes.len() {
        return Ok(order);
    }

    let loops = detect_loops(def, registry);
    if loops.iter().any(|l| !l.controlled) {
        let remaining: Vec<String> = def
            .nodes
            .iter()
            .filter(|n| !placed.contains(n.id.as_str()))
            .map(|n| n.id.clone())
            .collect();
        return Err(GraphError::CircularDependency(remaining));
    }

    // Controlled loops: append the trapped nodes in the order a run would
    // first reach them.
    for id in discovery_order(def, &adjacency) {
        if !placed.contains(id) {
            placed.insert(id);
            order.push(id.to_string());
        }
    }
    // disconnected leftovers keep declaration order
    for node in &def.nodes {
        if !placed.contains(node.id.as_str()) {
            order.push(node.id.clone());
        }
    }
    Ok(order)
}

fn discovery_order<'a>(
    def: &'a GraphDefinition,
    adjacency: &HashMap<&'a str, Vec<&'a str>>,
) -> Vec<&'a str> {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut order: Vec<&str> = Vec::new();
    let mut stack: Vec<&str> = Vec::new();
    if let Some(entry) = def.resolved_entry_point() {
        stack.push(entry);
    }
    while let Some(node) = stack.pop() {
        if !visited.insert(node) {
            continue;
        }
        order.push(node);
        if let Some(targets) = adjacency.get(node) {
            // reverse so declaration-order edges are discovered first
            for &t in targets.iter().rev() {
                if !visited.contains(t) {
                    stack.push(t);
                }
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::types::{EdgeSpec, NodeSpec};
    use crate::registry::{Capability, CapabilityFactory, CapabilityRegistry};
    use crate::error::BoxError;
    use async_trait::async_trait;
    use serde_json::{Map, Value};
    use std::sync::Arc;

    struct Noop;

    #[async_trait]
    impl Capability for Noop {
        async fn execute(&self, _state: &Map<String, Value>) -> Result<Value, BoxError> {
            Ok(Value::Null)
        }
    }

    struct NoopFactory {
        decision: bool,
    }

    impl CapabilityFactory for NoopFactory {
        fn create(
            &self,
            _node_id: &str,
            _config: &Map<String, Value>,
        ) -> Result<Arc<dyn Capability>, BoxError> {
            Ok(Arc::new(Noop))
        }

        fn is_decision(&self) -> bool {
            self.decision
        }
    }

    fn registry() -> CapabilityRegistry {
        let mut registry = CapabilityRegistry::new();
        registry.register("task", Arc::new(NoopFactory { decision: false }));
        registry.register("decision", Arc::new(NoopFactory { decision: true }));
        registry
    }

    fn node(id: &str, node_type: &str) -> NodeSpec {
        NodeSpec::new(id, node_type, Map::new()).unwrap()
    }

    fn edge(id: &str, source: &str, target: &str) -> EdgeSpec {
        EdgeSpec::new(id, source, target).unwrap()
    }

    #[test]
    fn test_acyclic_graph_has_no_loops() {
        let def = GraphDefinition::new(
            "g",
            vec![node("A", "task"), node("B", "task")],
            vec![edge("e1", "A", "B")],
        )
        .unwrap();
        assert!(detect_loops(&def, &registry()).is_empty());
    }

    #[test]
    fn test_uncontrolled_cycle_detected() {
        let def = GraphDefinition::new(
            "g",
            vec![node("A", "task"), node("B", "task")],
            vec![edge("e1", "A", "B"), edge("e2", "B", "A")],
        )
        .unwrap();
        let loops = detect_loops(&def, &registry());
        assert_eq!(loops.len(), 1);
        assert!(!loops[0].controlled);
        assert_eq!(loops[0].nodes.len(), 2);
    }

    #[test]
    fn test_decision_with_exit_controls_the_loop() {
        // work -> check -> work, plus check -> END
        let def = GraphDefinition::new(
            "g",
            vec![node("work", "task"), node("check", "decision")],
            vec![
                edge("e1", "work", "check"),
                edge("e2", "check", "work").with_condition("retry == true"),
                edge("e3", "check", END),
            ],
        )
        .unwrap();
        let loops = detect_loops(&def, &registry());
        assert_eq!(loops.len(), 1);
        assert!(loops[0].controlled);
        assert_eq!(loops[0].controlling_node.as_deref(), Some("check"));
        // closed path repeats the first node
        let path = loops[0].cycle_path();
        assert_eq!(path.first(), path.last());
        assert_eq!(path.len(), 3);
    }

    #[test]
    fn test_decision_without_exit_does_not_control() {
        // decision node exists but every edge stays inside the cycle
        let def = GraphDefinition::new(
            "g",
            vec![node("A", "task"), node("B", "decision")],
            vec![edge("e1", "A", "B"), edge("e2", "B", "A")],
        )
        .unwrap();
        let loops = detect_loops(&def, &registry());
        assert_eq!(loops.len(), 1);
        assert!(!loops[0].controlled);
    }

    #[test]
    fn test_cycle_deduplicated_across_entry_points() {
        // the same A<->B cycle is reachable from both nodes
        let def = GraphDefinition::new(
            "g",
            vec![node("A", "task"), node("B", "task"), node("C", "task")],
            vec![
                edge("e1", "A", "B"),
                edge("e2", "B", "A"),
                edge("e3", "C", "A"),
            ],
        )
        .unwrap();
        assert_eq!(detect_loops(&def, &registry()).len(), 1);
    }

    #[test]
    fn test_topological_order_linear() {
        let def = GraphDefinition::new(
            "g",
            vec![node("C", "task"), node("A", "task"), node("B", "task")],
            vec![edge("e1", "A", "B"), edge("e2", "B", "C")],
        )
        .unwrap();
        let order = topological_order(&def, &registry()).unwrap();
        assert_eq!(order, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_topological_order_rejects_uncontrolled_cycle() {
        let def = GraphDefinition::new(
            "g",
            vec![node("A", "task"), node("B", "task")],
            vec![edge("e1", "A", "B"), edge("e2", "B", "A")],
        )
        .unwrap();
        let err = topological_order(&def, &registry()).unwrap_err();
        assert!(matches!(err, GraphError::CircularDependency(_)));
    }

    #[test]
    fn test_topological_order_with_controlled_loop() {
        // start -> work -> check, check loops back to work or exits
        let def = GraphDefinition::new(
            "g",
            vec![
                node("start", "task"),
                node("work", "task"),
                node("check", "decision"),
            ],
            vec![
                edge("e1", "start", "work"),
                edge("e2", "work", "check"),
                edge("e3", "check", "work").with_condition("retry == true"),
                edge("e4", "check", END),
            ],
        )
        .unwrap();
        let order = topological_order(&def, &registry()).unwrap();
        assert_eq!(order.len(), 3);
        assert_eq!(order[0], "start");
        // work and check are in the loop; discovery order reaches work first
        assert_eq!(order[1], "work");
        assert_eq!(order[2], "check");
    }
}
