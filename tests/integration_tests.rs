//! Integration tests for graph definition, validation and execution
//!
//! These tests verify end-to-end engine behavior using mock capabilities.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use taskflow_rs::error::{BoxError, GraphError};
use taskflow_rs::expr;
use taskflow_rs::graph::{
    compile, topological_order, EdgeSpec, Executor, GraphDefinition, NodeSpec, Validator, END,
};
use taskflow_rs::observer::{RunObserver, RunStatus};
use taskflow_rs::registry::{Capability, CapabilityFactory, CapabilityRegistry};

// ============================================================================
// Mock Components
// ============================================================================

/// Capability that returns a fixed output and counts its invocations.
struct MockCapability {
    output: Value,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Capability for MockCapability {
    async fn execute(&self, _state: &Map<String, Value>) -> Result<Value, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.output.clone())
    }
}

struct MockFactory {
    decision: bool,
    calls: Arc<AtomicUsize>,
}

impl MockFactory {
    fn new(decision: bool) -> Self {
        Self {
            decision,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl CapabilityFactory for MockFactory {
    fn create(
        &self,
        node_id: &str,
        config: &Map<String, Value>,
    ) -> Result<Arc<dyn Capability>, BoxError> {
        let output = config
            .get("output")
            .cloned()
            .unwrap_or_else(|| json!({ "ran": node_id }));
        Ok(Arc::new(MockCapability {
            output,
            calls: self.calls.clone(),
        }))
    }

    fn is_decision(&self) -> bool {
        self.decision
    }
}

/// Decision capability that reports how many times it has run.
struct AttemptCapability {
    attempts: Arc<AtomicUsize>,
}

#[async_trait]
impl Capability for AttemptCapability {
    async fn execute(&self, _state: &Map<String, Value>) -> Result<Value, BoxError> {
        let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(json!({ "attempt": n }))
    }
}

struct AttemptFactory {
    attempts: Arc<AtomicUsize>,
}

impl CapabilityFactory for AttemptFactory {
    fn create(
        &self,
        _node_id: &str,
        _config: &Map<String, Value>,
    ) -> Result<Arc<dyn Capability>, BoxError> {
        Ok(Arc::new(AttemptCapability {
            attempts: self.attempts.clone(),
        }))
    }

    fn is_decision(&self) -> bool {
        true
    }
}

/// Capability whose execute always fails.
struct FailingCapability;

#[async_trait]
impl Capability for FailingCapability {
    async fn execute(&self, _state: &Map<String, Value>) -> Result<Value, BoxError> {
        Err("deliberate failure".into())
    }
}

struct FailingFactory;

impl CapabilityFactory for FailingFactory {
    fn create(
        &self,
        _node_id: &str,
        _config: &Map<String, Value>,
    ) -> Result<Arc<dyn Capability>, BoxError> {
        Ok(Arc::new(FailingCapability))
    }
}

/// Observer that records every notification for later assertions.
#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<(RunStatus, Option<String>)>>,
}

impl RecordingObserver {
    fn statuses(&self) -> Vec<RunStatus> {
        self.events.lock().unwrap().iter().map(|(s, _)| *s).collect()
    }
}

#[async_trait]
impl RunObserver for RecordingObserver {
    async fn notify(
        &self,
        _run_id: &str,
        status: RunStatus,
        node_id: Option<&str>,
        _output: Option<&Value>,
    ) -> Result<(), BoxError> {
        self.events
            .lock()
            .unwrap()
            .push((status, node_id.map(|s| s.to_string())));
        Ok(())
    }
}

fn test_registry() -> CapabilityRegistry {
    let mut registry = CapabilityRegistry::new();
    registry.register("task", Arc::new(MockFactory::new(false)));
    registry.register("decision", Arc::new(MockFactory::new(true)));
    registry.register("failing", Arc::new(FailingFactory));
    registry
}

fn node(id: &str, node_type: &str) -> NodeSpec {
    NodeSpec::new(id, node_type, Map::new()).unwrap()
}

fn edge(id: &str, source: &str, target: &str) -> EdgeSpec {
    EdgeSpec::new(id, source, target).unwrap()
}

// ============================================================================
// Construction invariants
// ============================================================================

#[test]
fn duplicate_node_ids_fail_before_validation() {
    let err = GraphDefinition::new("g", vec![node("a", "task"), node("a", "task")], vec![])
        .unwrap_err();
    assert_eq!(err, GraphError::DuplicateNodeId("a".to_string()));
}

#[test]
fn self_loop_edges_fail_construction() {
    let err = EdgeSpec::new("e", "a", "a").unwrap_err();
    assert_eq!(err, GraphError::SelfLoop("e".to_string()));
}

#[test]
fn linear_graph_resolves_first_node_as_entry() {
    let def = GraphDefinition::new(
        "g",
        vec![node("A", "task"), node("B", "task"), node("C", "task")],
        vec![edge("e1", "A", "B"), edge("e2", "B", "C")],
    )
    .unwrap();
    assert_eq!(def.resolved_entry_point(), Some("A"));
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn plain_cycle_is_a_circular_dependency_error() {
    let def = GraphDefinition::new(
        "g",
        vec![node("A", "task"), node("B", "task")],
        vec![edge("e1", "A", "B"), edge("e2", "B", "A")],
    )
    .unwrap();
    let registry = test_registry();
    let result = Validator::new(&registry).validate(&def);

    assert!(!result.valid);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].code, "CIRCULAR_DEPENDENCY");
    assert_eq!(result.errors[0].context["cyclePath"], json!(["A", "B", "A"]));
}

#[test]
fn decision_with_exit_downgrades_cycle_to_warning() {
    // A -> B -> C(decision) -> A, plus C -> D leaving the cycle
    let def = GraphDefinition::new(
        "g",
        vec![
            node("A", "task"),
            node("B", "task"),
            node("C", "decision"),
            node("D", "task"),
        ],
        vec![
            edge("e1", "A", "B"),
            edge("e2", "B", "C"),
            edge("e3", "C", "A").with_condition("retry == true"),
            edge("e4", "C", "D"),
            edge("e5", "D", END),
        ],
    )
    .unwrap();
    let registry = test_registry();
    let result = Validator::new(&registry).validate(&def);

    assert!(result.valid);
    let loop_warning = result
        .warnings
        .iter()
        .find(|w| w.code == "CONTROLLED_LOOP")
        .expect("controlled loop warning");
    assert_eq!(loop_warning.context["conditionNodeId"], json!("C"));
}

#[test]
fn wire_round_trip_validates_identically() {
    // carries an error (bad condition) and warnings (mixed edges, dead end)
    let def = GraphDefinition::new(
        "g",
        vec![node("A", "task"), node("B", "task"), node("C", "task")],
        vec![
            edge("e1", "A", "B").with_condition("lambda x: x"),
            edge("e2", "A", "C"),
        ],
    )
    .unwrap();
    let registry = test_registry();
    let validator = Validator::new(&registry);

    let original = validator.validate(&def);
    let wire = serde_json::to_value(&def).unwrap();
    let reconstructed = GraphDefinition::from_wire(wire).unwrap();
    let round_tripped = validator.validate(&reconstructed);

    let codes = |r: &taskflow_rs::graph::ValidationResult| {
        (
            r.errors.iter().map(|i| i.code.clone()).collect::<Vec<_>>(),
            r.warnings.iter().map(|i| i.code.clone()).collect::<Vec<_>>(),
        )
    };
    assert_eq!(codes(&original), codes(&round_tripped));
    assert_eq!(original.valid, round_tripped.valid);
}

// ============================================================================
// Expression sandbox
// ============================================================================

#[test]
fn evaluate_compound_condition() {
    let mut context = Map::new();
    context.insert("x".to_string(), json!(11));
    context.insert("y".to_string(), json!("ok"));
    let result = expr::evaluate_str("x > 10 and y == 'ok'", &context).unwrap();
    assert_eq!(result, json!(true));
}

#[test]
fn evaluate_fails_on_undefined_name() {
    let context = Map::new();
    let err = expr::evaluate_str("x > 10", &context).unwrap_err();
    assert!(err.to_string().contains("'x'"));
}

#[test]
fn static_check_flags_function_calls_without_evaluating() {
    let issues = expr::static_check("open('x')");
    assert!(!issues.is_empty());
    assert!(issues.iter().any(|i| i.contains("call")));
}

// ============================================================================
// Routing
// ============================================================================

#[tokio::test]
async fn first_declared_truthy_branch_wins() {
    // both conditions are always true; the probe behind the second edge
    // must never run
    let probe = MockFactory::new(false);
    let probe_calls = probe.calls.clone();
    let mut registry = test_registry();
    registry.register("probe", Arc::new(probe));

    let def = GraphDefinition::new(
        "g",
        vec![
            node("pick", "decision"),
            node("first", "task"),
            node("second", "probe"),
        ],
        vec![
            edge("e1", "pick", "first").with_condition("true"),
            edge("e2", "pick", "second").with_condition("true"),
            edge("e3", "first", END),
            edge("e4", "second", END),
        ],
    )
    .unwrap();
    let graph = Arc::new(compile(&def, &registry).unwrap());
    let executor = Executor::new(Arc::new(RecordingObserver::default()));
    let report = executor.run(graph, Map::new(), "run-routing").await;

    assert!(report.success);
    assert!(report.state.get("first").is_some());
    assert!(report.state.get("second").is_none());
    assert_eq!(probe_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn conditions_read_freshly_merged_output() {
    let mut config = Map::new();
    config.insert("output".to_string(), json!({ "verdict": "retry" }));
    let def = GraphDefinition::new(
        "g",
        vec![
            NodeSpec::new("check", "decision", config).unwrap(),
            node("again", "task"),
            node("done", "task"),
        ],
        vec![
            edge("e1", "check", "again").with_condition("check.verdict == 'retry'"),
            edge("e2", "check", "done").with_condition("check.verdict == 'done'"),
            edge("e3", "again", END),
            edge("e4", "done", END),
        ],
    )
    .unwrap();
    let registry = test_registry();
    let graph = Arc::new(compile(&def, &registry).unwrap());
    let executor = Executor::new(Arc::new(RecordingObserver::default()));
    let report = executor.run(graph, Map::new(), "run-fresh").await;

    assert!(report.success);
    assert!(report.state.get("again").is_some());
    assert!(report.state.get("done").is_none());
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn diamond_orders_dependencies_first() {
    let def = GraphDefinition::new(
        "g",
        vec![
            node("A", "task"),
            node("B", "task"),
            node("C", "task"),
            node("D", "task"),
        ],
        vec![
            edge("e1", "A", "B"),
            edge("e2", "A", "C"),
            edge("e3", "B", "D"),
            edge("e4", "C", "D"),
        ],
    )
    .unwrap();
    let registry = test_registry();
    let order = topological_order(&def, &registry).unwrap();

    let pos = |id: &str| order.iter().position(|n| n == id).unwrap();
    assert!(pos("A") < pos("B"));
    assert!(pos("A") < pos("C"));
    assert!(pos("B") < pos("D"));
    assert!(pos("C") < pos("D"));
}

// ============================================================================
// Execution
// ============================================================================

#[tokio::test]
async fn failed_node_returns_partial_state() {
    let def = GraphDefinition::new(
        "g",
        vec![
            node("first", "task"),
            node("broken", "failing"),
            node("after", "task"),
        ],
        vec![
            edge("e1", "first", "broken"),
            edge("e2", "broken", "after"),
            edge("e3", "after", END),
        ],
    )
    .unwrap();
    let registry = test_registry();
    let graph = Arc::new(compile(&def, &registry).unwrap());
    let observer = Arc::new(RecordingObserver::default());
    let executor = Executor::new(observer.clone());
    let report = executor.run(graph, Map::new(), "run-partial").await;

    assert!(!report.success);
    assert!(report.error.as_deref().unwrap().contains("deliberate"));
    // the first node's output survives under its own id
    assert_eq!(report.state.get_path("first.ran"), Some(&json!("first")));
    assert!(report.state.get("after").is_none());

    let statuses = observer.statuses();
    assert_eq!(statuses.last(), Some(&RunStatus::WorkflowError));
    assert!(statuses.contains(&RunStatus::Error));
    assert!(!statuses.contains(&RunStatus::WorkflowComplete));
}

#[tokio::test]
async fn full_lifecycle_notifications_for_successful_run() {
    let def = GraphDefinition::new(
        "g",
        vec![node("A", "task"), node("B", "task")],
        vec![edge("e1", "A", "B"), edge("e2", "B", END)],
    )
    .unwrap();
    let registry = test_registry();
    let graph = Arc::new(compile(&def, &registry).unwrap());
    let observer = Arc::new(RecordingObserver::default());
    let executor = Executor::new(observer.clone());
    let report = executor.run(graph, Map::new(), "run-lifecycle").await;

    assert!(report.success);
    let statuses = observer.statuses();
    assert_eq!(statuses.first(), Some(&RunStatus::WorkflowStart));
    assert_eq!(statuses.last(), Some(&RunStatus::WorkflowComplete));
    // pending for both nodes before anything runs
    assert_eq!(statuses[1], RunStatus::Pending);
    assert_eq!(statuses[2], RunStatus::Pending);
    assert_eq!(
        statuses.iter().filter(|s| **s == RunStatus::Completed).count(),
        2
    );
}

#[tokio::test]
async fn controlled_loop_runs_until_budget() {
    // check unconditionally loops back; the budget ends the run
    let def = GraphDefinition::new(
        "g",
        vec![node("work", "task"), node("check", "decision")],
        vec![
            edge("e1", "work", "check"),
            edge("e2", "check", "work").with_condition("true"),
            edge("e3", "check", END),
        ],
    )
    .unwrap()
    .with_max_iterations(2);
    let registry = test_registry();
    let graph = Arc::new(compile(&def, &registry).unwrap());
    let observer = Arc::new(RecordingObserver::default());
    let executor = Executor::new(observer.clone());
    let report = executor.run(graph, Map::new(), "run-budget").await;

    assert!(!report.success);
    assert!(report.error.as_deref().unwrap().contains("budget"));
    // budget overrun is not attributable to one node
    let events = observer.events.lock().unwrap();
    let error_events: Vec<_> = events
        .iter()
        .filter(|(s, _)| *s == RunStatus::Error)
        .collect();
    assert!(error_events.is_empty());
}

#[tokio::test]
async fn controlled_loop_exits_through_its_condition() {
    // work -> check, looping back while check.attempt < 3, then falling
    // through the unconditional edge to done
    let work = MockFactory::new(false);
    let work_calls = work.calls.clone();
    let attempts = Arc::new(AtomicUsize::new(0));
    let mut registry = CapabilityRegistry::new();
    registry.register("work", Arc::new(work));
    registry.register("done", Arc::new(MockFactory::new(false)));
    registry.register(
        "attempt",
        Arc::new(AttemptFactory {
            attempts: attempts.clone(),
        }),
    );

    let def = GraphDefinition::new(
        "g",
        vec![
            node("work", "work"),
            node("check", "attempt"),
            node("done", "done"),
        ],
        vec![
            edge("e1", "work", "check"),
            edge("e2", "check", "work").with_condition("check.attempt < 3"),
            edge("e3", "check", "done"),
            edge("e4", "done", END),
        ],
    )
    .unwrap();
    let result = Validator::new(&registry).validate(&def);
    assert!(result.valid);

    let graph = Arc::new(compile(&def, &registry).unwrap());
    let observer = Arc::new(RecordingObserver::default());
    let executor = Executor::new(observer.clone());
    let report = executor.run(graph, Map::new(), "run-loop-exit").await;

    assert!(report.success);
    assert!(report.error.is_none());
    // the loop body ran three times before the condition cleared
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(work_calls.load(Ordering::SeqCst), 3);
    assert_eq!(report.state.get_path("check.attempt"), Some(&json!(3)));
    // the post-loop node executed after the exit
    assert_eq!(report.state.get_path("done.ran"), Some(&json!("done")));

    let statuses = observer.statuses();
    assert_eq!(statuses.last(), Some(&RunStatus::WorkflowComplete));
    assert!(!statuses.contains(&RunStatus::Error));
    // work and check each completed three times, done once
    assert_eq!(
        statuses.iter().filter(|s| **s == RunStatus::Completed).count(),
        7
    );
}

#[tokio::test]
async fn run_id_is_seeded_into_state() {
    let def = GraphDefinition::new("g", vec![node("A", "task")], vec![edge("e1", "A", END)])
        .unwrap();
    let registry = test_registry();
    let graph = Arc::new(compile(&def, &registry).unwrap());
    let executor = Executor::new(Arc::new(RecordingObserver::default()));
    let report = executor.run(graph, Map::new(), "run-42").await;

    assert!(report.success);
    assert_eq!(report.state.get("run_id"), Some(&json!("run-42")));
    assert_eq!(report.run_id, "run-42");
}
