// SPDX-License-Identifier: MIT

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use taskflow_rs::error::BoxError;
use taskflow_rs::graph::{
    compile, detect_loops, topological_order, Executor, GraphDefinition, Validator,
};
use taskflow_rs::observer::LogObserver;
use taskflow_rs::registry::{Capability, CapabilityFactory, CapabilityRegistry};

#[derive(Parser, Debug)]
#[command(author, version, about = "Dynamic task-graph engine", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate a graph definition and print every issue
    Validate {
        /// Path to the graph definition JSON
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Show entry point, ordering hint and loops of a graph
    Inspect {
        /// Path to the graph definition JSON
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Run a graph with the built-in demo capabilities
    Run {
        /// Path to the graph definition JSON
        #[arg(short, long)]
        file: PathBuf,

        /// Initial state as a JSON object
        #[arg(short, long)]
        input: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        Commands::Validate { file } => {
            let def = load_definition(&file)?;
            let registry = demo_registry();
            let result = Validator::new(&registry).validate(&def);
            for issue in result.errors.iter().chain(result.warnings.iter()) {
                println!("{:?} [{}] {}", issue.severity, issue.code, issue.message);
            }
            if !result.valid {
                bail!(
                    "graph '{}' is invalid ({} errors)",
                    def.name,
                    result.errors.len()
                );
            }
            println!(
                "graph '{}' is valid ({} warnings)",
                def.name,
                result.warnings.len()
            );
        }
        Commands::Inspect { file } => {
            let def = load_definition(&file)?;
            let registry = demo_registry();
            println!(
                "entry point: {}",
                def.resolved_entry_point().unwrap_or("<none>")
            );
            match topological_order(&def, &registry) {
                Ok(order) => println!("order hint: {}", order.join(" -> ")),
                Err(e) => println!("order hint: unavailable ({})", e),
            }
            let loops = detect_loops(&def, &registry);
            if loops.is_empty() {
                println!("loops: none");
            }
            for info in loops {
                println!(
                    "loop: {} ({})",
                    info.cycle_path().join(" -> "),
                    if info.controlled {
                        "controlled"
                    } else {
                        "uncontrolled"
                    }
                );
            }
        }
        Commands::Run { file, input } => {
            let def = load_definition(&file)?;
            let registry = demo_registry();
            let graph = Arc::new(compile(&def, &registry)?);
            let initial = match input {
                Some(raw) => parse_input(&raw)?,
                None => Map::new(),
            };
            let run_id = uuid::Uuid::new_v4().to_string();
            let executor = Executor::new(Arc::new(LogObserver));
            let report = executor.run(graph, initial, &run_id).await;
            println!("{}", serde_json::to_string_pretty(&report.state.to_json())?);
            if !report.success {
                bail!(
                    "run {} failed: {}",
                    report.run_id,
                    report.error.unwrap_or_default()
                );
            }
        }
    }

    Ok(())
}

fn load_definition(file: &PathBuf) -> anyhow::Result<GraphDefinition> {
    let raw =
        std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let value: Value =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", file.display()))?;
    GraphDefinition::from_wire(value).context("invalid graph definition")
}

fn parse_input(raw: &str) -> anyhow::Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw).context("parsing --input")? {
        Value::Object(map) => Ok(map),
        _ => bail!("--input must be a JSON object"),
    }
}

/// Looks up a dot-separated path in a state map.
fn lookup<'a>(state: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = state.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Emits a fixed value from its config.
struct ConstantCapability {
    value: Option<Value>,
}

#[async_trait]
impl Capability for ConstantCapability {
    async fn execute(&self, _state: &Map<String, Value>) -> Result<Value, BoxError> {
        Ok(self.value.clone().unwrap_or(Value::Null))
    }

    fn validate_config(&self) -> Vec<String> {
        if self.value.is_none() {
            vec!["config requires a 'value' field".to_string()]
        } else {
            Vec::new()
        }
    }
}

struct ConstantFactory;

impl CapabilityFactory for ConstantFactory {
    fn create(
        &self,
        _node_id: &str,
        config: &Map<String, Value>,
    ) -> Result<Arc<dyn Capability>, BoxError> {
        Ok(Arc::new(ConstantCapability {
            value: config.get("value").cloned(),
        }))
    }
}

/// Upper-cases the string found at the configured state path.
struct UppercaseCapability {
    source: Option<String>,
}

#[async_trait]
impl Capability for UppercaseCapability {
    async fn execute(&self, state: &Map<String, Value>) -> Result<Value, BoxError> {
        let Some(source) = &self.source else {
            return Err("missing 'source' config".into());
        };
        match lookup(state, source).and_then(Value::as_str) {
            Some(text) => Ok(json!({ "text": text.to_uppercase() })),
            None => Err(format!("no string at state path '{}'", source).into()),
        }
    }

    fn validate_config(&self) -> Vec<String> {
        if self.source.is_none() {
            vec!["config requires a 'source' field".to_string()]
        } else {
            Vec::new()
        }
    }
}

struct UppercaseFactory;

impl CapabilityFactory for UppercaseFactory {
    fn create(
        &self,
        _node_id: &str,
        config: &Map<String, Value>,
    ) -> Result<Arc<dyn Capability>, BoxError> {
        Ok(Arc::new(UppercaseCapability {
            source: config
                .get("source")
                .and_then(Value::as_str)
                .map(|s| s.to_string()),
        }))
    }
}

/// Decision capability: compares a state path against a configured value
/// and publishes the outcome as `condition_result`.
struct BranchCapability {
    field: Option<String>,
    equals: Option<Value>,
}

#[async_trait]
impl Capability for BranchCapability {
    async fn execute(&self, state: &Map<String, Value>) -> Result<Value, BoxError> {
        let Some(field) = &self.field else {
            return Err("missing 'field' config".into());
        };
        let matched = match (&self.equals, lookup(state, field)) {
            (Some(expected), Some(actual)) => expected == actual,
            _ => false,
        };
        Ok(json!({ "condition_result": matched }))
    }

    fn validate_config(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.field.is_none() {
            issues.push("config requires a 'field' field".to_string());
        }
        if self.equals.is_none() {
            issues.push("config requires an 'equals' field".to_string());
        }
        issues
    }
}

struct BranchFactory;

impl CapabilityFactory for BranchFactory {
    fn create(
        &self,
        _node_id: &str,
        config: &Map<String, Value>,
    ) -> Result<Arc<dyn Capability>, BoxError> {
        Ok(Arc::new(BranchCapability {
            field: config
                .get("field")
                .and_then(Value::as_str)
                .map(|s| s.to_string()),
            equals: config.get("equals").cloned(),
        }))
    }

    fn is_decision(&self) -> bool {
        true
    }
}

fn demo_registry() -> CapabilityRegistry {
    let mut registry = CapabilityRegistry::new();
    registry.register("constant", Arc::new(ConstantFactory));
    registry.register("uppercase", Arc::new(UppercaseFactory));
    registry.register("branch", Arc::new(BranchFactory));
    registry
}
