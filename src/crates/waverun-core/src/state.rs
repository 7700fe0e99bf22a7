//! Shared execution state
//!
//! [`ExecutionState`] is the single mutable structure shared between the
//! scheduler and its wave workers. It carries per-node status, input,
//! output, config, resolved config, error, and timestamps, plus loop
//! iteration counts and loop-input overrides, all behind one
//! `parking_lot::RwLock`.
//!
//! Every accessor is a short critical section with no I/O and no `.await`
//! inside; workers publish results exclusively through these mutators.
//!
//! # Memory estimation
//!
//! [`estimate_value_size`] computes a recursive byte estimate of a JSON
//! value (strings by length, sequences and mappings by sum, a fixed small
//! constant for scalars). [`ExecutionState::total_memory_usage`] sums the
//! estimate over all node outputs; the scheduler uses it for the soft
//! memory-cap warning.

use crate::model::{NodeExecution, NodeStatus, Workflow};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Byte estimate charged for a number, boolean, or other scalar
const SCALAR_SIZE: usize = 8;

/// Linkage from a child execution back to the fan-out item that spawned it
#[derive(Debug, Clone)]
pub struct ParentLink {
    pub execution_id: String,
    pub node_id: String,
    pub item_index: usize,
    pub item_key: Option<String>,
}

#[derive(Debug, Default)]
struct StateInner {
    statuses: HashMap<String, NodeStatus>,
    inputs: HashMap<String, Value>,
    outputs: HashMap<String, Value>,
    configs: HashMap<String, Map<String, Value>>,
    resolved_configs: HashMap<String, Map<String, Value>>,
    errors: HashMap<String, String>,
    started_at: HashMap<String, DateTime<Utc>>,
    finished_at: HashMap<String, DateTime<Utc>>,
    loop_iterations: HashMap<String, u32>,
    loop_inputs: HashMap<String, Value>,
    resources: HashMap<String, Value>,
}

/// Mutable state of one execution, shared by parallel workers
///
/// Constructed from a workflow snapshot when the execution starts and
/// destroyed when the execution record is handed back to the caller.
#[derive(Debug)]
pub struct ExecutionState {
    pub execution_id: String,
    pub workflow: Arc<Workflow>,
    pub input: Map<String, Value>,
    pub variables: Map<String, Value>,
    pub parent: Option<ParentLink>,
    inner: RwLock<StateInner>,
}

impl ExecutionState {
    /// Create state for a fresh execution with a generated ID
    pub fn new(workflow: Arc<Workflow>, input: Map<String, Value>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), workflow, input)
    }

    /// Create state with an explicit execution ID
    pub fn with_id(
        execution_id: impl Into<String>,
        workflow: Arc<Workflow>,
        input: Map<String, Value>,
    ) -> Self {
        let variables = workflow.variables.clone();
        Self {
            execution_id: execution_id.into(),
            workflow,
            input,
            variables,
            parent: None,
            inner: RwLock::new(StateInner::default()),
        }
    }

    /// Overlay execution-scoped variables on top of the workflow variables
    pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        for (key, value) in variables {
            self.variables.insert(key, value);
        }
        self
    }

    /// Attach parent-execution linkage (sub-workflow children)
    pub fn with_parent(mut self, parent: ParentLink) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow.id
    }

    // --- per-node accessors -------------------------------------------------

    pub fn set_status(&self, node_id: &str, status: NodeStatus) {
        self.inner
            .write()
            .statuses
            .insert(node_id.to_string(), status);
    }

    pub fn status(&self, node_id: &str) -> Option<NodeStatus> {
        self.inner.read().statuses.get(node_id).copied()
    }

    pub fn set_input(&self, node_id: &str, input: Value) {
        self.inner.write().inputs.insert(node_id.to_string(), input);
    }

    pub fn input(&self, node_id: &str) -> Option<Value> {
        self.inner.read().inputs.get(node_id).cloned()
    }

    pub fn set_output(&self, node_id: &str, output: Value) {
        self.inner
            .write()
            .outputs
            .insert(node_id.to_string(), output);
    }

    pub fn output(&self, node_id: &str) -> Option<Value> {
        self.inner.read().outputs.get(node_id).cloned()
    }

    pub fn set_config(&self, node_id: &str, config: Map<String, Value>) {
        self.inner
            .write()
            .configs
            .insert(node_id.to_string(), config);
    }

    pub fn config(&self, node_id: &str) -> Option<Map<String, Value>> {
        self.inner.read().configs.get(node_id).cloned()
    }

    pub fn set_resolved_config(&self, node_id: &str, config: Map<String, Value>) {
        self.inner
            .write()
            .resolved_configs
            .insert(node_id.to_string(), config);
    }

    pub fn resolved_config(&self, node_id: &str) -> Option<Map<String, Value>> {
        self.inner.read().resolved_configs.get(node_id).cloned()
    }

    pub fn set_error(&self, node_id: &str, error: impl Into<String>) {
        self.inner
            .write()
            .errors
            .insert(node_id.to_string(), error.into());
    }

    pub fn error(&self, node_id: &str) -> Option<String> {
        self.inner.read().errors.get(node_id).cloned()
    }

    pub fn set_started_at(&self, node_id: &str, at: DateTime<Utc>) {
        self.inner
            .write()
            .started_at
            .insert(node_id.to_string(), at);
    }

    pub fn started_at(&self, node_id: &str) -> Option<DateTime<Utc>> {
        self.inner.read().started_at.get(node_id).copied()
    }

    pub fn set_finished_at(&self, node_id: &str, at: DateTime<Utc>) {
        self.inner
            .write()
            .finished_at
            .insert(node_id.to_string(), at);
    }

    pub fn finished_at(&self, node_id: &str) -> Option<DateTime<Utc>> {
        self.inner.read().finished_at.get(node_id).copied()
    }

    // --- loop bookkeeping ---------------------------------------------------

    /// Times a loop edge has fired so far
    pub fn loop_iteration(&self, edge_id: &str) -> u32 {
        self.inner
            .read()
            .loop_iterations
            .get(edge_id)
            .copied()
            .unwrap_or(0)
    }

    /// Increment a loop edge's firing count and return the new count
    pub fn increment_loop_iteration(&self, edge_id: &str) -> u32 {
        let mut inner = self.inner.write();
        let count = inner.loop_iterations.entry(edge_id.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Stash a loop input for a node, consumed on its next execution
    pub fn set_loop_input(&self, node_id: &str, input: Value) {
        self.inner
            .write()
            .loop_inputs
            .insert(node_id.to_string(), input);
    }

    /// Whether a loop input is pending for a node
    pub fn has_loop_input(&self, node_id: &str) -> bool {
        self.inner.read().loop_inputs.contains_key(node_id)
    }

    /// Remove and return a pending loop input
    pub fn take_loop_input(&self, node_id: &str) -> Option<Value> {
        self.inner.write().loop_inputs.remove(node_id)
    }

    /// Drop a pending loop input without consuming it
    pub fn clear_loop_input(&self, node_id: &str) {
        self.inner.write().loop_inputs.remove(node_id);
    }

    /// Atomically wipe a node's execution state for a loop rewind
    ///
    /// Deletes status, input, output, config, resolved config, error, and
    /// both timestamps in one critical section. Loop iteration counts and
    /// pending loop inputs survive.
    pub fn reset_node_for_loop(&self, node_id: &str) {
        let mut inner = self.inner.write();
        inner.statuses.remove(node_id);
        inner.inputs.remove(node_id);
        inner.outputs.remove(node_id);
        inner.configs.remove(node_id);
        inner.resolved_configs.remove(node_id);
        inner.errors.remove(node_id);
        inner.started_at.remove(node_id);
        inner.finished_at.remove(node_id);
    }

    // --- resources ----------------------------------------------------------

    /// Register a resource payload under an alias for template resolution
    pub fn set_resource(&self, alias: impl Into<String>, payload: Value) {
        self.inner.write().resources.insert(alias.into(), payload);
    }

    pub fn resources(&self) -> HashMap<String, Value> {
        self.inner.read().resources.clone()
    }

    // --- aggregates ---------------------------------------------------------

    /// Byte estimate of all node outputs held by this execution
    pub fn total_memory_usage(&self) -> usize {
        self.inner
            .read()
            .outputs
            .values()
            .map(estimate_value_size)
            .sum()
    }

    /// Snapshot every node of the workflow into execution records
    pub fn build_node_executions(&self) -> Vec<NodeExecution> {
        let inner = self.inner.read();
        self.workflow
            .nodes
            .iter()
            .map(|node| {
                let started = inner.started_at.get(&node.id).copied();
                let finished = inner.finished_at.get(&node.id).copied();
                let duration_ms = match (started, finished) {
                    (Some(s), Some(f)) => (f - s).num_milliseconds().try_into().ok(),
                    _ => None,
                };
                NodeExecution {
                    node_id: node.id.clone(),
                    node_name: node.name.clone(),
                    node_kind: node.kind.clone(),
                    status: inner
                        .statuses
                        .get(&node.id)
                        .copied()
                        .unwrap_or(NodeStatus::Pending),
                    input: inner.inputs.get(&node.id).cloned(),
                    output: inner.outputs.get(&node.id).cloned(),
                    error: inner.errors.get(&node.id).cloned(),
                    started_at: started,
                    finished_at: finished,
                    duration_ms,
                }
            })
            .collect()
    }
}

/// Recursive byte estimate of a JSON value
///
/// Strings count their length, sequences sum their elements, mappings sum
/// key lengths plus value sizes, `null` is free, and every other scalar is
/// charged a fixed small constant. The estimate is monotone in structural
/// containment; it is a heuristic, not an exact accounting.
pub fn estimate_value_size(value: &Value) -> usize {
    match value {
        Value::Null => 0,
        Value::String(s) => s.len(),
        Value::Array(items) => items.iter().map(estimate_value_size).sum(),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| k.len() + estimate_value_size(v))
            .sum(),
        _ => SCALAR_SIZE,
    }
}
