//! Sub-workflow fan-out
//!
//! A node whose kind is `sub_workflow` is dispatched by the scheduler
//! itself: it evaluates a `for_each` path over the node's input, loads the
//! referenced child workflow, and drives one child execution per element
//! under a bounded-parallel fan-out. Each child runs against a clone of
//! the child workflow with a fresh ID and its own derived cancellation
//! token, so `fail_fast` can cancel siblings without touching the parent.
//!
//! # Config
//!
//! | key | default | effect |
//! |---|---|---|
//! | `workflow_id` | required | child workflow resolved via the loader |
//! | `for_each` | required | dot-path to a sequence (`input` prefix = root) |
//! | `item_var` | `"item"` | key the element is injected under |
//! | `max_parallelism` | 0 (all at once) | cap on concurrent children |
//! | `on_error` | `"fail_fast"` | or `"collect_partial"` |
//! | `timeout_per_item` | 0 (inherit) | per-child deadline in milliseconds |
//!
//! # Output
//!
//! ```text
//! { items: [ {index, status, execution_id, output?, error?, duration_ms}, ... ],
//!   summary: { total, completed, failed } }
//! ```

use crate::error::{Result, WorkflowError};
use crate::event::EventType;
use crate::executor::DagExecutor;
use crate::model::{ExecutionStatus, Node};
use crate::node::NodeResult;
use crate::options::ExecutionOptions;
use crate::state::{ExecutionState, ParentLink};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Sibling handling when an item fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnItemError {
    /// First failure cancels the remaining children and fails the node
    FailFast,
    /// Failures are recorded per item and the node still completes
    CollectPartial,
}

/// Parsed fan-out configuration
#[derive(Debug, Clone)]
pub struct SubWorkflowConfig {
    pub workflow_id: String,
    pub for_each: String,
    pub item_var: String,
    pub max_parallelism: usize,
    pub on_error: OnItemError,
    pub timeout_per_item: Option<Duration>,
}

impl SubWorkflowConfig {
    /// Parse from a node config record
    ///
    /// Values arrive as strings in serialized workflows; numeric entries
    /// are accepted in either form.
    pub fn parse(config: &Map<String, Value>) -> Result<Self> {
        let workflow_id = required_string(config, "workflow_id")?;
        let for_each = required_string(config, "for_each")?;

        let item_var = match config.get("item_var") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            _ => "item".to_string(),
        };

        let max_parallelism = numeric_entry(config, "max_parallelism")?.unwrap_or(0) as usize;

        let on_error = match config.get("on_error") {
            None => OnItemError::FailFast,
            Some(Value::String(s)) => match s.as_str() {
                "fail_fast" | "" => OnItemError::FailFast,
                "collect_partial" => OnItemError::CollectPartial,
                other => {
                    return Err(WorkflowError::Validation(format!(
                        "unknown on_error mode '{other}'"
                    )));
                }
            },
            Some(other) => {
                return Err(WorkflowError::Validation(format!(
                    "on_error must be a string, got {other}"
                )));
            }
        };

        let timeout_per_item = match numeric_entry(config, "timeout_per_item")?.unwrap_or(0) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        Ok(Self {
            workflow_id,
            for_each,
            item_var,
            max_parallelism,
            on_error,
            timeout_per_item,
        })
    }
}

fn required_string(config: &Map<String, Value>, key: &str) -> Result<String> {
    match config.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(other) => Err(WorkflowError::Validation(format!(
            "'{key}' must be a non-empty string, got {other}"
        ))),
        None => Err(WorkflowError::Validation(format!(
            "missing required config key '{key}'"
        ))),
    }
}

fn numeric_entry(config: &Map<String, Value>, key: &str) -> Result<Option<u64>> {
    match config.get(key) {
        None => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_u64()),
        Some(Value::String(s)) => s.parse::<u64>().map(Some).map_err(|_| {
            WorkflowError::Validation(format!("'{key}' must be a non-negative integer, got '{s}'"))
        }),
        Some(other) => Err(WorkflowError::Validation(format!(
            "'{key}' must be a number, got {other}"
        ))),
    }
}

/// Walk a dot-path over the node input and demand a sequence
///
/// The first segment `input` is a synonym for the root.
pub fn resolve_for_each(root: &Value, path: &str) -> Result<Vec<Value>> {
    let mut segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
    if segments.first() == Some(&"input") {
        segments.remove(0);
    }

    let mut current = root;
    for segment in &segments {
        current = current.get(segment).ok_or_else(|| {
            WorkflowError::Validation(format!(
                "for_each path '{path}' does not resolve: missing segment '{segment}'"
            ))
        })?;
    }

    match current {
        Value::Array(items) => Ok(items.clone()),
        other => Err(WorkflowError::Validation(format!(
            "for_each path '{path}' must resolve to a sequence, got {other}"
        ))),
    }
}

/// Result of one fan-out child
struct ItemOutcome {
    index: usize,
    execution_id: String,
    status: &'static str,
    output: Option<Value>,
    error: Option<String>,
    duration_ms: u64,
}

impl ItemOutcome {
    fn to_json(&self) -> Value {
        let mut entry = Map::new();
        entry.insert("index".to_string(), json!(self.index));
        entry.insert("status".to_string(), json!(self.status));
        entry.insert("execution_id".to_string(), json!(self.execution_id));
        if let Some(output) = &self.output {
            entry.insert("output".to_string(), output.clone());
        }
        if let Some(error) = &self.error {
            entry.insert("error".to_string(), json!(error));
        }
        entry.insert("duration_ms".to_string(), json!(self.duration_ms));
        Value::Object(entry)
    }
}

impl DagExecutor {
    /// Drive the fan-out for one `sub_workflow` node
    ///
    /// Runs inside the scheduler's normal node machinery, so the node's
    /// deadline, retry policy, and cancellation all still apply around this
    /// call.
    pub(crate) async fn run_sub_workflow_node(
        &self,
        node: &Node,
        input: Value,
        state: &Arc<ExecutionState>,
        options: &Arc<ExecutionOptions>,
        cancel: &CancellationToken,
    ) -> Result<NodeResult> {
        let sub_error = |message: String| WorkflowError::SubWorkflow {
            node_id: node.id.clone(),
            message,
        };

        let config = SubWorkflowConfig::parse(&node.config).map_err(|e| sub_error(e.to_string()))?;
        let items =
            resolve_for_each(&input, &config.for_each).map_err(|e| sub_error(e.to_string()))?;
        let total = items.len();

        if total == 0 {
            let output = json!({
                "items": [],
                "summary": {"total": 0, "completed": 0, "failed": 0},
            });
            return Ok(NodeResult {
                output,
                input,
                config: node.config.clone(),
                resolved_config: node.config.clone(),
            });
        }

        let loader = self
            .loader()
            .ok_or_else(|| sub_error("no workflow loader configured".to_string()))?;
        let template = loader
            .load_workflow(&config.workflow_id)
            .await
            .map_err(|e| sub_error(e.to_string()))?;
        let template = Arc::new(template);

        tracing::info!(
            node_id = node.id.as_str(),
            child_workflow = config.workflow_id.as_str(),
            total,
            max_parallelism = config.max_parallelism,
            "starting sub-workflow fan-out"
        );

        let fan_token = cancel.child_token();
        let semaphore = (config.max_parallelism > 0)
            .then(|| Arc::new(Semaphore::new(config.max_parallelism)));
        let mut children: JoinSet<ItemOutcome> = JoinSet::new();

        for (index, item) in items.into_iter().enumerate() {
            let this = self.clone();
            let template = template.clone();
            let options = options.clone();
            let fan_token = fan_token.clone();
            let semaphore = semaphore.clone();
            let item_var = config.item_var.clone();
            let timeout_per_item = config.timeout_per_item;
            let parent_input = state.input.clone();
            let parent_variables = state.variables.clone();
            let parent_link = ParentLink {
                execution_id: state.execution_id.clone(),
                node_id: node.id.clone(),
                item_index: index,
                item_key: None,
            };

            children.spawn(async move {
                let child_execution_id = uuid::Uuid::new_v4().to_string();
                let clock = Instant::now();

                let _permit = match semaphore {
                    Some(sem) => {
                        tokio::select! {
                            _ = fan_token.cancelled() => {
                                return ItemOutcome {
                                    index,
                                    execution_id: child_execution_id,
                                    status: "failed",
                                    output: None,
                                    error: Some("execution cancelled".to_string()),
                                    duration_ms: 0,
                                };
                            }
                            permit = sem.acquire_owned() => permit.ok(),
                        }
                    }
                    None => None,
                };

                if fan_token.is_cancelled() {
                    return ItemOutcome {
                        index,
                        execution_id: child_execution_id,
                        status: "failed",
                        output: None,
                        error: Some("execution cancelled".to_string()),
                        duration_ms: clock.elapsed().as_millis() as u64,
                    };
                }

                // fresh workflow ID per child: siblings never share an instance
                let child_workflow =
                    Arc::new(template.clone_with_id(uuid::Uuid::new_v4().to_string()));

                let mut child_input = Map::new();
                child_input.insert(item_var, item);
                child_input.insert("index".to_string(), json!(index));
                child_input.insert("total".to_string(), json!(total));
                // parent execution input fills in only where the child keys are absent
                for (key, value) in parent_input {
                    child_input.entry(key).or_insert(value);
                }

                let child_state = Arc::new(
                    ExecutionState::with_id(
                        child_execution_id.clone(),
                        child_workflow,
                        child_input,
                    )
                    .with_variables(parent_variables)
                    .with_parent(parent_link),
                );

                let child_token = fan_token.child_token();
                let child = this.execute_state(child_state, options, child_token);
                let outcome = match timeout_per_item {
                    Some(deadline) => match tokio::time::timeout(deadline, child).await {
                        Ok(result) => result,
                        Err(_) => Err(WorkflowError::Timeout(format!(
                            "sub-workflow item {index} exceeded {}ms",
                            deadline.as_millis()
                        ))),
                    },
                    None => child.await,
                };

                let duration_ms = clock.elapsed().as_millis() as u64;
                match outcome {
                    Ok(record) if record.status == ExecutionStatus::Completed => ItemOutcome {
                        index,
                        execution_id: child_execution_id,
                        status: "completed",
                        output: Some(record.output),
                        error: None,
                        duration_ms,
                    },
                    Ok(record) => ItemOutcome {
                        index,
                        execution_id: child_execution_id,
                        status: "failed",
                        output: None,
                        error: Some(
                            record
                                .error
                                .unwrap_or_else(|| "child execution failed".to_string()),
                        ),
                        duration_ms,
                    },
                    Err(error) => ItemOutcome {
                        index,
                        execution_id: child_execution_id,
                        status: "failed",
                        output: None,
                        error: Some(error.to_string()),
                        duration_ms,
                    },
                }
            });
        }

        let mut outcomes: Vec<ItemOutcome> = Vec::with_capacity(total);
        let mut completed = 0usize;
        let mut failed = 0usize;
        let mut first_error: Option<String> = None;

        while let Some(joined) = children.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(join_error) => ItemOutcome {
                    index: usize::MAX,
                    execution_id: String::new(),
                    status: "failed",
                    output: None,
                    error: Some(format!("child worker join error: {join_error}")),
                    duration_ms: 0,
                },
            };

            if outcome.status == "completed" {
                completed += 1;
                self.notify(
                    self.base_sub_workflow_event(
                        state,
                        EventType::SubWorkflowItemCompleted,
                        "completed",
                        node,
                    )
                    .with_sub_workflow_item(outcome.index, outcome.execution_id.as_str())
                    .with_duration(outcome.duration_ms),
                );
            } else {
                failed += 1;
                let error = outcome.error.clone().unwrap_or_default();
                self.notify(
                    self.base_sub_workflow_event(
                        state,
                        EventType::SubWorkflowItemFailed,
                        "failed",
                        node,
                    )
                    .with_sub_workflow_item(outcome.index, outcome.execution_id.as_str())
                    .with_duration(outcome.duration_ms)
                    .with_error(error.clone()),
                );
                if config.on_error == OnItemError::FailFast && first_error.is_none() {
                    first_error = Some(error);
                    fan_token.cancel();
                }
            }

            self.notify(
                self.base_sub_workflow_event(state, EventType::SubWorkflowProgress, "running", node)
                    .with_sub_workflow_progress(total, completed, failed),
            );

            outcomes.push(outcome);
        }

        outcomes.sort_by_key(|outcome| outcome.index);

        if let Some(error) = first_error {
            return Err(sub_error(error));
        }

        let items_json: Vec<Value> = outcomes.iter().map(ItemOutcome::to_json).collect();
        let output = json!({
            "items": items_json,
            "summary": {"total": total, "completed": completed, "failed": failed},
        });

        tracing::info!(
            node_id = node.id.as_str(),
            total,
            completed,
            failed,
            "sub-workflow fan-out finished"
        );

        Ok(NodeResult {
            output,
            input,
            config: node.config.clone(),
            resolved_config: node.config.clone(),
        })
    }

    fn base_sub_workflow_event(
        &self,
        state: &ExecutionState,
        event_type: EventType,
        status: &str,
        node: &Node,
    ) -> crate::event::ExecutionEvent {
        crate::event::ExecutionEvent::new(
            event_type,
            state.execution_id.as_str(),
            state.workflow_id(),
            status,
        )
        .with_node(node)
    }
}
