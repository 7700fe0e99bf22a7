//! Lifecycle events emitted during workflow execution
//!
//! Every state transition the scheduler performs is published as an
//! [`ExecutionEvent`] through the observer manager. Events form a tagged
//! union: a handful of common fields plus type-specific fields that are
//! only populated for the relevant [`EventType`].
//!
//! Events are JSON-ready (`serde` with optional-field skipping) and can be
//! flattened into a string-keyed payload via [`ExecutionEvent::payload`]
//! for persistence-shaped consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Maximum serialized length of an output snapshot carried in an event
pub const MAX_EVENT_OUTPUT_LEN: usize = 512;

/// Discriminant of the event union
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "execution.started")]
    ExecutionStarted,
    #[serde(rename = "execution.completed")]
    ExecutionCompleted,
    #[serde(rename = "execution.failed")]
    ExecutionFailed,
    #[serde(rename = "execution.cancelled")]
    ExecutionCancelled,
    #[serde(rename = "wave.started")]
    WaveStarted,
    #[serde(rename = "wave.completed")]
    WaveCompleted,
    #[serde(rename = "node.started")]
    NodeStarted,
    #[serde(rename = "node.completed")]
    NodeCompleted,
    #[serde(rename = "node.failed")]
    NodeFailed,
    #[serde(rename = "node.skipped")]
    NodeSkipped,
    #[serde(rename = "node.retrying")]
    NodeRetrying,
    #[serde(rename = "loop.iteration")]
    LoopIteration,
    #[serde(rename = "loop.exhausted")]
    LoopExhausted,
    #[serde(rename = "sub_workflow.progress")]
    SubWorkflowProgress,
    #[serde(rename = "sub_workflow.item_completed")]
    SubWorkflowItemCompleted,
    #[serde(rename = "sub_workflow.item_failed")]
    SubWorkflowItemFailed,
}

impl EventType {
    /// Stable dotted string form, identical to the serde representation
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ExecutionStarted => "execution.started",
            EventType::ExecutionCompleted => "execution.completed",
            EventType::ExecutionFailed => "execution.failed",
            EventType::ExecutionCancelled => "execution.cancelled",
            EventType::WaveStarted => "wave.started",
            EventType::WaveCompleted => "wave.completed",
            EventType::NodeStarted => "node.started",
            EventType::NodeCompleted => "node.completed",
            EventType::NodeFailed => "node.failed",
            EventType::NodeSkipped => "node.skipped",
            EventType::NodeRetrying => "node.retrying",
            EventType::LoopIteration => "loop.iteration",
            EventType::LoopExhausted => "loop.exhausted",
            EventType::SubWorkflowProgress => "sub_workflow.progress",
            EventType::SubWorkflowItemCompleted => "sub_workflow.item_completed",
            EventType::SubWorkflowItemFailed => "sub_workflow.item_failed",
        }
    }

    /// Whether this event concerns a single node
    pub fn is_node_event(&self) -> bool {
        matches!(
            self,
            EventType::NodeStarted
                | EventType::NodeCompleted
                | EventType::NodeFailed
                | EventType::NodeSkipped
                | EventType::NodeRetrying
        )
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One lifecycle event
///
/// Common fields are always populated; the optional fields are populated
/// according to [`EventType`]:
///
/// | event class | extra fields |
/// |---|---|
/// | node | `node_id`, `node_name`, `node_type`, `duration_ms`, `output` |
/// | wave | `wave_index`, `node_count`, `duration_ms` |
/// | loop | `loop_edge_id`, `loop_iteration`, `loop_max_iter`, `message` |
/// | sub-workflow | `sub_workflow_*` counters and item identity |
/// | failure | `error` |
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub event_type: EventType,
    pub execution_id: String,
    pub workflow_id: String,
    pub timestamp: DateTime<Utc>,
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub wave_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_count: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub loop_edge_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loop_iteration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loop_max_iter: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_workflow_total: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_workflow_completed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_workflow_failed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_workflow_item_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_workflow_item_exec_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Truncated snapshot of the node output, bounded by
    /// [`MAX_EVENT_OUTPUT_LEN`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
}

impl ExecutionEvent {
    /// Create an event with the common fields; type-specific fields start
    /// empty and are filled via the `with_*` methods
    pub fn new(
        event_type: EventType,
        execution_id: impl Into<String>,
        workflow_id: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            execution_id: execution_id.into(),
            workflow_id: workflow_id.into(),
            timestamp: Utc::now(),
            status: status.into(),
            node_id: None,
            node_name: None,
            node_type: None,
            duration_ms: None,
            wave_index: None,
            node_count: None,
            loop_edge_id: None,
            loop_iteration: None,
            loop_max_iter: None,
            sub_workflow_total: None,
            sub_workflow_completed: None,
            sub_workflow_failed: None,
            sub_workflow_item_index: None,
            sub_workflow_item_exec_id: None,
            message: None,
            error: None,
            output: None,
        }
    }

    /// Attach node identity
    pub fn with_node(mut self, node: &crate::model::Node) -> Self {
        self.node_id = Some(node.id.clone());
        self.node_name = Some(node.name.clone());
        self.node_type = Some(node.kind.clone());
        self
    }

    /// Attach a duration in milliseconds
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Attach wave identity
    pub fn with_wave(mut self, wave_index: usize, node_count: usize) -> Self {
        self.wave_index = Some(wave_index);
        self.node_count = Some(node_count);
        self
    }

    /// Attach loop-edge identity
    pub fn with_loop(mut self, edge_id: impl Into<String>, iteration: u32, max_iter: u32) -> Self {
        self.loop_edge_id = Some(edge_id.into());
        self.loop_iteration = Some(iteration);
        self.loop_max_iter = Some(max_iter);
        self
    }

    /// Attach sub-workflow progress counters
    pub fn with_sub_workflow_progress(
        mut self,
        total: usize,
        completed: usize,
        failed: usize,
    ) -> Self {
        self.sub_workflow_total = Some(total);
        self.sub_workflow_completed = Some(completed);
        self.sub_workflow_failed = Some(failed);
        self
    }

    /// Attach sub-workflow item identity
    pub fn with_sub_workflow_item(mut self, index: usize, exec_id: impl Into<String>) -> Self {
        self.sub_workflow_item_index = Some(index);
        self.sub_workflow_item_exec_id = Some(exec_id.into());
        self
    }

    /// Attach a human-readable message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attach an error string
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Attach a truncated output snapshot
    pub fn with_output(mut self, output: &Value) -> Self {
        self.output = Some(truncate_output(output, MAX_EVENT_OUTPUT_LEN));
        self
    }

    /// Flatten every populated field into a string-keyed map
    ///
    /// Used by persistence-shaped observers that store events as
    /// `{execution_id, event_type, payload}` records.
    pub fn payload(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// Bound an output value for inclusion in an event
///
/// Values whose serialized form fits within `max_len` pass through
/// unchanged; larger values are replaced with a preview object carrying the
/// leading characters and a truncation marker.
pub fn truncate_output(output: &Value, max_len: usize) -> Value {
    let serialized = output.to_string();
    if serialized.len() <= max_len {
        return output.clone();
    }
    let preview: String = serialized.chars().take(max_len).collect();
    serde_json::json!({
        "truncated": true,
        "preview": preview,
        "full_length": serialized.len(),
    })
}
