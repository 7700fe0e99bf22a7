//! Core workflow data structures
//!
//! This module defines the fundamental building blocks the engine executes:
//!
//! - **[`Workflow`]**: the complete node-and-edge definition, plus variables
//!   and metadata
//! - **[`Node`]**: a unit of work identified by a kind tag (which picks an
//!   executor) and configured by a free-form record
//! - **[`Edge`]**: a directed link that may carry a branch handle, a
//!   condition expression, or a loop descriptor
//!
//! # Structure
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                     Workflow                         │
//! │                                                      │
//! │   ┌───────┐  edge   ┌─────────────┐  handle="true"   │
//! │   │ fetch │────────▶│ check       │─────────────────▶│ publish
//! │   └───────┘         │ (conditional)│  handle="false"  │
//! │                     └─────────────┘─────────────────▶│ repair
//! │                            ▲                         │
//! │                            │  loop edge (max 3)      │
//! │                            └────────────── repair    │
//! │                                                      │
//! │   variables: { "region": "eu" }                      │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! Workflows are immutable during execution. Sub-workflow fan-out clones
//! the child definition with a fresh ID ([`Workflow::clone_with_id`]) so
//! concurrent siblings never share mutable workflow fields.
//!
//! # Examples
//!
//! ```rust
//! use waverun_core::model::{Workflow, Node, Edge};
//!
//! let workflow = Workflow::new("wf-1", "greeter")
//!     .with_node(Node::new("hello", "Hello", "template"))
//!     .with_node(Node::new("send", "Send", "http"))
//!     .with_edge(Edge::new("e1", "hello", "send"));
//!
//! assert!(workflow.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Node kind dispatched by the scheduler itself: fan-out over a child workflow
pub const SUB_WORKFLOW_KIND: &str = "sub_workflow";

/// Node kind participating in boolean branch routing via edge handles
pub const CONDITIONAL_KIND: &str = "conditional";

/// Branch handle admitting the true branch of a conditional node
pub const HANDLE_TRUE: &str = "true";

/// Branch handle admitting the false branch of a conditional node
pub const HANDLE_FALSE: &str = "false";

/// Maximum length of a node ID
pub const MAX_NODE_ID_LEN: usize = 100;

/// Maximum length of a node name
pub const MAX_NODE_NAME_LEN: usize = 255;

/// Loop descriptor attached to a back-edge
///
/// A loop edge is excluded from the topological sort. When it fires, the
/// scheduler resets every wave between the edge's target and the current
/// wave and re-drives execution from the target's wave with the source's
/// output injected as loop input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopSpec {
    /// Maximum number of times this edge may fire within one execution
    pub max_iterations: u32,
}

/// Directed link between two nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// Unique edge ID within the workflow
    pub id: String,

    /// Source node ID
    pub from: String,

    /// Target node ID
    pub to: String,

    /// Branch handle; for conditional sources the values `"true"` and
    /// `"false"` route on the source's boolean result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,

    /// Expression evaluated against `{ output: <source output> }`; the edge
    /// admits its target only when the expression yields `true`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    /// Present on loop back-edges
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "loop")]
    pub loop_spec: Option<LoopSpec>,
}

impl Edge {
    /// Create a plain edge between two nodes
    pub fn new(id: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            from: from.into(),
            to: to.into(),
            source_handle: None,
            condition: None,
            loop_spec: None,
        }
    }

    /// Attach a branch handle
    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.source_handle = Some(handle.into());
        self
    }

    /// Attach a condition expression
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Turn this edge into a loop back-edge with the given iteration budget
    pub fn with_loop(mut self, max_iterations: u32) -> Self {
        self.loop_spec = Some(LoopSpec { max_iterations });
        self
    }

    /// Whether this edge is a loop back-edge
    pub fn is_loop(&self) -> bool {
        self.loop_spec.is_some()
    }
}

/// A unit of work in a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Stable logical ID, unique within the workflow
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// Kind tag resolving to a registered executor. The kinds
    /// [`SUB_WORKFLOW_KIND`] and [`CONDITIONAL_KIND`] receive special
    /// scheduler treatment.
    pub kind: String,

    /// Free-form configuration consumed by the executor; string values may
    /// contain `{{...}}` templates resolved before each invocation
    #[serde(default)]
    pub config: Map<String, Value>,

    /// Optional metadata; a numeric `priority` entry orders nodes within a
    /// wave (higher runs first)
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Node {
    /// Create a node with an empty config
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: kind.into(),
            config: Map::new(),
            metadata: Map::new(),
        }
    }

    /// Set a config entry
    pub fn with_config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    /// Set a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Scheduling priority read from metadata, default 0
    ///
    /// Integer and float values are accepted; anything else coerces to 0.
    pub fn priority(&self) -> f64 {
        match self.metadata.get("priority") {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            _ => 0.0,
        }
    }
}

/// Complete workflow definition executed by the scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique workflow ID
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// Ordered collection of nodes
    #[serde(default)]
    pub nodes: Vec<Node>,

    /// Ordered collection of edges
    #[serde(default)]
    pub edges: Vec<Edge>,

    /// Workflow-scoped variables, overridable per execution
    #[serde(default)]
    pub variables: Map<String, Value>,

    /// Free-form metadata
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Workflow {
    /// Create an empty workflow
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            variables: Map::new(),
            metadata: Map::new(),
        }
    }

    /// Add a node
    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Add an edge
    pub fn with_edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    /// Set a workflow variable
    pub fn with_variable(mut self, key: impl Into<String>, value: Value) -> Self {
        self.variables.insert(key.into(), value);
        self
    }

    /// Look up a node by ID
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Clone this workflow under a fresh ID
    ///
    /// Used by the sub-workflow fan-out so concurrent siblings never share
    /// a workflow instance.
    pub fn clone_with_id(&self, id: impl Into<String>) -> Self {
        let mut clone = self.clone();
        clone.id = id.into();
        clone
    }

    /// Validate the workflow structure
    ///
    /// Checks every graph-build-time rule:
    ///
    /// - node IDs are non-empty, unique, and within length limits
    /// - edge endpoints reference existing nodes
    /// - no self-edges
    /// - loop edges carry no condition and a positive iteration budget
    ///
    /// Cycle detection among non-loop edges happens separately during
    /// topological planning.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::WorkflowError;

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if node.id.is_empty() {
                return Err(WorkflowError::Validation(
                    "node ID must not be empty".to_string(),
                ));
            }
            if node.id.len() > MAX_NODE_ID_LEN {
                return Err(WorkflowError::Validation(format!(
                    "node ID '{}' exceeds {} characters",
                    node.id, MAX_NODE_ID_LEN
                )));
            }
            if node.name.len() > MAX_NODE_NAME_LEN {
                return Err(WorkflowError::Validation(format!(
                    "node '{}' name exceeds {} characters",
                    node.id, MAX_NODE_NAME_LEN
                )));
            }
            if !seen.insert(node.id.as_str()) {
                return Err(WorkflowError::Validation(format!(
                    "duplicate node ID '{}'",
                    node.id
                )));
            }
        }

        for edge in &self.edges {
            if edge.from == edge.to {
                return Err(WorkflowError::Validation(format!(
                    "edge '{}' connects node '{}' to itself",
                    edge.id, edge.from
                )));
            }
            if !seen.contains(edge.from.as_str()) {
                return Err(WorkflowError::NodeNotFound(format!(
                    "edge '{}' source '{}'",
                    edge.id, edge.from
                )));
            }
            if !seen.contains(edge.to.as_str()) {
                return Err(WorkflowError::NodeNotFound(format!(
                    "edge '{}' target '{}'",
                    edge.id, edge.to
                )));
            }
            if let Some(loop_spec) = &edge.loop_spec {
                if edge.condition.is_some() {
                    return Err(WorkflowError::Validation(format!(
                        "loop edge '{}' must not carry a condition",
                        edge.id
                    )));
                }
                if loop_spec.max_iterations == 0 {
                    return Err(WorkflowError::Validation(format!(
                        "loop edge '{}' must allow at least one iteration",
                        edge.id
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Status of a single node within an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl NodeStatus {
    /// Stable string form used in events and records
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Pending => "pending",
            NodeStatus::Running => "running",
            NodeStatus::Completed => "completed",
            NodeStatus::Failed => "failed",
            NodeStatus::Skipped => "skipped",
        }
    }
}

/// Status of a whole execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    /// Stable string form used in events and records
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
        }
    }
}

/// Snapshot of one node's execution, embedded in the final record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExecution {
    pub node_id: String,
    pub node_name: String,
    pub node_kind: String,
    pub status: NodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Aggregate record handed back to the caller when an execution finishes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: String,
    pub workflow_id: String,
    pub workflow_name: String,
    pub status: ExecutionStatus,
    pub input: Map<String, Value>,
    pub variables: Map<String, Value>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: chrono::DateTime<chrono::Utc>,
    pub duration_ms: u64,
    pub node_executions: Vec<NodeExecution>,
    /// Aggregated output: a single leaf node's output unwrapped, or a map
    /// keyed by leaf node ID
    pub output: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn two_node_workflow() -> Workflow {
        Workflow::new("wf", "test")
            .with_node(Node::new("a", "A", "noop"))
            .with_node(Node::new("b", "B", "noop"))
            .with_edge(Edge::new("e1", "a", "b"))
    }

    #[test]
    fn test_valid_workflow() {
        assert!(two_node_workflow().validate().is_ok());
    }

    #[test]
    fn test_duplicate_node_id_rejected() {
        let workflow = Workflow::new("wf", "test")
            .with_node(Node::new("a", "A", "noop"))
            .with_node(Node::new("a", "A again", "noop"));
        let err = workflow.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_self_edge_rejected() {
        let workflow = Workflow::new("wf", "test")
            .with_node(Node::new("a", "A", "noop"))
            .with_edge(Edge::new("e1", "a", "a"));
        assert!(workflow.validate().is_err());
    }

    #[test]
    fn test_dangling_edge_rejected() {
        let workflow = Workflow::new("wf", "test")
            .with_node(Node::new("a", "A", "noop"))
            .with_edge(Edge::new("e1", "a", "ghost"));
        let err = workflow.validate().unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_loop_edge_with_condition_rejected() {
        let workflow = two_node_workflow()
            .with_edge(Edge::new("loop", "b", "a").with_loop(3).with_condition("output.x > 1"));
        assert!(workflow.validate().is_err());
    }

    #[test]
    fn test_loop_edge_zero_iterations_rejected() {
        let workflow = two_node_workflow().with_edge(Edge::new("loop", "b", "a").with_loop(0));
        assert!(workflow.validate().is_err());
    }

    #[test]
    fn test_node_id_length_limit() {
        let workflow =
            Workflow::new("wf", "test").with_node(Node::new("x".repeat(101), "X", "noop"));
        assert!(workflow.validate().is_err());
    }

    #[test]
    fn test_priority_coercion() {
        let node = Node::new("a", "A", "noop").with_metadata("priority", json!(5));
        assert_eq!(node.priority(), 5.0);

        let node = Node::new("a", "A", "noop").with_metadata("priority", json!(2.5));
        assert_eq!(node.priority(), 2.5);

        let node = Node::new("a", "A", "noop").with_metadata("priority", json!("high"));
        assert_eq!(node.priority(), 0.0);

        let node = Node::new("a", "A", "noop");
        assert_eq!(node.priority(), 0.0);
    }

    #[test]
    fn test_clone_with_id() {
        let workflow = two_node_workflow();
        let clone = workflow.clone_with_id("wf-child");
        assert_eq!(clone.id, "wf-child");
        assert_eq!(clone.nodes.len(), workflow.nodes.len());
        assert_eq!(workflow.id, "wf");
    }

    #[test]
    fn test_serde_round_trip() {
        let workflow = two_node_workflow()
            .with_edge(Edge::new("loop", "b", "a").with_loop(2))
            .with_variable("region", json!("eu"));
        let text = serde_json::to_string(&workflow).unwrap();
        let back: Workflow = serde_json::from_str(&text).unwrap();
        assert_eq!(back.edges.len(), 2);
        assert!(back.edges[1].is_loop());
        assert_eq!(back.variables["region"], json!("eu"));
    }
}
