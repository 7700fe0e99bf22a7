//! # waverun-core
//!
//! A workflow execution engine: a directed acyclic workflow graph
//! (nodes + edges with per-node config) is planned into *waves* of
//! independent nodes and driven to completion by a bounded-parallel
//! scheduler, producing per-node outputs, an aggregate execution record,
//! and a stream of lifecycle events.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   waves    ┌──────────────┐   events   ┌───────────────┐
//! │ Dag        │──────────▶│ DagExecutor   │──────────▶│ ObserverManager│
//! │ (planning) │           │ (scheduling)  │           │ (fan-out)      │
//! └────────────┘           └──────┬───────┘           └───────────────┘
//!                                 │ reads/writes
//!                          ┌──────▼────────┐
//!                          │ ExecutionState │  shared, lock-guarded
//!                          └──────┬────────┘
//!        ┌───────────────┬───────┴────────┬────────────────┐
//!        │ NodeRunner    │ RetryPolicy    │ ConditionEvaluator
//!        │ (executors +  │ (backoff +     │ (edge predicates +
//!        │  templates)   │  cancellation) │  LRU cache)
//! ```
//!
//! Edge semantics distinguish the engine from a plain DAG runner:
//! incoming edges OR-gate their target, `source_handle` values route
//! conditional branches, `condition` expressions gate on the source's
//! output, and *loop edges* — back-edges excluded from the topological
//! sort — rewind execution to an earlier wave with an injected loop input.
//! A `sub_workflow` node fans a referenced child workflow out over a
//! sequence with bounded parallelism.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use serde_json::{json, Map, Value};
//! use waverun_core::{
//!     DagExecutor, Edge, Executor, ExecutionOptions, ExecutorRegistry, Node, Workflow,
//! };
//!
//! struct Identity;
//!
//! #[async_trait]
//! impl Executor for Identity {
//!     async fn execute(
//!         &self,
//!         _config: &Map<String, Value>,
//!         input: Value,
//!     ) -> waverun_core::Result<Value> {
//!         Ok(input)
//!     }
//! }
//!
//! # async fn run() -> waverun_core::Result<()> {
//! let registry = Arc::new(ExecutorRegistry::new());
//! registry.register("identity", Arc::new(Identity))?;
//!
//! let workflow = Workflow::new("wf-1", "pipeline")
//!     .with_node(Node::new("a", "A", "identity"))
//!     .with_node(Node::new("b", "B", "identity"))
//!     .with_edge(Edge::new("e1", "a", "b"));
//!
//! let executor = DagExecutor::new(registry);
//! let mut input = Map::new();
//! input.insert("x".to_string(), json!(1));
//! let record = executor
//!     .execute(workflow, input, ExecutionOptions::default())
//!     .await?;
//! assert_eq!(record.output, json!({"x": 1}));
//! # Ok(())
//! # }
//! ```

pub mod condition;
pub mod dag;
pub mod error;
pub mod event;
pub mod executor;
pub mod loader;
pub mod model;
pub mod node;
pub mod observer;
pub mod options;
pub mod registry;
pub mod retry;
pub mod state;
pub mod subworkflow;
pub mod template;

// Re-export main types
pub use condition::{
    CompiledCondition, ConditionEvaluator, ExpressionCache, FallbackConditionEvaluator,
};
pub use dag::{find_node_wave, sort_nodes_by_priority, Dag};
pub use error::{Result, WorkflowError};
pub use event::{EventType, ExecutionEvent};
pub use executor::DagExecutor;
pub use loader::{InMemoryWorkflowLoader, WorkflowLoader};
pub use model::{
    Edge, ExecutionRecord, ExecutionStatus, LoopSpec, Node, NodeExecution, NodeStatus, Workflow,
    CONDITIONAL_KIND, SUB_WORKFLOW_KIND,
};
pub use node::{NodeResult, NodeRunner};
pub use observer::{
    CompoundFilter, EventFilter, EventTypeFilter, ExecutionIdFilter, NodeIdFilter, Observer,
    ObserverManager,
};
pub use options::ExecutionOptions;
pub use registry::{Executor, ExecutorRegistry};
pub use retry::{BackoffStrategy, RetryPolicy};
pub use state::{estimate_value_size, ExecutionState, ParentLink};
pub use subworkflow::{OnItemError, SubWorkflowConfig};
pub use template::{TemplateContext, TemplateResolver};
