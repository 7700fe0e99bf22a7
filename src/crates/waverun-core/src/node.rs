//! Single-node execution
//!
//! [`NodeRunner`] assembles the per-invocation bundle for one node: the
//! input derived from parent outputs (or a pending loop input), the node's
//! config with templates resolved, and the executor resolved from the
//! registry. The scheduler wraps the call in its own retry, deadline, and
//! cancellation machinery.
//!
//! # Input preparation
//!
//! The input handed to an executor depends on the node's position:
//!
//! 1. A pending **loop input** wins: the execution input is overlaid with
//!    the injected map, and the override is consumed.
//! 2. Exactly one regular parent: execution input overlaid with the
//!    parent's output (parent wins on key collision). A non-object parent
//!    output is passed through as-is.
//! 3. Two or more regular parents: a map keyed by parent node ID, so
//!    sibling outputs never collide.
//! 4. No parents (root): the execution input itself.

use crate::error::Result;
use crate::model::Node;
use crate::registry::ExecutorRegistry;
use crate::state::ExecutionState;
use crate::template::{TemplateContext, TemplateResolver};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Everything produced by one successful node invocation
#[derive(Debug, Clone)]
pub struct NodeResult {
    pub output: Value,
    pub input: Value,
    pub config: Map<String, Value>,
    pub resolved_config: Map<String, Value>,
}

/// Executes single nodes against the registry
#[derive(Debug)]
pub struct NodeRunner {
    registry: Arc<ExecutorRegistry>,
    templates: TemplateResolver,
}

impl NodeRunner {
    pub fn new(registry: Arc<ExecutorRegistry>) -> Self {
        Self {
            registry,
            templates: TemplateResolver::new(),
        }
    }

    /// Build the input for a node from state, consuming any loop input
    pub fn prepare_input(state: &ExecutionState, node: &Node, parents: &[String]) -> Value {
        let base = Value::Object(state.input.clone());

        if let Some(loop_input) = state.take_loop_input(&node.id) {
            return overlay(base, loop_input);
        }

        match parents {
            [] => base,
            [parent] => match state.output(parent) {
                Some(output) => overlay(base, output),
                None => base,
            },
            many => {
                let mut merged = Map::with_capacity(many.len());
                for parent in many {
                    merged.insert(
                        parent.clone(),
                        state.output(parent).unwrap_or(Value::Null),
                    );
                }
                Value::Object(merged)
            }
        }
    }

    /// Resolve the executor and config, invoke, and package the result
    pub async fn run(
        &self,
        node: &Node,
        input: Value,
        state: &ExecutionState,
        strict: bool,
    ) -> Result<NodeResult> {
        let executor = self.registry.get(&node.kind)?;

        let context = TemplateContext {
            workflow_variables: state.workflow.variables.clone(),
            variables: state.variables.clone(),
            input: input.clone(),
            resources: state.resources(),
        };
        let resolved_config = self
            .templates
            .resolve_config(&node.id, &node.config, &context, strict)?;

        tracing::debug!(
            node_id = node.id.as_str(),
            node_kind = node.kind.as_str(),
            "invoking executor"
        );
        let output = executor.execute(&resolved_config, input.clone()).await?;

        Ok(NodeResult {
            output,
            input,
            config: node.config.clone(),
            resolved_config,
        })
    }
}

/// Overlay `update` on top of `base`; update wins on key collision
///
/// A non-object update replaces the base entirely.
fn overlay(base: Value, update: Value) -> Value {
    match (base, update) {
        (Value::Object(mut base), Value::Object(update)) => {
            for (key, value) in update {
                base.insert(key, value);
            }
            Value::Object(base)
        }
        (_, update) => update,
    }
}
