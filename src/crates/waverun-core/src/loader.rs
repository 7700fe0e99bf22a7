//! Child workflow resolution for sub-workflow nodes

use crate::error::{Result, WorkflowError};
use crate::model::Workflow;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Resolves child-workflow IDs to workflow definitions
///
/// Returned workflows must be safe to use after being cloned; the engine
/// clones each child under a fresh ID before execution and never mutates
/// the loader's copy.
#[async_trait]
pub trait WorkflowLoader: Send + Sync {
    async fn load_workflow(&self, id: &str) -> Result<Workflow>;
}

/// Map-backed loader for tests and embedded use
#[derive(Default)]
pub struct InMemoryWorkflowLoader {
    workflows: RwLock<HashMap<String, Workflow>>,
}

impl InMemoryWorkflowLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a workflow under its own ID
    pub fn insert(&self, workflow: Workflow) {
        self.workflows
            .write()
            .insert(workflow.id.clone(), workflow);
    }
}

#[async_trait]
impl WorkflowLoader for InMemoryWorkflowLoader {
    async fn load_workflow(&self, id: &str) -> Result<Workflow> {
        self.workflows
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| WorkflowError::Loader(format!("workflow '{id}' not found")))
    }
}
