//! Executor contract and registry
//!
//! Each node kind resolves to a user-supplied [`Executor`]. The engine
//! treats executors as opaque and stateless: they receive the resolved
//! config and the node input, and return an output value or an error.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use serde_json::{Map, Value};
//! use waverun_core::registry::{Executor, ExecutorRegistry};
//! use waverun_core::error::Result;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl Executor for Echo {
//!     async fn execute(&self, _config: &Map<String, Value>, input: Value) -> Result<Value> {
//!         Ok(input)
//!     }
//! }
//!
//! let registry = ExecutorRegistry::new();
//! registry.register("echo", Arc::new(Echo)).unwrap();
//! assert!(registry.has("echo"));
//! ```

use crate::error::{Result, WorkflowError};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// User-supplied implementation of one node kind
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run the node
    ///
    /// `config` is the node's config after template resolution; `input` is
    /// the context the scheduler prepared from parent outputs. No side
    /// effects are assumed beyond what the executor documents.
    async fn execute(&self, config: &Map<String, Value>, input: Value) -> Result<Value>;
}

impl std::fmt::Debug for dyn Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<dyn Executor>")
    }
}

/// Thread-safe registry mapping node kinds to executors
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: RwLock<HashMap<String, Arc<dyn Executor>>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor for a kind; a duplicate kind fails
    pub fn register(&self, kind: impl Into<String>, executor: Arc<dyn Executor>) -> Result<()> {
        let kind = kind.into();
        let mut executors = self.executors.write();
        if executors.contains_key(&kind) {
            return Err(WorkflowError::Validation(format!(
                "executor already registered for kind '{kind}'"
            )));
        }
        executors.insert(kind, executor);
        Ok(())
    }

    /// Resolve an executor by kind
    pub fn get(&self, kind: &str) -> Result<Arc<dyn Executor>> {
        self.executors
            .read()
            .get(kind)
            .cloned()
            .ok_or_else(|| WorkflowError::ExecutorNotFound(kind.to_string()))
    }

    pub fn has(&self, kind: &str) -> bool {
        self.executors.read().contains_key(kind)
    }

    /// Registered kinds, sorted
    pub fn list(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.executors.read().keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Remove an executor; unknown kinds fail
    pub fn unregister(&self, kind: &str) -> Result<()> {
        self.executors
            .write()
            .remove(kind)
            .map(|_| ())
            .ok_or_else(|| WorkflowError::ExecutorNotFound(kind.to_string()))
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("kinds", &self.list())
            .finish()
    }
}
