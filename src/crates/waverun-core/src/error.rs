//! Error types for workflow construction and execution
//!
//! All errors are collected in a single [`WorkflowError`] enum implemented
//! with `thiserror`. The taxonomy follows behaviour, not origin:
//!
//! ```text
//! WorkflowError
//! ├── Validation          - graph structure errors (fatal before start)
//! ├── Cycle               - cycle among non-loop edges
//! ├── NodeNotFound        - dangling node reference
//! ├── ExecutorNotFound    - node kind with no registered executor
//! ├── Template            - config template resolution failure
//! ├── Condition           - edge predicate compile/evaluate failure
//! ├── NodeFailed          - node execution failure (post-retry)
//! ├── Timeout             - node or execution deadline exceeded
//! ├── Cancelled           - execution token cancelled
//! ├── OutputSizeExceeded  - node output over the configured byte cap
//! ├── RetryExhausted      - attempt budget spent
//! ├── SubWorkflow         - fan-out node failure
//! ├── Loader              - child workflow could not be resolved
//! ├── Serialization       - JSON (de)serialization failure
//! └── Execution           - anything else that stops an execution
//! ```
//!
//! Cancellation and timeouts propagate unchanged through the retry layer;
//! they are never retried. Validation and cycle errors abort before the
//! execution starts.

use thiserror::Error;

/// Errors that can occur during workflow validation and execution
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Workflow structure is invalid (duplicate IDs, self-edges, bad loop spec, ...)
    #[error("validation error: {0}")]
    Validation(String),

    /// The non-loop subgraph contains a cycle
    #[error("cycle detected among non-loop edges: {0}")]
    Cycle(String),

    /// An edge or operation references a node that does not exist
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// No executor is registered for a node kind
    #[error("no executor registered for node kind '{0}'")]
    ExecutorNotFound(String),

    /// Config template resolution failed
    #[error("template resolution failed for node '{node_id}': {message}")]
    Template { node_id: String, message: String },

    /// An edge condition failed to compile or evaluate
    #[error("condition error: {0}")]
    Condition(String),

    /// A node failed after its retry budget was applied
    #[error("node '{node_id}' failed: {message}")]
    NodeFailed { node_id: String, message: String },

    /// A node or execution deadline elapsed
    #[error("timeout: {0}")]
    Timeout(String),

    /// The execution was cancelled
    #[error("execution cancelled")]
    Cancelled,

    /// A node output exceeded the configured size cap
    #[error("node '{node_id}' output size {size} bytes exceeds limit {limit} bytes")]
    OutputSizeExceeded {
        node_id: String,
        size: usize,
        limit: usize,
    },

    /// All retry attempts were spent
    #[error("retry budget exhausted after {attempts} attempts: {message}")]
    RetryExhausted { attempts: u32, message: String },

    /// A sub-workflow fan-out node failed
    #[error("sub-workflow node '{node_id}' failed: {message}")]
    SubWorkflow { node_id: String, message: String },

    /// A child workflow could not be loaded
    #[error("workflow loader error: {0}")]
    Loader(String),

    /// JSON (de)serialization failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// General execution error
    #[error("execution error: {0}")]
    Execution(String),
}

impl WorkflowError {
    /// Whether this error is a cancellation or deadline signal.
    ///
    /// These are terminal: the retry layer never retries them and they
    /// propagate unchanged.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, WorkflowError::Cancelled | WorkflowError::Timeout(_))
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, WorkflowError>;
