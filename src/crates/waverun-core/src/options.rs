//! Execution options and engine defaults

use crate::retry::RetryPolicy;
use serde_json::{Map, Value};
use std::time::Duration;

/// Default whole-execution deadline
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Default per-node deadline
pub const DEFAULT_NODE_TIMEOUT: Duration = Duration::from_secs(2 * 60);

/// Default per-wave concurrency cap
pub const DEFAULT_MAX_PARALLELISM: usize = 10;

/// Default per-node output byte cap (10 MB)
pub const DEFAULT_MAX_OUTPUT_SIZE: usize = 10 * 1024 * 1024;

/// Knobs recognised by the scheduler for one execution
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// Whole-execution deadline
    pub timeout: Duration,

    /// Default per-node deadline; a node's `timeout` config entry
    /// (milliseconds) overrides it
    pub node_timeout: Duration,

    /// Collect wave errors instead of failing fast
    pub continue_on_error: bool,

    /// Unresolved template placeholders become errors
    pub strict_mode: bool,

    /// Per-wave concurrency cap; non-positive defaults to the wave width
    pub max_parallelism: usize,

    /// Secondary concurrency cap, combined with `max_parallelism` by
    /// minimum; non-positive is ignored
    pub max_concurrency: usize,

    /// Per-node output byte cap (estimated); 0 disables the check
    pub max_output_size: usize,

    /// Soft threshold for the sum of all outputs; 0 disables the warning
    pub max_total_memory: usize,

    /// Execution-scoped variables overlaid on the workflow variables
    pub variables: Map<String, Value>,

    /// Default retry policy applied to every node
    pub retry_policy: Option<RetryPolicy>,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_EXECUTION_TIMEOUT,
            node_timeout: DEFAULT_NODE_TIMEOUT,
            continue_on_error: false,
            strict_mode: false,
            max_parallelism: DEFAULT_MAX_PARALLELISM,
            max_concurrency: 0,
            max_output_size: DEFAULT_MAX_OUTPUT_SIZE,
            max_total_memory: 0,
            variables: Map::new(),
            retry_policy: None,
        }
    }
}

impl ExecutionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout = timeout;
        self
    }

    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    pub fn with_strict_mode(mut self, strict: bool) -> Self {
        self.strict_mode = strict;
        self
    }

    pub fn with_max_parallelism(mut self, cap: usize) -> Self {
        self.max_parallelism = cap;
        self
    }

    pub fn with_max_concurrency(mut self, cap: usize) -> Self {
        self.max_concurrency = cap;
        self
    }

    pub fn with_max_output_size(mut self, bytes: usize) -> Self {
        self.max_output_size = bytes;
        self
    }

    pub fn with_max_total_memory(mut self, bytes: usize) -> Self {
        self.max_total_memory = bytes;
        self
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: Value) -> Self {
        self.variables.insert(key.into(), value);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Effective semaphore width for a wave:
    /// `min(max_parallelism, max_concurrency, wave_width)` with
    /// non-positive caps defaulting to the wave width
    pub fn effective_parallelism(&self, wave_width: usize) -> usize {
        let mut cap = wave_width.max(1);
        if self.max_parallelism > 0 {
            cap = cap.min(self.max_parallelism);
        }
        if self.max_concurrency > 0 {
            cap = cap.min(self.max_concurrency);
        }
        cap
    }
}
