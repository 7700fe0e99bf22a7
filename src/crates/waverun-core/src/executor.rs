//! The DAG scheduler
//!
//! [`DagExecutor`] drives a workflow to completion:
//!
//! 1. Build the indexed DAG and topologically sort it into waves
//!    (validation and cycle errors are fatal before the execution starts).
//! 2. For each wave, spawn one worker per node. Workers share a counting
//!    semaphore of width `min(max_parallelism, max_concurrency, |wave|)`,
//!    start in best-effort priority order, and re-check cancellation at
//!    every boundary.
//! 3. Each worker evaluates the node's incoming-edge policy (OR gating):
//!    a pending loop input admits the node unconditionally, a root node
//!    always runs, and otherwise at least one incoming non-loop edge must
//!    have a completed source, a passing condition, and a passing
//!    conditional branch handle. Nodes no edge admits are skipped with a
//!    composite reason.
//! 4. Admitted nodes run under the retry policy with a per-attempt
//!    deadline; results and errors are published into the shared
//!    [`ExecutionState`], and every transition emits an event.
//! 5. After each wave the loop-edge processor may rewind: the first
//!    eligible loop edge with budget left injects the source's output as
//!    the target's loop input, resets every wave from the target to the
//!    current one, and jumps back. An over-budget edge emits
//!    `loop.exhausted` and execution advances.
//!
//! ```text
//!        ┌────────────────────────────────────────────────┐
//!        │ wave loop                                      │
//!        │   ┌──────────┐   ┌──────────┐   ┌──────────┐   │
//!  ────▶ │   │ wave 0   │──▶│ wave 1   │──▶│ wave 2   │──▶│ done
//!        │   └──────────┘   └──────────┘   └──────────┘   │
//!        │        ▲              loop edge fired │        │
//!        │        └───────── reset + rewind ─────┘        │
//!        └────────────────────────────────────────────────┘
//! ```
//!
//! Sub-workflow nodes (`kind == "sub_workflow"`) are dispatched by the
//! scheduler itself (see the fan-out implementation in
//! [`crate::subworkflow`]); every other policy — deadline, retry,
//! cancellation, events — still applies to them.

use crate::condition::ConditionEvaluator;
use crate::dag::{find_node_wave, sort_nodes_by_priority, Dag};
use crate::error::{Result, WorkflowError};
use crate::event::{EventType, ExecutionEvent};
use crate::loader::WorkflowLoader;
use crate::model::{
    Edge, ExecutionRecord, ExecutionStatus, Node, NodeStatus, Workflow, CONDITIONAL_KIND,
    HANDLE_FALSE, HANDLE_TRUE, SUB_WORKFLOW_KIND,
};
use crate::node::NodeRunner;
use crate::observer::ObserverManager;
use crate::options::ExecutionOptions;
use crate::registry::ExecutorRegistry;
use crate::state::{estimate_value_size, ExecutionState};
use chrono::Utc;
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Outcome of the gating check for one node
enum Gate {
    Run,
    Skip(String),
}

/// Wave-parallel workflow scheduler
///
/// Cheap to clone; all fields are shared handles. One executor can drive
/// any number of concurrent executions.
#[derive(Clone)]
pub struct DagExecutor {
    registry: Arc<ExecutorRegistry>,
    runner: Arc<NodeRunner>,
    observers: Arc<ObserverManager>,
    conditions: Arc<ConditionEvaluator>,
    loader: Option<Arc<dyn WorkflowLoader>>,
}

impl DagExecutor {
    pub fn new(registry: Arc<ExecutorRegistry>) -> Self {
        Self {
            runner: Arc::new(NodeRunner::new(registry.clone())),
            registry,
            observers: Arc::new(ObserverManager::new()),
            conditions: Arc::new(ConditionEvaluator::new()),
            loader: None,
        }
    }

    /// Attach an observer manager for event fan-out
    pub fn with_observers(mut self, observers: Arc<ObserverManager>) -> Self {
        self.observers = observers;
        self
    }

    /// Attach a loader for resolving sub-workflow children
    pub fn with_loader(mut self, loader: Arc<dyn WorkflowLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Size the compiled-condition cache
    pub fn with_condition_cache_capacity(mut self, capacity: usize) -> Self {
        self.conditions = Arc::new(ConditionEvaluator::with_capacity(capacity));
        self
    }

    /// The observer manager events are published through
    pub fn observers(&self) -> Arc<ObserverManager> {
        self.observers.clone()
    }

    pub(crate) fn loader(&self) -> Option<Arc<dyn WorkflowLoader>> {
        self.loader.clone()
    }

    /// The registry node kinds are resolved against
    pub fn registry(&self) -> Arc<ExecutorRegistry> {
        self.registry.clone()
    }

    /// Execute a workflow with a fresh execution ID and cancellation token
    pub async fn execute(
        &self,
        workflow: Workflow,
        input: Map<String, Value>,
        options: ExecutionOptions,
    ) -> Result<ExecutionRecord> {
        let variables = options.variables.clone();
        let state = Arc::new(
            ExecutionState::new(Arc::new(workflow), input).with_variables(variables),
        );
        self.execute_state(state, Arc::new(options), CancellationToken::new())
            .await
    }

    /// Execute against prepared state under an external cancellation token
    ///
    /// Boxed so the sub-workflow fan-out can recurse into child
    /// executions.
    pub fn execute_state(
        &self,
        state: Arc<ExecutionState>,
        options: Arc<ExecutionOptions>,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<ExecutionRecord>> {
        let this = self.clone();
        Box::pin(async move { this.execute_inner(state, options, cancel).await })
    }

    async fn execute_inner(
        &self,
        state: Arc<ExecutionState>,
        options: Arc<ExecutionOptions>,
        cancel: CancellationToken,
    ) -> Result<ExecutionRecord> {
        // Plan before emitting anything: validation and cycle errors mean
        // the execution never starts.
        let dag = Arc::new(Dag::build(&state.workflow)?);
        let waves = dag.topological_sort()?;

        let started_at = Utc::now();
        let clock = Instant::now();
        tracing::info!(
            execution_id = state.execution_id.as_str(),
            workflow_id = state.workflow_id(),
            waves = waves.len(),
            nodes = state.workflow.nodes.len(),
            "starting execution"
        );
        self.notify(self.base_event(&state, EventType::ExecutionStarted, "running"));

        let outcome = match tokio::time::timeout(
            options.timeout,
            self.run_waves(&dag, &waves, &state, &options, &cancel),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(WorkflowError::Timeout(format!(
                "execution exceeded {}ms",
                options.timeout.as_millis()
            ))),
        };

        let finished_at = Utc::now();
        let duration_ms = clock.elapsed().as_millis() as u64;
        let output = self.collect_final_output(&dag, &state);

        let (status, error) = match outcome {
            Ok(collected) if collected.is_empty() => {
                tracing::info!(
                    execution_id = state.execution_id.as_str(),
                    duration_ms,
                    "execution completed"
                );
                self.notify(
                    self.base_event(&state, EventType::ExecutionCompleted, "completed")
                        .with_duration(duration_ms),
                );
                (ExecutionStatus::Completed, None)
            }
            Ok(collected) => {
                let joined = collected.join("; ");
                tracing::warn!(
                    execution_id = state.execution_id.as_str(),
                    errors = collected.len(),
                    "execution completed with collected errors"
                );
                self.notify(
                    self.base_event(&state, EventType::ExecutionFailed, "failed")
                        .with_duration(duration_ms)
                        .with_error(joined.clone()),
                );
                (ExecutionStatus::Failed, Some(joined))
            }
            Err(WorkflowError::Cancelled) => {
                tracing::info!(
                    execution_id = state.execution_id.as_str(),
                    "execution cancelled"
                );
                self.notify(
                    self.base_event(&state, EventType::ExecutionCancelled, "cancelled")
                        .with_duration(duration_ms),
                );
                (
                    ExecutionStatus::Cancelled,
                    Some(WorkflowError::Cancelled.to_string()),
                )
            }
            Err(error) => {
                let message = error.to_string();
                tracing::error!(
                    execution_id = state.execution_id.as_str(),
                    error = message.as_str(),
                    "execution failed"
                );
                self.notify(
                    self.base_event(&state, EventType::ExecutionFailed, "failed")
                        .with_duration(duration_ms)
                        .with_error(message.clone()),
                );
                (ExecutionStatus::Failed, Some(message))
            }
        };

        Ok(ExecutionRecord {
            execution_id: state.execution_id.clone(),
            workflow_id: state.workflow.id.clone(),
            workflow_name: state.workflow.name.clone(),
            status,
            input: state.input.clone(),
            variables: state.variables.clone(),
            started_at,
            finished_at,
            duration_ms,
            node_executions: state.build_node_executions(),
            output,
            error,
        })
    }

    /// Wave loop with loop-edge rewind offers
    ///
    /// Returns the error messages collected under `continue_on_error`; an
    /// empty list means a clean run.
    async fn run_waves(
        &self,
        dag: &Arc<Dag>,
        waves: &[Vec<String>],
        state: &Arc<ExecutionState>,
        options: &Arc<ExecutionOptions>,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let mut collected = Vec::new();
        let mut wave_idx = 0;

        while wave_idx < waves.len() {
            if cancel.is_cancelled() {
                return Err(WorkflowError::Cancelled);
            }

            let errors = self
                .execute_wave(dag, waves, wave_idx, state, options, cancel)
                .await?;
            collected.extend(errors);

            match self.process_loop_edges(dag, waves, wave_idx, state) {
                Some(target) => {
                    for wave in &waves[target..=wave_idx] {
                        for node_id in wave {
                            state.reset_node_for_loop(node_id);
                        }
                    }
                    tracing::debug!(from_wave = wave_idx, to_wave = target, "loop rewind");
                    wave_idx = target;
                }
                None => wave_idx += 1,
            }
        }

        Ok(collected)
    }

    async fn execute_wave(
        &self,
        dag: &Arc<Dag>,
        waves: &[Vec<String>],
        wave_idx: usize,
        state: &Arc<ExecutionState>,
        options: &Arc<ExecutionOptions>,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let wave = &waves[wave_idx];
        let wave_clock = Instant::now();
        tracing::debug!(wave = wave_idx, nodes = wave.len(), "starting wave");
        self.notify(
            self.base_event(state, EventType::WaveStarted, "running")
                .with_wave(wave_idx, wave.len()),
        );

        let mut nodes: Vec<Node> = wave
            .iter()
            .filter_map(|id| dag.nodes.get(id).cloned())
            .collect();
        sort_nodes_by_priority(&mut nodes);

        let permits = options.effective_parallelism(wave.len());
        let semaphore = Arc::new(Semaphore::new(permits));
        let mut workers: JoinSet<std::result::Result<(), (String, WorkflowError)>> =
            JoinSet::new();

        for node in nodes {
            let this = self.clone();
            let dag = dag.clone();
            let state = state.clone();
            let options = options.clone();
            let cancel = cancel.clone();
            let semaphore = semaphore.clone();

            workers.spawn(async move {
                if cancel.is_cancelled() {
                    this.mark_skipped(&state, &node, "execution cancelled");
                    return Ok(());
                }

                let _permit = tokio::select! {
                    _ = cancel.cancelled() => {
                        this.mark_skipped(&state, &node, "execution cancelled");
                        return Ok(());
                    }
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => {
                            return Err((
                                node.id.clone(),
                                WorkflowError::Execution("wave semaphore closed".to_string()),
                            ));
                        }
                    }
                };

                match this.gate_node(&dag, &node, &state) {
                    Gate::Run => this
                        .run_node(&dag, &node, &state, &options, &cancel)
                        .await
                        .map_err(|error| (node.id.clone(), error)),
                    Gate::Skip(reason) => {
                        this.mark_skipped(&state, &node, &reason);
                        Ok(())
                    }
                }
            });
        }

        let mut failures: Vec<(String, WorkflowError)> = Vec::new();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(failure)) => failures.push(failure),
                Err(join_error) => failures.push((
                    "<worker>".to_string(),
                    WorkflowError::Execution(format!("worker join error: {join_error}")),
                )),
            }
        }

        let duration_ms = wave_clock.elapsed().as_millis() as u64;

        if failures.is_empty() {
            self.notify(
                self.base_event(state, EventType::WaveCompleted, "completed")
                    .with_wave(wave_idx, wave.len())
                    .with_duration(duration_ms),
            );
            return Ok(Vec::new());
        }

        if options.continue_on_error {
            let messages: Vec<String> = failures
                .iter()
                .map(|(node_id, error)| format!("{node_id}: {error}"))
                .collect();
            let joined = messages.join("; ");
            self.notify(
                self.base_event(state, EventType::WaveCompleted, "completed_with_errors")
                    .with_wave(wave_idx, wave.len())
                    .with_duration(duration_ms)
                    .with_error(joined),
            );
            return Ok(messages);
        }

        // fail fast: cancellation outranks other failures so the record
        // reports it faithfully
        let position = failures
            .iter()
            .position(|(_, error)| matches!(error, WorkflowError::Cancelled))
            .unwrap_or(0);
        let (node_id, error) = failures.swap_remove(position);
        self.notify(
            self.base_event(state, EventType::WaveCompleted, "failed")
                .with_wave(wave_idx, wave.len())
                .with_duration(duration_ms)
                .with_error(format!("{node_id}: {error}")),
        );
        Err(error)
    }

    /// Does this node's incoming-edge policy admit it?
    fn gate_node(&self, dag: &Dag, node: &Node, state: &ExecutionState) -> Gate {
        // a fired loop edge admits its target unconditionally
        if state.has_loop_input(&node.id) {
            return Gate::Run;
        }

        let incoming = dag.regular_incoming(&node.id);
        if incoming.is_empty() {
            return Gate::Run;
        }

        let mut reasons = Vec::with_capacity(incoming.len());
        for edge in incoming {
            match self.edge_admits(dag, edge, state) {
                Ok(()) => return Gate::Run,
                Err(reason) => reasons.push(reason),
            }
        }
        Gate::Skip(reasons.join("; "))
    }

    /// Check one incoming edge: completed source, passing condition,
    /// passing branch handle
    fn edge_admits(
        &self,
        dag: &Dag,
        edge: &Edge,
        state: &ExecutionState,
    ) -> std::result::Result<(), String> {
        match state.status(&edge.from) {
            Some(NodeStatus::Completed) => {}
            Some(status) => {
                return Err(format!("parent '{}' is {}", edge.from, status.as_str()));
            }
            None => return Err(format!("parent '{}' has not run", edge.from)),
        }

        let source_output = state.output(&edge.from);

        if let Some(condition) = &edge.condition {
            match self
                .conditions
                .evaluate_edge(condition, source_output.as_ref())
            {
                Ok(true) => {}
                Ok(false) => {
                    return Err(format!(
                        "condition '{condition}' on edge '{}' evaluated to false",
                        edge.id
                    ));
                }
                Err(error) => {
                    return Err(format!(
                        "condition '{condition}' on edge '{}' failed: {error}",
                        edge.id
                    ));
                }
            }
        }

        if let (Some(handle), Some(source)) = (&edge.source_handle, dag.nodes.get(&edge.from)) {
            if source.kind == CONDITIONAL_KIND {
                if let Some(branch) = conditional_result(source_output.as_ref()) {
                    let admitted = match handle.as_str() {
                        HANDLE_TRUE => branch,
                        HANDLE_FALSE => !branch,
                        _ => true,
                    };
                    if !admitted {
                        return Err(format!(
                            "branch '{handle}' of conditional '{}' not taken",
                            edge.from
                        ));
                    }
                }
            }
        }

        Ok(())
    }

    /// Run one admitted node under deadline, retry, and cancellation
    async fn run_node(
        &self,
        dag: &Arc<Dag>,
        node: &Node,
        state: &Arc<ExecutionState>,
        options: &Arc<ExecutionOptions>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let clock = Instant::now();
        state.set_status(&node.id, NodeStatus::Running);
        state.set_started_at(&node.id, Utc::now());
        tracing::debug!(
            node_id = node.id.as_str(),
            node_kind = node.kind.as_str(),
            "node started"
        );
        self.notify(
            self.base_event(state, EventType::NodeStarted, "running")
                .with_node(node),
        );

        let deadline = node_deadline(node, options);
        let parents = dag.regular_parents(&node.id);
        let input = NodeRunner::prepare_input(state, node, &parents);

        let mut policy = options.retry_policy.clone().unwrap_or_default();
        let user_hook = policy.on_retry.take();
        let hook_observers = self.observers.clone();
        let hook_execution_id = state.execution_id.clone();
        let hook_workflow_id = state.workflow_id().to_string();
        let hook_node = node.clone();
        policy.on_retry = Some(Arc::new(move |attempt, error| {
            if let Some(hook) = &user_hook {
                hook(attempt, error);
            }
            hook_observers.notify(
                ExecutionEvent::new(
                    EventType::NodeRetrying,
                    hook_execution_id.as_str(),
                    hook_workflow_id.as_str(),
                    "retrying",
                )
                .with_node(&hook_node)
                .with_message(format!("attempt {attempt} failed"))
                .with_error(error.to_string()),
            );
        }));

        let attempt_result = policy
            .run(cancel, |_attempt| {
                let this = self.clone();
                let node = node.clone();
                let state = state.clone();
                let options = options.clone();
                let cancel = cancel.clone();
                let input = input.clone();
                async move {
                    let work = async {
                        if node.kind == SUB_WORKFLOW_KIND {
                            this.run_sub_workflow_node(&node, input, &state, &options, &cancel)
                                .await
                        } else {
                            this.runner.run(&node, input, &state, options.strict_mode).await
                        }
                    };
                    tokio::select! {
                        _ = cancel.cancelled() => Err(WorkflowError::Cancelled),
                        attempt = tokio::time::timeout(deadline, work) => match attempt {
                            Ok(result) => result,
                            Err(_) => Err(WorkflowError::Timeout(format!(
                                "node '{}' exceeded {}ms",
                                node.id,
                                deadline.as_millis()
                            ))),
                        }
                    }
                }
            })
            .await;

        match attempt_result {
            Err(error) => {
                self.fail_node(state, node, clock, &error);
                Err(error)
            }
            Ok(result) => {
                if options.max_output_size > 0 {
                    let size = estimate_value_size(&result.output);
                    if size > options.max_output_size {
                        let error = WorkflowError::OutputSizeExceeded {
                            node_id: node.id.clone(),
                            size,
                            limit: options.max_output_size,
                        };
                        self.fail_node(state, node, clock, &error);
                        return Err(error);
                    }
                }

                state.set_output(&node.id, result.output.clone());
                state.set_input(&node.id, result.input);
                state.set_config(&node.id, result.config);
                state.set_resolved_config(&node.id, result.resolved_config);
                state.set_status(&node.id, NodeStatus::Completed);
                state.set_finished_at(&node.id, Utc::now());

                let duration_ms = clock.elapsed().as_millis() as u64;
                let mut event = self
                    .base_event(state, EventType::NodeCompleted, "completed")
                    .with_node(node)
                    .with_duration(duration_ms)
                    .with_output(&result.output);

                if options.max_total_memory > 0 {
                    let usage = state.total_memory_usage();
                    if usage > options.max_total_memory {
                        tracing::warn!(
                            node_id = node.id.as_str(),
                            usage,
                            threshold = options.max_total_memory,
                            "total output memory over threshold"
                        );
                        event.status = "warning".to_string();
                        event = event.with_message(format!(
                            "total output memory {usage} bytes exceeds threshold {} bytes",
                            options.max_total_memory
                        ));
                    }
                }

                tracing::debug!(
                    node_id = node.id.as_str(),
                    duration_ms,
                    "node completed"
                );
                self.notify(event);
                Ok(())
            }
        }
    }

    fn fail_node(
        &self,
        state: &ExecutionState,
        node: &Node,
        clock: Instant,
        error: &WorkflowError,
    ) {
        let message = error.to_string();
        state.set_error(&node.id, message.as_str());
        state.set_status(&node.id, NodeStatus::Failed);
        state.set_finished_at(&node.id, Utc::now());
        let duration_ms = clock.elapsed().as_millis() as u64;
        tracing::warn!(
            node_id = node.id.as_str(),
            duration_ms,
            error = message.as_str(),
            "node failed"
        );
        self.notify(
            self.base_event(state, EventType::NodeFailed, "failed")
                .with_node(node)
                .with_duration(duration_ms)
                .with_error(message),
        );
    }

    fn mark_skipped(&self, state: &ExecutionState, node: &Node, reason: &str) {
        state.set_status(&node.id, NodeStatus::Skipped);
        state.set_error(&node.id, reason);
        tracing::debug!(node_id = node.id.as_str(), reason, "node skipped");
        self.notify(
            self.base_event(state, EventType::NodeSkipped, "skipped")
                .with_node(node)
                .with_message(reason),
        );
    }

    /// Offer the loop edges of a just-completed wave a chance to rewind
    ///
    /// At most one edge fires per wave completion. An edge whose budget is
    /// spent emits `loop.exhausted` and is passed over; execution then
    /// advances normally, so the source's non-loop forward edges stay
    /// eligible.
    fn process_loop_edges(
        &self,
        dag: &Dag,
        waves: &[Vec<String>],
        wave_idx: usize,
        state: &ExecutionState,
    ) -> Option<usize> {
        let wave = &waves[wave_idx];

        for edge in &dag.loop_edges {
            if !wave.iter().any(|id| id == &edge.from) {
                continue;
            }
            if state.status(&edge.from) != Some(NodeStatus::Completed) {
                continue;
            }
            let max_iterations = match &edge.loop_spec {
                Some(loop_spec) => loop_spec.max_iterations,
                None => continue,
            };

            let iterations = state.loop_iteration(&edge.id);
            if iterations >= max_iterations {
                tracing::info!(
                    edge_id = edge.id.as_str(),
                    iterations,
                    max_iterations,
                    "loop exhausted"
                );
                self.notify(
                    self.base_event(state, EventType::LoopExhausted, "exhausted")
                        .with_loop(edge.id.as_str(), iterations, max_iterations)
                        .with_message(format!(
                            "loop edge '{}' exhausted after {iterations} iterations",
                            edge.id
                        )),
                );
                continue;
            }

            let target_wave = match find_node_wave(waves, &edge.to) {
                Some(index) => index,
                None => continue,
            };

            let new_count = state.increment_loop_iteration(&edge.id);
            let loop_input = state.output(&edge.from).unwrap_or(Value::Null);
            state.set_loop_input(&edge.to, loop_input);

            tracing::info!(
                edge_id = edge.id.as_str(),
                iteration = new_count,
                max_iterations,
                target_wave,
                "loop edge fired"
            );
            self.notify(
                self.base_event(state, EventType::LoopIteration, "running")
                    .with_loop(edge.id.as_str(), new_count, max_iterations)
                    .with_message(format!(
                        "loop edge '{}' fired ({new_count}/{max_iterations})",
                        edge.id
                    )),
            );

            return Some(target_wave);
        }

        None
    }

    /// Aggregate the outputs of terminal nodes: a single leaf unwraps, more
    /// than one becomes a map keyed by node ID
    pub(crate) fn collect_final_output(&self, dag: &Dag, state: &ExecutionState) -> Value {
        let mut outputs: Vec<(String, Value)> = dag
            .find_leaf_nodes()
            .into_iter()
            .filter_map(|id| state.output(&id).map(|output| (id, output)))
            .collect();

        match outputs.len() {
            0 => Value::Object(Map::new()),
            1 => outputs.remove(0).1,
            _ => Value::Object(outputs.into_iter().collect()),
        }
    }

    fn base_event(
        &self,
        state: &ExecutionState,
        event_type: EventType,
        status: &str,
    ) -> ExecutionEvent {
        ExecutionEvent::new(
            event_type,
            state.execution_id.as_str(),
            state.workflow_id(),
            status,
        )
    }

    pub(crate) fn notify(&self, event: ExecutionEvent) {
        self.observers.notify(event);
    }
}

/// Per-attempt deadline: node-config `timeout` (milliseconds) wins over the
/// execution-wide default
fn node_deadline(node: &Node, options: &ExecutionOptions) -> Duration {
    match node.config.get("timeout") {
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Duration::from_millis)
            .unwrap_or(options.node_timeout),
        Some(Value::String(s)) => s
            .parse::<u64>()
            .ok()
            .map(Duration::from_millis)
            .unwrap_or(options.node_timeout),
        _ => options.node_timeout,
    }
}

/// Extract the boolean branch decision of a conditional node's output
///
/// A bare boolean or a map with a boolean `result` key gates the branch;
/// anything else does not gate.
fn conditional_result(output: Option<&Value>) -> Option<bool> {
    match output? {
        Value::Bool(b) => Some(*b),
        Value::Object(map) => match map.get("result") {
            Some(Value::Bool(b)) => Some(*b),
            _ => None,
        },
        _ => None,
    }
}
