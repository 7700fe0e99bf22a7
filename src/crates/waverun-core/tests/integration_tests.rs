//! End-to-end scheduler scenarios
//!
//! Each test drives a full execution through [`DagExecutor`] with small
//! scripted executors and asserts the observable outcome: node statuses,
//! aggregated output, and the event stream.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use waverun_core::{
    BackoffStrategy, Dag, DagExecutor, Edge, EventType, ExecutionEvent, ExecutionOptions,
    ExecutionState, ExecutionStatus, Executor, ExecutorRegistry, InMemoryWorkflowLoader, Node,
    NodeStatus, Observer, ObserverManager, Result, RetryPolicy, Workflow,
};

// ---------------------------------------------------------------------------
// Test executors
// ---------------------------------------------------------------------------

/// Returns its input unchanged
struct Identity;

#[async_trait]
impl Executor for Identity {
    async fn execute(&self, _config: &Map<String, Value>, input: Value) -> Result<Value> {
        Ok(input)
    }
}

/// Returns its input and counts invocations
struct CountingIdentity {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Executor for CountingIdentity {
    async fn execute(&self, _config: &Map<String, Value>, input: Value) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(input)
    }
}

/// Conditional node: emits `{result: <scripted>}` per call
struct ScriptedCheck {
    calls: Arc<AtomicUsize>,
    results: Vec<bool>,
}

#[async_trait]
impl Executor for ScriptedCheck {
    async fn execute(&self, _config: &Map<String, Value>, _input: Value) -> Result<Value> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let result = self
            .results
            .get(call)
            .or(self.results.last())
            .copied()
            .unwrap_or(false);
        Ok(json!({ "result": result }))
    }
}

/// Fails a fixed number of times, then succeeds
struct Flaky {
    calls: Arc<AtomicUsize>,
    failures: usize,
}

#[async_trait]
impl Executor for Flaky {
    async fn execute(&self, _config: &Map<String, Value>, input: Value) -> Result<Value> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            Err(waverun_core::WorkflowError::Execution(format!(
                "transient failure {}",
                call + 1
            )))
        } else {
            Ok(input)
        }
    }
}

/// Always fails
struct AlwaysFails;

#[async_trait]
impl Executor for AlwaysFails {
    async fn execute(&self, _config: &Map<String, Value>, _input: Value) -> Result<Value> {
        Err(waverun_core::WorkflowError::Execution(
            "permanent failure".to_string(),
        ))
    }
}

/// Sleeps, tracking the number of concurrently running invocations
struct ConcurrencyProbe {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

#[async_trait]
impl Executor for ConcurrencyProbe {
    async fn execute(&self, _config: &Map<String, Value>, input: Value) -> Result<Value> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(40)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(input)
    }
}

/// Sleeps long enough to be cancelled or timed out
struct Slow;

#[async_trait]
impl Executor for Slow {
    async fn execute(&self, _config: &Map<String, Value>, input: Value) -> Result<Value> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(input)
    }
}

/// Echoes the fan-out item, failing on a marker value
struct ItemWorker;

#[async_trait]
impl Executor for ItemWorker {
    async fn execute(&self, _config: &Map<String, Value>, input: Value) -> Result<Value> {
        let item = input.get("item").cloned().unwrap_or(Value::Null);
        if item == json!("d") {
            return Err(waverun_core::WorkflowError::Execution(
                "item 'd' is poisoned".to_string(),
            ));
        }
        Ok(json!({ "processed": item }))
    }
}

/// Produces a string output of the configured length
struct BigOutput {
    len: usize,
}

#[async_trait]
impl Executor for BigOutput {
    async fn execute(&self, _config: &Map<String, Value>, _input: Value) -> Result<Value> {
        Ok(json!("x".repeat(self.len)))
    }
}

// ---------------------------------------------------------------------------
// Event collection
// ---------------------------------------------------------------------------

struct Collector {
    events: Arc<Mutex<Vec<ExecutionEvent>>>,
}

#[async_trait]
impl Observer for Collector {
    fn name(&self) -> &str {
        "collector"
    }

    async fn on_event(&self, event: ExecutionEvent) -> Result<()> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

fn collecting_manager() -> (Arc<ObserverManager>, Arc<Mutex<Vec<ExecutionEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let manager = Arc::new(ObserverManager::new());
    manager
        .register(Arc::new(Collector {
            events: events.clone(),
        }))
        .unwrap();
    (manager, events)
}

/// Let detached observer workers finish before asserting on events
async fn drain_events() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

fn count_events(events: &Mutex<Vec<ExecutionEvent>>, event_type: EventType) -> usize {
    events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| e.event_type == event_type)
        .count()
}

fn input_map(entries: &[(&str, Value)]) -> Map<String, Value> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn node_status(record: &waverun_core::ExecutionRecord, node_id: &str) -> NodeStatus {
    record
        .node_executions
        .iter()
        .find(|n| n.node_id == node_id)
        .map(|n| n.status)
        .unwrap_or_else(|| panic!("node '{node_id}' missing from record"))
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts)
        .with_initial_delay(Duration::from_millis(10))
        .with_max_delay(Duration::from_secs(1))
        .with_backoff(BackoffStrategy::Exponential)
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_basic_linear_pipeline() {
    let registry = Arc::new(ExecutorRegistry::new());
    registry.register("identity", Arc::new(Identity)).unwrap();

    let workflow = Workflow::new("wf-linear", "linear")
        .with_node(Node::new("a", "A", "identity"))
        .with_node(Node::new("b", "B", "identity"))
        .with_node(Node::new("c", "C", "identity"))
        .with_edge(Edge::new("e1", "a", "b"))
        .with_edge(Edge::new("e2", "b", "c"));

    let waves = Dag::build(&workflow).unwrap().topological_sort().unwrap();
    assert_eq!(waves, vec![vec!["a"], vec!["b"], vec!["c"]]);

    let executor = DagExecutor::new(registry);
    let record = executor
        .execute(
            workflow,
            input_map(&[("x", json!(1))]),
            ExecutionOptions::default().with_retry_policy(fast_retry(1)),
        )
        .await
        .unwrap();

    assert_eq!(record.status, ExecutionStatus::Completed);
    assert_eq!(record.output, json!({"x": 1}));
    for id in ["a", "b", "c"] {
        assert_eq!(node_status(&record, id), NodeStatus::Completed);
    }
}

#[tokio::test]
async fn test_conditional_branching_routes_true_handle() {
    let registry = Arc::new(ExecutorRegistry::new());
    registry
        .register(
            "conditional",
            Arc::new(ScriptedCheck {
                calls: Arc::new(AtomicUsize::new(0)),
                results: vec![true],
            }),
        )
        .unwrap();
    registry.register("identity", Arc::new(Identity)).unwrap();

    let workflow = Workflow::new("wf-branch", "branching")
        .with_node(Node::new("a", "A", "conditional"))
        .with_node(Node::new("b", "B", "identity"))
        .with_node(Node::new("c", "C", "identity"))
        .with_edge(Edge::new("e1", "a", "b").with_handle("true"))
        .with_edge(Edge::new("e2", "a", "c").with_handle("false"));

    let executor = DagExecutor::new(registry);
    let record = executor
        .execute(workflow, Map::new(), ExecutionOptions::default())
        .await
        .unwrap();

    assert_eq!(record.status, ExecutionStatus::Completed);
    assert_eq!(node_status(&record, "a"), NodeStatus::Completed);
    assert_eq!(node_status(&record, "b"), NodeStatus::Completed);
    assert_eq!(node_status(&record, "c"), NodeStatus::Skipped);

    let skipped = record
        .node_executions
        .iter()
        .find(|n| n.node_id == "c")
        .unwrap();
    assert!(
        skipped.error.as_deref().unwrap_or("").contains("false"),
        "skip reason should mention the untaken branch: {:?}",
        skipped.error
    );
}

#[tokio::test]
async fn test_retry_then_success_emits_retrying_events() {
    let registry = Arc::new(ExecutorRegistry::new());
    let calls = Arc::new(AtomicUsize::new(0));
    registry
        .register(
            "flaky",
            Arc::new(Flaky {
                calls: calls.clone(),
                failures: 2,
            }),
        )
        .unwrap();

    let workflow =
        Workflow::new("wf-retry", "retry").with_node(Node::new("x", "X", "flaky"));

    let (manager, events) = collecting_manager();
    let executor = DagExecutor::new(registry).with_observers(manager);
    let record = executor
        .execute(
            workflow,
            Map::new(),
            ExecutionOptions::default().with_retry_policy(fast_retry(3)),
        )
        .await
        .unwrap();
    drain_events().await;

    assert_eq!(record.status, ExecutionStatus::Completed);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(count_events(&events, EventType::NodeRetrying), 2);
    assert_eq!(count_events(&events, EventType::NodeCompleted), 1);
    assert_eq!(count_events(&events, EventType::NodeFailed), 0);
}

/// Builds the loop scenario graph:
/// `gen -> check`, `check -> select` (handle "true"),
/// `check -> fix` (handle "false"), loop edge `fix -> check`.
fn loop_workflow(max_iterations: u32) -> Workflow {
    Workflow::new("wf-loop", "loop")
        .with_node(Node::new("gen", "Generate", "identity"))
        .with_node(Node::new("check", "Check", "conditional"))
        .with_node(Node::new("select", "Select", "select"))
        .with_node(Node::new("fix", "Fix", "fix"))
        .with_edge(Edge::new("e1", "gen", "check"))
        .with_edge(Edge::new("e2", "check", "select").with_handle("true"))
        .with_edge(Edge::new("e3", "check", "fix").with_handle("false"))
        .with_edge(Edge::new("loop1", "fix", "check").with_loop(max_iterations))
}

fn loop_registry(
    check_results: Vec<bool>,
) -> (
    Arc<ExecutorRegistry>,
    Arc<AtomicUsize>,
    Arc<AtomicUsize>,
    Arc<AtomicUsize>,
) {
    let registry = Arc::new(ExecutorRegistry::new());
    let check_calls = Arc::new(AtomicUsize::new(0));
    let fix_calls = Arc::new(AtomicUsize::new(0));
    let select_calls = Arc::new(AtomicUsize::new(0));

    registry.register("identity", Arc::new(Identity)).unwrap();
    registry
        .register(
            "conditional",
            Arc::new(ScriptedCheck {
                calls: check_calls.clone(),
                results: check_results,
            }),
        )
        .unwrap();
    registry
        .register(
            "fix",
            Arc::new(CountingIdentity {
                calls: fix_calls.clone(),
            }),
        )
        .unwrap();
    registry
        .register(
            "select",
            Arc::new(CountingIdentity {
                calls: select_calls.clone(),
            }),
        )
        .unwrap();

    (registry, check_calls, fix_calls, select_calls)
}

#[tokio::test]
async fn test_loop_with_recovery() {
    let (registry, check_calls, fix_calls, select_calls) =
        loop_registry(vec![false, false, true]);
    let (manager, events) = collecting_manager();
    let executor = DagExecutor::new(registry).with_observers(manager);

    let record = executor
        .execute(loop_workflow(3), Map::new(), ExecutionOptions::default())
        .await
        .unwrap();
    drain_events().await;

    assert_eq!(record.status, ExecutionStatus::Completed);
    assert_eq!(check_calls.load(Ordering::SeqCst), 3, "check runs 3 times");
    assert_eq!(fix_calls.load(Ordering::SeqCst), 2, "fix runs 2 times");
    assert_eq!(select_calls.load(Ordering::SeqCst), 1);
    assert_eq!(node_status(&record, "select"), NodeStatus::Completed);
    assert_eq!(count_events(&events, EventType::LoopIteration), 2);
    assert_eq!(count_events(&events, EventType::LoopExhausted), 0);
}

#[tokio::test]
async fn test_loop_exhaustion() {
    let (registry, check_calls, fix_calls, select_calls) = loop_registry(vec![false]);
    let (manager, events) = collecting_manager();
    let executor = DagExecutor::new(registry).with_observers(manager);

    let record = executor
        .execute(loop_workflow(2), Map::new(), ExecutionOptions::default())
        .await
        .unwrap();
    drain_events().await;

    assert_eq!(record.status, ExecutionStatus::Completed);
    assert_eq!(check_calls.load(Ordering::SeqCst), 3, "1 initial + 2 rewinds");
    // the loop source runs once per pass, max_iterations + 1 in total
    assert_eq!(fix_calls.load(Ordering::SeqCst), 3);
    assert_eq!(select_calls.load(Ordering::SeqCst), 0);
    assert_eq!(node_status(&record, "select"), NodeStatus::Skipped);
    assert_eq!(count_events(&events, EventType::LoopIteration), 2);
    assert_eq!(count_events(&events, EventType::LoopExhausted), 1);
}

#[tokio::test]
async fn test_loop_iteration_bound_holds() {
    // property: for a loop edge with max k, the source runs at most k+1 times
    for max_iterations in 1..=3u32 {
        let (registry, _, fix_calls, _) = loop_registry(vec![false]);
        let executor = DagExecutor::new(registry);
        executor
            .execute(
                loop_workflow(max_iterations),
                Map::new(),
                ExecutionOptions::default(),
            )
            .await
            .unwrap();
        assert!(
            fix_calls.load(Ordering::SeqCst) <= (max_iterations + 1) as usize,
            "source exceeded its loop bound for max_iterations = {max_iterations}"
        );
    }
}

#[tokio::test]
async fn test_sub_workflow_fan_out_collect_partial() {
    let registry = Arc::new(ExecutorRegistry::new());
    registry.register("work_item", Arc::new(ItemWorker)).unwrap();

    let child = Workflow::new("wf-child", "child")
        .with_node(Node::new("work", "Work", "work_item"));
    let loader = Arc::new(InMemoryWorkflowLoader::new());
    loader.insert(child);

    let parent = Workflow::new("wf-parent", "parent").with_node(
        Node::new("fan", "Fan out", "sub_workflow")
            .with_config("workflow_id", json!("wf-child"))
            .with_config("for_each", json!("input.items"))
            .with_config("max_parallelism", json!(2))
            .with_config("on_error", json!("collect_partial")),
    );

    let (manager, events) = collecting_manager();
    let executor = DagExecutor::new(registry)
        .with_loader(loader)
        .with_observers(manager);

    let record = executor
        .execute(
            parent,
            input_map(&[("items", json!(["a", "b", "c", "d", "e"]))]),
            ExecutionOptions::default().with_retry_policy(fast_retry(1)),
        )
        .await
        .unwrap();
    drain_events().await;

    assert_eq!(record.status, ExecutionStatus::Completed);
    assert_eq!(node_status(&record, "fan"), NodeStatus::Completed);

    let summary = &record.output["summary"];
    assert_eq!(summary["total"], json!(5));
    assert_eq!(summary["completed"], json!(4));
    assert_eq!(summary["failed"], json!(1));

    let items = record.output["items"].as_array().unwrap();
    assert_eq!(items.len(), 5);
    for (index, item) in items.iter().enumerate() {
        assert_eq!(item["index"], json!(index));
        assert!(item["execution_id"].as_str().is_some());
    }
    let failed: Vec<&Value> = items
        .iter()
        .filter(|i| i["status"] == json!("failed"))
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0]["index"], json!(3));
    assert!(failed[0]["error"].as_str().unwrap().contains("poisoned"));

    assert!(count_events(&events, EventType::SubWorkflowProgress) >= 1);
    assert_eq!(
        count_events(&events, EventType::SubWorkflowItemCompleted),
        4
    );
    assert_eq!(count_events(&events, EventType::SubWorkflowItemFailed), 1);
}

#[tokio::test]
async fn test_sub_workflow_fail_fast_fails_node() {
    let registry = Arc::new(ExecutorRegistry::new());
    registry.register("work_item", Arc::new(ItemWorker)).unwrap();

    let child = Workflow::new("wf-child", "child")
        .with_node(Node::new("work", "Work", "work_item"));
    let loader = Arc::new(InMemoryWorkflowLoader::new());
    loader.insert(child);

    let parent = Workflow::new("wf-parent", "parent").with_node(
        Node::new("fan", "Fan out", "sub_workflow")
            .with_config("workflow_id", json!("wf-child"))
            .with_config("for_each", json!("input.items"))
            .with_config("max_parallelism", json!(1)),
    );

    let executor = DagExecutor::new(registry).with_loader(loader);
    let record = executor
        .execute(
            parent,
            input_map(&[("items", json!(["a", "d", "c"]))]),
            ExecutionOptions::default().with_retry_policy(fast_retry(1)),
        )
        .await
        .unwrap();

    assert_eq!(record.status, ExecutionStatus::Failed);
    assert_eq!(node_status(&record, "fan"), NodeStatus::Failed);
    assert!(record.error.unwrap().contains("poisoned"));
}

#[tokio::test]
async fn test_sub_workflow_empty_sequence_completes() {
    let registry = Arc::new(ExecutorRegistry::new());
    registry.register("work_item", Arc::new(ItemWorker)).unwrap();

    let child = Workflow::new("wf-child", "child")
        .with_node(Node::new("work", "Work", "work_item"));
    let loader = Arc::new(InMemoryWorkflowLoader::new());
    loader.insert(child);

    let parent = Workflow::new("wf-parent", "parent").with_node(
        Node::new("fan", "Fan out", "sub_workflow")
            .with_config("workflow_id", json!("wf-child"))
            .with_config("for_each", json!("input.items")),
    );

    let executor = DagExecutor::new(registry).with_loader(loader);
    let record = executor
        .execute(
            parent,
            input_map(&[("items", json!([]))]),
            ExecutionOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(record.status, ExecutionStatus::Completed);
    assert_eq!(record.output["summary"]["total"], json!(0));
    assert_eq!(record.output["items"], json!([]));
}

// ---------------------------------------------------------------------------
// Boundaries and policies
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_empty_workflow_completes() {
    let registry = Arc::new(ExecutorRegistry::new());
    let executor = DagExecutor::new(registry);
    let record = executor
        .execute(
            Workflow::new("wf-empty", "empty"),
            Map::new(),
            ExecutionOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(record.status, ExecutionStatus::Completed);
    assert_eq!(record.output, json!({}));
    assert!(record.node_executions.is_empty());
}

#[tokio::test]
async fn test_root_only_workflow() {
    let registry = Arc::new(ExecutorRegistry::new());
    registry.register("identity", Arc::new(Identity)).unwrap();
    let workflow =
        Workflow::new("wf-root", "root").with_node(Node::new("root", "Root", "identity"));

    let waves = Dag::build(&workflow).unwrap().topological_sort().unwrap();
    assert_eq!(waves.len(), 1);

    let executor = DagExecutor::new(registry);
    let record = executor
        .execute(workflow, input_map(&[("k", json!("v"))]), ExecutionOptions::default())
        .await
        .unwrap();
    assert_eq!(node_status(&record, "root"), NodeStatus::Completed);
    assert_eq!(record.output, json!({"k": "v"}));
}

#[tokio::test]
async fn test_cycle_fails_before_start() {
    let registry = Arc::new(ExecutorRegistry::new());
    registry.register("identity", Arc::new(Identity)).unwrap();
    let workflow = Workflow::new("wf-cycle", "cycle")
        .with_node(Node::new("a", "A", "identity"))
        .with_node(Node::new("b", "B", "identity"))
        .with_edge(Edge::new("e1", "a", "b"))
        .with_edge(Edge::new("e2", "b", "a"));

    let executor = DagExecutor::new(registry);
    let result = executor
        .execute(workflow, Map::new(), ExecutionOptions::default())
        .await;
    assert!(matches!(
        result.unwrap_err(),
        waverun_core::WorkflowError::Cycle(_)
    ));
}

#[tokio::test]
async fn test_wave_parallelism_cap() {
    let registry = Arc::new(ExecutorRegistry::new());
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    registry
        .register(
            "probe",
            Arc::new(ConcurrencyProbe {
                current: current.clone(),
                peak: peak.clone(),
            }),
        )
        .unwrap();

    let mut workflow = Workflow::new("wf-wide", "wide");
    for i in 0..6 {
        workflow = workflow.with_node(Node::new(format!("n{i}"), format!("N{i}"), "probe"));
    }

    let executor = DagExecutor::new(registry);
    let record = executor
        .execute(
            workflow,
            Map::new(),
            ExecutionOptions::default().with_max_parallelism(2),
        )
        .await
        .unwrap();

    assert_eq!(record.status, ExecutionStatus::Completed);
    assert!(
        peak.load(Ordering::SeqCst) <= 2,
        "parallelism cap exceeded: peak {}",
        peak.load(Ordering::SeqCst)
    );
}

#[tokio::test]
async fn test_continue_on_error_collects_and_proceeds() {
    let registry = Arc::new(ExecutorRegistry::new());
    registry.register("identity", Arc::new(Identity)).unwrap();
    registry.register("fails", Arc::new(AlwaysFails)).unwrap();

    // wave 0: ok + bad (parallel); wave 1: downstream of each
    let workflow = Workflow::new("wf-collect", "collect")
        .with_node(Node::new("ok", "Ok", "identity"))
        .with_node(Node::new("bad", "Bad", "fails"))
        .with_node(Node::new("after_ok", "After ok", "identity"))
        .with_node(Node::new("after_bad", "After bad", "identity"))
        .with_edge(Edge::new("e1", "ok", "after_ok"))
        .with_edge(Edge::new("e2", "bad", "after_bad"));

    let executor = DagExecutor::new(registry);
    let record = executor
        .execute(
            workflow,
            Map::new(),
            ExecutionOptions::default()
                .with_continue_on_error(true)
                .with_retry_policy(fast_retry(1)),
        )
        .await
        .unwrap();

    assert_eq!(record.status, ExecutionStatus::Failed);
    assert!(record
        .error
        .as_deref()
        .unwrap()
        .contains("permanent failure"));
    assert_eq!(node_status(&record, "ok"), NodeStatus::Completed);
    assert_eq!(node_status(&record, "bad"), NodeStatus::Failed);
    assert_eq!(node_status(&record, "after_ok"), NodeStatus::Completed);
    // no admitting edge: its only parent failed
    assert_eq!(node_status(&record, "after_bad"), NodeStatus::Skipped);
}

#[tokio::test]
async fn test_fail_fast_stops_execution() {
    let registry = Arc::new(ExecutorRegistry::new());
    registry.register("identity", Arc::new(Identity)).unwrap();
    registry.register("fails", Arc::new(AlwaysFails)).unwrap();

    let workflow = Workflow::new("wf-fast", "fast")
        .with_node(Node::new("bad", "Bad", "fails"))
        .with_node(Node::new("next", "Next", "identity"))
        .with_edge(Edge::new("e1", "bad", "next"));

    let executor = DagExecutor::new(registry);
    let record = executor
        .execute(
            workflow,
            Map::new(),
            ExecutionOptions::default().with_retry_policy(fast_retry(1)),
        )
        .await
        .unwrap();

    assert_eq!(record.status, ExecutionStatus::Failed);
    assert_eq!(node_status(&record, "bad"), NodeStatus::Failed);
    // the wave after the failure never ran
    assert_eq!(node_status(&record, "next"), NodeStatus::Pending);
}

#[tokio::test]
async fn test_node_timeout_from_config() {
    let registry = Arc::new(ExecutorRegistry::new());
    registry.register("slow", Arc::new(Slow)).unwrap();

    let workflow = Workflow::new("wf-timeout", "timeout").with_node(
        Node::new("s", "Slow", "slow").with_config("timeout", json!(50)),
    );

    let executor = DagExecutor::new(registry);
    let record = executor
        .execute(
            workflow,
            Map::new(),
            ExecutionOptions::default().with_retry_policy(fast_retry(3)),
        )
        .await
        .unwrap();

    // deadline errors are terminal: no retries despite the budget
    assert_eq!(record.status, ExecutionStatus::Failed);
    assert_eq!(node_status(&record, "s"), NodeStatus::Failed);
    assert!(record.error.unwrap().contains("exceeded"));
}

#[tokio::test]
async fn test_output_size_cap_fails_node() {
    let registry = Arc::new(ExecutorRegistry::new());
    registry
        .register("big", Arc::new(BigOutput { len: 4096 }))
        .unwrap();

    let workflow =
        Workflow::new("wf-big", "big").with_node(Node::new("b", "Big", "big"));

    let executor = DagExecutor::new(registry);
    let record = executor
        .execute(
            workflow,
            Map::new(),
            ExecutionOptions::default()
                .with_max_output_size(1024)
                .with_retry_policy(fast_retry(1)),
        )
        .await
        .unwrap();

    assert_eq!(record.status, ExecutionStatus::Failed);
    assert_eq!(node_status(&record, "b"), NodeStatus::Failed);
    assert!(record.error.unwrap().contains("exceeds limit"));
}

#[tokio::test]
async fn test_memory_threshold_warns_but_completes() {
    let registry = Arc::new(ExecutorRegistry::new());
    registry
        .register("big", Arc::new(BigOutput { len: 512 }))
        .unwrap();

    let workflow =
        Workflow::new("wf-mem", "mem").with_node(Node::new("b", "Big", "big"));

    let (manager, events) = collecting_manager();
    let executor = DagExecutor::new(registry).with_observers(manager);
    let record = executor
        .execute(
            workflow,
            Map::new(),
            ExecutionOptions::default().with_max_total_memory(100),
        )
        .await
        .unwrap();
    drain_events().await;

    assert_eq!(record.status, ExecutionStatus::Completed);
    assert_eq!(node_status(&record, "b"), NodeStatus::Completed);

    let events = events.lock().unwrap();
    let completed = events
        .iter()
        .find(|e| e.event_type == EventType::NodeCompleted)
        .unwrap();
    assert_eq!(completed.status, "warning");
    assert!(completed.message.as_deref().unwrap().contains("memory"));
}

#[tokio::test]
async fn test_cancellation_terminates_and_still_notifies() {
    let registry = Arc::new(ExecutorRegistry::new());
    registry.register("slow", Arc::new(Slow)).unwrap();

    let workflow =
        Workflow::new("wf-cancel", "cancel").with_node(Node::new("s", "Slow", "slow"));

    let (manager, events) = collecting_manager();
    let executor = DagExecutor::new(registry).with_observers(manager);

    let state = Arc::new(ExecutionState::new(Arc::new(workflow), Map::new()));
    let token = CancellationToken::new();
    let cancel_handle = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel_handle.cancel();
    });

    let record = executor
        .execute_state(state, Arc::new(ExecutionOptions::default()), token)
        .await
        .unwrap();
    drain_events().await;

    assert_eq!(record.status, ExecutionStatus::Cancelled);
    // the terminal event outlives the cancelled execution context
    assert_eq!(count_events(&events, EventType::ExecutionCancelled), 1);
}

#[tokio::test]
async fn test_clone_and_execute_matches_original() {
    let registry = Arc::new(ExecutorRegistry::new());
    registry.register("identity", Arc::new(Identity)).unwrap();

    let workflow = Workflow::new("wf-orig", "orig")
        .with_node(Node::new("a", "A", "identity"))
        .with_node(Node::new("b", "B", "identity"))
        .with_edge(Edge::new("e1", "a", "b"));
    let clone = workflow.clone_with_id("wf-copy");

    let executor = DagExecutor::new(registry);
    let input = input_map(&[("v", json!(7))]);

    let original = executor
        .execute(workflow, input.clone(), ExecutionOptions::default())
        .await
        .unwrap();
    let copied = executor
        .execute(clone, input, ExecutionOptions::default())
        .await
        .unwrap();

    assert_eq!(original.output, copied.output);
    for (a, b) in original
        .node_executions
        .iter()
        .zip(copied.node_executions.iter())
    {
        assert_eq!(a.node_id, b.node_id);
        assert_eq!(a.output, b.output);
    }
}

#[tokio::test]
async fn test_edge_condition_gates_on_output() {
    let registry = Arc::new(ExecutorRegistry::new());
    registry.register("identity", Arc::new(Identity)).unwrap();

    let workflow = Workflow::new("wf-cond", "cond")
        .with_node(Node::new("src", "Source", "identity"))
        .with_node(Node::new("high", "High", "identity"))
        .with_node(Node::new("low", "Low", "identity"))
        .with_edge(Edge::new("e1", "src", "high").with_condition("output.score > 5"))
        .with_edge(Edge::new("e2", "src", "low").with_condition("output.score <= 5"));

    let executor = DagExecutor::new(registry);
    let record = executor
        .execute(
            workflow,
            input_map(&[("score", json!(9))]),
            ExecutionOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(record.status, ExecutionStatus::Completed);
    assert_eq!(node_status(&record, "high"), NodeStatus::Completed);
    assert_eq!(node_status(&record, "low"), NodeStatus::Skipped);
}
