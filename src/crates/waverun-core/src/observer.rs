//! Observer fan-out
//!
//! The scheduler publishes every lifecycle event through an
//! [`ObserverManager`]. Notification is deliberately decoupled from the
//! execution's cancellation scope: each observer receives its own detached
//! worker task, so terminal events (`execution.cancelled` included) are
//! still delivered after the execution context is torn down.
//!
//! ```text
//! scheduler ──▶ ObserverManager::notify(event)
//!                 │  snapshot observers under a read lock
//!                 ├──▶ task: filter ──▶ observer A (panic-isolated)
//!                 ├──▶ task: filter ──▶ observer B (panic-isolated)
//!                 └──▶ task: filter ──▶ observer C (panic-isolated)
//! ```
//!
//! Observer errors are logged and never surface to the execution. A
//! panicking observer is contained by its worker and cannot affect
//! siblings or the scheduler.

use crate::error::{Result, WorkflowError};
use crate::event::{EventType, ExecutionEvent};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Event consumer registered with the manager
#[async_trait]
pub trait Observer: Send + Sync {
    /// Unique name; registration under a taken name fails
    fn name(&self) -> &str;

    /// Optional filter consulted before delivery
    fn filter(&self) -> Option<Arc<dyn EventFilter>> {
        None
    }

    /// Handle one event; errors are logged by the manager and dropped
    async fn on_event(&self, event: ExecutionEvent) -> Result<()>;
}

/// Predicate deciding whether an observer sees an event
pub trait EventFilter: Send + Sync {
    fn should_notify(&self, event: &ExecutionEvent) -> bool;
}

/// Membership in a fixed set of event types; an empty set matches all
#[derive(Debug, Default)]
pub struct EventTypeFilter {
    types: HashSet<EventType>,
}

impl EventTypeFilter {
    pub fn new(types: impl IntoIterator<Item = EventType>) -> Self {
        Self {
            types: types.into_iter().collect(),
        }
    }
}

impl EventFilter for EventTypeFilter {
    fn should_notify(&self, event: &ExecutionEvent) -> bool {
        self.types.is_empty() || self.types.contains(&event.event_type)
    }
}

/// Exact execution-ID match
#[derive(Debug)]
pub struct ExecutionIdFilter {
    execution_id: String,
}

impl ExecutionIdFilter {
    pub fn new(execution_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
        }
    }
}

impl EventFilter for ExecutionIdFilter {
    fn should_notify(&self, event: &ExecutionEvent) -> bool {
        event.execution_id == self.execution_id
    }
}

/// Node-ID membership; events without a node pass
#[derive(Debug)]
pub struct NodeIdFilter {
    node_ids: HashSet<String>,
}

impl NodeIdFilter {
    pub fn new(node_ids: impl IntoIterator<Item = String>) -> Self {
        Self {
            node_ids: node_ids.into_iter().collect(),
        }
    }
}

impl EventFilter for NodeIdFilter {
    fn should_notify(&self, event: &ExecutionEvent) -> bool {
        match &event.node_id {
            Some(node_id) => self.node_ids.contains(node_id),
            None => true,
        }
    }
}

/// Conjunction of filters
pub struct CompoundFilter {
    filters: Vec<Arc<dyn EventFilter>>,
}

impl CompoundFilter {
    /// Strip `None`s and collapse: empty input yields `None`, a single
    /// survivor is returned unwrapped, anything else becomes a conjunction
    pub fn combine(
        filters: impl IntoIterator<Item = Option<Arc<dyn EventFilter>>>,
    ) -> Option<Arc<dyn EventFilter>> {
        let mut survivors: Vec<Arc<dyn EventFilter>> = filters.into_iter().flatten().collect();
        match survivors.len() {
            0 => None,
            1 => survivors.pop(),
            _ => Some(Arc::new(CompoundFilter { filters: survivors })),
        }
    }
}

impl EventFilter for CompoundFilter {
    fn should_notify(&self, event: &ExecutionEvent) -> bool {
        self.filters.iter().all(|f| f.should_notify(event))
    }
}

/// Registry and fan-out point for observers
#[derive(Default)]
pub struct ObserverManager {
    observers: RwLock<HashMap<String, Arc<dyn Observer>>>,
}

impl ObserverManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer; duplicate names fail
    pub fn register(&self, observer: Arc<dyn Observer>) -> Result<()> {
        let name = observer.name().to_string();
        let mut observers = self.observers.write();
        if observers.contains_key(&name) {
            return Err(WorkflowError::Validation(format!(
                "observer '{name}' already registered"
            )));
        }
        observers.insert(name, observer);
        Ok(())
    }

    /// Remove an observer by name
    pub fn unregister(&self, name: &str) -> Result<()> {
        self.observers
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| WorkflowError::Validation(format!("observer '{name}' not registered")))
    }

    pub fn count(&self) -> usize {
        self.observers.read().len()
    }

    /// Fan an event out to every registered observer
    ///
    /// Each observer gets a detached worker that applies its filter, calls
    /// `on_event`, and contains panics. The call returns immediately;
    /// delivery is best-effort and unordered, and proceeds even if the
    /// caller's execution context is cancelled right after.
    pub fn notify(&self, event: ExecutionEvent) {
        let snapshot: Vec<Arc<dyn Observer>> =
            self.observers.read().values().cloned().collect();
        if snapshot.is_empty() {
            return;
        }

        for observer in snapshot {
            let event = event.clone();
            tokio::spawn(async move {
                if let Some(filter) = observer.filter() {
                    if !filter.should_notify(&event) {
                        return;
                    }
                }

                let name = observer.name().to_string();
                let event_type = event.event_type;
                let worker = tokio::spawn(async move { observer.on_event(event).await });
                match worker.await {
                    Ok(Ok(())) => {}
                    Ok(Err(error)) => {
                        tracing::warn!(
                            observer = name.as_str(),
                            event_type = %event_type,
                            error = %error,
                            "observer returned an error"
                        );
                    }
                    Err(join_error) if join_error.is_panic() => {
                        tracing::error!(
                            observer = name.as_str(),
                            event_type = %event_type,
                            "observer panicked while handling event"
                        );
                    }
                    Err(_) => {}
                }
            });
        }
    }
}

impl std::fmt::Debug for ObserverManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverManager")
            .field("count", &self.count())
            .finish()
    }
}
