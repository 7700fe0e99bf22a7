//! Structured logging observer

use async_trait::async_trait;
use waverun_core::{EventFilter, EventType, ExecutionEvent, Observer, Result};

/// Logs every event through `tracing`
///
/// The level follows the event class: failures at `error`, retries at
/// `warn`, completions and everything else at `info`.
pub struct LoggingObserver {
    name: String,
}

impl LoggingObserver {
    pub fn new() -> Self {
        Self {
            name: "logging".to_string(),
        }
    }

    /// Use a custom registration name (several logging observers with
    /// different filters can then coexist)
    pub fn with_name(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for LoggingObserver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Observer for LoggingObserver {
    fn name(&self) -> &str {
        &self.name
    }

    fn filter(&self) -> Option<std::sync::Arc<dyn EventFilter>> {
        None
    }

    async fn on_event(&self, event: ExecutionEvent) -> Result<()> {
        let node = event.node_id.as_deref().unwrap_or("");
        let error = event.error.as_deref().unwrap_or("");
        let message = event.message.as_deref().unwrap_or("");

        match event.event_type {
            EventType::ExecutionFailed | EventType::NodeFailed | EventType::SubWorkflowItemFailed => {
                tracing::error!(
                    event_type = %event.event_type,
                    execution_id = event.execution_id.as_str(),
                    workflow_id = event.workflow_id.as_str(),
                    node_id = node,
                    status = event.status.as_str(),
                    error,
                    "workflow event"
                );
            }
            EventType::NodeRetrying => {
                tracing::warn!(
                    event_type = %event.event_type,
                    execution_id = event.execution_id.as_str(),
                    workflow_id = event.workflow_id.as_str(),
                    node_id = node,
                    status = event.status.as_str(),
                    error,
                    message,
                    "workflow event"
                );
            }
            _ => {
                tracing::info!(
                    event_type = %event.event_type,
                    execution_id = event.execution_id.as_str(),
                    workflow_id = event.workflow_id.as_str(),
                    node_id = node,
                    status = event.status.as_str(),
                    duration_ms = event.duration_ms.unwrap_or(0),
                    message,
                    "workflow event"
                );
            }
        }
        Ok(())
    }
}
