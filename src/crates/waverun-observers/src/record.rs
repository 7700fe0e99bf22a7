//! Event-record observer
//!
//! Maps every event to a flat record and hands it to an [`EventSink`].
//! The sink is the narrow shape of an execution-events repository; the
//! engine only consumes it, persistence lives elsewhere. This observer
//! carries no filter and sees every event.

use async_trait::async_trait;
use serde_json::{Map, Value};
use waverun_core::{ExecutionEvent, Observer, Result};

/// One persisted event row
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub execution_id: String,
    pub event_type: String,
    /// Every populated event field, flattened
    pub payload: Map<String, Value>,
}

/// Destination for event records
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn store(&self, record: EventRecord) -> Result<()>;
}

/// Observer forwarding every event to a sink as an [`EventRecord`]
pub struct RecordObserver<S: EventSink> {
    name: String,
    sink: S,
}

impl<S: EventSink> RecordObserver<S> {
    pub fn new(sink: S) -> Self {
        Self {
            name: "event-records".to_string(),
            sink,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl<S: EventSink> Observer for RecordObserver<S> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_event(&self, event: ExecutionEvent) -> Result<()> {
        let record = EventRecord {
            execution_id: event.execution_id.clone(),
            event_type: event.event_type.as_str().to_string(),
            payload: event.payload(),
        };
        self.sink.store(record).await
    }
}
