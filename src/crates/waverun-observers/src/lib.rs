//! # waverun-observers
//!
//! Ready-to-use observers for the waverun engine:
//!
//! - [`LoggingObserver`]: structured `tracing` lines, level chosen by event
//!   class (failures log at error, retries at warn, the rest at info)
//! - [`WebhookObserver`]: delivers events as JSON over HTTP with its own
//!   multiplier backoff
//! - [`RecordObserver`]: maps every event to a flat
//!   `{execution_id, event_type, payload}` record and hands it to an
//!   [`EventSink`] — the persistence-repository shape
//!
//! Register any of them with an
//! [`ObserverManager`](waverun_core::ObserverManager):
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use waverun_core::ObserverManager;
//! use waverun_observers::LoggingObserver;
//!
//! let manager = ObserverManager::new();
//! manager.register(Arc::new(LoggingObserver::new())).unwrap();
//! ```

pub mod logging;
pub mod record;
pub mod webhook;

pub use logging::LoggingObserver;
pub use record::{EventRecord, EventSink, RecordObserver};
pub use webhook::{WebhookConfig, WebhookObserver};
