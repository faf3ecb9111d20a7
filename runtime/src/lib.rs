//! # Fulfillment Runtime
//!
//! Infrastructure shared by fulfillment services:
//!
//! - [`consumer::EventConsumer`]: subscribe-process-reconnect loop over an
//!   [`EventBus`](fulfillment_core::event_bus::EventBus)
//! - [`handler::EventHandler`]: pluggable per-event processing
//! - [`retry`]: exponential backoff with jitter
//! - [`metrics`]: Prometheus exporter and metric recorders
//! - [`shutdown`]: signal handling and graceful task shutdown

pub mod consumer;
pub mod handler;
pub mod metrics;
pub mod retry;
pub mod shutdown;

pub use consumer::{ConsumerError, EventConsumer, EventConsumerBuilder};
pub use handler::{EventHandler, HandlerError};
pub use retry::{RetryPolicy, retry_with_backoff, retry_with_predicate};
