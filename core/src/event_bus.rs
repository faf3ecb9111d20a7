//! Event bus abstraction for cross-service messaging.
//!
//! Three flows ride on the bus:
//!
//! ```text
//!  creation ──► shelf-events ──────────► packing
//!  packing  ──► kitchen-requests ──────► kitchen (external)
//!  packing  ──► request-status-changes ─► notification hub
//! ```
//!
//! # Key Principles
//!
//! - **At-least-once delivery**: events may be delivered multiple times
//! - **Idempotency**: subscribers must tolerate duplicates; packing is
//!   idempotent with respect to already-committed progress
//! - **Ordered within partition**: events sharing a key keep their order
//!
//! # Implementations
//!
//! - `InMemoryEventBus` in `fulfillment-testing` - for tests
//! - `RedpandaEventBus` in `fulfillment-redpanda` - for production (Kafka-compatible)

use crate::event::SerializedEvent;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Transport failures reported by an [`EventBus`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    /// Brokers unreachable or client misconfigured
    #[error("Cannot reach event bus: {0}")]
    ConnectionFailed(String),

    /// A message was not accepted by the broker
    #[error("Could not publish to '{topic}': {reason}")]
    PublishFailed {
        /// Destination topic
        topic: String,
        /// Broker or encoding error
        reason: String,
    },

    /// A consumer could not join its topics
    #[error("Could not subscribe to {topics:?}: {reason}")]
    SubscriptionFailed {
        /// Requested topics
        topics: Vec<String>,
        /// Broker error
        reason: String,
    },

    /// A received message lacked required headers or was malformed
    #[error("Malformed message: {0}")]
    DeserializationFailed(String),

    /// Receive-side failure, such as a lagging subscriber
    #[error("Event bus transport: {0}")]
    TransportError(String),
}

/// Messages delivered to a subscriber, in partition order per key.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<SerializedEvent, EventBusError>> + Send>>;

/// Publish/subscribe transport shared by publishers and consumers.
///
/// # Dyn Compatibility
///
/// Uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn` so the
/// bus can be shared as `Arc<dyn EventBus>` between publishers and consumers.
pub trait EventBus: Send + Sync {
    /// Send `event` to `topic`, partitioned by its key.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] when the broker rejects or
    /// times out the message.
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;

    /// Join `topics` and stream what arrives from now on.
    ///
    /// Only events published after the subscription is established are
    /// guaranteed to be delivered.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] when the consumer cannot
    /// be created or assigned.
    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>>;
}
