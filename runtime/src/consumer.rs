//! Generic event bus consumer with automatic reconnection.
//!
//! `EventConsumer` owns the subscribe-process-reconnect loop so each consumer
//! in the service only has to implement [`EventHandler`].
//!
//! ```text
//! loop {
//!     subscribe (retry after delay on failure)
//!     loop {
//!         next event -> handler (errors logged, processing continues)
//!         shutdown?  -> exit
//!     }
//!     stream ended -> wait, resubscribe
//! }
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let consumer = EventConsumer::builder()
//!     .name("shelf-events")
//!     .topics(vec!["shelf-events".to_string()])
//!     .event_bus(event_bus)
//!     .handler(handler)
//!     .shutdown(shutdown_tx.subscribe())
//!     .build()?;
//!
//! let handle = consumer.spawn();
//! ```

use crate::handler::EventHandler;
use crate::metrics::ConsumerMetrics;
use fulfillment_core::event::SerializedEvent;
use fulfillment_core::event_bus::EventBus;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Default wait before resubscribing after a failure.
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Errors from building a consumer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsumerError {
    /// A required builder field was not set.
    #[error("EventConsumer is missing required field '{0}'")]
    MissingField(&'static str),

    /// No topics were given.
    #[error("EventConsumer '{0}' has no topics to subscribe to")]
    NoTopics(String),
}

/// Generic event bus consumer.
///
/// # Lifecycle
///
/// 1. Created via `builder()` or `new()`
/// 2. Spawned as background task via `spawn()`
/// 3. Runs until the shutdown signal fires (or its sender is dropped)
pub struct EventConsumer {
    /// Consumer name (for logging and monitoring)
    name: String,

    /// Topics to subscribe to
    topics: Vec<String>,

    /// Event bus to consume from
    event_bus: Arc<dyn EventBus>,

    /// Handler for processing events
    handler: Arc<dyn EventHandler>,

    /// Shutdown signal receiver
    shutdown: broadcast::Receiver<()>,

    /// Retry delay on connection failure (default: 5 seconds)
    retry_delay: Duration,
}

impl EventConsumer {
    /// Create a new event consumer with the default retry delay (5 seconds).
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        topics: Vec<String>,
        event_bus: Arc<dyn EventBus>,
        handler: Arc<dyn EventHandler>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            name: name.into(),
            topics,
            event_bus,
            handler,
            shutdown,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Create a builder for configuring a consumer.
    #[must_use]
    pub fn builder() -> EventConsumerBuilder {
        EventConsumerBuilder::default()
    }

    /// Set custom retry delay.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Consumer name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Spawn the consumer as a background task.
    ///
    /// The returned handle completes once the consumer has observed shutdown.
    #[must_use]
    pub fn spawn(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&mut self) {
        info!(consumer = %self.name, topics = ?self.topics, "Event consumer started");

        loop {
            let topics: Vec<&str> = self.topics.iter().map(String::as_str).collect();

            let subscribe_result = tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(consumer = %self.name, "Event consumer received shutdown signal");
                    break;
                }
                result = self.event_bus.subscribe(&topics) => result,
            };

            match subscribe_result {
                Ok(mut stream) => {
                    info!(consumer = %self.name, topics = ?self.topics, "Subscribed to event bus");
                    if self.process_stream(&mut stream).await == StreamEnd::Shutdown {
                        break;
                    }
                    warn!(
                        consumer = %self.name,
                        "Event stream ended, reconnecting in {:?}",
                        self.retry_delay
                    );
                }
                Err(e) => {
                    error!(
                        consumer = %self.name,
                        error = %e,
                        "Failed to subscribe to event bus, retrying in {:?}",
                        self.retry_delay
                    );
                }
            }

            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(consumer = %self.name, "Event consumer received shutdown signal while waiting to reconnect");
                    break;
                }
                () = tokio::time::sleep(self.retry_delay) => {}
            }
        }

        info!(consumer = %self.name, "Event consumer stopped");
    }

    async fn process_stream<S, E>(&mut self, stream: &mut S) -> StreamEnd
    where
        S: futures::Stream<Item = Result<SerializedEvent, E>> + Unpin + Send,
        E: std::fmt::Display,
    {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(consumer = %self.name, "Event consumer received shutdown signal during processing");
                    return StreamEnd::Shutdown;
                }
                next = stream.next() => match next {
                    Some(Ok(event)) => {
                        debug!(consumer = %self.name, event_type = %event.event_type, "Handling event");
                        match self.handler.handle(&event).await {
                            Ok(()) => ConsumerMetrics::record_handled(&self.name),
                            Err(e) => {
                                ConsumerMetrics::record_handler_error(&self.name);
                                error!(
                                    consumer = %self.name,
                                    event_type = %event.event_type,
                                    error = %e,
                                    "Failed to handle event"
                                );
                            }
                        }
                    }
                    Some(Err(e)) => {
                        ConsumerMetrics::record_handler_error(&self.name);
                        error!(consumer = %self.name, error = %e, "Error receiving event from stream");
                    }
                    None => return StreamEnd::Closed,
                },
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEnd {
    Shutdown,
    Closed,
}

/// Builder for configuring an `EventConsumer`.
#[derive(Default)]
pub struct EventConsumerBuilder {
    name: Option<String>,
    topics: Option<Vec<String>>,
    event_bus: Option<Arc<dyn EventBus>>,
    handler: Option<Arc<dyn EventHandler>>,
    shutdown: Option<broadcast::Receiver<()>>,
    retry_delay: Option<Duration>,
}

impl EventConsumerBuilder {
    /// Set consumer name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set topics to subscribe to.
    #[must_use]
    pub fn topics(mut self, topics: Vec<String>) -> Self {
        self.topics = Some(topics);
        self
    }

    /// Set event bus instance.
    #[must_use]
    pub fn event_bus(mut self, event_bus: Arc<dyn EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Set event handler.
    #[must_use]
    pub fn handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Set shutdown signal receiver.
    #[must_use]
    pub fn shutdown(mut self, shutdown: broadcast::Receiver<()>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Set custom retry delay (default: 5 seconds).
    #[must_use]
    pub const fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Build the `EventConsumer`.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError::MissingField`] if name, topics, event bus,
    /// handler or shutdown are unset, and [`ConsumerError::NoTopics`] if the
    /// topic list is empty.
    pub fn build(self) -> Result<EventConsumer, ConsumerError> {
        let name = self.name.ok_or(ConsumerError::MissingField("name"))?;
        let topics = self.topics.ok_or(ConsumerError::MissingField("topics"))?;
        if topics.is_empty() {
            return Err(ConsumerError::NoTopics(name));
        }

        Ok(EventConsumer {
            name,
            topics,
            event_bus: self.event_bus.ok_or(ConsumerError::MissingField("event_bus"))?,
            handler: self.handler.ok_or(ConsumerError::MissingField("handler"))?,
            shutdown: self.shutdown.ok_or(ConsumerError::MissingField("shutdown"))?,
            retry_delay: self.retry_delay.unwrap_or(DEFAULT_RETRY_DELAY),
        })
    }
}
