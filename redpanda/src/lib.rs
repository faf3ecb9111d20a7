//! Redpanda event bus for fulfillment services.
//!
//! Implements the [`EventBus`] trait from `fulfillment-core` over rdkafka, so
//! any Kafka-compatible broker works (Redpanda, Apache Kafka, MSK).
//!
//! # Wire Format
//!
//! Each [`SerializedEvent`] maps onto one Kafka record:
//!
//! | Event field  | Record part                                    |
//! |--------------|------------------------------------------------|
//! | `data`       | payload, the event's JSON as-is                |
//! | `key`        | record key, falling back to `event_type`       |
//! | `event_type` | `event-type` header                            |
//! | `metadata`   | `metadata` header (JSON), omitted when absent  |
//!
//! Keeping the payload plain JSON lets services outside this workspace read
//! and write the same topics.
//!
//! # Delivery Semantics
//!
//! **At-least-once delivery** with manual offset commits:
//! - Offsets are committed AFTER the event reaches the subscriber's channel
//! - If the process crashes before commit, events are redelivered
//! - Subscribers must be idempotent
//! - Ordering holds within a partition, so events sharing a key stay ordered
//!
//! # Example
//!
//! ```no_run
//! use fulfillment_core::event::SerializedEvent;
//! use fulfillment_core::event_bus::EventBus;
//! use fulfillment_redpanda::RedpandaEventBus;
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let event_bus = RedpandaEventBus::builder()
//!     .brokers("localhost:9092")
//!     .consumer_group("fulfillment-shelf")
//!     .build()?;
//!
//! let event = SerializedEvent::new("NewRequest.v1".to_string(), b"{}".to_vec(), None)
//!     .with_key("42");
//! event_bus.publish("shelf-events", &event).await?;
//!
//! let mut stream = event_bus.subscribe(&["shelf-events"]).await?;
//! while let Some(result) = stream.next().await {
//!     match result {
//!         Ok(event) => println!("Received: {}", event.event_type),
//!         Err(e) => eprintln!("Error: {e}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use fulfillment_core::event::SerializedEvent;
use fulfillment_core::event_bus::{EventBus, EventBusError, EventStream};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Header carrying [`SerializedEvent::event_type`].
pub const EVENT_TYPE_HEADER: &str = "event-type";

/// Header carrying [`SerializedEvent::metadata`] as JSON.
pub const METADATA_HEADER: &str = "metadata";

const DEFAULT_BUFFER_SIZE: usize = 1000;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Redpanda event bus.
///
/// One producer is shared by all publishes. Every call to
/// [`subscribe`](EventBus::subscribe) creates its own consumer, owned by a
/// background task that forwards records into a bounded channel.
///
/// # Example
///
/// ```no_run
/// use fulfillment_redpanda::RedpandaEventBus;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let event_bus = RedpandaEventBus::builder()
///     .brokers("localhost:9092,localhost:9093")
///     .producer_acks("all")
///     .compression("lz4")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RedpandaEventBus {
    producer: FutureProducer,
    brokers: String,
    timeout: Duration,
    consumer_group: Option<String>,
    buffer_size: usize,
    auto_offset_reset: String,
}

impl RedpandaEventBus {
    /// Create an event bus with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the producer cannot be created.
    pub fn new(brokers: &str) -> Result<Self, EventBusError> {
        Self::builder().brokers(brokers).build()
    }

    /// Start configuring an event bus.
    #[must_use]
    pub fn builder() -> RedpandaEventBusBuilder {
        RedpandaEventBusBuilder::default()
    }

    /// Bootstrap servers this bus connects to.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    fn consumer_group_for(&self, topics: &[String]) -> String {
        self.consumer_group.clone().unwrap_or_else(|| {
            let mut sorted = topics.to_vec();
            sorted.sort();
            format!("fulfillment-{}", sorted.join("-"))
        })
    }
}

/// Builder for [`RedpandaEventBus`].
#[derive(Default)]
pub struct RedpandaEventBusBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    consumer_group: Option<String>,
    buffer_size: Option<usize>,
    auto_offset_reset: Option<String>,
}

impl RedpandaEventBusBuilder {
    /// Comma-separated broker addresses, e.g. `"localhost:9092"`.
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Producer acknowledgment mode: `"0"`, `"1"` or `"all"`. Default `"1"`.
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Compression codec: `"none"`, `"gzip"`, `"snappy"`, `"lz4"` or `"zstd"`.
    /// Default `"none"`.
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Producer send timeout. Default 5 seconds.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Consumer group used by every subscription of this bus.
    ///
    /// Instances sharing a group split the partitions between them; instances
    /// with distinct groups each see every record. Without an explicit group
    /// one is derived from the subscribed topics.
    #[must_use]
    pub fn consumer_group(mut self, consumer_group: impl Into<String>) -> Self {
        self.consumer_group = Some(consumer_group.into());
        self
    }

    /// Events buffered between the Kafka consumer and the subscriber.
    ///
    /// Default 1000. Zero is raised to one.
    #[must_use]
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size.max(1));
        self
    }

    /// Where a new consumer group starts reading: `"earliest"`, `"latest"`
    /// or `"error"`. Default `"latest"`.
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Build the bus.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if no brokers were set or
    /// the producer cannot be created.
    pub fn build(self) -> Result<RedpandaEventBus, EventBusError> {
        let brokers = self
            .brokers
            .filter(|b| !b.trim().is_empty())
            .ok_or_else(|| EventBusError::ConnectionFailed("Brokers not configured".to_string()))?;
        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let acks = self.producer_acks.as_deref().unwrap_or("1");
        let compression = self.compression.as_deref().unwrap_or("none");

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("acks", acks)
            .set("compression.type", compression)
            .create()
            .map_err(|e| {
                EventBusError::ConnectionFailed(format!("Failed to create producer: {e}"))
            })?;

        let buffer_size = self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        let auto_offset_reset = self
            .auto_offset_reset
            .unwrap_or_else(|| "latest".to_string());

        tracing::info!(
            brokers = %brokers,
            acks,
            compression,
            buffer_size,
            auto_offset_reset = %auto_offset_reset,
            "RedpandaEventBus created"
        );

        Ok(RedpandaEventBus {
            producer,
            brokers,
            timeout,
            consumer_group: self.consumer_group,
            buffer_size,
            auto_offset_reset,
        })
    }
}

/// Headers for an outgoing record.
fn encode_headers(event: &SerializedEvent) -> Result<OwnedHeaders, serde_json::Error> {
    let headers = OwnedHeaders::new().insert(Header {
        key: EVENT_TYPE_HEADER,
        value: Some(event.event_type.as_str()),
    });

    match &event.metadata {
        Some(metadata) => {
            let bytes = serde_json::to_vec(metadata)?;
            Ok(headers.insert(Header {
                key: METADATA_HEADER,
                value: Some(bytes.as_slice()),
            }))
        }
        None => Ok(headers),
    }
}

/// Rebuild a [`SerializedEvent`] from a received record.
fn decode_message<M: Message>(message: &M) -> Result<SerializedEvent, EventBusError> {
    let data = message
        .payload()
        .ok_or_else(|| EventBusError::DeserializationFailed("Message has no payload".to_string()))?
        .to_vec();

    let mut event_type = None;
    let mut metadata = None;
    if let Some(headers) = message.headers() {
        for header in headers.iter() {
            match (header.key, header.value) {
                (EVENT_TYPE_HEADER, Some(value)) => {
                    event_type = Some(String::from_utf8_lossy(value).into_owned());
                }
                (METADATA_HEADER, Some(value)) => {
                    metadata = Some(serde_json::from_slice(value).map_err(|e| {
                        EventBusError::DeserializationFailed(format!("Invalid metadata header: {e}"))
                    })?);
                }
                _ => {}
            }
        }
    }

    let event_type = event_type.ok_or_else(|| {
        EventBusError::DeserializationFailed(format!("Message has no {EVENT_TYPE_HEADER} header"))
    })?;
    let key = message
        .key()
        .and_then(|k| std::str::from_utf8(k).ok())
        .map(str::to_string);

    Ok(SerializedEvent {
        event_type,
        key,
        data,
        metadata,
    })
}

impl EventBus for RedpandaEventBus {
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let event = event.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            let headers = encode_headers(&event).map_err(|e| EventBusError::PublishFailed {
                topic: topic.clone(),
                reason: format!("Failed to encode metadata: {e}"),
            })?;
            let key = event.key.as_deref().unwrap_or(&event.event_type);

            let record = FutureRecord::to(&topic)
                .payload(event.data.as_slice())
                .key(key)
                .headers(headers);

            match self.producer.send(record, Timeout::After(timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic = %topic,
                        partition,
                        offset,
                        event_type = %event.event_type,
                        key,
                        "Event published"
                    );
                    Ok(())
                }
                Err((kafka_error, _)) => {
                    tracing::error!(topic = %topic, error = %kafka_error, "Failed to publish event");
                    Err(EventBusError::PublishFailed {
                        topic,
                        reason: kafka_error.to_string(),
                    })
                }
            }
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(|s| (*s).to_string()).collect();
        let consumer_group_id = self.consumer_group_for(&topics);
        let brokers = self.brokers.clone();
        let buffer_size = self.buffer_size;
        let auto_offset_reset = self.auto_offset_reset.clone();

        Box::pin(async move {
            let consumer: StreamConsumer = ClientConfig::new()
                .set("bootstrap.servers", &brokers)
                .set("group.id", &consumer_group_id)
                .set("enable.auto.commit", "false")
                .set("auto.offset.reset", &auto_offset_reset)
                .set("session.timeout.ms", "6000")
                .set("enable.partition.eof", "false")
                .create()
                .map_err(|e| EventBusError::SubscriptionFailed {
                    topics: topics.clone(),
                    reason: format!("Failed to create consumer: {e}"),
                })?;

            let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
            consumer
                .subscribe(&topic_refs)
                .map_err(|e| EventBusError::SubscriptionFailed {
                    topics: topics.clone(),
                    reason: format!("Failed to subscribe to topics: {e}"),
                })?;

            tracing::info!(
                topics = ?topics,
                consumer_group = %consumer_group_id,
                buffer_size,
                auto_offset_reset = %auto_offset_reset,
                "Subscribed to topics"
            );

            let (tx, mut rx) = tokio::sync::mpsc::channel(buffer_size);

            tokio::spawn(async move {
                use futures::StreamExt;
                use rdkafka::consumer::CommitMode;

                let mut stream = consumer.stream();

                while let Some(msg_result) = stream.next().await {
                    match msg_result {
                        Ok(message) => {
                            let event_result = decode_message(&message);
                            if let Ok(event) = &event_result {
                                tracing::trace!(
                                    topic = message.topic(),
                                    partition = message.partition(),
                                    offset = message.offset(),
                                    event_type = %event.event_type,
                                    "Received event"
                                );
                            }

                            // Undecodable records are committed too, or they would
                            // be redelivered forever.
                            if tx.send(event_result).await.is_err() {
                                tracing::debug!("Subscriber dropped, exiting consumer task");
                                break;
                            }

                            if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                                tracing::warn!(
                                    topic = message.topic(),
                                    partition = message.partition(),
                                    offset = message.offset(),
                                    error = %e,
                                    "Failed to commit offset, message may be redelivered"
                                );
                            }
                        }
                        Err(e) => {
                            let err = EventBusError::TransportError(format!(
                                "Failed to receive message: {e}"
                            ));
                            if tx.send(Err(err)).await.is_err() {
                                break;
                            }
                        }
                    }
                }

                tracing::debug!("Consumer task exiting");
            });

            let stream = async_stream::stream! {
                while let Some(result) = rx.recv().await {
                    yield result;
                }
            };

            Ok(Box::pin(stream) as EventStream)
        })
    }
}
