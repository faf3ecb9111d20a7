//! In-memory event bus for tests.

#![allow(clippy::unwrap_used)] // Test infrastructure: a poisoned lock means a test already panicked
#![allow(clippy::missing_panics_doc)]

use fulfillment_core::event::SerializedEvent;
use fulfillment_core::event_bus::{EventBus, EventBusError, EventStream};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

const TOPIC_CAPACITY: usize = 1024;

#[derive(Default)]
struct BusState {
    topics: HashMap<String, broadcast::Sender<SerializedEvent>>,
    published: Vec<(String, SerializedEvent)>,
    failing_topics: HashSet<String>,
}

impl BusState {
    fn sender(&mut self, topic: &str) -> &broadcast::Sender<SerializedEvent> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
    }
}

/// Event bus backed by one tokio broadcast channel per topic.
///
/// Subscribers receive events published after they subscribed. Every
/// successful publish is also recorded for assertions.
///
/// # Example
///
/// ```
/// use fulfillment_core::event::SerializedEvent;
/// use fulfillment_core::event_bus::EventBus;
/// use fulfillment_testing::InMemoryEventBus;
///
/// # tokio_test::block_on(async {
/// let bus = InMemoryEventBus::new();
/// let event = SerializedEvent::new("Ping.v1".into(), b"{}".to_vec(), None);
/// bus.publish("pings", &event).await.unwrap();
/// assert_eq!(bus.published("pings").len(), 1);
/// # });
/// ```
#[derive(Clone, Default)]
pub struct InMemoryEventBus {
    state: Arc<RwLock<BusState>>,
}

impl InMemoryEventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events successfully published to `topic`, in order.
    #[must_use]
    pub fn published(&self, topic: &str) -> Vec<SerializedEvent> {
        self.state
            .read()
            .unwrap()
            .published
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, event)| event.clone())
            .collect()
    }

    /// Number of live subscriptions covering `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.state
            .read()
            .unwrap()
            .topics
            .get(topic)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// Make every publish to `topic` fail until [`restore_publishes_to`](Self::restore_publishes_to).
    pub fn fail_publishes_to(&self, topic: &str) {
        self.state.write().unwrap().failing_topics.insert(topic.to_string());
    }

    /// Undo [`fail_publishes_to`](Self::fail_publishes_to).
    pub fn restore_publishes_to(&self, topic: &str) {
        self.state.write().unwrap().failing_topics.remove(topic);
    }

    /// Forget recorded publishes.
    pub fn clear(&self) {
        self.state.write().unwrap().published.clear();
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let event = event.clone();

        Box::pin(async move {
            let mut state = self.state.write().unwrap();
            if state.failing_topics.contains(&topic) {
                return Err(EventBusError::PublishFailed {
                    topic,
                    reason: "publishing disabled for test".to_string(),
                });
            }

            // No receivers is not an error: the event is simply not observed.
            let _ = state.sender(&topic).send(event.clone());
            state.published.push((topic, event));
            Ok(())
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let receivers: Vec<_> = {
            let mut state = self.state.write().unwrap();
            topics
                .iter()
                .map(|topic| state.sender(topic).subscribe())
                .collect()
        };

        Box::pin(async move {
            let streams = receivers.into_iter().map(|mut rx| {
                Box::pin(async_stream::stream! {
                    loop {
                        match rx.recv().await {
                            Ok(event) => yield Ok(event),
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                yield Err(EventBusError::TransportError(format!(
                                    "subscriber lagged, {skipped} events skipped"
                                )));
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                })
            });

            Ok(Box::pin(futures::stream::select_all(streams)) as EventStream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn event(event_type: &str) -> SerializedEvent {
        SerializedEvent::new(event_type.to_string(), b"{}".to_vec(), None)
    }

    #[tokio::test]
    async fn subscribers_see_events_from_all_their_topics() {
        let bus = InMemoryEventBus::new();
        let mut stream = bus.subscribe(&["a", "b"]).await.unwrap();

        bus.publish("a", &event("A.v1")).await.unwrap();
        bus.publish("b", &event("B.v1")).await.unwrap();
        bus.publish("c", &event("C.v1")).await.unwrap();

        let mut seen = vec![
            stream.next().await.unwrap().unwrap().event_type,
            stream.next().await.unwrap().unwrap().event_type,
        ];
        seen.sort();
        assert_eq!(seen, vec!["A.v1", "B.v1"]);
    }

    #[tokio::test]
    async fn dropping_stream_unsubscribes() {
        let bus = InMemoryEventBus::new();
        let stream = bus.subscribe(&["a"]).await.unwrap();
        assert_eq!(bus.subscriber_count("a"), 1);
        drop(stream);
        assert_eq!(bus.subscriber_count("a"), 0);
    }

    #[tokio::test]
    async fn failing_topic_rejects_publish_and_records_nothing() {
        let bus = InMemoryEventBus::new();
        bus.fail_publishes_to("a");

        let result = bus.publish("a", &event("A.v1")).await;
        assert!(matches!(result, Err(EventBusError::PublishFailed { .. })));
        assert!(bus.published("a").is_empty());

        bus.restore_publishes_to("a");
        bus.publish("a", &event("A.v1")).await.unwrap();
        assert_eq!(bus.published("a").len(), 1);
    }
}
