//! Outbound status changes.

use fulfillment_core::event::{SerializedEvent, StatusChangeEvent};
use fulfillment_core::event_bus::EventBus;
use fulfillment_runtime::metrics::NotificationMetrics;
use std::sync::Arc;

/// Publishes [`StatusChangeEvent`]s on the status topic, keyed by request.
///
/// Publishing never fails from the caller's point of view: a notification
/// that cannot be delivered is logged and counted, and the state change that
/// caused it stands.
#[derive(Clone)]
pub struct StatusChangePublisher {
    event_bus: Arc<dyn EventBus>,
    topic: String,
}

impl StatusChangePublisher {
    /// Create a publisher for `topic`.
    #[must_use]
    pub fn new(event_bus: Arc<dyn EventBus>, topic: impl Into<String>) -> Self {
        Self {
            event_bus,
            topic: topic.into(),
        }
    }

    /// Publish a status change. Returns whether it reached the bus.
    pub async fn publish(&self, change: &StatusChangeEvent) -> bool {
        let event = match SerializedEvent::from_event(change, None) {
            Ok(event) => event,
            Err(e) => {
                NotificationMetrics::record_publish_failure();
                tracing::warn!(request_id = %change.request_id, error = %e, "Failed to encode status change");
                return false;
            }
        };

        match self.event_bus.publish(&self.topic, &event).await {
            Ok(()) => {
                NotificationMetrics::record_published();
                tracing::info!(
                    request_id = %change.request_id,
                    request_status = %change.request_status,
                    packing_status = %change.packing_status,
                    "Status change published"
                );
                true
            }
            Err(e) => {
                NotificationMetrics::record_publish_failure();
                tracing::warn!(
                    request_id = %change.request_id,
                    topic = %self.topic,
                    error = %e,
                    "Failed to publish status change"
                );
                false
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use fulfillment_core::model::RequestId;
    use fulfillment_core::status::{PackingStatus, RequestStatus};
    use fulfillment_testing::InMemoryEventBus;

    fn change() -> StatusChangeEvent {
        StatusChangeEvent {
            request_id: RequestId::new(8),
            request_status: RequestStatus::InProgress,
            packing_status: PackingStatus::RequestedItems,
        }
    }

    #[tokio::test]
    async fn publishes_keyed_by_request() {
        let bus = InMemoryEventBus::new();
        let publisher = StatusChangePublisher::new(Arc::new(bus.clone()), "status");

        assert!(publisher.publish(&change()).await);

        let published = bus.published("status");
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].key.as_deref(), Some("8"));
        assert_eq!(published[0].decode::<StatusChangeEvent>().unwrap(), change());
    }

    #[tokio::test]
    async fn bus_failure_is_reported_not_raised() {
        let bus = InMemoryEventBus::new();
        bus.fail_publishes_to("status");
        let publisher = StatusChangePublisher::new(Arc::new(bus.clone()), "status");

        assert!(!publisher.publish(&change()).await);
        assert!(bus.published("status").is_empty());
    }
}
