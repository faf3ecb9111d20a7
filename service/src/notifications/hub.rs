//! Process-wide fan-out of status changes to live subscribers.
//!
//! The hub wraps a bounded [`broadcast`] channel. Each subscriber sees every
//! event published after it subscribed. A subscriber that falls more than the
//! buffer behind skips ahead to the oldest retained event; the skip is logged
//! and counted, and nobody else is affected.

use fulfillment_core::event::StatusChangeEvent;
use fulfillment_runtime::metrics::NotificationMetrics;
use futures::Stream;
use tokio::sync::{broadcast, watch};

/// Broadcast hub for [`StatusChangeEvent`]s.
///
/// Created once at startup and shared as `Arc<NotificationHub>`.
pub struct NotificationHub {
    sender: broadcast::Sender<StatusChangeEvent>,
    shutdown: watch::Sender<bool>,
}

impl NotificationHub {
    /// Create a hub retaining up to `capacity` events per lagging subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        let (shutdown, _) = watch::channel(false);
        Self { sender, shutdown }
    }

    /// Deliver `event` to every current subscriber.
    ///
    /// Returns the number of subscribers that will receive it. Never fails;
    /// with no subscribers, or after [`shutdown`](Self::shutdown), the event
    /// is dropped and `0` is returned.
    pub fn publish(&self, event: StatusChangeEvent) -> usize {
        if self.is_shut_down() {
            tracing::debug!(request_id = %event.request_id, "Hub shut down, dropping status change");
            return 0;
        }

        let delivered = self.sender.send(event).unwrap_or(0);
        NotificationMetrics::record_subscribers(delivered);
        tracing::debug!(request_id = %event.request_id, subscribers = delivered, "Status change fanned out");
        delivered
    }

    /// Register a new subscriber.
    ///
    /// A subscription taken after [`shutdown`](Self::shutdown) yields nothing.
    #[must_use]
    pub fn subscribe(&self) -> HubSubscription {
        let subscription = HubSubscription {
            receiver: self.sender.subscribe(),
            shutdown: self.shutdown.subscribe(),
            hub: self.sender.clone(),
        };
        NotificationMetrics::record_subscribers(self.subscriber_count());
        subscription
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// End every live subscription and refuse further deliveries.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
        tracing::info!(subscribers = self.subscriber_count(), "Notification hub shut down");
    }

    /// Whether [`shutdown`](Self::shutdown) was called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }
}

/// One subscriber's view of the hub. Dropping it unsubscribes.
pub struct HubSubscription {
    receiver: broadcast::Receiver<StatusChangeEvent>,
    shutdown: watch::Receiver<bool>,
    hub: broadcast::Sender<StatusChangeEvent>,
}

impl HubSubscription {
    /// Next status change, or `None` once the hub has shut down.
    pub async fn recv(&mut self) -> Option<StatusChangeEvent> {
        loop {
            if *self.shutdown.borrow_and_update() {
                return None;
            }

            tokio::select! {
                biased;

                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
                received = self.receiver.recv() => match received {
                    Ok(event) => return Some(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        NotificationMetrics::record_lagged(skipped);
                        tracing::warn!(skipped, "Status subscriber lagged, skipping to oldest retained event");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                },
            }
        }
    }

    /// Turn the subscription into a stream that ends on hub shutdown.
    pub fn into_stream(self) -> impl Stream<Item = StatusChangeEvent> + Send {
        let mut subscription = self;
        async_stream::stream! {
            while let Some(event) = subscription.recv().await {
                yield event;
            }
        }
    }
}

impl Drop for HubSubscription {
    fn drop(&mut self) {
        // Our own receiver is still counted until the fields drop.
        NotificationMetrics::record_subscribers(self.hub.receiver_count().saturating_sub(1));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use fulfillment_core::model::RequestId;
    use fulfillment_core::status::{PackingStatus, RequestStatus};
    use futures::StreamExt;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn change(id: i64) -> StatusChangeEvent {
        StatusChangeEvent {
            request_id: RequestId::new(id),
            request_status: RequestStatus::InProgress,
            packing_status: PackingStatus::InProgress,
        }
    }

    /// Last value set on the hub subscriber gauge.
    #[derive(Default)]
    struct SubscriberGauge(AtomicU64);

    impl SubscriberGauge {
        fn current(&self) -> f64 {
            f64::from_bits(self.0.load(Ordering::SeqCst))
        }
    }

    impl metrics::GaugeFn for SubscriberGauge {
        fn increment(&self, _: f64) {}

        fn decrement(&self, _: f64) {}

        fn set(&self, value: f64) {
            self.0.store(value.to_bits(), Ordering::SeqCst);
        }
    }

    struct GaugeRecorder(Arc<SubscriberGauge>);

    impl metrics::Recorder for GaugeRecorder {
        fn describe_counter(
            &self,
            _: metrics::KeyName,
            _: Option<metrics::Unit>,
            _: metrics::SharedString,
        ) {
        }

        fn describe_gauge(
            &self,
            _: metrics::KeyName,
            _: Option<metrics::Unit>,
            _: metrics::SharedString,
        ) {
        }

        fn describe_histogram(
            &self,
            _: metrics::KeyName,
            _: Option<metrics::Unit>,
            _: metrics::SharedString,
        ) {
        }

        fn register_counter(
            &self,
            _: &metrics::Key,
            _: &metrics::Metadata<'_>,
        ) -> metrics::Counter {
            metrics::Counter::noop()
        }

        fn register_gauge(&self, key: &metrics::Key, _: &metrics::Metadata<'_>) -> metrics::Gauge {
            if key.name() == "notification_hub_subscribers" {
                metrics::Gauge::from_arc(Arc::clone(&self.0))
            } else {
                metrics::Gauge::noop()
            }
        }

        fn register_histogram(
            &self,
            _: &metrics::Key,
            _: &metrics::Metadata<'_>,
        ) -> metrics::Histogram {
            metrics::Histogram::noop()
        }
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn dropping_subscription_refreshes_subscriber_gauge() {
        let gauge = Arc::new(SubscriberGauge::default());
        let recorder = GaugeRecorder(Arc::clone(&gauge));

        metrics::with_local_recorder(&recorder, || {
            let hub = NotificationHub::new(8);
            let first = hub.subscribe();
            let second = hub.subscribe().into_stream();
            assert_eq!(gauge.current(), 2.0);

            drop(first);
            assert_eq!(gauge.current(), 1.0);

            drop(second);
            assert_eq!(gauge.current(), 0.0);
        });
    }

    #[tokio::test]
    async fn every_subscriber_sees_the_event() {
        let hub = NotificationHub::new(8);
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();

        assert_eq!(hub.publish(change(1)), 2);

        assert_eq!(first.recv().await, Some(change(1)));
        assert_eq!(second.recv().await, Some(change(1)));
    }

    #[tokio::test]
    async fn late_subscriber_misses_earlier_events() {
        let hub = NotificationHub::new(8);
        let mut early = hub.subscribe();
        hub.publish(change(1));

        let mut late = hub.subscribe();
        hub.publish(change(2));

        assert_eq!(early.recv().await, Some(change(1)));
        assert_eq!(early.recv().await, Some(change(2)));
        assert_eq!(late.recv().await, Some(change(2)));
    }

    #[tokio::test]
    async fn lagging_subscriber_continues_from_oldest_retained() {
        let hub = NotificationHub::new(2);
        let mut slow = hub.subscribe();
        for id in 1..=5 {
            hub.publish(change(id));
        }

        assert_eq!(slow.recv().await, Some(change(4)));
        assert_eq!(slow.recv().await, Some(change(5)));
    }

    #[tokio::test]
    async fn dropping_subscription_unregisters() {
        let hub = NotificationHub::new(8);
        let subscription = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);

        drop(subscription);

        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(hub.publish(change(1)), 0);
    }

    #[tokio::test]
    async fn shutdown_ends_subscriptions_and_drops_publishes() {
        let hub = NotificationHub::new(8);
        let mut subscription = hub.subscribe();
        let stream = hub.subscribe().into_stream();

        hub.shutdown();

        assert!(hub.is_shut_down());
        assert_eq!(hub.publish(change(1)), 0);
        assert_eq!(subscription.recv().await, None);
        assert!(stream.collect::<Vec<_>>().await.is_empty());
        assert_eq!(hub.subscribe().recv().await, None);
    }
}
