//! Prometheus metrics for observability and monitoring.
//!
//! Covers shelf reservations, packing passes, the notification hub, event
//! consumers and retries.
//!
//! # Example
//!
//! ```rust,no_run
//! use fulfillment_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other crates
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the global recorder and start the HTTP listener.
    ///
    /// Must be called from within a tokio runtime. If a recorder is already
    /// installed (common in tests) a warning is logged and the call succeeds
    /// without a handle.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Build`] if the exporter cannot be built, for
    /// example because the address cannot be bound.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = recorder.handle();
        if metrics::set_global_recorder(recorder).is_err() {
            tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
            return Ok(());
        }

        let addr = self.addr;
        tokio::spawn(async move {
            if exporter.await.is_err() {
                tracing::error!(%addr, "Metrics exporter stopped");
            }
        });

        self.handle = Some(handle);
        tracing::info!(
            addr = %self.addr,
            "Metrics server started - available at http://{}/metrics",
            self.addr
        );
        Ok(())
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Shelf reservation metrics
    describe_counter!(
        "shelf_reservations_total",
        "Total number of shelf reservations, labelled by outcome"
    );
    describe_counter!(
        "shelf_conflicts_total",
        "Optimistic version conflicts on shelf writes"
    );
    describe_counter!(
        "kitchen_requests_total",
        "Replenishment requests sent to the kitchen"
    );
    describe_counter!(
        "kitchen_request_failures_total",
        "Replenishment requests that could not be published"
    );

    // Packing metrics
    describe_counter!("packing_passes_total", "Completed packing passes");
    describe_counter!("packing_failures_total", "Packing passes aborted by an error");
    describe_histogram!(
        "packing_duration_seconds",
        "Time taken by a packing pass"
    );

    // Notification metrics
    describe_counter!(
        "status_changes_published_total",
        "Status-change events published to the event bus"
    );
    describe_counter!(
        "status_change_publish_failures_total",
        "Status-change events that could not be published"
    );
    describe_gauge!(
        "notification_hub_subscribers",
        "Live subscribers of the notification hub"
    );
    describe_counter!(
        "notification_hub_lagged_total",
        "Events skipped by subscribers that fell behind the hub buffer"
    );

    // Consumer metrics
    describe_counter!(
        "consumer_events_handled_total",
        "Events handled successfully, labelled by consumer"
    );
    describe_counter!(
        "consumer_handler_errors_total",
        "Events that failed to decode or handle, labelled by consumer"
    );

    // Retry metrics
    describe_counter!("retry_attempts_total", "Total number of retry attempts");
    describe_counter!("retry_successes_total", "Total number of successful retries");
    describe_counter!(
        "retry_exhausted_total",
        "Total number of operations that exhausted max retries"
    );
}

/// Shelf reservation metrics recorder.
pub struct ReservationMetrics;

impl ReservationMetrics {
    /// Record a finished reservation with its packing outcome.
    pub fn record_outcome(outcome: &'static str) {
        counter!("shelf_reservations_total", "outcome" => outcome).increment(1);
    }

    /// Record a lost optimistic write.
    pub fn record_conflict() {
        counter!("shelf_conflicts_total").increment(1);
    }

    /// Record a kitchen replenishment request.
    pub fn record_kitchen_request() {
        counter!("kitchen_requests_total").increment(1);
    }

    /// Record a kitchen replenishment request that failed to publish.
    pub fn record_kitchen_failure() {
        counter!("kitchen_request_failures_total").increment(1);
    }
}

/// Packing metrics recorder.
pub struct PackingMetrics;

impl PackingMetrics {
    /// Record a completed packing pass.
    pub fn record_pass(duration: Duration) {
        counter!("packing_passes_total").increment(1);
        histogram!("packing_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record an aborted packing pass.
    pub fn record_failure() {
        counter!("packing_failures_total").increment(1);
    }
}

/// Notification pipeline metrics recorder.
pub struct NotificationMetrics;

impl NotificationMetrics {
    /// Record a published status change.
    pub fn record_published() {
        counter!("status_changes_published_total").increment(1);
    }

    /// Record a status change that failed to publish.
    pub fn record_publish_failure() {
        counter!("status_change_publish_failures_total").increment(1);
    }

    /// Record the current number of hub subscribers.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_subscribers(count: usize) {
        gauge!("notification_hub_subscribers").set(count as f64);
    }

    /// Record events skipped by a lagging subscriber.
    pub fn record_lagged(skipped: u64) {
        counter!("notification_hub_lagged_total").increment(skipped);
    }
}

/// Event consumer metrics recorder.
pub struct ConsumerMetrics;

impl ConsumerMetrics {
    /// Record a successfully handled event.
    pub fn record_handled(consumer: &str) {
        counter!("consumer_events_handled_total", "consumer" => consumer.to_string()).increment(1);
    }

    /// Record an event that failed to decode or handle.
    pub fn record_handler_error(consumer: &str) {
        counter!("consumer_handler_errors_total", "consumer" => consumer.to_string()).increment(1);
    }
}

/// Retry metrics recorder.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record a retry attempt.
    pub fn record_attempt() {
        counter!("retry_attempts_total").increment(1);
    }

    /// Record a successful retry.
    pub fn record_success() {
        counter!("retry_successes_total").increment(1);
    }

    /// Record exhausted retries.
    pub fn record_exhausted() {
        counter!("retry_exhausted_total").increment(1);
    }
}
