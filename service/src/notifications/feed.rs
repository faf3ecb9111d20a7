//! Live status feed for clients.
//!
//! Joins each status change from the [`NotificationHub`] with a fresh
//! [`RequestView`](fulfillment_core::model::RequestView) lookup, so counts
//! reflect storage at emission time rather than what the event carried.

use super::hub::NotificationHub;
use crate::request::RequestService;
use fulfillment_core::ExecutionResult;
use fulfillment_core::event::StatusChangeEvent;
use fulfillment_core::model::{RequestId, RequestStatusUpdate};
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;

/// Stream of feed items. Ends when dropped or when the hub shuts down.
pub type FeedStream = Pin<Box<dyn Stream<Item = ExecutionResult<RequestStatusUpdate>> + Send>>;

/// Which status changes a feed subscriber wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFilter {
    /// Every request
    All,
    /// A single request
    Request(RequestId),
}

impl FeedFilter {
    /// Whether `event` passes the filter.
    #[must_use]
    pub fn matches(self, event: &StatusChangeEvent) -> bool {
        match self {
            Self::All => true,
            Self::Request(id) => event.request_id == id,
        }
    }
}

/// Fan-out of status changes to client streams.
#[derive(Clone)]
pub struct StatusFeed {
    hub: Arc<NotificationHub>,
    requests: Arc<RequestService>,
}

impl StatusFeed {
    /// Create a feed over `hub`, resolving views through `requests`.
    #[must_use]
    pub const fn new(hub: Arc<NotificationHub>, requests: Arc<RequestService>) -> Self {
        Self { hub, requests }
    }

    /// Subscribe to status updates matching `filter`.
    ///
    /// The subscription is registered before this returns, so any change
    /// published afterwards is delivered. A failed view lookup yields an
    /// `Err` item and the feed keeps going.
    #[must_use]
    pub fn subscribe(&self, filter: FeedFilter) -> FeedStream {
        let mut subscription = self.hub.subscribe();
        let requests = Arc::clone(&self.requests);
        tracing::debug!(?filter, "Status feed subscriber registered");

        Box::pin(async_stream::stream! {
            while let Some(event) = subscription.recv().await {
                if !filter.matches(&event) {
                    continue;
                }

                match requests.find_view(event.request_id).await {
                    Ok(view) => {
                        yield Ok(RequestStatusUpdate {
                            request_id: view.request_id,
                            packing_status: event.packing_status,
                            prepared_items: view.prepared_total,
                            total_items: view.required_total,
                        });
                    }
                    Err(e) => {
                        tracing::warn!(request_id = %event.request_id, error = %e, "Status feed lookup failed");
                        yield Err(e);
                    }
                }
            }
        })
    }
}
