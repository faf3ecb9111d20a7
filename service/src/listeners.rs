//! Event handlers run by the service's consumers.

use crate::notifications::NotificationHub;
use crate::packing::PackingCommand;
use async_trait::async_trait;
use fulfillment_core::event::{Event, SerializedEvent, ShelfEvent, StatusChangeEvent};
use fulfillment_runtime::{EventHandler, HandlerError};
use std::sync::Arc;

/// Runs a packing pass for every shelf event.
pub struct ShelfEventHandler {
    packing: Arc<PackingCommand>,
}

impl ShelfEventHandler {
    /// Create a handler driving `packing`.
    #[must_use]
    pub const fn new(packing: Arc<PackingCommand>) -> Self {
        Self { packing }
    }
}

#[async_trait]
impl EventHandler for ShelfEventHandler {
    async fn handle(&self, event: &SerializedEvent) -> Result<(), HandlerError> {
        let shelf_event = ShelfEvent::from_bytes(&event.data)?;
        tracing::debug!(
            request_id = %shelf_event.request_id,
            trigger = shelf_event.event_type(),
            "Shelf event received"
        );

        self.packing.pack(shelf_event.request_id).await?;
        Ok(())
    }
}

/// Feeds status changes from the bus into the [`NotificationHub`].
pub struct StatusChangeListener {
    hub: Arc<NotificationHub>,
}

impl StatusChangeListener {
    /// Create a listener publishing into `hub`.
    #[must_use]
    pub const fn new(hub: Arc<NotificationHub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl EventHandler for StatusChangeListener {
    async fn handle(&self, event: &SerializedEvent) -> Result<(), HandlerError> {
        let change: StatusChangeEvent = event.decode()?;
        self.hub.publish(change);
        Ok(())
    }
}
