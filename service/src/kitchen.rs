//! Outbound replenishment requests to the kitchen.

use fulfillment_core::event::{KitchenReplenishmentRequest, SerializedEvent};
use fulfillment_core::event_bus::{EventBus, EventBusError};
use fulfillment_core::model::MenuItemId;
use std::sync::Arc;

/// Publishes [`KitchenReplenishmentRequest`]s on the kitchen topic.
#[derive(Clone)]
pub struct KitchenRequestPublisher {
    event_bus: Arc<dyn EventBus>,
    topic: String,
}

impl KitchenRequestPublisher {
    /// Create a publisher for `topic`.
    #[must_use]
    pub fn new(event_bus: Arc<dyn EventBus>, topic: impl Into<String>) -> Self {
        Self {
            event_bus,
            topic: topic.into(),
        }
    }

    /// Ask the kitchen for `quantity` more units of `menu_item_id`.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError`] if the message cannot be encoded or published.
    pub async fn request(&self, menu_item_id: MenuItemId, quantity: u32) -> Result<(), EventBusError> {
        let message = KitchenReplenishmentRequest {
            menu_item_id,
            quantity,
        };
        let event = SerializedEvent::from_event(&message, None)
            .map_err(|e| EventBusError::PublishFailed {
                topic: self.topic.clone(),
                reason: e.to_string(),
            })?;

        self.event_bus.publish(&self.topic, &event).await?;
        tracing::debug!(menu_item_id = %menu_item_id, quantity, "Kitchen replenishment requested");
        Ok(())
    }
}
