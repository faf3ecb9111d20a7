//! Messages exchanged over the event bus.
//!
//! Every message is JSON so that services written in other languages can
//! produce and consume the same topics. Field names are camelCase and enum
//! values SCREAMING_SNAKE_CASE.
//!
//! # Example
//!
//! ```
//! use fulfillment_core::event::{Event, SerializedEvent, StatusChangeEvent};
//! use fulfillment_core::model::RequestId;
//! use fulfillment_core::status::{PackingStatus, RequestStatus};
//!
//! let event = StatusChangeEvent {
//!     request_id: RequestId::new(7),
//!     request_status: RequestStatus::InProgress,
//!     packing_status: PackingStatus::RequestedItems,
//! };
//!
//! let serialized = SerializedEvent::from_event(&event, None).unwrap();
//! assert_eq!(serialized.event_type, "RequestStatusChanged.v1");
//! assert_eq!(serialized.key.as_deref(), Some("7"));
//!
//! let decoded: StatusChangeEvent = serialized.decode().unwrap();
//! assert_eq!(decoded, event);
//! ```

use crate::model::{MenuItemId, RequestId};
use crate::status::{PackingStatus, RequestStatus};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fmt;
use thiserror::Error;

/// Error types for event operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// Failed to serialize event to bytes.
    #[error("Failed to serialize event: {0}")]
    SerializationError(String),

    /// Failed to deserialize event from bytes.
    #[error("Failed to deserialize event: {0}")]
    DeserializationError(String),
}

/// A message that can be published on the event bus.
///
/// # Event Naming Convention
///
/// `event_type()` returns a stable identifier with a version suffix, for
/// example `"RequestStatusChanged.v1"`. Consumers use it to route and to
/// evolve schemas.
pub trait Event: Send + Sync + 'static {
    /// Returns the event type identifier for this event.
    fn event_type(&self) -> &'static str;

    /// Partition key for the event, if ordering matters for it.
    ///
    /// Events sharing a key land on the same partition and keep their order.
    fn partition_key(&self) -> Option<String> {
        None
    }

    /// Serialize this event to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns `EventError::SerializationError` if the event cannot be serialized.
    fn to_bytes(&self) -> Result<Vec<u8>, EventError>
    where
        Self: Serialize,
    {
        serde_json::to_vec(self).map_err(|e| EventError::SerializationError(e.to_string()))
    }

    /// Deserialize an event from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns `EventError::DeserializationError` if the bytes are not valid
    /// JSON for this event type.
    fn from_bytes(bytes: &[u8]) -> Result<Self, EventError>
    where
        Self: DeserializeOwned + Sized,
    {
        serde_json::from_slice(bytes).map_err(|e| EventError::DeserializationError(e.to_string()))
    }
}

/// A serialized event ready for the wire.
#[derive(Clone, Debug, PartialEq)]
pub struct SerializedEvent {
    /// The event type identifier (e.g., "RequestStatusChanged.v1").
    pub event_type: String,

    /// Partition key. Transports fall back to `event_type` when absent.
    pub key: Option<String>,

    /// The JSON-serialized event data.
    pub data: Vec<u8>,

    /// Optional metadata, such as a correlation id.
    pub metadata: Option<serde_json::Value>,
}

impl SerializedEvent {
    /// Create a new serialized event without a partition key.
    #[must_use]
    pub const fn new(
        event_type: String,
        data: Vec<u8>,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            event_type,
            key: None,
            data,
            metadata,
        }
    }

    /// Set the partition key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Create a serialized event from an [`Event`].
    ///
    /// # Errors
    ///
    /// Returns `EventError::SerializationError` if the event cannot be serialized.
    pub fn from_event<E: Event + Serialize>(
        event: &E,
        metadata: Option<serde_json::Value>,
    ) -> Result<Self, EventError> {
        Ok(Self {
            event_type: event.event_type().to_string(),
            key: event.partition_key(),
            data: event.to_bytes()?,
            metadata,
        })
    }

    /// Decode the payload into a concrete event.
    ///
    /// # Errors
    ///
    /// Returns `EventError::DeserializationError` if the payload does not match `E`.
    pub fn decode<E: Event + DeserializeOwned>(&self) -> Result<E, EventError> {
        E::from_bytes(&self.data)
    }
}

impl fmt::Display for SerializedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SerializedEvent {{ type: {}, size: {} bytes }}",
            self.event_type,
            self.data.len()
        )
    }
}

/// A request's status changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangeEvent {
    /// Request whose status changed
    pub request_id: RequestId,
    /// New request status
    pub request_status: RequestStatus,
    /// Packing status of the attempt that caused the change
    pub packing_status: PackingStatus,
}

impl Event for StatusChangeEvent {
    fn event_type(&self) -> &'static str {
        "RequestStatusChanged.v1"
    }

    fn partition_key(&self) -> Option<String> {
        Some(self.request_id.to_string())
    }
}

/// Ask the kitchen to prepare more of a menu item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KitchenReplenishmentRequest {
    /// Menu item to prepare
    pub menu_item_id: MenuItemId,
    /// Units requested
    pub quantity: u32,
}

impl Event for KitchenReplenishmentRequest {
    fn event_type(&self) -> &'static str {
        "KitchenReplenishmentRequested.v1"
    }

    fn partition_key(&self) -> Option<String> {
        Some(self.menu_item_id.to_string())
    }
}

/// Kind of shelf-side trigger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShelfEventType {
    /// A request was created and needs its first packing pass
    NewRequest,
    /// Stock changed; packing should be attempted again
    ItemAddedOnShelf,
}

/// Trigger for a packing pass.
///
/// `menu_item_id` and `quantity` are `-1` for [`ShelfEventType::NewRequest`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShelfEvent {
    /// Trigger kind
    pub event_type: ShelfEventType,
    /// Request to pack
    pub request_id: RequestId,
    /// Replenished menu item, or `-1`
    pub menu_item_id: i64,
    /// Units added, or `-1`
    pub quantity: i64,
}

impl ShelfEvent {
    /// A freshly created request.
    #[must_use]
    pub const fn new_request(request_id: RequestId) -> Self {
        Self {
            event_type: ShelfEventType::NewRequest,
            request_id,
            menu_item_id: -1,
            quantity: -1,
        }
    }

    /// Stock for `menu_item_id` was added; re-attempt `request_id`.
    #[must_use]
    pub fn item_added(request_id: RequestId, menu_item_id: MenuItemId, quantity: u32) -> Self {
        Self {
            event_type: ShelfEventType::ItemAddedOnShelf,
            request_id,
            menu_item_id: menu_item_id.value(),
            quantity: i64::from(quantity),
        }
    }
}

impl Event for ShelfEvent {
    fn event_type(&self) -> &'static str {
        match self.event_type {
            ShelfEventType::NewRequest => "NewRequest.v1",
            ShelfEventType::ItemAddedOnShelf => "ItemAddedOnShelf.v1",
        }
    }

    fn partition_key(&self) -> Option<String> {
        Some(self.request_id.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn kitchen_request_wire_format() {
        let message = KitchenReplenishmentRequest {
            menu_item_id: MenuItemId::new(3),
            quantity: 4,
        };
        let json: serde_json::Value = serde_json::from_slice(&message.to_bytes().unwrap()).unwrap();
        assert_eq!(json, serde_json::json!({ "menuItemId": 3, "quantity": 4 }));
    }

    #[test]
    fn new_request_shelf_event_uses_sentinels() {
        let event = ShelfEvent::new_request(RequestId::new(12));
        let json: serde_json::Value = serde_json::from_slice(&event.to_bytes().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "eventType": "NEW_REQUEST",
                "requestId": 12,
                "menuItemId": -1,
                "quantity": -1
            })
        );
        assert_eq!(event.event_type(), "NewRequest.v1");
    }

    #[test]
    fn shelf_event_parses_foreign_payload() {
        let payload = br#"{"eventType":"ITEM_ADDED_ON_SHELF","requestId":9,"menuItemId":2,"quantity":6}"#;
        let event = ShelfEvent::from_bytes(payload).unwrap();
        assert_eq!(event, ShelfEvent::item_added(RequestId::new(9), MenuItemId::new(2), 6));
    }

    #[test]
    fn status_change_keyed_by_request() {
        let event = StatusChangeEvent {
            request_id: RequestId::new(5),
            request_status: RequestStatus::New,
            packing_status: PackingStatus::NotStarted,
        };
        let serialized = SerializedEvent::from_event(&event, None).unwrap();
        assert_eq!(serialized.key.as_deref(), Some("5"));

        let json: serde_json::Value = serde_json::from_slice(&serialized.data).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "requestId": 5,
                "requestStatus": "NEW",
                "packingStatus": "NOT_STARTED"
            })
        );
    }

    #[test]
    fn decode_rejects_mismatched_payload() {
        let serialized = SerializedEvent::new("Other.v1".into(), b"{\"foo\":1}".to_vec(), None);
        assert!(matches!(
            serialized.decode::<StatusChangeEvent>(),
            Err(EventError::DeserializationError(_))
        ));
    }
}
