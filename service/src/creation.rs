//! Request creation.
//!
//! Validates the order against the menu, persists it, announces it as `NEW`,
//! then asks packing to take a first pass by publishing a `NEW_REQUEST`
//! shelf event.

use crate::notifications::StatusChangePublisher;
use crate::request::RequestService;
use fulfillment_core::event::{SerializedEvent, ShelfEvent, StatusChangeEvent};
use fulfillment_core::event_bus::EventBus;
use fulfillment_core::model::{CustomerId, MenuItemId, NewLineItem, RequestView};
use fulfillment_core::status::{PackingStatus, RequestStatus};
use fulfillment_core::store::{LineItemStore, MenuCatalog, RequestStore};
use fulfillment_core::{Command, ExecutionResult, FulfillmentError, ResourceType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// One ordered menu item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestedItem {
    /// Menu item to order
    pub menu_item_id: MenuItemId,
    /// Units ordered
    pub quantity: u32,
}

/// Input of [`CreateRequestCommand`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRequest {
    /// Ordering customer
    pub customer_id: CustomerId,
    /// Ordered items, kept in this order
    pub items: Vec<RequestedItem>,
}

/// Creates requests and triggers their first packing pass.
pub struct CreateRequestCommand {
    requests: Arc<dyn RequestStore>,
    line_items: Arc<dyn LineItemStore>,
    menu: Arc<dyn MenuCatalog>,
    views: Arc<RequestService>,
    event_bus: Arc<dyn EventBus>,
    shelf_topic: String,
    status_publisher: StatusChangePublisher,
}

impl CreateRequestCommand {
    /// Create the command.
    #[must_use]
    pub fn new(
        requests: Arc<dyn RequestStore>,
        line_items: Arc<dyn LineItemStore>,
        menu: Arc<dyn MenuCatalog>,
        views: Arc<RequestService>,
        event_bus: Arc<dyn EventBus>,
        shelf_topic: impl Into<String>,
        status_publisher: StatusChangePublisher,
    ) -> Self {
        Self {
            requests,
            line_items,
            menu,
            views,
            event_bus,
            shelf_topic: shelf_topic.into(),
            status_publisher,
        }
    }

    /// Persist a new request and hand it to packing.
    ///
    /// # Errors
    ///
    /// - [`FulfillmentError::InvalidArgument`] for an empty order or a zero quantity
    /// - [`FulfillmentError::NotFound`] if a menu item does not exist; nothing
    ///   is written
    /// - [`FulfillmentError::Transient`] if storage fails or the packing
    ///   trigger cannot be published; the stored request remains
    #[tracing::instrument(skip(self, new_request), fields(customer_id = %new_request.customer_id))]
    pub async fn create(&self, new_request: NewRequest) -> ExecutionResult<RequestView> {
        if new_request.items.is_empty() {
            return Err(FulfillmentError::InvalidArgument(
                "a request needs at least one item".to_string(),
            ));
        }
        if let Some(item) = new_request.items.iter().find(|item| item.quantity == 0) {
            return Err(FulfillmentError::InvalidArgument(format!(
                "quantity for menu item {} must be positive",
                item.menu_item_id
            )));
        }

        let ids: BTreeSet<MenuItemId> = new_request.items.iter().map(|i| i.menu_item_id).collect();
        let immediate: HashMap<MenuItemId, bool> = self
            .menu
            .find_by_ids(ids.iter().copied().collect())
            .await?
            .into_iter()
            .map(|item| (item.id, item.requires_immediate_preparation))
            .collect();
        if let Some(missing) = ids.iter().find(|id| !immediate.contains_key(*id)) {
            return Err(FulfillmentError::not_found(ResourceType::MenuItem, missing.value()));
        }

        let request = self
            .requests
            .insert(new_request.customer_id, RequestStatus::New)
            .await?;
        let line_items = new_request
            .items
            .iter()
            .map(|item| NewLineItem {
                menu_item_id: item.menu_item_id,
                quantity: item.quantity,
                immediate: immediate.get(&item.menu_item_id).copied().unwrap_or(false),
            })
            .collect();
        self.line_items.insert_all(request.id, line_items).await?;
        tracing::info!(request_id = %request.id, items = new_request.items.len(), "Request created");

        // NEW goes out before the trigger; once packing can run, a later
        // status may be published at any moment.
        self.status_publisher
            .publish(&StatusChangeEvent {
                request_id: request.id,
                request_status: RequestStatus::New,
                packing_status: PackingStatus::NotStarted,
            })
            .await;

        let trigger = SerializedEvent::from_event(&ShelfEvent::new_request(request.id), None)?;
        self.event_bus
            .publish(&self.shelf_topic, &trigger)
            .await
            .inspect_err(|e| {
                tracing::error!(request_id = %request.id, error = %e, "Failed to publish packing trigger");
            })?;

        self.views.find_view(request.id).await
    }
}

impl Command for CreateRequestCommand {
    type Input = NewRequest;
    type Output = RequestView;

    fn execute(
        &self,
        input: NewRequest,
    ) -> Pin<Box<dyn Future<Output = ExecutionResult<RequestView>> + Send + '_>> {
        Box::pin(self.create(input))
    }
}
