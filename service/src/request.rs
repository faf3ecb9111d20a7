//! Request queries and the prepared-count mutation.

use fulfillment_core::model::{
    MenuItem, MenuItemId, Request, RequestId, RequestLineItem, RequestView,
};
use fulfillment_core::status::{RequestStatus, compute_status};
use fulfillment_core::store::{LineItemStore, MenuCatalog, RequestStore};
use fulfillment_core::view::build_view;
use fulfillment_core::{ExecutionResult, FulfillmentError, ResourceType};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Read access to requests, plus the manual "add prepared" mutation.
pub struct RequestService {
    requests: Arc<dyn RequestStore>,
    line_items: Arc<dyn LineItemStore>,
    menu: Arc<dyn MenuCatalog>,
}

impl RequestService {
    /// Create a service over the given stores.
    #[must_use]
    pub fn new(
        requests: Arc<dyn RequestStore>,
        line_items: Arc<dyn LineItemStore>,
        menu: Arc<dyn MenuCatalog>,
    ) -> Self {
        Self {
            requests,
            line_items,
            menu,
        }
    }

    /// Fresh view of a request.
    ///
    /// # Errors
    ///
    /// - [`FulfillmentError::NotFound`] if the request does not exist
    /// - [`FulfillmentError::Transient`] on store failures
    pub async fn find_view(&self, id: RequestId) -> ExecutionResult<RequestView> {
        let request = self
            .requests
            .find_by_id(id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found(ResourceType::Request, id.value()))?;
        self.view_of(&request).await
    }

    /// Views of every request that is not yet collected, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns the first store or view error encountered.
    pub async fn fetch_active(&self) -> ExecutionResult<Vec<RequestView>> {
        let requests = self
            .requests
            .find_by_statuses(RequestStatus::ACTIVE.to_vec())
            .await?;

        let mut views = Vec::with_capacity(requests.len());
        for request in &requests {
            views.push(self.view_of(request).await?);
        }
        Ok(views)
    }

    /// The whole menu catalog.
    ///
    /// # Errors
    ///
    /// Returns [`FulfillmentError::Transient`] on store failures.
    pub async fn menu(&self) -> ExecutionResult<Vec<MenuItem>> {
        Ok(self.menu.find_all().await?)
    }

    /// Mark `count` more units of `menu_item_id` as prepared on a request.
    ///
    /// # Errors
    ///
    /// - [`FulfillmentError::InvalidArgument`] if `count` is zero
    /// - [`FulfillmentError::NotFound`] if the request has no such line item
    /// - [`FulfillmentError::InvariantViolation`] if more would be prepared
    ///   than was requested
    #[tracing::instrument(skip(self))]
    pub async fn add_prepared(
        &self,
        request_id: RequestId,
        menu_item_id: MenuItemId,
        count: u32,
    ) -> ExecutionResult<RequestView> {
        if count == 0 {
            return Err(FulfillmentError::InvalidArgument(
                "prepared count must be positive".to_string(),
            ));
        }

        let request = self
            .requests
            .find_by_id(request_id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found(ResourceType::Request, request_id.value()))?;

        let item = self
            .line_items
            .find_by_request_and_menu_item(request_id, menu_item_id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found(ResourceType::LineItem, menu_item_id.value()))?;

        self.line_items.save(item.with_prepared_added(count)?).await?;

        let items = self.line_items.find_by_request(request_id).await?;
        let prepared: u64 = items.iter().map(|i| u64::from(i.prepared())).sum();
        let required: u64 = items.iter().map(|i| u64::from(i.quantity())).sum();
        let next = compute_status(prepared, required)?;
        advance_status(self.requests.as_ref(), request_id, request.status, next).await?;

        tracing::info!(prepared, required, status = %next, "Prepared count updated");
        self.find_view(request_id).await
    }

    /// The request, its stored line items and the view built from them.
    ///
    /// Fails exactly when [`find_view`](Self::find_view) would, so callers
    /// can validate a request before writing anything.
    pub(crate) async fn load(
        &self,
        id: RequestId,
    ) -> ExecutionResult<(Request, Vec<RequestLineItem>, RequestView)> {
        let request = self
            .requests
            .find_by_id(id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found(ResourceType::Request, id.value()))?;
        let items = self.line_items.find_by_request(id).await?;
        let view = self.build(&request, &items).await?;
        Ok((request, items, view))
    }

    async fn view_of(&self, request: &Request) -> ExecutionResult<RequestView> {
        let items = self.line_items.find_by_request(request.id).await?;
        self.build(request, &items).await
    }

    async fn build(
        &self,
        request: &Request,
        items: &[RequestLineItem],
    ) -> ExecutionResult<RequestView> {
        let menu_ids: BTreeSet<MenuItemId> = items.iter().map(|i| i.menu_item_id()).collect();
        let menu_items = self.menu.find_by_ids(menu_ids.into_iter().collect()).await?;
        build_view(request, items, &menu_items)
    }
}

/// Persist `next` if the lifecycle allows moving there from `current`.
///
/// Returns the status the request holds afterwards. Disallowed moves (for
/// example out of `COLLECTED`) leave the stored status untouched.
pub(crate) async fn advance_status(
    requests: &dyn RequestStore,
    id: RequestId,
    current: RequestStatus,
    next: RequestStatus,
) -> ExecutionResult<RequestStatus> {
    if current == next {
        return Ok(current);
    }
    if !current.can_transition_to(next) {
        tracing::debug!(request_id = %id, from = %current, to = %next, "Status change not allowed, keeping current");
        return Ok(current);
    }

    if !requests.update_status(id, next).await? {
        return Err(FulfillmentError::not_found(ResourceType::Request, id.value()));
    }
    tracing::debug!(request_id = %id, from = %current, to = %next, "Request status advanced");
    Ok(next)
}
