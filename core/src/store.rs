//! Persistence seams consumed by the fulfillment services.
//!
//! All traits are dyn-compatible (boxed futures) so services hold them as
//! `Arc<dyn ...>`. Implementations must provide read-your-writes consistency
//! within one process.
//!
//! - `PostgresFulfillmentStore` in `fulfillment-postgres` - production
//! - `InMemoryFulfillmentStore` in `fulfillment-testing` - tests

use crate::error::StoreError;
use crate::model::{
    CustomerId, MenuItem, MenuItemId, NewLineItem, NewShelfRecord, Request, RequestId,
    RequestLineItem, ShelfRecord,
};
use crate::status::RequestStatus;
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by every store operation.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Customer requests.
pub trait RequestStore: Send + Sync {
    /// Insert a request and return it with its assigned id.
    fn insert(&self, customer_id: CustomerId, status: RequestStatus) -> StoreFuture<'_, Request>;

    /// Look up a request.
    fn find_by_id(&self, id: RequestId) -> StoreFuture<'_, Option<Request>>;

    /// Overwrite a request's status. Returns `false` if the request does not exist.
    fn update_status(&self, id: RequestId, status: RequestStatus) -> StoreFuture<'_, bool>;

    /// All requests whose status is one of `statuses`, ordered by id.
    fn find_by_statuses(&self, statuses: Vec<RequestStatus>) -> StoreFuture<'_, Vec<Request>>;
}

/// Request line items.
pub trait LineItemStore: Send + Sync {
    /// Insert line items for a request with `prepared = 0`, in the given order.
    fn insert_all(
        &self,
        request_id: RequestId,
        items: Vec<NewLineItem>,
    ) -> StoreFuture<'_, Vec<RequestLineItem>>;

    /// Line items of a request in storage order.
    fn find_by_request(&self, request_id: RequestId) -> StoreFuture<'_, Vec<RequestLineItem>>;

    /// The line item of `request_id` for `menu_item_id`.
    fn find_by_request_and_menu_item(
        &self,
        request_id: RequestId,
        menu_item_id: MenuItemId,
    ) -> StoreFuture<'_, Option<RequestLineItem>>;

    /// Persist a line item's counters.
    fn save(&self, item: RequestLineItem) -> StoreFuture<'_, RequestLineItem>;
}

/// On-hand shelf stock.
pub trait ShelfStore: Send + Sync {
    /// The shelf record for a menu item.
    fn find_by_menu_item(&self, menu_item_id: MenuItemId) -> StoreFuture<'_, Option<ShelfRecord>>;

    /// Create an empty record (quantity 0, version 0) unless one exists.
    ///
    /// Returns whichever record is stored afterwards, so concurrent creators
    /// agree on a single row.
    fn insert_if_absent(&self, record: NewShelfRecord) -> StoreFuture<'_, ShelfRecord>;

    /// Write `record` only if the stored version still equals `expected_version`.
    ///
    /// # Errors
    ///
    /// Implementations return [`StoreError::Conflict`] when another writer
    /// got there first.
    fn save(&self, record: ShelfRecord, expected_version: i64) -> StoreFuture<'_, ShelfRecord>;
}

/// Read-only menu catalog.
pub trait MenuCatalog: Send + Sync {
    /// Menu items with the given ids. Unknown ids are skipped.
    fn find_by_ids(&self, ids: Vec<MenuItemId>) -> StoreFuture<'_, Vec<MenuItem>>;

    /// The whole catalog ordered by id.
    fn find_all(&self) -> StoreFuture<'_, Vec<MenuItem>>;
}
