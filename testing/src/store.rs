//! In-memory implementation of every fulfillment store trait.

#![allow(clippy::unwrap_used)] // Test infrastructure: a poisoned lock means a test already panicked
#![allow(clippy::missing_panics_doc)]

use chrono::{DateTime, Utc};
use fulfillment_core::error::{ResourceType, StoreError};
use fulfillment_core::model::{
    CustomerId, LineItemId, MenuItem, MenuItemId, NewLineItem, NewShelfRecord, Request, RequestId,
    RequestLineItem, ShelfRecord,
};
use fulfillment_core::status::RequestStatus;
use fulfillment_core::store::{LineItemStore, MenuCatalog, RequestStore, ShelfStore, StoreFuture};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock};

/// Menu item with sensible defaults for tests.
#[must_use]
pub fn menu_item(id: i64, name: &str, immediate: bool) -> MenuItem {
    MenuItem {
        id: MenuItemId::new(id),
        name: name.to_string(),
        price: 10.0,
        volume: 1,
        requires_immediate_preparation: immediate,
    }
}

/// Simulated concurrent writer that wins the next shelf saves.
#[derive(Debug, Clone, Copy)]
struct InjectedConflict {
    remaining: usize,
    steal: u32,
}

#[derive(Default)]
struct StoreState {
    next_id: i64,
    menu: BTreeMap<MenuItemId, MenuItem>,
    requests: BTreeMap<RequestId, Request>,
    line_items: BTreeMap<LineItemId, RequestLineItem>,
    shelves: HashMap<MenuItemId, ShelfRecord>,
    shelf_reads: usize,
    shelf_writes: usize,
    line_item_saves: usize,
    failing_shelves: HashSet<MenuItemId>,
    conflicts: HashMap<MenuItemId, InjectedConflict>,
    unavailable: bool,
}

impl StoreState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable {
            Err(StoreError::Unavailable("in-memory store marked unavailable".into()))
        } else {
            Ok(())
        }
    }
}

/// Shared-map store implementing [`RequestStore`], [`LineItemStore`],
/// [`ShelfStore`] and [`MenuCatalog`].
///
/// Clones share state. Line items are kept in id order, which is insertion
/// order, matching the storage order a database would return.
#[derive(Clone, Default)]
pub struct InMemoryFulfillmentStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryFulfillmentStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a catalog entry.
    pub fn add_menu_item(&self, item: MenuItem) {
        self.state.write().unwrap().menu.insert(item.id, item);
    }

    /// Set a shelf's quantity directly, creating the record if needed.
    ///
    /// Models stock arriving from the kitchen. Bumps the version like any
    /// other write but is not counted in [`shelf_writes`](Self::shelf_writes).
    pub fn set_shelf_quantity(&self, menu_item_id: MenuItemId, quantity: u32) {
        let mut state = self.state.write().unwrap();
        let now = Utc::now();
        let name = state
            .menu
            .get(&menu_item_id)
            .map(|item| item.name.clone())
            .unwrap_or_default();
        let id = state.next_id();
        state
            .shelves
            .entry(menu_item_id)
            .and_modify(|record| *record = record.with_quantity(quantity, now))
            .or_insert_with(|| ShelfRecord {
                id,
                menu_item_id,
                item_name: name,
                quantity,
                version: 0,
                updated_at: now,
            });
    }

    /// The shelf record for a menu item, without counting a read.
    #[must_use]
    pub fn shelf(&self, menu_item_id: MenuItemId) -> Option<ShelfRecord> {
        self.state.read().unwrap().shelves.get(&menu_item_id).cloned()
    }

    /// Shelf quantity for a menu item, without counting a read.
    #[must_use]
    pub fn shelf_quantity(&self, menu_item_id: MenuItemId) -> Option<u32> {
        self.shelf(menu_item_id).map(|record| record.quantity)
    }

    /// Shelf lookups made through [`ShelfStore`].
    #[must_use]
    pub fn shelf_reads(&self) -> usize {
        self.state.read().unwrap().shelf_reads
    }

    /// Shelf inserts and saves made through [`ShelfStore`].
    #[must_use]
    pub fn shelf_writes(&self) -> usize {
        self.state.read().unwrap().shelf_writes
    }

    /// Line item saves made through [`LineItemStore::save`].
    #[must_use]
    pub fn line_item_saves(&self) -> usize {
        self.state.read().unwrap().line_item_saves
    }

    /// Make shelf saves for `menu_item_id` fail with [`StoreError::Unavailable`].
    pub fn fail_shelf_writes_for(&self, menu_item_id: MenuItemId) {
        self.state.write().unwrap().failing_shelves.insert(menu_item_id);
    }

    /// Let a simulated concurrent writer win the next `times` shelf saves for
    /// `menu_item_id`, taking `steal` units each time.
    pub fn inject_shelf_conflicts(&self, menu_item_id: MenuItemId, times: usize, steal: u32) {
        self.state.write().unwrap().conflicts.insert(
            menu_item_id,
            InjectedConflict {
                remaining: times,
                steal,
            },
        );
    }

    /// Make every operation fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.write().unwrap().unavailable = unavailable;
    }

    /// Insert a request with its line items in one step.
    #[must_use]
    pub fn seed_request(
        &self,
        customer_id: CustomerId,
        items: Vec<NewLineItem>,
    ) -> (Request, Vec<RequestLineItem>) {
        let mut state = self.state.write().unwrap();
        let request = Request {
            id: RequestId::new(state.next_id()),
            customer_id,
            status: RequestStatus::New,
        };
        state.requests.insert(request.id, request.clone());
        let line_items = insert_line_items(&mut state, request.id, items);
        (request, line_items)
    }

    /// Current stored status of a request.
    #[must_use]
    pub fn request_status(&self, id: RequestId) -> Option<RequestStatus> {
        self.state.read().unwrap().requests.get(&id).map(|r| r.status)
    }

    /// Current stored line items of a request, without going through the trait.
    #[must_use]
    pub fn line_items(&self, request_id: RequestId) -> Vec<RequestLineItem> {
        self.state
            .read()
            .unwrap()
            .line_items
            .values()
            .filter(|item| item.request_id() == request_id)
            .cloned()
            .collect()
    }
}

fn insert_line_items(
    state: &mut StoreState,
    request_id: RequestId,
    items: Vec<NewLineItem>,
) -> Vec<RequestLineItem> {
    items
        .into_iter()
        .filter_map(|item| {
            let id = LineItemId::new(state.next_id());
            let line_item = RequestLineItem::new(
                id,
                request_id,
                item.menu_item_id,
                item.quantity,
                0,
                item.immediate,
            )
            .ok()?;
            state.line_items.insert(id, line_item.clone());
            Some(line_item)
        })
        .collect()
}

fn new_shelf_record(id: i64, record: NewShelfRecord, now: DateTime<Utc>) -> ShelfRecord {
    ShelfRecord {
        id,
        menu_item_id: record.menu_item_id,
        item_name: record.item_name,
        quantity: 0,
        version: 0,
        updated_at: now,
    }
}

impl RequestStore for InMemoryFulfillmentStore {
    fn insert(&self, customer_id: CustomerId, status: RequestStatus) -> StoreFuture<'_, Request> {
        Box::pin(async move {
            let mut state = self.state.write().unwrap();
            state.check_available()?;
            let request = Request {
                id: RequestId::new(state.next_id()),
                customer_id,
                status,
            };
            state.requests.insert(request.id, request.clone());
            Ok(request)
        })
    }

    fn find_by_id(&self, id: RequestId) -> StoreFuture<'_, Option<Request>> {
        Box::pin(async move {
            let state = self.state.read().unwrap();
            state.check_available()?;
            Ok(state.requests.get(&id).cloned())
        })
    }

    fn update_status(&self, id: RequestId, status: RequestStatus) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let mut state = self.state.write().unwrap();
            state.check_available()?;
            Ok(state
                .requests
                .get_mut(&id)
                .map(|request| request.status = status)
                .is_some())
        })
    }

    fn find_by_statuses(&self, statuses: Vec<RequestStatus>) -> StoreFuture<'_, Vec<Request>> {
        Box::pin(async move {
            let state = self.state.read().unwrap();
            state.check_available()?;
            Ok(state
                .requests
                .values()
                .filter(|request| statuses.contains(&request.status))
                .cloned()
                .collect())
        })
    }
}

impl LineItemStore for InMemoryFulfillmentStore {
    fn insert_all(
        &self,
        request_id: RequestId,
        items: Vec<NewLineItem>,
    ) -> StoreFuture<'_, Vec<RequestLineItem>> {
        Box::pin(async move {
            let mut state = self.state.write().unwrap();
            state.check_available()?;
            Ok(insert_line_items(&mut state, request_id, items))
        })
    }

    fn find_by_request(&self, request_id: RequestId) -> StoreFuture<'_, Vec<RequestLineItem>> {
        Box::pin(async move {
            self.state.read().unwrap().check_available()?;
            Ok(self.line_items(request_id))
        })
    }

    fn find_by_request_and_menu_item(
        &self,
        request_id: RequestId,
        menu_item_id: MenuItemId,
    ) -> StoreFuture<'_, Option<RequestLineItem>> {
        Box::pin(async move {
            let state = self.state.read().unwrap();
            state.check_available()?;
            Ok(state
                .line_items
                .values()
                .find(|item| item.request_id() == request_id && item.menu_item_id() == menu_item_id)
                .cloned())
        })
    }

    fn save(&self, item: RequestLineItem) -> StoreFuture<'_, RequestLineItem> {
        Box::pin(async move {
            let mut state = self.state.write().unwrap();
            state.check_available()?;
            if !state.line_items.contains_key(&item.id()) {
                return Err(StoreError::Corrupt(format!(
                    "line item {} does not exist",
                    item.id()
                )));
            }
            state.line_item_saves += 1;
            state.line_items.insert(item.id(), item.clone());
            Ok(item)
        })
    }
}

impl ShelfStore for InMemoryFulfillmentStore {
    fn find_by_menu_item(&self, menu_item_id: MenuItemId) -> StoreFuture<'_, Option<ShelfRecord>> {
        Box::pin(async move {
            let mut state = self.state.write().unwrap();
            state.check_available()?;
            state.shelf_reads += 1;
            Ok(state.shelves.get(&menu_item_id).cloned())
        })
    }

    fn insert_if_absent(&self, record: NewShelfRecord) -> StoreFuture<'_, ShelfRecord> {
        Box::pin(async move {
            let mut state = self.state.write().unwrap();
            state.check_available()?;
            state.shelf_writes += 1;
            if let Some(existing) = state.shelves.get(&record.menu_item_id) {
                return Ok(existing.clone());
            }
            let id = state.next_id();
            let menu_item_id = record.menu_item_id;
            let created_at = record.created_at;
            let stored = new_shelf_record(id, record, created_at);
            state.shelves.insert(menu_item_id, stored.clone());
            Ok(stored)
        })
    }

    fn save(&self, record: ShelfRecord, expected_version: i64) -> StoreFuture<'_, ShelfRecord> {
        Box::pin(async move {
            let mut state = self.state.write().unwrap();
            state.check_available()?;
            state.shelf_writes += 1;

            let menu_item_id = record.menu_item_id;
            if state.failing_shelves.contains(&menu_item_id) {
                return Err(StoreError::Unavailable(format!(
                    "shelf writes for menu item {menu_item_id} disabled for test"
                )));
            }

            let stolen = state
                .conflicts
                .get_mut(&menu_item_id)
                .filter(|conflict| conflict.remaining > 0)
                .map(|conflict| {
                    conflict.remaining -= 1;
                    conflict.steal
                });
            if let Some(steal) = stolen {
                if let Some(current) = state.shelves.get_mut(&menu_item_id) {
                    *current =
                        current.with_quantity(current.quantity.saturating_sub(steal), Utc::now());
                }
            }

            let current_version = state.shelves.get(&menu_item_id).map(|r| r.version);
            if current_version != Some(expected_version) {
                return Err(StoreError::Conflict {
                    resource: ResourceType::ShelfItem,
                    id: menu_item_id.value(),
                    expected_version,
                });
            }

            state.shelves.insert(menu_item_id, record.clone());
            Ok(record)
        })
    }
}

impl MenuCatalog for InMemoryFulfillmentStore {
    fn find_by_ids(&self, ids: Vec<MenuItemId>) -> StoreFuture<'_, Vec<MenuItem>> {
        Box::pin(async move {
            let state = self.state.read().unwrap();
            state.check_available()?;
            Ok(ids
                .iter()
                .filter_map(|id| state.menu.get(id).cloned())
                .collect())
        })
    }

    fn find_all(&self) -> StoreFuture<'_, Vec<MenuItem>> {
        Box::pin(async move {
            let state = self.state.read().unwrap();
            state.check_available()?;
            Ok(state.menu.values().cloned().collect())
        })
    }
}
