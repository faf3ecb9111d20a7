//! Shared fixtures for service integration tests.

#![allow(dead_code)]

use fulfillment_core::model::{CustomerId, MenuItemId, NewLineItem, Request, RequestLineItem};
use fulfillment_service::{Config, FulfillmentApp, Stores};
use fulfillment_testing::{InMemoryEventBus, InMemoryFulfillmentStore, menu_item, test_clock};
use std::sync::Arc;
use std::time::Duration;

pub const PHO: MenuItemId = MenuItemId::new(1);
pub const BANH_MI: MenuItemId = MenuItemId::new(2);
pub const ESPRESSO: MenuItemId = MenuItemId::new(3);

/// In-memory service with its store and bus exposed for assertions.
pub struct Harness {
    pub store: InMemoryFulfillmentStore,
    pub bus: InMemoryEventBus,
    pub app: FulfillmentApp,
}

impl Harness {
    pub fn new() -> Self {
        let store = InMemoryFulfillmentStore::new();
        store.add_menu_item(menu_item(PHO.value(), "Pho", false));
        store.add_menu_item(menu_item(BANH_MI.value(), "Banh Mi", false));
        store.add_menu_item(menu_item(ESPRESSO.value(), "Espresso", true));

        let bus = InMemoryEventBus::new();
        let app = FulfillmentApp::with_clock(
            test_config(),
            Stores::shared(store.clone()),
            Arc::new(bus.clone()),
            Arc::new(bus.clone()),
            Arc::new(test_clock()),
        );

        Self { store, bus, app }
    }

    pub fn status_topic(&self) -> String {
        self.app.config().topics.status.clone()
    }

    pub fn shelf_topic(&self) -> String {
        self.app.config().topics.shelf.clone()
    }

    pub fn kitchen_topic(&self) -> String {
        self.app.config().topics.kitchen.clone()
    }

    /// Seed a request whose line items take `immediate` from the menu.
    pub fn seed(&self, items: &[(MenuItemId, u32)]) -> (Request, Vec<RequestLineItem>) {
        self.store.seed_request(
            CustomerId::new(1),
            items
                .iter()
                .map(|&(menu_item_id, quantity)| NewLineItem {
                    menu_item_id,
                    quantity,
                    immediate: menu_item_id == ESPRESSO,
                })
                .collect(),
        )
    }

    /// Start consumers and wait until both are subscribed.
    pub async fn start(&self) {
        self.app.start().await.expect("consumers start");
        wait_for_subscribers(&self.bus, &self.shelf_topic(), 1).await;
        wait_for_subscribers(&self.bus, &self.status_topic(), 1).await;
    }
}

/// Defaults with fast, generous conflict retries.
pub fn test_config() -> Config {
    Config::from_lookup(|key| match key {
        "RESERVATION_MAX_RETRIES" => Some("50".to_string()),
        "RESERVATION_RETRY_INITIAL_MS" => Some("1".to_string()),
        "SHUTDOWN_TIMEOUT" => Some("2".to_string()),
        "HUB_BUFFER_SIZE" => Some("64".to_string()),
        _ => None,
    })
}

pub async fn wait_for_subscribers(bus: &InMemoryEventBus, topic: &str, count: usize) {
    wait_until(|| bus.subscriber_count(topic) >= count).await;
}

/// Poll `condition` for up to five seconds.
pub async fn wait_until<F: Fn() -> bool>(condition: F) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(condition(), "condition not met within 5s");
}
