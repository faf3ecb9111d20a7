//! Packing and request creation against in-memory stores and bus.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{BANH_MI, ESPRESSO, Harness, PHO, wait_until};
use fulfillment_core::event::{
    Event, KitchenReplenishmentRequest, SerializedEvent, ShelfEvent, StatusChangeEvent,
};
use fulfillment_core::event_bus::EventBus;
use fulfillment_core::model::{CustomerId, MenuItemId, PackingActionResult, RequestId};
use fulfillment_core::status::{PackingStatus, RequestStatus, compute_status};
use fulfillment_core::{Command, FulfillmentError, ResourceType};
use fulfillment_service::{NewRequest, RequestedItem};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn status_events(harness: &Harness) -> Vec<StatusChangeEvent> {
    harness
        .bus
        .published(&harness.status_topic())
        .iter()
        .map(|event| event.decode().unwrap())
        .collect()
}

fn kitchen_requests(harness: &Harness) -> Vec<KitchenReplenishmentRequest> {
    harness
        .bus
        .published(&harness.kitchen_topic())
        .iter()
        .map(|event| event.decode().unwrap())
        .collect()
}

fn order(items: &[(MenuItemId, u32)]) -> NewRequest {
    NewRequest {
        customer_id: CustomerId::new(5),
        items: items
            .iter()
            .map(|&(menu_item_id, quantity)| RequestedItem {
                menu_item_id,
                quantity,
            })
            .collect(),
    }
}

#[tokio::test]
async fn full_stock_packs_request_and_notifies_once() {
    let harness = Harness::new();
    harness.store.set_shelf_quantity(PHO, 1);
    harness.store.set_shelf_quantity(BANH_MI, 2);
    let (request, _) = harness.seed(&[(PHO, 1), (BANH_MI, 2)]);
    harness.start().await;
    let mut subscription = harness.app.hub().subscribe();

    let result = harness.app.packing().pack(request.id).await.unwrap();

    assert_eq!(
        result,
        PackingActionResult {
            request_id: request.id,
            prepared_total: 3,
            required_total: 3,
            status: RequestStatus::ReadyToCollect,
        }
    );
    assert_eq!(harness.store.request_status(request.id), Some(RequestStatus::ReadyToCollect));

    let event = tokio::time::timeout(Duration::from_secs(5), subscription.recv())
        .await
        .expect("status change delivered")
        .expect("hub open");
    assert_eq!(
        event,
        StatusChangeEvent {
            request_id: request.id,
            request_status: RequestStatus::ReadyToCollect,
            packing_status: PackingStatus::ReadyToCollect,
        }
    );
    assert!(
        tokio::time::timeout(Duration::from_millis(200), subscription.recv())
            .await
            .is_err()
    );
    assert_eq!(status_events(&harness).len(), 1);
    assert!(kitchen_requests(&harness).is_empty());

    assert_eq!(harness.app.shutdown().await, 2);
}

#[tokio::test]
async fn repeat_pack_without_new_stock_changes_nothing() {
    let harness = Harness::new();
    harness.store.set_shelf_quantity(PHO, 1);
    let (request, _) = harness.seed(&[(PHO, 3)]);
    let packing = harness.app.packing();

    let first = packing.pack(request.id).await.unwrap();
    let saves = harness.store.line_item_saves();
    let events = status_events(&harness).len();

    let second = packing.pack(request.id).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.prepared_total, 1);
    assert_eq!(first.status, RequestStatus::InProgress);
    assert_eq!(harness.store.line_item_saves(), saves);
    assert_eq!(status_events(&harness).len(), events);
    assert_eq!(
        status_events(&harness),
        vec![StatusChangeEvent {
            request_id: request.id,
            request_status: RequestStatus::InProgress,
            packing_status: PackingStatus::RequestedItems,
        }]
    );
}

#[tokio::test]
async fn shortfall_requests_kitchen_and_reports_progress() {
    let harness = Harness::new();
    harness.store.set_shelf_quantity(PHO, 2);
    let (request, _) = harness.seed(&[(PHO, 5), (ESPRESSO, 1)]);

    let result = harness.app.packing().pack(request.id).await.unwrap();

    assert_eq!((result.prepared_total, result.required_total), (3, 6));
    assert_eq!(result.status, RequestStatus::InProgress);
    assert_eq!(harness.store.shelf_quantity(PHO), Some(0));
    assert_eq!(
        kitchen_requests(&harness),
        vec![KitchenReplenishmentRequest {
            menu_item_id: PHO,
            quantity: 3
        }]
    );
    assert!(harness.store.shelf(ESPRESSO).is_none());
}

#[tokio::test]
async fn replenished_shelf_event_completes_request() {
    let harness = Harness::new();
    harness.store.set_shelf_quantity(PHO, 1);
    harness.start().await;

    let view = harness.app.creation().create(order(&[(PHO, 3)])).await.unwrap();
    let id = view.request_id;
    wait_until(|| harness.store.request_status(id) == Some(RequestStatus::InProgress)).await;

    harness.store.set_shelf_quantity(PHO, 2);
    let trigger = SerializedEvent::from_event(&ShelfEvent::item_added(id, PHO, 2), None).unwrap();
    harness.bus.publish(&harness.shelf_topic(), &trigger).await.unwrap();

    wait_until(|| harness.store.request_status(id) == Some(RequestStatus::ReadyToCollect)).await;
    let view = harness.app.requests().find_view(id).await.unwrap();
    assert_eq!((view.prepared_total, view.required_total), (3, 3));
    assert_eq!(harness.store.shelf_quantity(PHO), Some(0));

    harness.app.shutdown().await;
}

#[tokio::test]
async fn create_stores_request_and_triggers_packing() {
    let harness = Harness::new();

    let view = harness
        .app
        .creation()
        .create(order(&[(ESPRESSO, 1), (PHO, 2)]))
        .await
        .unwrap();

    assert_eq!(view.customer_id, CustomerId::new(5));
    assert_eq!(view.status, RequestStatus::New);
    assert_eq!((view.prepared_total, view.required_total), (0, 3));
    let immediate: Vec<_> = view.line_items.iter().map(|i| (i.menu_item_id, i.immediate)).collect();
    assert_eq!(immediate, vec![(ESPRESSO, true), (PHO, false)]);

    let triggers = harness.bus.published(&harness.shelf_topic());
    assert_eq!(triggers.len(), 1);
    assert_eq!(triggers[0].event_type, ShelfEvent::new_request(view.request_id).event_type());
    assert_eq!(
        triggers[0].decode::<ShelfEvent>().unwrap(),
        ShelfEvent::new_request(view.request_id)
    );
    assert_eq!(
        status_events(&harness),
        vec![StatusChangeEvent {
            request_id: view.request_id,
            request_status: RequestStatus::New,
            packing_status: PackingStatus::NotStarted,
        }]
    );
}

#[tokio::test]
async fn create_rejects_invalid_orders_without_writing() {
    let harness = Harness::new();
    let creation = harness.app.creation();

    assert!(matches!(
        creation.create(order(&[])).await,
        Err(FulfillmentError::InvalidArgument(_))
    ));
    assert!(matches!(
        creation.create(order(&[(PHO, 0)])).await,
        Err(FulfillmentError::InvalidArgument(_))
    ));
    assert_eq!(
        creation.create(order(&[(PHO, 1), (MenuItemId::new(42), 1)])).await,
        Err(FulfillmentError::not_found(ResourceType::MenuItem, 42))
    );

    assert!(harness.app.requests().fetch_active().await.unwrap().is_empty());
    assert!(harness.bus.published(&harness.shelf_topic()).is_empty());
}

#[tokio::test]
async fn failed_packing_trigger_is_transient_and_keeps_request() {
    let harness = Harness::new();
    harness.bus.fail_publishes_to(&harness.shelf_topic());

    let result = harness.app.creation().create(order(&[(PHO, 1)])).await;

    assert!(matches!(result, Err(FulfillmentError::Transient(_))));
    let active = harness.app.requests().fetch_active().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].status, RequestStatus::New);
}

#[tokio::test]
async fn failure_mid_pass_keeps_committed_progress() {
    let harness = Harness::new();
    harness.store.set_shelf_quantity(PHO, 1);
    harness.store.set_shelf_quantity(BANH_MI, 1);
    harness.store.fail_shelf_writes_for(BANH_MI);
    let (request, _) = harness.seed(&[(PHO, 1), (BANH_MI, 1)]);

    let result = harness.app.packing().pack(request.id).await;

    assert!(matches!(result, Err(FulfillmentError::Transient(_))));
    let prepared: Vec<_> = harness
        .store
        .line_items(request.id)
        .iter()
        .map(|item| item.prepared())
        .collect();
    assert_eq!(prepared, vec![1, 0]);
    assert_eq!(harness.store.request_status(request.id), Some(RequestStatus::InProgress));
    assert!(status_events(&harness).is_empty());
}

#[tokio::test]
async fn packing_unknown_request_is_not_found() {
    let harness = Harness::new();

    let result = harness.app.packing().pack(RequestId::new(404)).await;

    assert_eq!(result, Err(FulfillmentError::not_found(ResourceType::Request, 404)));
}

#[tokio::test]
async fn uncatalogued_menu_item_fails_pack_before_any_write() {
    let harness = Harness::new();
    let retired = MenuItemId::new(77);
    harness.store.set_shelf_quantity(PHO, 1);
    harness.store.set_shelf_quantity(retired, 5);
    let (request, _) = harness.seed(&[(PHO, 1), (retired, 1)]);

    let result = harness.app.packing().pack(request.id).await;

    assert_eq!(result, Err(FulfillmentError::not_found(ResourceType::MenuItem, 77)));
    assert_eq!(harness.store.shelf_quantity(PHO), Some(1));
    assert_eq!(harness.store.shelf_quantity(retired), Some(5));
    assert_eq!(harness.store.shelf_writes(), 0);
    assert_eq!(harness.store.line_item_saves(), 0);
    assert!(harness.store.line_items(request.id).iter().all(|item| item.prepared() == 0));
    assert_eq!(harness.store.request_status(request.id), Some(RequestStatus::New));
    assert!(status_events(&harness).is_empty());
    assert!(kitchen_requests(&harness).is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn created_request_reaches_hub_as_new_before_packing_progress() {
    for _ in 0..20 {
        let harness = Harness::new();
        harness.start().await;
        let mut subscription = harness.app.hub().subscribe();

        let view = harness
            .app
            .creation()
            .create(order(&[(ESPRESSO, 1)]))
            .await
            .unwrap();

        let mut statuses = Vec::new();
        while statuses.len() < 2 {
            let event = tokio::time::timeout(Duration::from_secs(5), subscription.recv())
                .await
                .expect("status change delivered")
                .expect("hub open");
            assert_eq!(event.request_id, view.request_id);
            statuses.push(event.request_status);
        }
        assert_eq!(statuses, vec![RequestStatus::New, RequestStatus::ReadyToCollect]);

        harness.app.shutdown().await;
    }
}

#[tokio::test]
async fn status_publish_failure_does_not_fail_pack() {
    let harness = Harness::new();
    harness.bus.fail_publishes_to(&harness.status_topic());
    harness.store.set_shelf_quantity(PHO, 2);
    let (request, _) = harness.seed(&[(PHO, 2)]);

    let result = harness.app.packing().pack(request.id).await.unwrap();

    assert_eq!(result.status, RequestStatus::ReadyToCollect);
    assert!(status_events(&harness).is_empty());
}

#[tokio::test]
async fn packing_runs_through_command_trait() {
    let harness = Harness::new();
    let (request, _) = harness.seed(&[(ESPRESSO, 2)]);
    let command: Arc<dyn Command<Input = RequestId, Output = PackingActionResult>> =
        harness.app.packing();

    let result = command.execute(request.id).await.unwrap();

    assert_eq!(result.status, RequestStatus::ReadyToCollect);
    assert_eq!(harness.store.shelf_reads(), 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn pack_status_matches_counts(lines in prop::collection::vec((1u32..6, 0u32..8), 1..4)) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let harness = Harness::new();
        let menu_ids = [PHO, BANH_MI, MenuItemId::new(4)];
        harness.store.add_menu_item(fulfillment_testing::menu_item(4, "Bun Cha", false));

        let items: Vec<_> = lines
            .iter()
            .zip(menu_ids)
            .map(|(&(quantity, stock), menu_item_id)| {
                harness.store.set_shelf_quantity(menu_item_id, stock);
                (menu_item_id, quantity)
            })
            .collect();
        let (request, _) = harness.seed(&items);

        let first = runtime.block_on(harness.app.packing().pack(request.id)).unwrap();
        let second = runtime.block_on(harness.app.packing().pack(request.id)).unwrap();

        let stored = harness.store.line_items(request.id);
        for (item, &(quantity, stock)) in stored.iter().zip(&lines) {
            prop_assert_eq!(item.prepared(), quantity.min(stock));
        }
        let prepared: u64 = stored.iter().map(|i| u64::from(i.prepared())).sum();
        let required: u64 = stored.iter().map(|i| u64::from(i.quantity())).sum();
        prop_assert_eq!(first.status, compute_status(prepared, required).unwrap());
        prop_assert_eq!(harness.store.request_status(request.id), Some(first.status));
        prop_assert_eq!(first, second);
        prop_assert!(status_events(&harness).len() <= 1);
    }
}
