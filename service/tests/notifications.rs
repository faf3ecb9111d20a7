//! Status feed behaviour over the notification hub.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{Harness, PHO};
use fulfillment_core::event::StatusChangeEvent;
use fulfillment_core::model::{RequestId, RequestStatusUpdate};
use fulfillment_core::status::{PackingStatus, RequestStatus};
use fulfillment_core::{FulfillmentError, ResourceType};
use fulfillment_service::FeedFilter;
use futures::StreamExt;
use std::time::Duration;

fn change(request_id: RequestId, packing_status: PackingStatus) -> StatusChangeEvent {
    StatusChangeEvent {
        request_id,
        request_status: RequestStatus::InProgress,
        packing_status,
    }
}

#[tokio::test]
async fn feed_reports_counts_from_storage_after_pack() {
    let harness = Harness::new();
    harness.store.set_shelf_quantity(PHO, 1);
    let (request, _) = harness.seed(&[(PHO, 2)]);
    harness.start().await;
    let mut feed = harness.app.feed().subscribe(FeedFilter::All);

    harness.app.packing().pack(request.id).await.unwrap();

    let update = tokio::time::timeout(Duration::from_secs(5), feed.next())
        .await
        .expect("feed item delivered")
        .expect("feed open")
        .unwrap();
    assert_eq!(
        update,
        RequestStatusUpdate {
            request_id: request.id,
            packing_status: PackingStatus::RequestedItems,
            prepared_items: 1,
            total_items: 2,
        }
    );

    harness.app.shutdown().await;
}

#[tokio::test]
async fn feed_counts_come_from_fresh_view_not_event() {
    let harness = Harness::new();
    let (request, _) = harness.seed(&[(PHO, 4)]);
    let mut feed = harness.app.feed().subscribe(FeedFilter::All);

    harness
        .app
        .requests()
        .add_prepared(request.id, PHO, 3)
        .await
        .unwrap();
    harness.app.hub().publish(change(request.id, PackingStatus::InProgress));

    let update = feed.next().await.unwrap().unwrap();
    assert_eq!((update.prepared_items, update.total_items), (3, 4));
    assert_eq!(update.packing_status, PackingStatus::InProgress);
}

#[tokio::test]
async fn request_filter_tracks_one_request() {
    let harness = Harness::new();
    let (first, _) = harness.seed(&[(PHO, 1)]);
    let (second, _) = harness.seed(&[(PHO, 2)]);
    let mut tracked = harness.app.feed().subscribe(FeedFilter::Request(second.id));
    let mut everything = harness.app.feed().subscribe(FeedFilter::All);

    let hub = harness.app.hub();
    hub.publish(change(first.id, PackingStatus::InProgress));
    hub.publish(change(second.id, PackingStatus::RequestedItems));

    let update = tracked.next().await.unwrap().unwrap();
    assert_eq!(update.request_id, second.id);
    assert_eq!(update.packing_status, PackingStatus::RequestedItems);

    assert_eq!(everything.next().await.unwrap().unwrap().request_id, first.id);
    assert_eq!(everything.next().await.unwrap().unwrap().request_id, second.id);
}

#[tokio::test]
async fn failed_lookup_yields_error_and_feed_continues() {
    let harness = Harness::new();
    let (request, _) = harness.seed(&[(PHO, 1)]);
    let mut feed = harness.app.feed().subscribe(FeedFilter::All);

    let hub = harness.app.hub();
    hub.publish(change(RequestId::new(999), PackingStatus::InProgress));
    hub.publish(change(request.id, PackingStatus::InProgress));

    assert_eq!(
        feed.next().await.unwrap(),
        Err(FulfillmentError::not_found(ResourceType::Request, 999))
    );
    assert_eq!(feed.next().await.unwrap().unwrap().request_id, request.id);
}

#[tokio::test]
async fn two_subscribers_both_receive_and_late_one_misses_earlier() {
    let harness = Harness::new();
    let (request, _) = harness.seed(&[(PHO, 1)]);
    let hub = harness.app.hub();
    let mut first = harness.app.feed().subscribe(FeedFilter::All);
    let mut second = harness.app.feed().subscribe(FeedFilter::All);

    hub.publish(change(request.id, PackingStatus::InProgress));
    let mut late = harness.app.feed().subscribe(FeedFilter::All);
    hub.publish(change(request.id, PackingStatus::RequestedItems));

    for feed in [&mut first, &mut second] {
        assert_eq!(
            feed.next().await.unwrap().unwrap().packing_status,
            PackingStatus::InProgress
        );
        assert_eq!(
            feed.next().await.unwrap().unwrap().packing_status,
            PackingStatus::RequestedItems
        );
    }
    assert_eq!(
        late.next().await.unwrap().unwrap().packing_status,
        PackingStatus::RequestedItems
    );
}

#[tokio::test]
async fn dropped_feed_unsubscribes() {
    let harness = Harness::new();
    let hub = harness.app.hub();

    let feed = harness.app.feed().subscribe(FeedFilter::All);
    assert_eq!(hub.subscriber_count(), 1);

    drop(feed);
    assert_eq!(hub.subscriber_count(), 0);
}

#[tokio::test]
async fn shutdown_ends_live_feeds() {
    let harness = Harness::new();
    harness.start().await;
    let mut feed = harness.app.feed().subscribe(FeedFilter::All);

    assert_eq!(harness.app.shutdown().await, 2);

    let end = tokio::time::timeout(Duration::from_secs(5), feed.next())
        .await
        .expect("feed ends after shutdown");
    assert!(end.is_none());
}
