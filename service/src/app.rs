//! Service wiring and lifecycle.
//!
//! [`FulfillmentApp`] owns every long-lived component. It builds them from
//! a [`Config`], a set of [`Stores`] and two event buses: one shared by the
//! packing consumers and publishers, one for the per-instance status
//! consumer whose group must differ so every instance sees every change.

use crate::config::Config;
use crate::creation::CreateRequestCommand;
use crate::kitchen::KitchenRequestPublisher;
use crate::listeners::{ShelfEventHandler, StatusChangeListener};
use crate::notifications::{NotificationHub, StatusChangePublisher, StatusFeed};
use crate::packing::PackingCommand;
use crate::request::RequestService;
use crate::shelf::ShelfReservationEngine;
use anyhow::Context;
use fulfillment_core::environment::{Clock, SystemClock};
use fulfillment_core::event_bus::EventBus;
use fulfillment_core::store::{LineItemStore, MenuCatalog, RequestStore, ShelfStore};
use fulfillment_postgres::PostgresFulfillmentStore;
use fulfillment_redpanda::RedpandaEventBus;
use fulfillment_runtime::shutdown::await_shutdown;
use fulfillment_runtime::{ConsumerError, EventConsumer, EventHandler};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;

/// Store handles used by the service.
#[derive(Clone)]
pub struct Stores {
    /// Requests
    pub requests: Arc<dyn RequestStore>,
    /// Line items
    pub line_items: Arc<dyn LineItemStore>,
    /// Shelf records
    pub shelves: Arc<dyn ShelfStore>,
    /// Menu catalog
    pub menu: Arc<dyn MenuCatalog>,
}

impl Stores {
    /// Use one store for every role.
    #[must_use]
    pub fn shared<S>(store: S) -> Self
    where
        S: RequestStore + LineItemStore + ShelfStore + MenuCatalog + 'static,
    {
        let store = Arc::new(store);
        Self {
            requests: store.clone(),
            line_items: store.clone(),
            shelves: store.clone(),
            menu: store,
        }
    }
}

/// The running fulfillment service.
pub struct FulfillmentApp {
    config: Config,
    event_bus: Arc<dyn EventBus>,
    status_bus: Arc<dyn EventBus>,
    requests: Arc<RequestService>,
    packing: Arc<PackingCommand>,
    creation: Arc<CreateRequestCommand>,
    hub: Arc<NotificationHub>,
    feed: StatusFeed,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Mutex<Vec<(String, JoinHandle<()>)>>,
}

impl FulfillmentApp {
    /// Wire the service from its collaborators.
    #[must_use]
    pub fn new(
        config: Config,
        stores: Stores,
        event_bus: Arc<dyn EventBus>,
        status_bus: Arc<dyn EventBus>,
    ) -> Self {
        Self::with_clock(config, stores, event_bus, status_bus, Arc::new(SystemClock))
    }

    /// Like [`new`](Self::new) with an explicit clock.
    #[must_use]
    pub fn with_clock(
        config: Config,
        stores: Stores,
        event_bus: Arc<dyn EventBus>,
        status_bus: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let requests = Arc::new(RequestService::new(
            Arc::clone(&stores.requests),
            Arc::clone(&stores.line_items),
            Arc::clone(&stores.menu),
        ));
        let status_publisher =
            StatusChangePublisher::new(Arc::clone(&event_bus), config.topics.status.clone());
        let engine = Arc::new(ShelfReservationEngine::new(
            Arc::clone(&stores.shelves),
            Arc::clone(&stores.menu),
            KitchenRequestPublisher::new(Arc::clone(&event_bus), config.topics.kitchen.clone()),
            clock,
            config.reservation_retry_policy(),
        ));
        let packing = Arc::new(PackingCommand::new(
            Arc::clone(&stores.requests),
            Arc::clone(&stores.line_items),
            Arc::clone(&requests),
            engine,
            status_publisher.clone(),
        ));
        let creation = Arc::new(CreateRequestCommand::new(
            Arc::clone(&stores.requests),
            Arc::clone(&stores.line_items),
            Arc::clone(&stores.menu),
            Arc::clone(&requests),
            Arc::clone(&event_bus),
            config.topics.shelf.clone(),
            status_publisher,
        ));
        let hub = Arc::new(NotificationHub::new(config.hub.buffer_size));
        let feed = StatusFeed::new(Arc::clone(&hub), Arc::clone(&requests));
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            event_bus,
            status_bus,
            requests,
            packing,
            creation,
            hub,
            feed,
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Connect to `PostgreSQL` and Redpanda, run migrations and wire the service.
    ///
    /// # Errors
    ///
    /// Returns an error if the database or the brokers cannot be reached.
    pub async fn connect(config: Config) -> anyhow::Result<Self> {
        tracing::info!("Connecting to PostgreSQL...");
        let store = PostgresFulfillmentStore::connect(
            &config.postgres.url,
            config.postgres.max_connections,
        )
        .await
        .context("Failed to connect to PostgreSQL")?;
        store.migrate().await.context("Failed to run migrations")?;
        tracing::info!("PostgreSQL connected and migrated");

        tracing::info!(brokers = %config.redpanda.brokers, "Connecting to Redpanda...");
        let event_bus = RedpandaEventBus::builder()
            .brokers(&config.redpanda.brokers)
            .consumer_group(&config.redpanda.shelf_consumer_group)
            .build()
            .context("Failed to create packing event bus")?;
        let status_bus = RedpandaEventBus::builder()
            .brokers(&config.redpanda.brokers)
            .consumer_group(&config.redpanda.status_consumer_group)
            .auto_offset_reset("latest")
            .build()
            .context("Failed to create status event bus")?;
        tracing::info!("Redpanda event buses created");

        Ok(Self::new(
            config,
            Stores::shared(store),
            Arc::new(event_bus),
            Arc::new(status_bus),
        ))
    }

    /// Spawn the shelf-event and status-change consumers.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError`] if a consumer cannot be configured.
    pub async fn start(&self) -> Result<(), ConsumerError> {
        let shelf_handler: Arc<dyn EventHandler> =
            Arc::new(ShelfEventHandler::new(Arc::clone(&self.packing)));
        let status_handler: Arc<dyn EventHandler> =
            Arc::new(StatusChangeListener::new(Arc::clone(&self.hub)));

        let shelf_consumer = EventConsumer::builder()
            .name("shelf-events")
            .topics(vec![self.config.topics.shelf.clone()])
            .event_bus(Arc::clone(&self.event_bus))
            .handler(shelf_handler)
            .shutdown(self.shutdown_tx.subscribe())
            .build()?;
        let status_consumer = EventConsumer::builder()
            .name("status-changes")
            .topics(vec![self.config.topics.status.clone()])
            .event_bus(Arc::clone(&self.status_bus))
            .handler(status_handler)
            .shutdown(self.shutdown_tx.subscribe())
            .build()?;

        let mut tasks = self.tasks.lock().await;
        tasks.push((shelf_consumer.name().to_string(), shelf_consumer.spawn()));
        tasks.push((status_consumer.name().to_string(), status_consumer.spawn()));
        tracing::info!(consumers = tasks.len(), "Fulfillment consumers started");
        Ok(())
    }

    /// Stop consumers, end live subscriptions and wait for background tasks.
    ///
    /// Returns the number of tasks that stopped cleanly.
    pub async fn shutdown(&self) -> usize {
        tracing::info!("Initiating graceful shutdown...");
        let _ = self.shutdown_tx.send(());
        self.hub.shutdown();

        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        let total = tasks.len();
        let stopped = await_shutdown(tasks, self.config.shutdown_timeout()).await;
        tracing::info!(stopped, total, "Graceful shutdown complete");
        stopped
    }

    /// Service configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Request queries.
    #[must_use]
    pub fn requests(&self) -> Arc<RequestService> {
        Arc::clone(&self.requests)
    }

    /// Packing orchestrator.
    #[must_use]
    pub fn packing(&self) -> Arc<PackingCommand> {
        Arc::clone(&self.packing)
    }

    /// Request creation.
    #[must_use]
    pub fn creation(&self) -> Arc<CreateRequestCommand> {
        Arc::clone(&self.creation)
    }

    /// Notification hub.
    #[must_use]
    pub fn hub(&self) -> Arc<NotificationHub> {
        Arc::clone(&self.hub)
    }

    /// Live status feed.
    #[must_use]
    pub const fn feed(&self) -> &StatusFeed {
        &self.feed
    }
}
