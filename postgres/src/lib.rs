//! `PostgreSQL` stores for fulfillment services.
//!
//! [`PostgresFulfillmentStore`] implements every store trait from
//! `fulfillment-core` over one connection pool:
//!
//! - `request` and `request_menu_item` rows for requests and their line items
//! - `shelf` rows guarded by a `version` column: [`ShelfStore::save`] is a
//!   conditional `UPDATE ... WHERE version = $expected`, so a concurrent
//!   writer surfaces as [`StoreError::Conflict`] instead of a lost update
//! - `menu_item` rows, read-only
//!
//! Queries are checked at runtime (`sqlx::query_as`), so building the crate
//! does not need a live database.
//!
//! # Example
//!
//! ```no_run
//! use fulfillment_postgres::PostgresFulfillmentStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = PostgresFulfillmentStore::connect("postgres://localhost/fulfillment", 10).await?;
//! store.migrate().await?;
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use fulfillment_core::error::{ResourceType, StoreError};
use fulfillment_core::model::{
    CustomerId, LineItemId, MenuItem, MenuItemId, NewLineItem, NewShelfRecord, Request, RequestId,
    RequestLineItem, ShelfRecord,
};
use fulfillment_core::status::RequestStatus;
use fulfillment_core::store::{LineItemStore, MenuCatalog, RequestStore, ShelfStore, StoreFuture};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

#[derive(sqlx::FromRow)]
struct RequestRow {
    id: i64,
    customer_id: i64,
    status: String,
}

impl TryFrom<RequestRow> for Request {
    type Error = StoreError;

    fn try_from(row: RequestRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<RequestStatus>().map_err(|e| {
            StoreError::Corrupt(format!("request {}: {e}", row.id))
        })?;
        Ok(Self {
            id: RequestId::new(row.id),
            customer_id: CustomerId::new(row.customer_id),
            status,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LineItemRow {
    id: i64,
    request_id: i64,
    menu_item_id: i64,
    quantity: i32,
    prepared: i32,
    immediate: bool,
}

impl TryFrom<LineItemRow> for RequestLineItem {
    type Error = StoreError;

    fn try_from(row: LineItemRow) -> Result<Self, Self::Error> {
        Self::new(
            LineItemId::new(row.id),
            RequestId::new(row.request_id),
            MenuItemId::new(row.menu_item_id),
            to_u32(row.quantity, "request_menu_item.quantity")?,
            to_u32(row.prepared, "request_menu_item.prepared")?,
            row.immediate,
        )
        .map_err(|e| StoreError::Corrupt(e.to_string()))
    }
}

#[derive(sqlx::FromRow)]
struct ShelfRow {
    id: i64,
    menu_item_id: i64,
    item_name: String,
    quantity: i32,
    version: i64,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ShelfRow> for ShelfRecord {
    type Error = StoreError;

    fn try_from(row: ShelfRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            menu_item_id: MenuItemId::new(row.menu_item_id),
            item_name: row.item_name,
            quantity: to_u32(row.quantity, "shelf.quantity")?,
            version: row.version,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MenuItemRow {
    id: i64,
    name: String,
    price: f64,
    volume: i32,
    requires_immediate_preparation: bool,
}

impl TryFrom<MenuItemRow> for MenuItem {
    type Error = StoreError;

    fn try_from(row: MenuItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: MenuItemId::new(row.id),
            name: row.name,
            price: row.price,
            volume: to_u32(row.volume, "menu_item.volume")?,
            requires_immediate_preparation: row.requires_immediate_preparation,
        })
    }
}

fn to_u32(value: i32, column: &str) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column} is negative: {value}")))
}

fn to_i32(value: u32, column: &str) -> Result<i32, StoreError> {
    i32::try_from(value)
        .map_err(|_| StoreError::Corrupt(format!("{column} out of range: {value}")))
}

fn unavailable(context: &'static str) -> impl Fn(sqlx::Error) -> StoreError {
    move |e| StoreError::Unavailable(format!("{context}: {e}"))
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

/// `PostgreSQL` implementation of every fulfillment store trait.
#[derive(Clone)]
pub struct PostgresFulfillmentStore {
    pool: PgPool,
}

impl PostgresFulfillmentStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `database_url`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the database cannot be reached.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(unavailable("Failed to connect"))?;

        tracing::info!(max_connections, "Connected to PostgreSQL");
        Ok(Self::new(pool))
    }

    /// Create or upgrade the fulfillment tables.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// The underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl RequestStore for PostgresFulfillmentStore {
    fn insert(&self, customer_id: CustomerId, status: RequestStatus) -> StoreFuture<'_, Request> {
        Box::pin(async move {
            let row: RequestRow = sqlx::query_as(
                "INSERT INTO request (customer_id, status) VALUES ($1, $2)
                 RETURNING id, customer_id, status",
            )
            .bind(customer_id.value())
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(unavailable("Failed to insert request"))?;

            row.try_into()
        })
    }

    fn find_by_id(&self, id: RequestId) -> StoreFuture<'_, Option<Request>> {
        Box::pin(async move {
            let row: Option<RequestRow> =
                sqlx::query_as("SELECT id, customer_id, status FROM request WHERE id = $1")
                    .bind(id.value())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(unavailable("Failed to load request"))?;

            row.map(Request::try_from).transpose()
        })
    }

    fn update_status(&self, id: RequestId, status: RequestStatus) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let result = sqlx::query("UPDATE request SET status = $2 WHERE id = $1")
                .bind(id.value())
                .bind(status.as_str())
                .execute(&self.pool)
                .await
                .map_err(unavailable("Failed to update request status"))?;

            Ok(result.rows_affected() > 0)
        })
    }

    fn find_by_statuses(&self, statuses: Vec<RequestStatus>) -> StoreFuture<'_, Vec<Request>> {
        Box::pin(async move {
            let names: Vec<String> = statuses.iter().map(ToString::to_string).collect();
            let rows: Vec<RequestRow> = sqlx::query_as(
                "SELECT id, customer_id, status FROM request
                 WHERE status = ANY($1) ORDER BY id",
            )
            .bind(names)
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable("Failed to list requests"))?;

            convert_all(rows)
        })
    }
}

impl LineItemStore for PostgresFulfillmentStore {
    fn insert_all(
        &self,
        request_id: RequestId,
        items: Vec<NewLineItem>,
    ) -> StoreFuture<'_, Vec<RequestLineItem>> {
        Box::pin(async move {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(unavailable("Failed to begin transaction"))?;

            let mut inserted = Vec::with_capacity(items.len());
            for item in items {
                let row: LineItemRow = sqlx::query_as(
                    "INSERT INTO request_menu_item
                         (request_id, menu_item_id, quantity, prepared, immediate)
                     VALUES ($1, $2, $3, 0, $4)
                     RETURNING id, request_id, menu_item_id, quantity, prepared, immediate",
                )
                .bind(request_id.value())
                .bind(item.menu_item_id.value())
                .bind(to_i32(item.quantity, "quantity")?)
                .bind(item.immediate)
                .fetch_one(&mut *tx)
                .await
                .map_err(unavailable("Failed to insert line item"))?;

                inserted.push(row.try_into()?);
            }

            tx.commit()
                .await
                .map_err(unavailable("Failed to commit line items"))?;
            Ok(inserted)
        })
    }

    fn find_by_request(&self, request_id: RequestId) -> StoreFuture<'_, Vec<RequestLineItem>> {
        Box::pin(async move {
            let rows: Vec<LineItemRow> = sqlx::query_as(
                "SELECT id, request_id, menu_item_id, quantity, prepared, immediate
                 FROM request_menu_item WHERE request_id = $1 ORDER BY id",
            )
            .bind(request_id.value())
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable("Failed to load line items"))?;

            convert_all(rows)
        })
    }

    fn find_by_request_and_menu_item(
        &self,
        request_id: RequestId,
        menu_item_id: MenuItemId,
    ) -> StoreFuture<'_, Option<RequestLineItem>> {
        Box::pin(async move {
            let row: Option<LineItemRow> = sqlx::query_as(
                "SELECT id, request_id, menu_item_id, quantity, prepared, immediate
                 FROM request_menu_item
                 WHERE request_id = $1 AND menu_item_id = $2
                 ORDER BY id LIMIT 1",
            )
            .bind(request_id.value())
            .bind(menu_item_id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable("Failed to load line item"))?;

            row.map(RequestLineItem::try_from).transpose()
        })
    }

    fn save(&self, item: RequestLineItem) -> StoreFuture<'_, RequestLineItem> {
        Box::pin(async move {
            let row: Option<LineItemRow> = sqlx::query_as(
                "UPDATE request_menu_item SET prepared = $2 WHERE id = $1
                 RETURNING id, request_id, menu_item_id, quantity, prepared, immediate",
            )
            .bind(item.id().value())
            .bind(to_i32(item.prepared(), "prepared")?)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable("Failed to save line item"))?;

            row.ok_or_else(|| StoreError::Corrupt(format!("line item {} does not exist", item.id())))?
                .try_into()
        })
    }
}

impl ShelfStore for PostgresFulfillmentStore {
    fn find_by_menu_item(&self, menu_item_id: MenuItemId) -> StoreFuture<'_, Option<ShelfRecord>> {
        Box::pin(async move {
            let row: Option<ShelfRow> = sqlx::query_as(
                "SELECT id, menu_item_id, item_name, quantity, version, updated_at
                 FROM shelf WHERE menu_item_id = $1",
            )
            .bind(menu_item_id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable("Failed to load shelf"))?;

            row.map(ShelfRecord::try_from).transpose()
        })
    }

    fn insert_if_absent(&self, record: NewShelfRecord) -> StoreFuture<'_, ShelfRecord> {
        Box::pin(async move {
            // The unique menu_item_id lets concurrent creators converge on one row.
            sqlx::query(
                "INSERT INTO shelf (menu_item_id, item_name, quantity, version, updated_at)
                 VALUES ($1, $2, 0, 0, $3)
                 ON CONFLICT (menu_item_id) DO NOTHING",
            )
            .bind(record.menu_item_id.value())
            .bind(&record.item_name)
            .bind(record.created_at)
            .execute(&self.pool)
            .await
            .map_err(unavailable("Failed to create shelf"))?;

            let row: ShelfRow = sqlx::query_as(
                "SELECT id, menu_item_id, item_name, quantity, version, updated_at
                 FROM shelf WHERE menu_item_id = $1",
            )
            .bind(record.menu_item_id.value())
            .fetch_one(&self.pool)
            .await
            .map_err(unavailable("Failed to load created shelf"))?;

            row.try_into()
        })
    }

    fn save(&self, record: ShelfRecord, expected_version: i64) -> StoreFuture<'_, ShelfRecord> {
        Box::pin(async move {
            let row: Option<ShelfRow> = sqlx::query_as(
                "UPDATE shelf SET quantity = $3, version = $4, updated_at = $5
                 WHERE id = $1 AND version = $2
                 RETURNING id, menu_item_id, item_name, quantity, version, updated_at",
            )
            .bind(record.id)
            .bind(expected_version)
            .bind(to_i32(record.quantity, "quantity")?)
            .bind(record.version)
            .bind(record.updated_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable("Failed to save shelf"))?;

            let Some(row) = row else {
                tracing::debug!(
                    menu_item_id = %record.menu_item_id,
                    expected_version,
                    "Shelf version moved under us"
                );
                return Err(StoreError::Conflict {
                    resource: ResourceType::ShelfItem,
                    id: record.menu_item_id.value(),
                    expected_version,
                });
            };

            row.try_into()
        })
    }
}

impl MenuCatalog for PostgresFulfillmentStore {
    fn find_by_ids(&self, ids: Vec<MenuItemId>) -> StoreFuture<'_, Vec<MenuItem>> {
        Box::pin(async move {
            let ids: Vec<i64> = ids.into_iter().map(MenuItemId::value).collect();
            let rows: Vec<MenuItemRow> = sqlx::query_as(
                "SELECT id, name, price, volume, requires_immediate_preparation
                 FROM menu_item WHERE id = ANY($1) ORDER BY id",
            )
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable("Failed to load menu items"))?;

            convert_all(rows)
        })
    }

    fn find_all(&self) -> StoreFuture<'_, Vec<MenuItem>> {
        Box::pin(async move {
            let rows: Vec<MenuItemRow> = sqlx::query_as(
                "SELECT id, name, price, volume, requires_immediate_preparation
                 FROM menu_item ORDER BY id",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable("Failed to load menu"))?;

            convert_all(rows)
        })
    }
}
