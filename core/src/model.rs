//! Domain model for requests, menu items and the shelf.

use crate::error::FulfillmentError;
use crate::status::{PackingStatus, RequestStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wrap a raw identifier.
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// The raw identifier.
            #[must_use]
            pub const fn value(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

id_newtype!(
    /// Identifier of a customer request.
    RequestId
);
id_newtype!(
    /// Identifier of a customer.
    CustomerId
);
id_newtype!(
    /// Identifier of a menu catalog entry.
    MenuItemId
);
id_newtype!(
    /// Identifier of a request line item.
    LineItemId
);

/// Menu catalog entry. Owned externally and read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    /// Catalog identifier
    pub id: MenuItemId,
    /// Display name
    pub name: String,
    /// Unit price
    pub price: f64,
    /// Packed volume of one unit
    pub volume: u32,
    /// Prepared on demand instead of drawn from the shelf
    pub requires_immediate_preparation: bool,
}

/// One requested menu item within a request.
///
/// `prepared` never exceeds `quantity`; the constructor and
/// [`with_prepared_added`](Self::with_prepared_added) enforce it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestLineItem {
    id: LineItemId,
    request_id: RequestId,
    menu_item_id: MenuItemId,
    quantity: u32,
    prepared: u32,
    immediate: bool,
}

impl RequestLineItem {
    /// Build a line item, checking `prepared <= quantity`.
    ///
    /// # Errors
    ///
    /// Returns [`FulfillmentError::InvariantViolation`] if `prepared` exceeds `quantity`.
    pub fn new(
        id: LineItemId,
        request_id: RequestId,
        menu_item_id: MenuItemId,
        quantity: u32,
        prepared: u32,
        immediate: bool,
    ) -> Result<Self, FulfillmentError> {
        if prepared > quantity {
            return Err(FulfillmentError::InvariantViolation(format!(
                "line item {id}: prepared {prepared} exceeds quantity {quantity}"
            )));
        }
        Ok(Self {
            id,
            request_id,
            menu_item_id,
            quantity,
            prepared,
            immediate,
        })
    }

    /// Line item identifier.
    #[must_use]
    pub const fn id(&self) -> LineItemId {
        self.id
    }

    /// Owning request.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Requested menu item.
    #[must_use]
    pub const fn menu_item_id(&self) -> MenuItemId {
        self.menu_item_id
    }

    /// Units requested.
    #[must_use]
    pub const fn quantity(&self) -> u32 {
        self.quantity
    }

    /// Units already packed.
    #[must_use]
    pub const fn prepared(&self) -> u32 {
        self.prepared
    }

    /// Whether the item is prepared on demand.
    #[must_use]
    pub const fn immediate(&self) -> bool {
        self.immediate
    }

    /// Units still outstanding.
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.quantity - self.prepared
    }

    /// Whether every requested unit has been packed.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.prepared == self.quantity
    }

    /// Copy of this item with `count` more units prepared.
    ///
    /// # Errors
    ///
    /// Returns [`FulfillmentError::InvariantViolation`] if the result would exceed `quantity`.
    pub fn with_prepared_added(&self, count: u32) -> Result<Self, FulfillmentError> {
        let prepared = self
            .prepared
            .checked_add(count)
            .filter(|total| *total <= self.quantity)
            .ok_or_else(|| {
                FulfillmentError::InvariantViolation(format!(
                    "line item {}: adding {count} to {} prepared exceeds quantity {}",
                    self.id, self.prepared, self.quantity
                ))
            })?;
        Ok(Self {
            prepared,
            ..self.clone()
        })
    }
}

/// Insert shape for a line item; `prepared` starts at zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLineItem {
    /// Requested menu item
    pub menu_item_id: MenuItemId,
    /// Units requested
    pub quantity: u32,
    /// Prepared on demand
    pub immediate: bool,
}

/// A customer request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Request identifier
    pub id: RequestId,
    /// Requesting customer
    pub customer_id: CustomerId,
    /// Current lifecycle state
    pub status: RequestStatus,
}

/// Line item joined with its menu item name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemView {
    /// Line item identifier
    pub line_item_id: LineItemId,
    /// Requested menu item
    pub menu_item_id: MenuItemId,
    /// Menu item display name
    pub menu_item_name: String,
    /// Units requested
    pub quantity: u32,
    /// Units packed
    pub prepared: u32,
    /// Prepared on demand
    pub immediate: bool,
}

impl LineItemView {
    /// Units still outstanding.
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.quantity.saturating_sub(self.prepared)
    }

    /// Whether every requested unit has been packed.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.prepared >= self.quantity
    }
}

/// Read model of a request, computed on demand and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestView {
    /// Request identifier
    pub request_id: RequestId,
    /// Requesting customer
    pub customer_id: CustomerId,
    /// Line items in storage order
    pub line_items: Vec<LineItemView>,
    /// Sum of prepared units
    pub prepared_total: u64,
    /// Sum of requested units
    pub required_total: u64,
    /// Derived (or terminal) status
    pub status: RequestStatus,
}

/// On-hand prepared stock of one menu item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShelfRecord {
    /// Record identifier
    pub id: i64,
    /// Stocked menu item
    pub menu_item_id: MenuItemId,
    /// Menu item name at creation time
    pub item_name: String,
    /// Units on the shelf
    pub quantity: u32,
    /// Optimistic concurrency marker, bumped on every write
    pub version: i64,
    /// Time of the last write
    pub updated_at: DateTime<Utc>,
}

impl ShelfRecord {
    /// Copy of this record with a new quantity and the next version.
    #[must_use]
    pub fn with_quantity(&self, quantity: u32, updated_at: DateTime<Utc>) -> Self {
        Self {
            quantity,
            version: self.version + 1,
            updated_at,
            ..self.clone()
        }
    }
}

/// Shape of a lazily created shelf record (quantity 0, version 0).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewShelfRecord {
    /// Stocked menu item
    pub menu_item_id: MenuItemId,
    /// Menu item name
    pub item_name: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// What a single reservation attempt yielded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationOutcome {
    /// Packing status for the item
    pub packing_status: PackingStatus,
    /// Units granted to the line item
    pub items_granted: u32,
}

impl ReservationOutcome {
    /// The request was satisfied in full.
    #[must_use]
    pub const fn ready(items_granted: u32) -> Self {
        Self {
            packing_status: PackingStatus::ReadyToCollect,
            items_granted,
        }
    }

    /// The shelf was short and the kitchen was asked for more.
    #[must_use]
    pub const fn requested(items_granted: u32) -> Self {
        Self {
            packing_status: PackingStatus::RequestedItems,
            items_granted,
        }
    }
}

/// Result of a packing pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackingActionResult {
    /// Packed request
    pub request_id: RequestId,
    /// Sum of prepared units after the pass
    pub prepared_total: u64,
    /// Sum of requested units
    pub required_total: u64,
    /// Request status after the pass
    pub status: RequestStatus,
}

impl From<&RequestView> for PackingActionResult {
    fn from(view: &RequestView) -> Self {
        Self {
            request_id: view.request_id,
            prepared_total: view.prepared_total,
            required_total: view.required_total,
            status: view.status,
        }
    }
}

/// One item of the live status feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStatusUpdate {
    /// Correlation key
    pub request_id: RequestId,
    /// Packing status carried by the triggering event
    pub packing_status: PackingStatus,
    /// Prepared units at emission time
    pub prepared_items: u64,
    /// Requested units
    pub total_items: u64,
}
