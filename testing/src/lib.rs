//! # Fulfillment Testing
//!
//! Testing utilities for fulfillment services.
//!
//! This crate provides:
//! - [`FixedClock`]: deterministic time
//! - [`InMemoryEventBus`]: broadcast-backed event bus that records what was published
//! - [`InMemoryFulfillmentStore`]: every store trait over shared maps, with
//!   fault and conflict injection
//! - [`properties`]: proptest strategies for domain types
//!
//! ## Example
//!
//! ```
//! use fulfillment_core::model::{CustomerId, MenuItemId, NewLineItem};
//! use fulfillment_testing::{InMemoryFulfillmentStore, menu_item};
//!
//! let store = InMemoryFulfillmentStore::new();
//! store.add_menu_item(menu_item(1, "Pho", false));
//! store.set_shelf_quantity(MenuItemId::new(1), 4);
//!
//! let (request, items) = store.seed_request(
//!     CustomerId::new(9),
//!     vec![NewLineItem { menu_item_id: MenuItemId::new(1), quantity: 2, immediate: false }],
//! );
//! assert_eq!(items[0].request_id(), request.id);
//! assert_eq!(store.shelf_quantity(MenuItemId::new(1)), Some(4));
//! ```

pub mod event_bus;
pub mod store;

use chrono::{DateTime, Utc};
use fulfillment_core::environment::Clock;

/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use fulfillment_testing::mocks::FixedClock;
    /// use fulfillment_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap_or_default())
    }
}

/// Proptest strategies for domain types.
pub mod properties {
    use fulfillment_core::model::{LineItemId, MenuItemId, RequestId, RequestLineItem};
    use proptest::prelude::*;

    /// An unfinished, shelf-backed line item with `quantity` up to `max_quantity`.
    pub fn unfinished_line_item(max_quantity: u32) -> impl Strategy<Value = RequestLineItem> {
        (1..=max_quantity.max(1))
            .prop_flat_map(|quantity| (Just(quantity), 0..quantity))
            .prop_filter_map("line item invariant", |(quantity, prepared)| {
                RequestLineItem::new(
                    LineItemId::new(1),
                    RequestId::new(1),
                    MenuItemId::new(1),
                    quantity,
                    prepared,
                    false,
                )
                .ok()
            })
    }
}

pub use event_bus::InMemoryEventBus;
pub use mocks::{FixedClock, test_clock};
pub use store::{InMemoryFulfillmentStore, menu_item};
