//! # Fulfillment Core
//!
//! Domain types, status rules and collaborator traits for restaurant request
//! fulfillment.
//!
//! This crate is free of I/O. It provides:
//!
//! - **Status model**: [`RequestStatus`](status::RequestStatus) and
//!   [`PackingStatus`](status::PackingStatus) with their transition rules
//! - **Domain model**: requests, line items, menu items and shelf records
//! - **Read model**: [`build_view`](view::build_view), the single authority for
//!   deriving a request's status from its counts
//! - **Errors**: [`FulfillmentError`](error::FulfillmentError) and the
//!   [`ExecutionResult`](command::ExecutionResult) envelope
//! - **Messaging**: the [`EventBus`](event_bus::EventBus) trait and the wire
//!   messages exchanged over it
//! - **Persistence seams**: dyn-compatible store traits in [`store`]
//!
//! ## Example
//!
//! ```
//! use fulfillment_core::status::{compute_status, RequestStatus};
//!
//! assert_eq!(compute_status(0, 3).unwrap(), RequestStatus::New);
//! assert_eq!(compute_status(1, 3).unwrap(), RequestStatus::InProgress);
//! assert_eq!(compute_status(3, 3).unwrap(), RequestStatus::ReadyToCollect);
//! assert!(compute_status(4, 3).is_err());
//! ```

pub mod command;
pub mod error;
pub mod event;
pub mod event_bus;
pub mod model;
pub mod status;
pub mod store;
pub mod view;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use command::{Command, ExecutionResult};
pub use error::{FulfillmentError, ResourceType, StoreError};

/// Environment module - injected dependencies abstracted behind traits
///
/// All time lookups go through [`Clock`](environment::Clock) so tests can pin
/// the current instant.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use fulfillment_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let _now = clock.now();
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
