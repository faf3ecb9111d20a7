//! Error taxonomy for fulfillment operations.
//!
//! Every state-mutating operation returns [`FulfillmentError`] on failure.
//! Store implementations report [`StoreError`], which converts into
//! [`FulfillmentError`] with `?`.

use crate::event::EventError;
use crate::event_bus::EventBusError;
use crate::model::MenuItemId;
use std::fmt;
use thiserror::Error;

/// Kind of entity a [`FulfillmentError::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    /// A menu catalog entry
    MenuItem,
    /// A customer request
    Request,
    /// A request line item
    LineItem,
    /// A shelf record
    ShelfItem,
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MenuItem => "menu item",
            Self::Request => "request",
            Self::LineItem => "line item",
            Self::ShelfItem => "shelf item",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by fulfillment operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FulfillmentError {
    /// Caller supplied input that can never succeed.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A referenced entity does not exist.
    #[error("{resource} {id} not found")]
    NotFound {
        /// Kind of the missing entity
        resource: ResourceType,
        /// Identifier that was looked up
        id: i64,
    },

    /// Internal consistency rule broken; always a bug.
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    /// Storage or channel I/O failure. Retrying the operation is safe.
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Optimistic concurrency retries on a shelf record were exhausted.
    #[error("Concurrent updates on shelf for menu item {menu_item_id} (gave up after {attempts} attempts)")]
    Conflict {
        /// Menu item whose shelf record kept changing
        menu_item_id: MenuItemId,
        /// Number of attempts made
        attempts: usize,
    },
}

impl FulfillmentError {
    /// Shorthand for a [`FulfillmentError::NotFound`].
    #[must_use]
    pub const fn not_found(resource: ResourceType, id: i64) -> Self {
        Self::NotFound { resource, id }
    }

    /// Whether re-running the failed operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Conflict { .. })
    }
}

/// Errors reported by store implementations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store could not be reached or the query failed.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A conditional write lost against a concurrent writer.
    #[error("Version conflict on {resource} {id}: expected version {expected_version}")]
    Conflict {
        /// Kind of the contended entity
        resource: ResourceType,
        /// Identifier of the contended entity
        id: i64,
        /// Version the writer read before writing
        expected_version: i64,
    },

    /// Stored data could not be mapped back into the domain model.
    #[error("Corrupt data: {0}")]
    Corrupt(String),
}

impl From<StoreError> for FulfillmentError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Unavailable(reason) => Self::Transient(reason),
            StoreError::Conflict { .. } => Self::Transient(error.to_string()),
            StoreError::Corrupt(reason) => Self::InvariantViolation(reason),
        }
    }
}

impl From<EventBusError> for FulfillmentError {
    fn from(error: EventBusError) -> Self {
        Self::Transient(error.to_string())
    }
}

impl From<EventError> for FulfillmentError {
    fn from(error: EventError) -> Self {
        Self::InvalidArgument(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(FulfillmentError::Transient("db down".into()).is_retryable());
        assert!(
            FulfillmentError::Conflict {
                menu_item_id: MenuItemId::new(1),
                attempts: 3
            }
            .is_retryable()
        );
        assert!(!FulfillmentError::InvalidArgument("zero".into()).is_retryable());
        assert!(!FulfillmentError::InvariantViolation("oops".into()).is_retryable());
        assert!(!FulfillmentError::not_found(ResourceType::Request, 7).is_retryable());
    }

    #[test]
    fn store_errors_map_onto_taxonomy() {
        let unavailable: FulfillmentError = StoreError::Unavailable("timeout".into()).into();
        assert!(matches!(unavailable, FulfillmentError::Transient(_)));

        let corrupt: FulfillmentError = StoreError::Corrupt("bad status".into()).into();
        assert!(matches!(corrupt, FulfillmentError::InvariantViolation(_)));
    }

    #[test]
    fn not_found_display_names_resource() {
        let error = FulfillmentError::not_found(ResourceType::MenuItem, 42);
        assert_eq!(error.to_string(), "menu item 42 not found");
    }
}
