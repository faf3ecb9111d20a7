//! Request and packing lifecycles.
//!
//! A request moves strictly forward:
//!
//! ```text
//! NEW ──► IN_PROGRESS ──► READY_TO_COLLECT ──► COLLECTED
//!  └──────────────────────────┘
//! ```
//!
//! `COLLECTED` is set by an external collection action and is terminal.
//! Every other state is derived from line-item counts by [`compute_status`].

use crate::error::FulfillmentError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a customer request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    /// Nothing prepared yet
    New,
    /// Some, but not all, items prepared
    InProgress,
    /// Every item prepared and waiting on the shelf
    ReadyToCollect,
    /// Handed over to the customer
    Collected,
}

impl RequestStatus {
    /// Statuses of requests that still need attention.
    pub const ACTIVE: [Self; 3] = [Self::New, Self::InProgress, Self::ReadyToCollect];

    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::InProgress => "IN_PROGRESS",
            Self::ReadyToCollect => "READY_TO_COLLECT",
            Self::Collected => "COLLECTED",
        }
    }

    /// Whether a request in this state may move to `next`.
    ///
    /// Staying put is always allowed. Moves never go backwards, and
    /// `COLLECTED` is only reachable from `READY_TO_COLLECT`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (current, next) if current == next => true,
            (Self::Collected, _) => false,
            (Self::ReadyToCollect, Self::Collected) => true,
            (_, Self::Collected) => false,
            (current, next) => next > current,
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(Self::New),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "READY_TO_COLLECT" => Ok(Self::ReadyToCollect),
            "COLLECTED" => Ok(Self::Collected),
            other => Err(format!("unknown request status '{other}'")),
        }
    }
}

/// Outcome of a packing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PackingStatus {
    /// No packing attempted yet
    NotStarted,
    /// Some items packed, the rest still outstanding
    InProgress,
    /// The kitchen was asked to replenish at least one item
    RequestedItems,
    /// Everything packed
    ReadyToCollect,
}

impl PackingStatus {
    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "NOT_STARTED",
            Self::InProgress => "IN_PROGRESS",
            Self::RequestedItems => "REQUESTED_ITEMS",
            Self::ReadyToCollect => "READY_TO_COLLECT",
        }
    }
}

impl fmt::Display for PackingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derive a request's status from its prepared and required totals.
///
/// # Errors
///
/// Returns [`FulfillmentError::InvariantViolation`] when `prepared` exceeds
/// `required`, which means some item was credited twice.
pub fn compute_status(prepared: u64, required: u64) -> Result<RequestStatus, FulfillmentError> {
    use std::cmp::Ordering;

    match prepared.cmp(&required) {
        Ordering::Less if prepared == 0 => Ok(RequestStatus::New),
        Ordering::Less => Ok(RequestStatus::InProgress),
        Ordering::Equal => Ok(RequestStatus::ReadyToCollect),
        Ordering::Greater => Err(FulfillmentError::InvariantViolation(format!(
            "prepared items ({prepared}) exceed required items ({required})"
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn compute_status_table() {
        assert_eq!(compute_status(0, 3).unwrap(), RequestStatus::New);
        assert_eq!(compute_status(2, 3).unwrap(), RequestStatus::InProgress);
        assert_eq!(compute_status(3, 3).unwrap(), RequestStatus::ReadyToCollect);
        assert_eq!(compute_status(0, 0).unwrap(), RequestStatus::ReadyToCollect);
        assert!(matches!(
            compute_status(4, 3),
            Err(FulfillmentError::InvariantViolation(_))
        ));
    }

    #[test]
    fn transitions_only_move_forward() {
        use RequestStatus::{Collected, InProgress, New, ReadyToCollect};

        assert!(New.can_transition_to(New));
        assert!(New.can_transition_to(InProgress));
        assert!(New.can_transition_to(ReadyToCollect));
        assert!(InProgress.can_transition_to(ReadyToCollect));
        assert!(ReadyToCollect.can_transition_to(Collected));

        assert!(!InProgress.can_transition_to(New));
        assert!(!ReadyToCollect.can_transition_to(InProgress));
        assert!(!New.can_transition_to(Collected));
        assert!(!InProgress.can_transition_to(Collected));
        assert!(!Collected.can_transition_to(ReadyToCollect));
    }

    #[test]
    fn wire_names_round_trip_through_from_str() {
        for status in [
            RequestStatus::New,
            RequestStatus::InProgress,
            RequestStatus::ReadyToCollect,
            RequestStatus::Collected,
        ] {
            assert_eq!(status.as_str().parse::<RequestStatus>().unwrap(), status);
        }
        assert!("SHIPPED".parse::<RequestStatus>().is_err());
    }

    #[test]
    fn serde_uses_screaming_snake_case() {
        let json = serde_json::to_string(&PackingStatus::RequestedItems).unwrap();
        assert_eq!(json, "\"REQUESTED_ITEMS\"");
        let json = serde_json::to_string(&RequestStatus::ReadyToCollect).unwrap();
        assert_eq!(json, "\"READY_TO_COLLECT\"");
    }

    proptest! {
        #[test]
        fn status_is_total_below_required(required in 1u64..10_000, prepared_frac in 0u64..10_000) {
            let prepared = prepared_frac % (required + 1);
            let status = compute_status(prepared, required).unwrap();
            let expected = if prepared == 0 {
                RequestStatus::New
            } else if prepared < required {
                RequestStatus::InProgress
            } else {
                RequestStatus::ReadyToCollect
            };
            prop_assert_eq!(status, expected);
        }
    }
}
