//! Shelf Reservation Engine.
//!
//! Grants a line item as many units as the shelf can spare and asks the
//! kitchen for the rest.
//!
//! # Concurrency
//!
//! The shelf record is the only row shared between requests. Every write is
//! conditional on the version that was read; a losing writer re-reads the
//! shelf and decides again from the fresh quantity, backing off between
//! attempts. Once retries run out the call fails with
//! [`FulfillmentError::Conflict`], which callers may retry.
//!
//! # Side effects
//!
//! Per call: one logical shelf read, one logical shelf write and at most one
//! kitchen message. Immediate items touch neither the shelf nor the kitchen.

use crate::kitchen::KitchenRequestPublisher;
use fulfillment_core::environment::Clock;
use fulfillment_core::model::{
    MenuItemId, NewShelfRecord, RequestLineItem, ReservationOutcome, ShelfRecord,
};
use fulfillment_core::store::{MenuCatalog, ShelfStore};
use fulfillment_core::{ExecutionResult, FulfillmentError, StoreError};
use fulfillment_runtime::metrics::ReservationMetrics;
use fulfillment_runtime::{RetryPolicy, retry_with_predicate};
use std::sync::Arc;

/// Outcome label recorded for items prepared on demand.
const IMMEDIATE_OUTCOME: &str = "IMMEDIATE";

/// What to do with a shelf holding `on_shelf` units for `remaining` requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Decision {
    left_on_shelf: u32,
    outcome: ReservationOutcome,
    shortfall: u32,
}

fn decide(on_shelf: u32, remaining: u32) -> Decision {
    if on_shelf < remaining {
        Decision {
            left_on_shelf: 0,
            outcome: ReservationOutcome::requested(on_shelf),
            shortfall: remaining - on_shelf,
        }
    } else {
        Decision {
            left_on_shelf: on_shelf - remaining,
            outcome: ReservationOutcome::ready(remaining),
            shortfall: 0,
        }
    }
}

/// Reserves shelf stock for line items.
pub struct ShelfReservationEngine {
    shelves: Arc<dyn ShelfStore>,
    menu: Arc<dyn MenuCatalog>,
    kitchen: KitchenRequestPublisher,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl ShelfReservationEngine {
    /// Create an engine.
    #[must_use]
    pub fn new(
        shelves: Arc<dyn ShelfStore>,
        menu: Arc<dyn MenuCatalog>,
        kitchen: KitchenRequestPublisher,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            shelves,
            menu,
            kitchen,
            clock,
            retry,
        }
    }

    /// Reserve stock for the outstanding units of `item`.
    ///
    /// # Errors
    ///
    /// - [`FulfillmentError::InvalidArgument`] if nothing is outstanding
    /// - [`FulfillmentError::Conflict`] if concurrent writers kept winning
    /// - [`FulfillmentError::Transient`] on store failures
    #[tracing::instrument(skip(self, item), fields(line_item_id = %item.id(), menu_item_id = %item.menu_item_id()))]
    pub async fn reserve(&self, item: &RequestLineItem) -> ExecutionResult<ReservationOutcome> {
        let remaining = item.remaining();
        if remaining == 0 {
            return Err(FulfillmentError::InvalidArgument(format!(
                "line item {} has nothing left to reserve",
                item.id()
            )));
        }

        if item.immediate() {
            ReservationMetrics::record_outcome(IMMEDIATE_OUTCOME);
            tracing::debug!(remaining, "Immediate item granted without shelf stock");
            return Ok(ReservationOutcome::ready(remaining));
        }

        let menu_item_id = item.menu_item_id();
        let decision = retry_with_predicate(
            &self.retry,
            || self.attempt(menu_item_id, remaining),
            |e| matches!(e, FulfillmentError::Conflict { .. }),
        )
        .await
        .map_err(|e| match e {
            FulfillmentError::Conflict { menu_item_id, .. } => FulfillmentError::Conflict {
                menu_item_id,
                attempts: self.retry.max_retries + 1,
            },
            other => other,
        })?;

        if decision.shortfall > 0 {
            match self.kitchen.request(menu_item_id, decision.shortfall).await {
                Ok(()) => ReservationMetrics::record_kitchen_request(),
                Err(e) => {
                    ReservationMetrics::record_kitchen_failure();
                    tracing::warn!(
                        shortfall = decision.shortfall,
                        error = %e,
                        "Failed to request replenishment from kitchen"
                    );
                }
            }
        }

        ReservationMetrics::record_outcome(decision.outcome.packing_status.as_str());
        tracing::debug!(
            remaining,
            granted = decision.outcome.items_granted,
            left_on_shelf = decision.left_on_shelf,
            "Shelf reservation decided"
        );
        Ok(decision.outcome)
    }

    /// One read-decide-write cycle against the current shelf record.
    async fn attempt(&self, menu_item_id: MenuItemId, remaining: u32) -> ExecutionResult<Decision> {
        let shelf = self.load_or_create(menu_item_id).await?;
        let decision = decide(shelf.quantity, remaining);
        let updated = shelf.with_quantity(decision.left_on_shelf, self.clock.now());

        match self.shelves.save(updated, shelf.version).await {
            Ok(_) => Ok(decision),
            Err(StoreError::Conflict { .. }) => {
                ReservationMetrics::record_conflict();
                Err(FulfillmentError::Conflict {
                    menu_item_id,
                    attempts: 1,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn load_or_create(&self, menu_item_id: MenuItemId) -> ExecutionResult<ShelfRecord> {
        if let Some(shelf) = self.shelves.find_by_menu_item(menu_item_id).await? {
            return Ok(shelf);
        }

        let item_name = self
            .menu
            .find_by_ids(vec![menu_item_id])
            .await?
            .into_iter()
            .next()
            .map(|item| item.name)
            .unwrap_or_default();

        tracing::info!(menu_item_id = %menu_item_id, "Creating empty shelf record");
        let shelf = self
            .shelves
            .insert_if_absent(NewShelfRecord {
                menu_item_id,
                item_name,
                created_at: self.clock.now(),
            })
            .await?;
        Ok(shelf)
    }
}
