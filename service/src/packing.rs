//! Packing Orchestrator.
//!
//! A packing pass walks a request's unfinished line items in storage order,
//! reserves shelf stock for each, and commits every grant as it happens:
//! the line item's prepared count first, then the request's derived status.
//! If anything was granted, one [`StatusChangeEvent`] announces the final
//! status once the pass is over.
//!
//! Passes are idempotent with respect to committed progress. Running one
//! again with no shelf change in between grants nothing, writes no line
//! items and emits nothing.

use crate::notifications::StatusChangePublisher;
use crate::request::{RequestService, advance_status};
use crate::shelf::ShelfReservationEngine;
use fulfillment_core::event::StatusChangeEvent;
use fulfillment_core::model::{PackingActionResult, RequestId};
use fulfillment_core::status::{PackingStatus, RequestStatus, compute_status};
use fulfillment_core::store::{LineItemStore, RequestStore};
use fulfillment_core::{Command, ExecutionResult, FulfillmentError};
use fulfillment_runtime::metrics::PackingMetrics;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

/// Runs packing passes.
pub struct PackingCommand {
    requests: Arc<dyn RequestStore>,
    line_items: Arc<dyn LineItemStore>,
    views: Arc<RequestService>,
    engine: Arc<ShelfReservationEngine>,
    status_publisher: StatusChangePublisher,
}

impl PackingCommand {
    /// Create an orchestrator.
    #[must_use]
    pub fn new(
        requests: Arc<dyn RequestStore>,
        line_items: Arc<dyn LineItemStore>,
        views: Arc<RequestService>,
        engine: Arc<ShelfReservationEngine>,
        status_publisher: StatusChangePublisher,
    ) -> Self {
        Self {
            requests,
            line_items,
            views,
            engine,
            status_publisher,
        }
    }

    /// Pack as much of a request as the shelves allow.
    ///
    /// # Errors
    ///
    /// - [`FulfillmentError::NotFound`] if the request does not exist or one
    ///   of its menu items is missing from the catalog; nothing is written
    /// - any reservation or persistence error, which aborts the rest of the
    ///   pass; grants committed before it stay committed
    #[tracing::instrument(skip(self))]
    pub async fn pack(&self, request_id: RequestId) -> ExecutionResult<PackingActionResult> {
        let started = Instant::now();

        match self.run_pass(request_id).await {
            Ok(result) => {
                PackingMetrics::record_pass(started.elapsed());
                tracing::info!(
                    prepared = result.prepared_total,
                    required = result.required_total,
                    status = %result.status,
                    "Packing pass complete"
                );
                Ok(result)
            }
            Err(e) => {
                PackingMetrics::record_failure();
                if matches!(e, FulfillmentError::InvariantViolation(_)) {
                    tracing::error!(error = %e, "Packing pass hit an invariant violation");
                } else {
                    tracing::warn!(error = %e, "Packing pass aborted");
                }
                Err(e)
            }
        }
    }

    async fn run_pass(&self, request_id: RequestId) -> ExecutionResult<PackingActionResult> {
        // The view must build before any stock moves: a line whose menu item
        // left the catalog fails the pass with nothing written.
        let (request, items, view) = self.views.load(request_id).await?;
        let mut prepared = view.prepared_total;
        let required = view.required_total;

        let mut status = request.status;
        let mut granted_any = false;
        let mut requested_any = false;

        for item in items.iter().filter(|item| !item.is_finished()) {
            let outcome = self.engine.reserve(item).await?;
            if outcome.packing_status == PackingStatus::RequestedItems {
                requested_any = true;
            }
            if outcome.items_granted == 0 {
                continue;
            }

            self.line_items
                .save(item.with_prepared_added(outcome.items_granted)?)
                .await?;
            prepared += u64::from(outcome.items_granted);

            let derived = compute_status(prepared, required)?;
            status = advance_status(self.requests.as_ref(), request_id, status, derived).await?;
            granted_any = true;

            tracing::debug!(
                line_item_id = %item.id(),
                granted = outcome.items_granted,
                status = %status,
                "Line item progress committed"
            );
        }

        if granted_any {
            let packing_status = if status == RequestStatus::ReadyToCollect {
                PackingStatus::ReadyToCollect
            } else if requested_any {
                PackingStatus::RequestedItems
            } else {
                PackingStatus::InProgress
            };
            self.status_publisher
                .publish(&StatusChangeEvent {
                    request_id,
                    request_status: status,
                    packing_status,
                })
                .await;
        }

        let view = self.views.find_view(request_id).await?;
        Ok(PackingActionResult::from(&view))
    }
}

impl Command for PackingCommand {
    type Input = RequestId;
    type Output = PackingActionResult;

    fn execute(
        &self,
        input: RequestId,
    ) -> Pin<Box<dyn Future<Output = ExecutionResult<PackingActionResult>> + Send + '_>> {
        Box::pin(self.pack(input))
    }
}
