//! Request read model.
//!
//! [`build_view`] is the only place that turns persisted fragments into a
//! [`RequestView`]. Its status always agrees with
//! [`compute_status`](crate::status::compute_status) over the same counts.

use crate::error::{FulfillmentError, ResourceType};
use crate::model::{LineItemView, MenuItem, Request, RequestLineItem, RequestView};
use crate::status::{RequestStatus, compute_status};
use std::collections::HashMap;

/// Join a request with its line items and menu items.
///
/// Line items keep the order they were given in. A request already marked
/// `COLLECTED` keeps that status; otherwise it is derived from the totals.
///
/// # Errors
///
/// - [`FulfillmentError::NotFound`] if a line item references a menu item
///   absent from `menu_items`
/// - [`FulfillmentError::InvariantViolation`] if the prepared total exceeds
///   the required total
pub fn build_view(
    request: &Request,
    line_items: &[RequestLineItem],
    menu_items: &[MenuItem],
) -> Result<RequestView, FulfillmentError> {
    let names: HashMap<_, _> = menu_items
        .iter()
        .map(|item| (item.id, item.name.as_str()))
        .collect();

    let mut views = Vec::with_capacity(line_items.len());
    let mut prepared_total = 0u64;
    let mut required_total = 0u64;

    for item in line_items {
        let name = names.get(&item.menu_item_id()).ok_or_else(|| {
            FulfillmentError::not_found(ResourceType::MenuItem, item.menu_item_id().value())
        })?;

        prepared_total += u64::from(item.prepared());
        required_total += u64::from(item.quantity());

        views.push(LineItemView {
            line_item_id: item.id(),
            menu_item_id: item.menu_item_id(),
            menu_item_name: (*name).to_string(),
            quantity: item.quantity(),
            prepared: item.prepared(),
            immediate: item.immediate(),
        });
    }

    let derived = compute_status(prepared_total, required_total)?;
    let status = if request.status == RequestStatus::Collected {
        RequestStatus::Collected
    } else {
        derived
    };

    Ok(RequestView {
        request_id: request.id,
        customer_id: request.customer_id,
        line_items: views,
        prepared_total,
        required_total,
        status,
    })
}
