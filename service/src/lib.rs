//! # Fulfillment Service
//!
//! Turns customer requests into packed, collectable orders.
//!
//! - [`shelf::ShelfReservationEngine`]: grants shelf stock to line items and
//!   asks the kitchen for shortfalls
//! - [`packing::PackingCommand`]: walks a request's line items, commits
//!   grants and announces status changes
//! - [`creation::CreateRequestCommand`]: validates and stores new requests
//! - [`request::RequestService`]: request views and the prepared-count mutation
//! - [`notifications`]: status-change publisher, hub and live feed
//! - [`app::FulfillmentApp`]: wiring and lifecycle for the `server` binary
//!
//! ## Flow
//!
//! ```text
//! create ──► NEW_REQUEST ──► ShelfEventHandler ──► pack
//!                                                   │
//!                   ┌───────────────────────────────┤
//!                   ▼                               ▼
//!        kitchen-requests (shortfall)     request-status-changes
//!                                                   │
//!                                                   ▼
//!                                 NotificationHub ──► StatusFeed
//! ```

pub mod app;
pub mod config;
pub mod creation;
pub mod kitchen;
pub mod listeners;
pub mod notifications;
pub mod packing;
pub mod request;
pub mod shelf;

pub use app::{FulfillmentApp, Stores};
pub use config::{Config, ConfigError};
pub use creation::{CreateRequestCommand, NewRequest, RequestedItem};
pub use notifications::{FeedFilter, NotificationHub, StatusFeed};
pub use packing::PackingCommand;
pub use request::RequestService;
pub use shelf::ShelfReservationEngine;
