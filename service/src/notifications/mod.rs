//! Status-change notification pipeline.
//!
//! ```text
//! packing ──► StatusChangePublisher ──► status topic
//!                                          │
//!                 StatusChangeListener ◄───┘ (EventConsumer)
//!                          │
//!                          ▼
//!                  NotificationHub ──► StatusFeed ──► client streams
//! ```

pub mod feed;
pub mod hub;
pub mod publisher;

pub use feed::{FeedFilter, FeedStream, StatusFeed};
pub use hub::{HubSubscription, NotificationHub};
pub use publisher::StatusChangePublisher;
