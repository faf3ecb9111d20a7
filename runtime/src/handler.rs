//! Event handler trait.
//!
//! An [`EventHandler`] receives each [`SerializedEvent`] an
//! [`EventConsumer`](crate::consumer::EventConsumer) pulls from the bus. It
//! decodes the payload into its own message type and acts on it.
//!
//! # Example
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//!
//! struct PackOnShelfEvent { packing: Arc<PackingCommand> }
//!
//! #[async_trait]
//! impl EventHandler for PackOnShelfEvent {
//!     async fn handle(&self, event: &SerializedEvent) -> Result<(), HandlerError> {
//!         let shelf_event: ShelfEvent = event.decode()?;
//!         self.packing.pack(shelf_event.request_id).await?;
//!         Ok(())
//!     }
//! }
//! ```

use async_trait::async_trait;
use fulfillment_core::event::SerializedEvent;

/// Error returned by a handler. Logged by the consumer; never stops it.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Handler for events delivered by an [`EventConsumer`](crate::consumer::EventConsumer).
///
/// Implementors must be `Send + Sync + 'static` because handlers are shared
/// across async tasks.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Handle one event.
    ///
    /// # Errors
    ///
    /// Common error cases:
    /// - Deserialization failure (malformed payload)
    /// - Business rule failures
    /// - Infrastructure failures (database, network)
    async fn handle(&self, event: &SerializedEvent) -> Result<(), HandlerError>;
}
