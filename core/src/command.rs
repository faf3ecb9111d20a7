//! Uniform execution envelope for state-mutating operations.
//!
//! Every command resolves to an [`ExecutionResult`], so callers branch on a
//! single shape regardless of which operation they ran.
//!
//! # Example
//!
//! ```
//! use fulfillment_core::command::{Command, ExecutionResult};
//! use std::future::Future;
//! use std::pin::Pin;
//!
//! struct Double;
//!
//! impl Command for Double {
//!     type Input = u32;
//!     type Output = u32;
//!
//!     fn execute(
//!         &self,
//!         input: u32,
//!     ) -> Pin<Box<dyn Future<Output = ExecutionResult<u32>> + Send + '_>> {
//!         Box::pin(async move { Ok(input * 2) })
//!     }
//! }
//! ```

use crate::error::FulfillmentError;
use std::future::Future;
use std::pin::Pin;

/// Success value or [`FulfillmentError`].
pub type ExecutionResult<T> = Result<T, FulfillmentError>;

/// An operation that mutates fulfillment state.
///
/// Returns a boxed future so commands can be held as trait objects
/// (`Arc<dyn Command<Input = _, Output = _>>`).
pub trait Command: Send + Sync {
    /// Input accepted by the command.
    type Input: Send + 'static;
    /// Value produced on success.
    type Output: Send + 'static;

    /// Run the command.
    fn execute(
        &self,
        input: Self::Input,
    ) -> Pin<Box<dyn Future<Output = ExecutionResult<Self::Output>> + Send + '_>>;
}
