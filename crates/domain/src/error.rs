//! Domain error types.

use common::{BatchReference, Sku};
use thiserror::Error;

/// Errors raised by the allocation domain model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// No candidate batch has room for the order line.
    #[error("Out of stock for sku {sku}")]
    OutOfStock { sku: Sku },

    /// A batch was asked to give up a line but holds none.
    #[error("Batch {reference} has no allocated order lines")]
    EmptyAllocation { reference: BatchReference },

    /// Order lines must request at least one unit.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },
}
