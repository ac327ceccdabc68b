use common::{BatchReference, OrderId, Sku};
use thiserror::Error;

use crate::{UowState, Version};

/// Errors that can occur when reading or writing batches.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No batch with the given reference exists.
    #[error("Batch not found: {0}")]
    BatchNotFound(BatchReference),

    /// A batch with the given reference already exists.
    #[error("Batch already exists: {0}")]
    DuplicateBatch(BatchReference),

    /// The order line is already allocated to another batch.
    #[error("Order line {order_id}/{sku} is already allocated to another batch")]
    LineAlreadyAllocated { order_id: OrderId, sku: Sku },

    /// The batch was changed by another unit of work after this one read it.
    #[error("Concurrency conflict for batch {reference}: expected version {expected}")]
    ConcurrencyConflict {
        reference: BatchReference,
        expected: Version,
    },

    /// The unit of work has already been committed or rolled back.
    #[error("Unit of work is not open (state: {state})")]
    NotOpen { state: UowState },

    /// The storage backend refused the operation.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Returns true if retrying the whole operation in a fresh unit of work
    /// may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::ConcurrencyConflict { .. } | StoreError::LineAlreadyAllocated { .. }
        )
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
