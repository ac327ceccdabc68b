use batch_store::StoreError;
use common::Sku;
use domain::DomainError;
use thiserror::Error;

/// Errors returned by service operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No batch exists for the requested SKU.
    #[error("Invalid sku {0}")]
    InvalidSku(Sku),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    /// Short label used for the `reason` of failure metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            ServiceError::InvalidSku(_) => "invalid_sku",
            ServiceError::Domain(DomainError::OutOfStock { .. }) => "out_of_stock",
            ServiceError::Domain(DomainError::InvalidQuantity { .. }) => "invalid_quantity",
            ServiceError::Domain(DomainError::EmptyAllocation { .. }) => "empty_allocation",
            ServiceError::Store(err) if err.is_conflict() => "conflict",
            ServiceError::Store(StoreError::BatchNotFound(_)) => "not_found",
            ServiceError::Store(_) => "store",
        }
    }
}
