//! Allocation service providing the application's use cases.

use batch_store::{Repository, UnitOfWork, UnitOfWorkFactory};
use common::BatchReference;
use domain::{Batch, DomainError, OrderLine, allocate};

use crate::commands::{AddBatch, Allocate, ChangeBatchQuantity, Reallocate};
use crate::error::ServiceError;

/// Service for managing batches and allocations.
///
/// Every operation runs in its own unit of work opened from the factory, so
/// each call is atomic: it either commits all of its changes or none.
pub struct AllocationService<F: UnitOfWorkFactory> {
    uow_factory: F,
}

impl<F: UnitOfWorkFactory> AllocationService<F> {
    /// Creates a new allocation service over the given factory.
    pub fn new(uow_factory: F) -> Self {
        Self { uow_factory }
    }

    /// Returns a reference to the underlying unit-of-work factory.
    pub fn uow_factory(&self) -> &F {
        &self.uow_factory
    }

    /// Registers a new batch.
    #[tracing::instrument(skip(self))]
    pub async fn add_batch(&self, cmd: AddBatch) -> Result<(), ServiceError> {
        let mut uow = self.uow_factory.begin().await?;
        uow.batches()
            .add(Batch::new(cmd.reference, cmd.sku, cmd.quantity, cmd.eta))
            .await?;
        uow.commit().await?;

        metrics::counter!("batches_added_total").increment(1);
        Ok(())
    }

    /// Allocates an order line and returns the reference of the chosen batch.
    ///
    /// Fails with `InvalidSku` when no batch exists for the SKU and with
    /// `OutOfStock` when none has room; nothing is committed in either case.
    #[tracing::instrument(skip(self))]
    pub async fn allocate(&self, cmd: Allocate) -> Result<BatchReference, ServiceError> {
        let line = cmd.into_line();
        let outcome = self.allocate_line(&line).await;
        record_allocation(&line, &outcome);
        outcome
    }

    async fn allocate_line(&self, line: &OrderLine) -> Result<BatchReference, ServiceError> {
        validate_quantity(line)?;

        let mut uow = self.uow_factory.begin().await?;
        let batches = uow.batches().for_sku(&line.sku).await?;
        if batches.is_empty() {
            return Err(ServiceError::InvalidSku(line.sku.clone()));
        }
        let reference = allocate(line, batches)?;
        uow.commit().await?;

        Ok(reference)
    }

    /// Corrects a batch's purchased quantity.
    ///
    /// If the batch is now over-allocated, lines are deallocated one at a
    /// time until it is not. The deallocated lines are returned so the caller
    /// can allocate them elsewhere; they are not reallocated here.
    #[tracing::instrument(skip(self))]
    pub async fn change_batch_quantity(
        &self,
        cmd: ChangeBatchQuantity,
    ) -> Result<Vec<OrderLine>, ServiceError> {
        let mut uow = self.uow_factory.begin().await?;
        let batch = uow.batches().get(&cmd.reference).await?;
        batch.change_purchased_quantity(cmd.quantity);

        let mut deallocated = Vec::new();
        while batch.available_quantity() < 0 {
            deallocated.push(batch.deallocate_one()?);
        }
        uow.commit().await?;

        metrics::counter!("batch_quantity_changes_total").increment(1);
        metrics::counter!("deallocations_total").increment(deallocated.len() as u64);
        if !deallocated.is_empty() {
            tracing::info!(
                batch = %cmd.reference,
                count = deallocated.len(),
                "order lines deallocated after quantity change"
            );
        }
        Ok(deallocated)
    }

    /// Moves an order line to the batch the allocation policy now prefers.
    ///
    /// Deallocating the line and allocating it again happen in one unit of
    /// work: if the allocation fails the line stays where it was.
    #[tracing::instrument(skip(self))]
    pub async fn reallocate(&self, cmd: Reallocate) -> Result<BatchReference, ServiceError> {
        let line = cmd.into_line();
        let outcome = self.reallocate_line(&line).await;
        record_allocation(&line, &outcome);
        outcome
    }

    async fn reallocate_line(&self, line: &OrderLine) -> Result<BatchReference, ServiceError> {
        validate_quantity(line)?;

        let mut uow = self.uow_factory.begin().await?;
        let mut batches = uow.batches().for_sku(&line.sku).await?;
        if batches.is_empty() {
            return Err(ServiceError::InvalidSku(line.sku.clone()));
        }
        for batch in batches.iter_mut() {
            if batch.deallocate(line) {
                metrics::counter!("deallocations_total").increment(1);
                tracing::debug!(
                    batch = %batch.reference(),
                    "order line released for reallocation"
                );
            }
        }
        let reference = allocate(line, batches)?;
        uow.commit().await?;

        Ok(reference)
    }

    /// Returns a snapshot of a batch without changing anything.
    #[tracing::instrument(skip(self))]
    pub async fn get_batch(&self, reference: &BatchReference) -> Result<Batch, ServiceError> {
        let mut uow = self.uow_factory.begin().await?;
        let batch = uow.batches().get(reference).await?.clone();
        uow.close().await?;
        Ok(batch)
    }
}

fn validate_quantity(line: &OrderLine) -> Result<(), DomainError> {
    if line.quantity == 0 {
        return Err(DomainError::InvalidQuantity {
            quantity: line.quantity,
        });
    }
    Ok(())
}

fn record_allocation(line: &OrderLine, outcome: &Result<BatchReference, ServiceError>) {
    match outcome {
        Ok(reference) => {
            metrics::counter!("allocations_total").increment(1);
            tracing::info!(
                order_id = %line.order_id,
                sku = %line.sku,
                batch = %reference,
                "order line allocated"
            );
        }
        Err(err) => {
            metrics::counter!("allocation_failures_total", "reason" => err.reason()).increment(1);
            tracing::info!(
                order_id = %line.order_id,
                sku = %line.sku,
                error = %err,
                "allocation failed"
            );
        }
    }
}
