//! Allocation policy.

use common::BatchReference;

use crate::error::DomainError;

use super::{Batch, OrderLine};

/// Allocates `line` to the most preferred batch that can take it.
///
/// Candidates are tried in [`Batch::allocation_order`]: in-stock batches
/// first, then shipments by ascending ETA. The sort is stable, so batches
/// with equal ETAs keep the order they were supplied in. The first batch
/// that accepts the line records the allocation and its reference is
/// returned.
///
/// If one of the candidates already holds `line`, that batch's reference is
/// returned and nothing changes, so a line is never booked into two batches.
///
/// # Errors
///
/// Returns [`DomainError::OutOfStock`] if no candidate has room for the line.
pub fn allocate<'a, I>(line: &OrderLine, batches: I) -> Result<BatchReference, DomainError>
where
    I: IntoIterator<Item = &'a mut Batch>,
{
    let mut candidates: Vec<&mut Batch> = batches.into_iter().collect();

    if let Some(holder) = candidates.iter().find(|batch| batch.is_allocated(line)) {
        tracing::debug!(
            order_id = %line.order_id,
            batch = %holder.reference(),
            "order line already allocated"
        );
        return Ok(holder.reference().clone());
    }

    candidates.sort_by(|a, b| a.allocation_order(b));

    for batch in candidates {
        if batch.allocate(line) {
            tracing::debug!(
                order_id = %line.order_id,
                sku = %line.sku,
                quantity = line.quantity,
                batch = %batch.reference(),
                "order line allocated"
            );
            return Ok(batch.reference().clone());
        }
    }

    Err(DomainError::OutOfStock {
        sku: line.sku.clone(),
    })
}
