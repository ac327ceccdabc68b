//! Batch entity.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::NaiveDate;
use common::{BatchReference, Sku};

use crate::error::DomainError;

use super::OrderLine;

/// A consignment of stock for a single SKU.
///
/// A batch without an ETA is physically in stock; a batch with an ETA is an
/// incoming shipment. Batches are entities: two batches are equal iff they
/// share a reference, regardless of their quantities or allocations.
#[derive(Debug, Clone)]
pub struct Batch {
    reference: BatchReference,
    sku: Sku,
    purchased_quantity: u32,
    eta: Option<NaiveDate>,
    allocations: BTreeSet<OrderLine>,
}

impl Batch {
    /// Creates a new batch with no allocations.
    pub fn new(
        reference: impl Into<BatchReference>,
        sku: impl Into<Sku>,
        purchased_quantity: u32,
        eta: Option<NaiveDate>,
    ) -> Self {
        Self {
            reference: reference.into(),
            sku: sku.into(),
            purchased_quantity,
            eta,
            allocations: BTreeSet::new(),
        }
    }

    /// Rebuilds a batch from stored state.
    ///
    /// Used by storage backends; the allocations are taken as-is, without
    /// re-checking SKU or capacity.
    pub fn restore(
        reference: BatchReference,
        sku: Sku,
        purchased_quantity: u32,
        eta: Option<NaiveDate>,
        allocations: impl IntoIterator<Item = OrderLine>,
    ) -> Self {
        Self {
            reference,
            sku,
            purchased_quantity,
            eta,
            allocations: allocations.into_iter().collect(),
        }
    }

    pub fn reference(&self) -> &BatchReference {
        &self.reference
    }

    pub fn sku(&self) -> &Sku {
        &self.sku
    }

    pub fn eta(&self) -> Option<NaiveDate> {
        self.eta
    }

    pub fn purchased_quantity(&self) -> u32 {
        self.purchased_quantity
    }

    /// Returns the order lines currently allocated to this batch.
    pub fn allocations(&self) -> &BTreeSet<OrderLine> {
        &self.allocations
    }

    /// Returns true if `line` is allocated to this batch.
    pub fn is_allocated(&self, line: &OrderLine) -> bool {
        self.allocations.contains(line)
    }

    /// Total quantity of all allocated lines.
    pub fn allocated_quantity(&self) -> i64 {
        self.allocations.iter().map(OrderLine::quantity_i64).sum()
    }

    /// Purchased minus allocated quantity.
    ///
    /// Negative only between a quantity reduction and the deallocations that
    /// follow it.
    pub fn available_quantity(&self) -> i64 {
        i64::from(self.purchased_quantity) - self.allocated_quantity()
    }

    /// Returns true if `line` is for this batch's SKU and fits in the
    /// remaining quantity.
    pub fn can_allocate(&self, line: &OrderLine) -> bool {
        self.sku == line.sku && self.available_quantity() >= line.quantity_i64()
    }

    /// Allocates `line` to this batch if it can.
    ///
    /// Returns true iff [`Batch::can_allocate`] holds for `line`. Allocating
    /// a line this batch already holds books it only once.
    pub fn allocate(&mut self, line: &OrderLine) -> bool {
        if !self.can_allocate(line) {
            return false;
        }
        self.allocations.insert(line.clone());
        true
    }

    /// Removes `line` from this batch. Returns false if it was not allocated.
    pub fn deallocate(&mut self, line: &OrderLine) -> bool {
        self.allocations.remove(line)
    }

    /// Removes and returns one allocated line.
    ///
    /// Lines are taken in allocation-set order, so repeated calls are
    /// deterministic for a given set.
    pub fn deallocate_one(&mut self) -> Result<OrderLine, DomainError> {
        self.allocations
            .pop_first()
            .ok_or_else(|| DomainError::EmptyAllocation {
                reference: self.reference.clone(),
            })
    }

    /// Sets the purchased quantity without touching allocations.
    ///
    /// Callers reducing the quantity must deallocate lines until
    /// [`available_quantity`](Self::available_quantity) is no longer negative.
    pub fn change_purchased_quantity(&mut self, quantity: u32) {
        self.purchased_quantity = quantity;
    }

    /// Compares two batches by allocation preference.
    ///
    /// In-stock batches (no ETA) come first, then shipments by ascending ETA.
    pub fn allocation_order(&self, other: &Batch) -> Ordering {
        // Option orders None before Some, which is exactly in-stock first.
        self.eta.cmp(&other.eta)
    }
}

impl PartialEq for Batch {
    fn eq(&self, other: &Self) -> bool {
        self.reference == other.reference
    }
}

impl Eq for Batch {}

impl std::hash::Hash for Batch {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.reference.hash(state);
    }
}
