//! Commands accepted by the service layer.

use chrono::NaiveDate;
use common::{BatchReference, OrderId, Sku};
use domain::OrderLine;

/// Command to register a new batch of stock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddBatch {
    pub reference: BatchReference,
    pub sku: Sku,
    /// Units purchased.
    pub quantity: u32,
    /// Expected arrival; `None` for stock already in the warehouse.
    pub eta: Option<NaiveDate>,
}

impl AddBatch {
    /// Creates a new AddBatch command.
    pub fn new(
        reference: impl Into<BatchReference>,
        sku: impl Into<Sku>,
        quantity: u32,
        eta: Option<NaiveDate>,
    ) -> Self {
        Self {
            reference: reference.into(),
            sku: sku.into(),
            quantity,
            eta,
        }
    }
}

/// Command to allocate an order line to the best available batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocate {
    pub order_id: OrderId,
    pub sku: Sku,
    pub quantity: u32,
}

impl Allocate {
    /// Creates a new Allocate command.
    pub fn new(order_id: impl Into<OrderId>, sku: impl Into<Sku>, quantity: u32) -> Self {
        Self {
            order_id: order_id.into(),
            sku: sku.into(),
            quantity,
        }
    }

    /// Returns the order line this command allocates.
    pub fn into_line(self) -> OrderLine {
        OrderLine::new(self.order_id, self.sku, self.quantity)
    }
}

/// Command to correct the purchased quantity of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeBatchQuantity {
    pub reference: BatchReference,
    /// The corrected purchased quantity.
    pub quantity: u32,
}

impl ChangeBatchQuantity {
    /// Creates a new ChangeBatchQuantity command.
    pub fn new(reference: impl Into<BatchReference>, quantity: u32) -> Self {
        Self {
            reference: reference.into(),
            quantity,
        }
    }
}

/// Command to move an order line to the currently best batch.
///
/// The line is taken out of whichever batch holds it and allocated again in
/// the same unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reallocate {
    pub order_id: OrderId,
    pub sku: Sku,
    pub quantity: u32,
}

impl Reallocate {
    /// Creates a new Reallocate command.
    pub fn new(order_id: impl Into<OrderId>, sku: impl Into<Sku>, quantity: u32) -> Self {
        Self {
            order_id: order_id.into(),
            sku: sku.into(),
            quantity,
        }
    }

    pub fn into_line(self) -> OrderLine {
        OrderLine::new(self.order_id, self.sku, self.quantity)
    }
}
