//! Order line value object.

use common::{OrderId, Sku};
use serde::{Deserialize, Serialize};

/// A request to allocate some quantity of a SKU to a customer order.
///
/// Order lines are values: two lines are the same line iff order id, SKU and
/// quantity all match. They are never stored on their own, only as members
/// of a batch's allocation set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderLine {
    /// The order this line belongs to.
    pub order_id: OrderId,

    /// The product being ordered.
    pub sku: Sku,

    /// Units requested.
    pub quantity: u32,
}

impl OrderLine {
    /// Creates a new order line.
    pub fn new(order_id: impl Into<OrderId>, sku: impl Into<Sku>, quantity: u32) -> Self {
        Self {
            order_id: order_id.into(),
            sku: sku.into(),
            quantity,
        }
    }

    /// Returns the requested quantity widened for quantity arithmetic.
    pub fn quantity_i64(&self) -> i64 {
        i64::from(self.quantity)
    }
}
