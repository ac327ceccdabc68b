//! Allocation domain model: order lines, batches and the allocation policy.

mod allocation;
mod batch;
mod order_line;

pub use allocation::allocate;
pub use batch::Batch;
pub use order_line::OrderLine;
