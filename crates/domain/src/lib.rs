//! Domain layer for batch allocation.
//!
//! This crate holds the pure allocation model:
//! - [`OrderLine`] value objects describing what a customer asked for
//! - [`Batch`] entities describing stock that is in the warehouse or on its way
//! - [`allocate`], the policy choosing which batch fulfils an order line
//!
//! Nothing here performs I/O; storage and transactions live in `batch-store`.

pub mod error;
pub mod model;

pub use error::DomainError;
pub use model::{Batch, OrderLine, allocate};
