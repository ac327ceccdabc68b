//! Service layer for the allocation system.
//!
//! Each operation takes a command, opens one unit of work, drives the domain
//! model through the scope's repository and commits. Errors propagate with
//! `?`; the open scope is rolled back when it is dropped.

pub mod commands;
pub mod error;
pub mod service;

pub use commands::{AddBatch, Allocate, ChangeBatchQuantity, Reallocate};
pub use error::ServiceError;
pub use service::AllocationService;
