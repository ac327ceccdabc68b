//! Shared identifier types used across the allocation crates.

pub mod types;

pub use types::{BatchReference, OrderId, Sku};
