//! Batch persistence behind a unit-of-work boundary.
//!
//! [`UnitOfWorkFactory::begin`] opens a scope; the scope's [`Repository`]
//! hands out batches that are tracked until [`UnitOfWork::commit`] writes
//! them back or the scope is rolled back. Two backends are provided: an
//! in-memory store for tests and a PostgreSQL store.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod state;
pub mod store;
pub mod tracking;
pub mod version;

pub use error::{Result, StoreError};
pub use memory::{InMemoryBatchRepository, InMemoryStore, InMemoryUnitOfWork};
pub use postgres::{PostgresBatchRepository, PostgresStore, PostgresUnitOfWork};
pub use state::UowState;
pub use store::{Repository, UnitOfWork, UnitOfWorkFactory};
pub use version::Version;
