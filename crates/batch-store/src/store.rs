use async_trait::async_trait;
use common::{BatchReference, Sku};
use domain::Batch;

use crate::{Result, UowState};

/// Collection-like access to stored batches.
///
/// A repository is bound to one unit of work. Batches handed out by
/// [`get`](Repository::get) and [`list`](Repository::list) are the same
/// mutable objects for the whole scope, so changes made to them through the
/// domain model are picked up by [`UnitOfWork::commit`] without an explicit
/// save.
#[async_trait]
pub trait Repository: Send {
    /// Registers a new batch.
    ///
    /// The batch becomes durable only when the unit of work commits. Fails
    /// with `DuplicateBatch` if the reference is already known.
    async fn add(&mut self, batch: Batch) -> Result<()>;

    /// Returns the batch with the given reference.
    ///
    /// Fails with `BatchNotFound` if there is none.
    async fn get<'a>(&'a mut self, reference: &BatchReference) -> Result<&'a mut Batch>;

    /// Returns every known batch, including ones added in this scope.
    ///
    /// The order is not significant.
    async fn list<'a>(&'a mut self) -> Result<Vec<&'a mut Batch>>;

    /// Returns every known batch for `sku`.
    async fn for_sku<'a>(&'a mut self, sku: &Sku) -> Result<Vec<&'a mut Batch>> {
        let batches = self.list().await?;
        Ok(batches
            .into_iter()
            .filter(|batch| batch.sku() == sku)
            .collect())
    }
}

/// A transactional scope around exactly one [`Repository`].
///
/// Changes made through [`batches`](UnitOfWork::batches) are either all made
/// durable by [`commit`](UnitOfWork::commit) or all discarded. Dropping a
/// unit of work that is still open rolls it back, so an early return or `?`
/// never leaves partial changes behind.
#[async_trait]
pub trait UnitOfWork: Send {
    /// The repository type exposed by this scope.
    type Batches: Repository;

    /// Returns the scope's batch repository.
    fn batches(&mut self) -> &mut Self::Batches;

    /// Returns the current lifecycle state.
    fn state(&self) -> UowState;

    /// Makes every tracked change durable.
    ///
    /// Fails with `ConcurrencyConflict` if a batch this scope changed was
    /// modified by another scope since it was read; nothing is written in
    /// that case.
    async fn commit(&mut self) -> Result<()>;

    /// Discards every tracked change.
    async fn rollback(&mut self) -> Result<()>;

    /// Ends the scope, rolling back first if it is still open.
    async fn close(self) -> Result<()>
    where
        Self: Sized,
    {
        let mut uow = self;
        if uow.state().is_open() {
            uow.rollback().await?;
        }
        Ok(())
    }
}

/// Opens units of work against a storage backend.
///
/// The composition root builds one factory and hands it to the service
/// layer; every operation begins its own scope from it.
#[async_trait]
pub trait UnitOfWorkFactory: Send + Sync {
    /// The unit of work type produced by this factory.
    type UnitOfWork: UnitOfWork;

    /// Opens a new scope on a fresh storage session.
    async fn begin(&self) -> Result<Self::UnitOfWork>;
}
