use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{BatchReference, Sku};
use domain::{Batch, OrderLine};
use tokio::sync::RwLock;

use crate::{
    Result, StoreError, UowState, Version,
    store::{Repository, UnitOfWork, UnitOfWorkFactory},
    tracking::{Change, TrackedBatches},
};

#[derive(Debug, Clone)]
struct StoredBatch {
    batch: Batch,
    version: Version,
}

#[derive(Debug, Default)]
struct InMemoryState {
    batches: HashMap<BatchReference, StoredBatch>,
    commits: usize,
    fail_on_commit: bool,
}

/// In-memory batch store for testing.
///
/// Provides the same unit-of-work semantics as the PostgreSQL store: changes
/// are private to a scope until commit, and a commit that would overwrite a
/// batch changed by another scope fails with `ConcurrencyConflict`.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<InMemoryState>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of committed batches.
    pub async fn batch_count(&self) -> usize {
        self.state.read().await.batches.len()
    }

    /// Returns how many units of work have committed successfully.
    pub async fn commit_count(&self) -> usize {
        self.state.read().await.commits
    }

    /// Returns the committed state of a batch, bypassing any unit of work.
    pub async fn committed_batch(&self, reference: &BatchReference) -> Option<Batch> {
        self.state
            .read()
            .await
            .batches
            .get(reference)
            .map(|stored| stored.batch.clone())
    }

    /// Configures the store to reject commits, as a failing database would.
    pub async fn set_fail_on_commit(&self, fail: bool) {
        self.state.write().await.fail_on_commit = fail;
    }
}

#[async_trait]
impl UnitOfWorkFactory for InMemoryStore {
    type UnitOfWork = InMemoryUnitOfWork;

    async fn begin(&self) -> Result<InMemoryUnitOfWork> {
        tracing::debug!("unit of work opened");
        Ok(InMemoryUnitOfWork {
            batches: InMemoryBatchRepository {
                shared: Arc::clone(&self.state),
                tracked: TrackedBatches::new(),
                state: UowState::Open,
            },
        })
    }
}

/// Repository over an [`InMemoryStore`], bound to one unit of work.
pub struct InMemoryBatchRepository {
    shared: Arc<RwLock<InMemoryState>>,
    tracked: TrackedBatches,
    state: UowState,
}

impl InMemoryBatchRepository {
    fn ensure_open(&self) -> Result<()> {
        if self.state.is_open() {
            Ok(())
        } else {
            Err(StoreError::NotOpen { state: self.state })
        }
    }

    async fn load_all(&mut self) {
        let shared = self.shared.read().await;
        for stored in shared.batches.values() {
            self.tracked.load(stored.batch.clone(), stored.version);
        }
    }

    async fn write_changes(&mut self) -> Result<()> {
        let mut shared = self.shared.write().await;
        if shared.fail_on_commit {
            return Err(StoreError::Unavailable("commit rejected".to_string()));
        }

        // Stage on a copy so a failed check leaves committed state untouched.
        let mut staged = shared.batches.clone();
        for change in self.tracked.changes() {
            let reference = change.batch().reference().clone();
            match change {
                Change::Insert(batch) => {
                    if staged.contains_key(&reference) {
                        return Err(StoreError::DuplicateBatch(reference));
                    }
                    staged.insert(
                        reference,
                        StoredBatch {
                            batch: batch.clone(),
                            version: Version::first(),
                        },
                    );
                }
                Change::Update {
                    batch, expected, ..
                } => {
                    let current = staged.get(&reference).map(|stored| stored.version);
                    if current != Some(expected) {
                        return Err(StoreError::ConcurrencyConflict {
                            reference,
                            expected,
                        });
                    }
                    staged.insert(
                        reference,
                        StoredBatch {
                            batch: batch.clone(),
                            version: expected.next(),
                        },
                    );
                }
            }
        }
        ensure_lines_unique(&staged)?;

        shared.batches = staged;
        shared.commits += 1;
        Ok(())
    }
}

/// Rejects states where one order line sits in two batches.
fn ensure_lines_unique(batches: &HashMap<BatchReference, StoredBatch>) -> Result<()> {
    let mut owners: HashMap<&OrderLine, &BatchReference> = HashMap::new();
    for (reference, stored) in batches {
        for line in stored.batch.allocations() {
            if owners.insert(line, reference).is_some() {
                return Err(StoreError::LineAlreadyAllocated {
                    order_id: line.order_id.clone(),
                    sku: line.sku.clone(),
                });
            }
        }
    }
    Ok(())
}

#[async_trait]
impl Repository for InMemoryBatchRepository {
    async fn add(&mut self, batch: Batch) -> Result<()> {
        self.ensure_open()?;
        if self.shared.read().await.batches.contains_key(batch.reference()) {
            return Err(StoreError::DuplicateBatch(batch.reference().clone()));
        }
        self.tracked.add(batch)
    }

    async fn get<'a>(&'a mut self, reference: &BatchReference) -> Result<&'a mut Batch> {
        self.ensure_open()?;
        if !self.tracked.contains(reference) {
            let shared = self.shared.read().await;
            if let Some(stored) = shared.batches.get(reference) {
                self.tracked.load(stored.batch.clone(), stored.version);
            }
        }
        self.tracked
            .get_mut(reference)
            .ok_or_else(|| StoreError::BatchNotFound(reference.clone()))
    }

    async fn list<'a>(&'a mut self) -> Result<Vec<&'a mut Batch>> {
        self.ensure_open()?;
        self.load_all().await;
        Ok(self.tracked.iter_mut().collect())
    }

    async fn for_sku<'a>(&'a mut self, sku: &Sku) -> Result<Vec<&'a mut Batch>> {
        self.ensure_open()?;
        self.load_all().await;
        Ok(self
            .tracked
            .iter_mut()
            .filter(|batch| batch.sku() == sku)
            .collect())
    }
}

/// Unit of work over an [`InMemoryStore`].
pub struct InMemoryUnitOfWork {
    batches: InMemoryBatchRepository,
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    type Batches = InMemoryBatchRepository;

    fn batches(&mut self) -> &mut InMemoryBatchRepository {
        &mut self.batches
    }

    fn state(&self) -> UowState {
        self.batches.state
    }

    async fn commit(&mut self) -> Result<()> {
        self.batches.ensure_open()?;
        let written = self.batches.write_changes().await;
        self.batches.tracked.clear();

        if let Err(err) = written {
            self.batches.state = UowState::RolledBack;
            if err.is_conflict() {
                metrics::counter!("uow_conflicts_total").increment(1);
                tracing::warn!(error = %err, "commit rejected");
            }
            metrics::counter!("uow_rollbacks_total").increment(1);
            return Err(err);
        }

        self.batches.state = UowState::Committed;
        metrics::counter!("uow_commits_total").increment(1);
        tracing::debug!("unit of work committed");
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.batches.ensure_open()?;
        self.batches.tracked.clear();
        self.batches.state = UowState::RolledBack;
        metrics::counter!("uow_rollbacks_total").increment(1);
        tracing::debug!("unit of work rolled back");
        Ok(())
    }
}

impl Drop for InMemoryUnitOfWork {
    fn drop(&mut self) {
        if self.batches.state.is_open() {
            let pending = self.batches.tracked.changes().len();
            self.batches.tracked.clear();
            self.batches.state = UowState::RolledBack;
            metrics::counter!("uow_rollbacks_total").increment(1);
            tracing::debug!(pending, "unit of work dropped while open, rolled back");
        }
    }
}
