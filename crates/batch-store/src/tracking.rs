//! Identity map shared by the storage backends.
//!
//! Each unit of work keeps one [`TrackedBatches`]. The first time a batch is
//! read it is recorded together with the version and state it was loaded at;
//! later reads hand out the same object. At commit time the map reports which
//! batches are new and which changed, and what the backend must write.

use std::collections::BTreeMap;

use common::BatchReference;
use domain::{Batch, OrderLine};

use crate::{Result, StoreError, Version};

#[derive(Debug)]
enum Origin {
    /// Added in this scope; not stored yet.
    Added,
    /// Read from storage at `version`, with `original` as it was then.
    Loaded { version: Version, original: Batch },
}

#[derive(Debug)]
struct Entry {
    batch: Batch,
    origin: Origin,
}

/// A pending write produced by [`TrackedBatches::changes`].
#[derive(Debug)]
pub enum Change<'a> {
    /// A batch added in this scope.
    Insert(&'a Batch),

    /// A stored batch whose quantity or allocations changed.
    Update {
        batch: &'a Batch,
        expected: Version,
        added: Vec<&'a OrderLine>,
        removed: Vec<&'a OrderLine>,
    },
}

impl Change<'_> {
    /// Returns the batch this change writes.
    pub fn batch(&self) -> &Batch {
        match self {
            Change::Insert(batch) => batch,
            Change::Update { batch, .. } => batch,
        }
    }
}

/// The batches seen by one unit of work, keyed by reference.
#[derive(Debug, Default)]
pub struct TrackedBatches {
    entries: BTreeMap<BatchReference, Entry>,
}

impl TrackedBatches {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, reference: &BatchReference) -> bool {
        self.entries.contains_key(reference)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tracks a batch created in this scope.
    pub fn add(&mut self, batch: Batch) -> Result<()> {
        if self.contains(batch.reference()) {
            return Err(StoreError::DuplicateBatch(batch.reference().clone()));
        }
        self.entries.insert(
            batch.reference().clone(),
            Entry {
                batch,
                origin: Origin::Added,
            },
        );
        Ok(())
    }

    /// Tracks a batch read from storage.
    ///
    /// If the reference is already tracked the stored copy is ignored, so
    /// every read in a scope sees the same object and its pending changes.
    pub fn load(&mut self, batch: Batch, version: Version) {
        self.entries
            .entry(batch.reference().clone())
            .or_insert_with(|| Entry {
                origin: Origin::Loaded {
                    version,
                    original: batch.clone(),
                },
                batch,
            });
    }

    pub fn get_mut(&mut self, reference: &BatchReference) -> Option<&mut Batch> {
        self.entries.get_mut(reference).map(|entry| &mut entry.batch)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Batch> {
        self.entries.values_mut().map(|entry| &mut entry.batch)
    }

    /// Returns the writes needed to make this scope durable.
    ///
    /// Loaded batches that were not modified produce no change.
    pub fn changes(&self) -> Vec<Change<'_>> {
        self.entries
            .values()
            .filter_map(|entry| match &entry.origin {
                Origin::Added => Some(Change::Insert(&entry.batch)),
                Origin::Loaded { version, original } => {
                    let added: Vec<&OrderLine> = entry
                        .batch
                        .allocations()
                        .difference(original.allocations())
                        .collect();
                    let removed: Vec<&OrderLine> = original
                        .allocations()
                        .difference(entry.batch.allocations())
                        .collect();
                    let resized =
                        entry.batch.purchased_quantity() != original.purchased_quantity();

                    (resized || !added.is_empty() || !removed.is_empty()).then(|| {
                        Change::Update {
                            batch: &entry.batch,
                            expected: *version,
                            added,
                            removed,
                        }
                    })
                }
            })
            .collect()
    }

    /// Forgets every tracked batch and its pending changes.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
