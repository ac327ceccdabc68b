use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use common::{BatchReference, OrderId, Sku};
use domain::{Batch, OrderLine};
use sqlx::{
    PgConnection, PgPool, Postgres, Row, Transaction,
    postgres::{PgPoolOptions, PgRow},
};

use crate::{
    Result, StoreError, UowState, Version,
    store::{Repository, UnitOfWork, UnitOfWorkFactory},
    tracking::{Change, TrackedBatches},
};

const SERIALIZATION_FAILURE: &str = "40001";
const BATCH_KEY: &str = "batches_pkey";
const ORDER_LINE_KEY: &str = "allocations_order_line_key";

/// PostgreSQL-backed batch store.
///
/// Every unit of work runs in its own REPEATABLE READ transaction, and batch
/// rows carry a version that each committed change bumps.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL batch store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool and wraps it in a store.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl UnitOfWorkFactory for PostgresStore {
    type UnitOfWork = PostgresUnitOfWork;

    async fn begin(&self) -> Result<PostgresUnitOfWork> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;

        tracing::debug!("unit of work opened");
        Ok(PostgresUnitOfWork {
            batches: PostgresBatchRepository {
                tx: Some(tx),
                tracked: TrackedBatches::new(),
                state: UowState::Open,
            },
        })
    }
}

enum Filter<'a> {
    All,
    Reference(&'a BatchReference),
    Sku(&'a Sku),
}

/// Reads batch rows and their allocations.
async fn fetch_batches(
    conn: &mut PgConnection,
    filter: Filter<'_>,
) -> Result<Vec<(Batch, Version)>> {
    const COLUMNS: &str = "SELECT reference, sku, purchased_quantity, eta, version FROM batches";

    let rows = match filter {
        Filter::All => sqlx::query(COLUMNS).fetch_all(&mut *conn).await?,
        Filter::Reference(reference) => {
            sqlx::query(&format!("{COLUMNS} WHERE reference = $1"))
                .bind(reference.as_str())
                .fetch_all(&mut *conn)
                .await?
        }
        Filter::Sku(sku) => {
            sqlx::query(&format!("{COLUMNS} WHERE sku = $1"))
                .bind(sku.as_str())
                .fetch_all(&mut *conn)
                .await?
        }
    };
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let references = rows
        .iter()
        .map(|row| row.try_get::<String, _>("reference"))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let line_rows = sqlx::query(
        r#"
        SELECT batch_reference, order_id, sku, quantity
        FROM allocations
        WHERE batch_reference = ANY($1)
        "#,
    )
    .bind(references.as_slice())
    .fetch_all(&mut *conn)
    .await?;

    let mut lines: HashMap<String, Vec<OrderLine>> = HashMap::new();
    for row in line_rows {
        let owner: String = row.try_get("batch_reference")?;
        let line = OrderLine::new(
            OrderId::new(row.try_get::<String, _>("order_id")?),
            Sku::new(row.try_get::<String, _>("sku")?),
            decode_quantity(&row, "quantity")?,
        );
        lines.entry(owner).or_default().push(line);
    }

    rows.into_iter()
        .map(|row| -> Result<(Batch, Version)> {
            let reference: String = row.try_get("reference")?;
            let allocations = lines.remove(&reference).unwrap_or_default();
            let batch = Batch::restore(
                BatchReference::new(reference),
                Sku::new(row.try_get::<String, _>("sku")?),
                decode_quantity(&row, "purchased_quantity")?,
                row.try_get::<Option<NaiveDate>, _>("eta")?,
                allocations,
            );
            Ok((batch, Version::new(row.try_get("version")?)))
        })
        .collect()
}

fn decode_quantity(row: &PgRow, column: &str) -> Result<u32> {
    let value: i64 = row.try_get(column)?;
    u32::try_from(value).map_err(|e| {
        StoreError::Database(sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(e),
        })
    })
}

/// Maps constraint and serialization failures onto store errors.
fn map_write_error(
    err: sqlx::Error,
    reference: &BatchReference,
    expected: Version,
    line: Option<&OrderLine>,
) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.code().as_deref() == Some(SERIALIZATION_FAILURE) {
            return StoreError::ConcurrencyConflict {
                reference: reference.clone(),
                expected,
            };
        }
        match (db_err.constraint(), line) {
            (Some(BATCH_KEY), _) => return StoreError::DuplicateBatch(reference.clone()),
            (Some(ORDER_LINE_KEY), Some(line)) => {
                return StoreError::LineAlreadyAllocated {
                    order_id: line.order_id.clone(),
                    sku: line.sku.clone(),
                };
            }
            _ => {}
        }
    }
    StoreError::Database(err)
}

async fn insert_batch(conn: &mut PgConnection, batch: &Batch) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO batches (reference, sku, purchased_quantity, eta, version)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(batch.reference().as_str())
    .bind(batch.sku().as_str())
    .bind(i64::from(batch.purchased_quantity()))
    .bind(batch.eta())
    .bind(Version::first().as_i64())
    .execute(&mut *conn)
    .await
    .map_err(|e| map_write_error(e, batch.reference(), Version::initial(), None))?;
    Ok(())
}

async fn update_batch(conn: &mut PgConnection, batch: &Batch, expected: Version) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE batches
        SET purchased_quantity = $1, version = $2
        WHERE reference = $3 AND version = $4
        "#,
    )
    .bind(i64::from(batch.purchased_quantity()))
    .bind(expected.next().as_i64())
    .bind(batch.reference().as_str())
    .bind(expected.as_i64())
    .execute(&mut *conn)
    .await
    .map_err(|e| map_write_error(e, batch.reference(), expected, None))?;

    if result.rows_affected() == 0 {
        return Err(StoreError::ConcurrencyConflict {
            reference: batch.reference().clone(),
            expected,
        });
    }
    Ok(())
}

async fn insert_line(
    conn: &mut PgConnection,
    reference: &BatchReference,
    expected: Version,
    line: &OrderLine,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO allocations (batch_reference, order_id, sku, quantity)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(reference.as_str())
    .bind(line.order_id.as_str())
    .bind(line.sku.as_str())
    .bind(line.quantity_i64())
    .execute(&mut *conn)
    .await
    .map_err(|e| map_write_error(e, reference, expected, Some(line)))?;
    Ok(())
}

async fn delete_line(
    conn: &mut PgConnection,
    reference: &BatchReference,
    expected: Version,
    line: &OrderLine,
) -> Result<()> {
    sqlx::query(
        r#"
        DELETE FROM allocations
        WHERE batch_reference = $1 AND order_id = $2 AND sku = $3 AND quantity = $4
        "#,
    )
    .bind(reference.as_str())
    .bind(line.order_id.as_str())
    .bind(line.sku.as_str())
    .bind(line.quantity_i64())
    .execute(&mut *conn)
    .await
    .map_err(|e| map_write_error(e, reference, expected, Some(line)))?;
    Ok(())
}

/// Writes every change in two passes.
///
/// Batch rows and removed lines go first, added lines last, so a line moving
/// between batches in one scope never exists twice.
async fn write_changes(conn: &mut PgConnection, changes: &[Change<'_>]) -> Result<()> {
    for change in changes {
        match change {
            Change::Insert(batch) => insert_batch(conn, batch).await?,
            Change::Update {
                batch,
                expected,
                removed,
                ..
            } => {
                update_batch(conn, batch, *expected).await?;
                for line in removed {
                    delete_line(conn, batch.reference(), *expected, line).await?;
                }
            }
        }
    }

    for change in changes {
        let (expected, lines): (Version, Vec<&OrderLine>) = match change {
            Change::Insert(batch) => (Version::initial(), batch.allocations().iter().collect()),
            Change::Update {
                expected, added, ..
            } => (*expected, added.clone()),
        };
        for line in lines {
            insert_line(conn, change.batch().reference(), expected, line).await?;
        }
    }
    Ok(())
}

/// Repository over a [`PostgresStore`] transaction, bound to one unit of work.
pub struct PostgresBatchRepository {
    tx: Option<Transaction<'static, Postgres>>,
    tracked: TrackedBatches,
    state: UowState,
}

impl PostgresBatchRepository {
    fn connection(&mut self) -> Result<&mut PgConnection> {
        match (self.state.is_open(), self.tx.as_mut()) {
            (true, Some(tx)) => Ok(&mut **tx),
            _ => Err(StoreError::NotOpen { state: self.state }),
        }
    }

    async fn load(&mut self, filter: Filter<'_>) -> Result<()> {
        let conn = self.connection()?;
        for (batch, version) in fetch_batches(conn, filter).await? {
            self.tracked.load(batch, version);
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for PostgresBatchRepository {
    async fn add(&mut self, batch: Batch) -> Result<()> {
        let conn = self.connection()?;
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM batches WHERE reference = $1)")
                .bind(batch.reference().as_str())
                .fetch_one(conn)
                .await?;
        if exists {
            return Err(StoreError::DuplicateBatch(batch.reference().clone()));
        }
        self.tracked.add(batch)
    }

    async fn get<'a>(&'a mut self, reference: &BatchReference) -> Result<&'a mut Batch> {
        self.connection()?;
        if !self.tracked.contains(reference) {
            self.load(Filter::Reference(reference)).await?;
        }
        self.tracked
            .get_mut(reference)
            .ok_or_else(|| StoreError::BatchNotFound(reference.clone()))
    }

    async fn list<'a>(&'a mut self) -> Result<Vec<&'a mut Batch>> {
        self.load(Filter::All).await?;
        Ok(self.tracked.iter_mut().collect())
    }

    async fn for_sku<'a>(&'a mut self, sku: &Sku) -> Result<Vec<&'a mut Batch>> {
        self.load(Filter::Sku(sku)).await?;
        Ok(self
            .tracked
            .iter_mut()
            .filter(|batch| batch.sku() == sku)
            .collect())
    }
}

/// Unit of work over a [`PostgresStore`] transaction.
pub struct PostgresUnitOfWork {
    batches: PostgresBatchRepository,
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    type Batches = PostgresBatchRepository;

    fn batches(&mut self) -> &mut PostgresBatchRepository {
        &mut self.batches
    }

    fn state(&self) -> UowState {
        self.batches.state
    }

    async fn commit(&mut self) -> Result<()> {
        self.batches.connection()?;
        let repo = &mut self.batches;
        let Some(mut tx) = repo.tx.take() else {
            return Err(StoreError::NotOpen { state: repo.state });
        };

        let written = {
            let changes = repo.tracked.changes();
            write_changes(&mut *tx, &changes).await
        };
        let result = match written {
            Ok(()) => tx.commit().await.map_err(StoreError::from),
            Err(err) => {
                // Dropping the transaction rolls it back.
                drop(tx);
                Err(err)
            }
        };
        repo.tracked.clear();

        match result {
            Ok(()) => {
                repo.state = UowState::Committed;
                metrics::counter!("uow_commits_total").increment(1);
                tracing::debug!("unit of work committed");
                Ok(())
            }
            Err(err) => {
                repo.state = UowState::RolledBack;
                if err.is_conflict() {
                    metrics::counter!("uow_conflicts_total").increment(1);
                    tracing::warn!(error = %err, "commit rejected");
                }
                metrics::counter!("uow_rollbacks_total").increment(1);
                Err(err)
            }
        }
    }

    async fn rollback(&mut self) -> Result<()> {
        self.batches.connection()?;
        let repo = &mut self.batches;
        repo.tracked.clear();
        repo.state = UowState::RolledBack;
        metrics::counter!("uow_rollbacks_total").increment(1);
        if let Some(tx) = repo.tx.take() {
            tx.rollback().await?;
        }
        tracing::debug!("unit of work rolled back");
        Ok(())
    }
}

impl Drop for PostgresUnitOfWork {
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
