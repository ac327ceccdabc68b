//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency. Each test
//! works on its own batch references and SKUs, so they can share tables.
//! Run with:
//!
//! ```bash
//! cargo test -p batch-store --test postgres_integration
//! ```

use std::sync::Arc;

use batch_store::{
    PostgresStore, Repository, StoreError, UnitOfWork, UnitOfWorkFactory, UowState, Version,
};
use chrono::NaiveDate;
use common::{BatchReference, Sku};
use domain::{Batch, OrderLine};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            PostgresStore::new(temp_pool.clone())
                .run_migrations()
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a store with its own pool
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;
    PostgresStore::connect(&info.connection_string, 5)
        .await
        .unwrap()
}

async fn add_batches(store: &PostgresStore, batches: Vec<Batch>) {
    let mut uow = store.begin().await.unwrap();
    for batch in batches {
        uow.batches().add(batch).await.unwrap();
    }
    uow.commit().await.unwrap();
}

async fn read_batch(store: &PostgresStore, reference: &str) -> Option<Batch> {
    let mut uow = store.begin().await.unwrap();
    match uow.batches().get(&BatchReference::new(reference)).await {
        Ok(batch) => Some(batch.clone()),
        Err(StoreError::BatchNotFound(_)) => None,
        Err(other) => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn add_and_get_batch() {
    let store = get_test_store().await;
    let eta = NaiveDate::from_ymd_opt(2026, 5, 1);
    add_batches(&store, vec![Batch::new("pg-add-1", "PG-ADD-LAMP", 100, eta)]).await;

    let batch = read_batch(&store, "pg-add-1").await.unwrap();

    assert_eq!(batch.sku(), &Sku::new("PG-ADD-LAMP"));
    assert_eq!(batch.purchased_quantity(), 100);
    assert_eq!(batch.eta(), eta);
    assert!(batch.allocations().is_empty());
}

#[tokio::test]
async fn allocations_round_trip() {
    let store = get_test_store().await;
    add_batches(&store, vec![Batch::new("pg-alloc-1", "PG-ALLOC", 20, None)]).await;

    let mut uow = store.begin().await.unwrap();
    let batch = uow
        .batches()
        .get(&BatchReference::new("pg-alloc-1"))
        .await
        .unwrap();
    assert!(batch.allocate(&OrderLine::new("pg-alloc-order-1", "PG-ALLOC", 5)));
    assert!(batch.allocate(&OrderLine::new("pg-alloc-order-2", "PG-ALLOC", 7)));
    uow.commit().await.unwrap();

    let batch = read_batch(&store, "pg-alloc-1").await.unwrap();
    assert_eq!(batch.allocated_quantity(), 12);
    assert_eq!(batch.available_quantity(), 8);
    assert!(batch.is_allocated(&OrderLine::new("pg-alloc-order-2", "PG-ALLOC", 7)));
}

#[tokio::test]
async fn for_sku_only_returns_matching_batches() {
    let store = get_test_store().await;
    add_batches(
        &store,
        vec![
            Batch::new("pg-sku-1", "PG-SKU-A", 10, None),
            Batch::new("pg-sku-2", "PG-SKU-A", 10, None),
            Batch::new("pg-sku-3", "PG-SKU-B", 10, None),
        ],
    )
    .await;

    let mut uow = store.begin().await.unwrap();
    let batches = uow.batches().for_sku(&Sku::new("PG-SKU-A")).await.unwrap();

    let mut references: Vec<_> = batches.iter().map(|b| b.reference().to_string()).collect();
    references.sort();
    assert_eq!(references, vec!["pg-sku-1", "pg-sku-2"]);
}

#[tokio::test]
async fn rollback_discards_changes() {
    let store = get_test_store().await;

    let mut uow = store.begin().await.unwrap();
    uow.batches()
        .add(Batch::new("pg-rollback-1", "PG-ROLLBACK", 10, None))
        .await
        .unwrap();
    uow.rollback().await.unwrap();

    assert_eq!(uow.state(), UowState::RolledBack);
    assert!(read_batch(&store, "pg-rollback-1").await.is_none());
}

#[tokio::test]
async fn dropped_scope_writes_nothing() {
    let store = get_test_store().await;

    {
        let mut uow = store.begin().await.unwrap();
        uow.batches()
            .add(Batch::new("pg-drop-1", "PG-DROP", 10, None))
            .await
            .unwrap();
    }

    assert!(read_batch(&store, "pg-drop-1").await.is_none());
}

#[tokio::test]
async fn duplicate_batch_is_rejected() {
    let store = get_test_store().await;
    add_batches(&store, vec![Batch::new("pg-dup-1", "PG-DUP", 10, None)]).await;

    let mut uow = store.begin().await.unwrap();
    let result = uow
        .batches()
        .add(Batch::new("pg-dup-1", "PG-DUP", 5, None))
        .await;

    assert!(matches!(result, Err(StoreError::DuplicateBatch(reference)) if reference == "pg-dup-1"));
}

#[tokio::test]
async fn concurrent_scopes_conflict() {
    let store = get_test_store().await;
    add_batches(&store, vec![Batch::new("pg-conflict-1", "PG-CONFLICT", 100, None)]).await;
    let sku = Sku::new("PG-CONFLICT");

    let mut first = store.begin().await.unwrap();
    let mut second = store.begin().await.unwrap();
    for batch in first.batches().for_sku(&sku).await.unwrap() {
        batch.allocate(&OrderLine::new("pg-conflict-order-1", "PG-CONFLICT", 10));
    }
    for batch in second.batches().for_sku(&sku).await.unwrap() {
        batch.allocate(&OrderLine::new("pg-conflict-order-2", "PG-CONFLICT", 10));
    }

    first.commit().await.unwrap();
    let result = second.commit().await;

    assert!(matches!(result, Err(StoreError::ConcurrencyConflict { .. })));
    assert_eq!(second.state(), UowState::RolledBack);
    let batch = read_batch(&store, "pg-conflict-1").await.unwrap();
    assert_eq!(batch.allocated_quantity(), 10);
}

#[tokio::test]
async fn line_can_move_between_batches_in_one_scope() {
    let store = get_test_store().await;
    let line = OrderLine::new("pg-move-order", "PG-MOVE", 4);
    let mut from = Batch::new("pg-move-from", "PG-MOVE", 10, None);
    from.allocate(&line);
    add_batches(&store, vec![from, Batch::new("pg-move-to", "PG-MOVE", 10, None)]).await;

    let mut uow = store.begin().await.unwrap();
    uow.batches()
        .get(&BatchReference::new("pg-move-from"))
        .await
        .unwrap()
        .deallocate(&line);
    uow.batches()
        .get(&BatchReference::new("pg-move-to"))
        .await
        .unwrap()
        .allocate(&line);
    uow.commit().await.unwrap();

    let from = read_batch(&store, "pg-move-from").await.unwrap();
    let to = read_batch(&store, "pg-move-to").await.unwrap();
    assert!(!from.is_allocated(&line));
    assert!(to.is_allocated(&line));
}

#[tokio::test]
async fn line_is_never_stored_twice() {
    let store = get_test_store().await;
    let line = OrderLine::new("pg-twice-order", "PG-TWICE", 4);
    let mut holder = Batch::new("pg-twice-a", "PG-TWICE", 10, None);
    holder.allocate(&line);
    add_batches(&store, vec![holder, Batch::new("pg-twice-b", "PG-TWICE", 10, None)]).await;

    let mut uow = store.begin().await.unwrap();
    uow.batches()
        .get(&BatchReference::new("pg-twice-b"))
        .await
        .unwrap()
        .allocate(&line);
    let result = uow.commit().await;

    assert!(matches!(result, Err(StoreError::LineAlreadyAllocated { .. })));
}

#[tokio::test]
async fn committed_changes_bump_the_version() {
    let store = get_test_store().await;
    add_batches(&store, vec![Batch::new("pg-version-1", "PG-VERSION", 10, None)]).await;

    let mut uow = store.begin().await.unwrap();
    uow.batches()
        .get(&BatchReference::new("pg-version-1"))
        .await
        .unwrap()
        .change_purchased_quantity(8);
    uow.commit().await.unwrap();

    let version: i64 = sqlx::query_scalar("SELECT version FROM batches WHERE reference = $1")
        .bind("pg-version-1")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(Version::new(version), Version::first().next());
}

#[tokio::test]
async fn commit_after_commit_is_rejected() {
    let store = get_test_store().await;
    let mut uow = store.begin().await.unwrap();
    uow.commit().await.unwrap();

    let result = uow.commit().await;

    assert!(matches!(
        result,
        Err(StoreError::NotOpen {
            state: UowState::Committed
        })
    ));
}
