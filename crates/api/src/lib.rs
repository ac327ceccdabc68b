//! HTTP API server for the allocation service.
//!
//! Provides REST endpoints for batches and allocations, with structured
//! logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use batch_store::UnitOfWorkFactory;
use metrics_exporter_prometheus::PrometheusHandle;
use services::AllocationService;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::allocations::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<F: UnitOfWorkFactory + 'static>(
    state: Arc<AppState<F>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/batches", post(routes::allocations::add_batch::<F>))
        .route(
            "/batches/{reference}",
            get(routes::allocations::get_batch::<F>)
                .patch(routes::allocations::change_quantity::<F>),
        )
        .route("/allocate", post(routes::allocations::allocate::<F>))
        .route("/reallocate", post(routes::allocations::reallocate::<F>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state around a unit-of-work factory.
pub fn create_state<F: UnitOfWorkFactory>(uow_factory: F) -> Arc<AppState<F>> {
    Arc::new(AppState {
        service: AllocationService::new(uow_factory),
    })
}
