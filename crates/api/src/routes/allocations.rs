//! Batch and allocation endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use batch_store::UnitOfWorkFactory;
use chrono::NaiveDate;
use common::BatchReference;
use domain::{Batch, OrderLine};
use serde::{Deserialize, Serialize};
use services::{AddBatch, Allocate, AllocationService, ChangeBatchQuantity, Reallocate};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<F: UnitOfWorkFactory> {
    pub service: AllocationService<F>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct AddBatchRequest {
    pub reference: String,
    pub sku: String,
    pub quantity: u32,
    pub eta: Option<NaiveDate>,
}

#[derive(Deserialize)]
pub struct ChangeQuantityRequest {
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct AllocateRequest {
    /// Generated when absent.
    pub order_id: Option<String>,
    pub sku: String,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct ReallocateRequest {
    pub order_id: String,
    pub sku: String,
    pub quantity: u32,
}

// -- Response types --

#[derive(Serialize)]
pub struct BatchCreatedResponse {
    pub reference: String,
}

#[derive(Serialize)]
pub struct BatchResponse {
    pub reference: String,
    pub sku: String,
    pub purchased_quantity: u32,
    pub available_quantity: i64,
    pub eta: Option<NaiveDate>,
    pub allocations: Vec<OrderLine>,
}

impl From<Batch> for BatchResponse {
    fn from(batch: Batch) -> Self {
        Self {
            reference: batch.reference().to_string(),
            sku: batch.sku().to_string(),
            purchased_quantity: batch.purchased_quantity(),
            available_quantity: batch.available_quantity(),
            eta: batch.eta(),
            allocations: batch.allocations().iter().cloned().collect(),
        }
    }
}

#[derive(Serialize)]
pub struct DeallocatedResponse {
    pub deallocated: Vec<OrderLine>,
}

#[derive(Serialize)]
pub struct AllocationResponse {
    pub order_id: String,
    pub batch_reference: String,
}

// -- Handlers --

/// POST /batches: register a new batch.
#[tracing::instrument(skip(state, req))]
pub async fn add_batch<F: UnitOfWorkFactory + 'static>(
    State(state): State<Arc<AppState<F>>>,
    Json(req): Json<AddBatchRequest>,
) -> Result<(StatusCode, Json<BatchCreatedResponse>), ApiError> {
    require("reference", &req.reference)?;
    require("sku", &req.sku)?;

    state
        .service
        .add_batch(AddBatch::new(
            req.reference.as_str(),
            req.sku,
            req.quantity,
            req.eta,
        ))
        .await?;

    let response = BatchCreatedResponse {
        reference: req.reference,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /batches/{reference}: current state of a batch.
#[tracing::instrument(skip(state))]
pub async fn get_batch<F: UnitOfWorkFactory + 'static>(
    State(state): State<Arc<AppState<F>>>,
    Path(reference): Path<String>,
) -> Result<Json<BatchResponse>, ApiError> {
    let batch = state
        .service
        .get_batch(&BatchReference::new(reference))
        .await?;
    Ok(Json(batch.into()))
}

/// PATCH /batches/{reference}: correct the purchased quantity.
#[tracing::instrument(skip(state, req))]
pub async fn change_quantity<F: UnitOfWorkFactory + 'static>(
    State(state): State<Arc<AppState<F>>>,
    Path(reference): Path<String>,
    Json(req): Json<ChangeQuantityRequest>,
) -> Result<Json<DeallocatedResponse>, ApiError> {
    let deallocated = state
        .service
        .change_batch_quantity(ChangeBatchQuantity::new(reference, req.quantity))
        .await?;
    Ok(Json(DeallocatedResponse { deallocated }))
}

/// POST /allocate: allocate an order line to the preferred batch.
#[tracing::instrument(skip(state, req))]
pub async fn allocate<F: UnitOfWorkFactory + 'static>(
    State(state): State<Arc<AppState<F>>>,
    Json(req): Json<AllocateRequest>,
) -> Result<(StatusCode, Json<AllocationResponse>), ApiError> {
    require("sku", &req.sku)?;
    let order_id = match req.order_id {
        Some(order_id) => {
            require("order_id", &order_id)?;
            order_id
        }
        None => uuid::Uuid::new_v4().to_string(),
    };

    let batch_reference = state
        .service
        .allocate(Allocate::new(order_id.as_str(), req.sku, req.quantity))
        .await?;

    let response = AllocationResponse {
        order_id,
        batch_reference: batch_reference.into_inner(),
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /reallocate: move an order line to the currently preferred batch.
#[tracing::instrument(skip(state, req))]
pub async fn reallocate<F: UnitOfWorkFactory + 'static>(
    State(state): State<Arc<AppState<F>>>,
    Json(req): Json<ReallocateRequest>,
) -> Result<Json<AllocationResponse>, ApiError> {
    require("order_id", &req.order_id)?;
    require("sku", &req.sku)?;

    let batch_reference = state
        .service
        .reallocate(Reallocate::new(
            req.order_id.as_str(),
            req.sku,
            req.quantity,
        ))
        .await?;

    Ok(Json(AllocationResponse {
        order_id: req.order_id,
        batch_reference: batch_reference.into_inner(),
    }))
}

fn require(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("{field} must not be empty")));
    }
    Ok(())
}
