//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use batch_store::StoreError;
use domain::DomainError;
use services::ServiceError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Error returned by the allocation service.
    Service(ServiceError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Service(err) => service_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn service_error_to_response(err: ServiceError) -> (StatusCode, String) {
    let status = match &err {
        ServiceError::InvalidSku(_) => StatusCode::BAD_REQUEST,
        ServiceError::Domain(domain_err) => match domain_err {
            DomainError::OutOfStock { .. } | DomainError::InvalidQuantity { .. } => {
                StatusCode::BAD_REQUEST
            }
            DomainError::EmptyAllocation { .. } => StatusCode::CONFLICT,
        },
        ServiceError::Store(StoreError::BatchNotFound(_)) => StatusCode::NOT_FOUND,
        ServiceError::Store(StoreError::DuplicateBatch(_)) => StatusCode::CONFLICT,
        ServiceError::Store(store_err) if store_err.is_conflict() => StatusCode::CONFLICT,
        ServiceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %err, "internal server error");
    }
    (status, err.to_string())
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError::Service(err)
    }
}
