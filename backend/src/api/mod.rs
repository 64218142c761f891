//! API handlers.

pub mod alerts;
pub mod companies;
pub mod devices;
pub mod models;
pub mod nodes;
pub mod play;
pub mod users;

use axum::{http::StatusCode, Json};
use tardet_types::api::ErrorResponse;
use tracing::error;

use crate::catalog::CatalogError;
use crate::state::StateError;

/// Error half of every JSON handler's result.
pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub type ApiResult<T> = Result<T, ApiError>;

pub(crate) fn catalog_error(e: CatalogError) -> ApiError {
    let status = match e {
        CatalogError::NotFound(_) => StatusCode::NOT_FOUND,
        CatalogError::Conflict(_) => StatusCode::CONFLICT,
        CatalogError::Invalid(_) => StatusCode::BAD_REQUEST,
    };
    (status, Json(ErrorResponse::new(e.to_string())))
}

pub(crate) fn state_error(e: StateError) -> ApiError {
    match e {
        StateError::Catalog(e) => catalog_error(e),
        StateError::Storage(e) => {
            error!("Storage failure: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::with_details(
                    "Failed to save changes",
                    e.to_string(),
                )),
            )
        }
    }
}

pub(crate) fn not_found(what: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new(format!("{} not found", what))),
    )
}

/// Reject a request body that fails its declared constraints.
pub(crate) fn validate<T>(req: &T) -> ApiResult<()>
where
    T: garde::Validate,
    T::Context: Default,
{
    req.validate().map_err(|report| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::with_details(
                "Invalid request",
                report.to_string(),
            )),
        )
    })
}

pub(crate) fn internal_error(message: &str, details: impl ToString) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::with_details(message, details.to_string())),
    )
}
