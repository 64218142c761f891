//! Camera vendor (company) API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use tardet_types::api::{
    CompanyListResponse, CompanyResponse, CreateCompanyRequest, ErrorResponse,
    UpdateCompanyRequest,
};
use tardet_types::CompanyId;
use tracing::info;

use super::{not_found, state_error, validate, ApiResult};
use crate::auth::Principal;
use crate::state::AppState;

/// List all companies.
#[utoipa::path(
    get,
    path = "/api/companies",
    tag = "companies",
    responses(
        (status = 200, description = "All companies ordered by name", body = CompanyListResponse)
    )
)]
pub async fn list_companies(State(state): State<AppState>) -> Json<CompanyListResponse> {
    let companies = state.catalog().await.companies();
    Json(CompanyListResponse { companies })
}

/// Get a company by ID.
#[utoipa::path(
    get,
    path = "/api/companies/{id}",
    tag = "companies",
    params(("id" = String, Path, description = "Company ID (UUID)")),
    responses(
        (status = 200, description = "Company found", body = CompanyResponse),
        (status = 404, description = "Company not found", body = ErrorResponse)
    )
)]
pub async fn get_company(
    State(state): State<AppState>,
    Path(id): Path<CompanyId>,
) -> ApiResult<Json<CompanyResponse>> {
    let company = state
        .catalog()
        .await
        .company(id)
        .cloned()
        .ok_or_else(|| not_found("Company"))?;
    Ok(Json(CompanyResponse { company }))
}

/// Create a company.
#[utoipa::path(
    post,
    path = "/api/companies",
    tag = "companies",
    request_body = CreateCompanyRequest,
    responses(
        (status = 201, description = "Company created", body = CompanyResponse),
        (status = 409, description = "Name already exists", body = ErrorResponse)
    )
)]
pub async fn create_company(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<CreateCompanyRequest>,
) -> ApiResult<(StatusCode, Json<CompanyResponse>)> {
    principal.require_admin()?;
    validate(&req)?;

    let company = state
        .mutate(|catalog| catalog.create_company(&req))
        .await
        .map_err(state_error)?;

    info!("Created company '{}' ({:?})", company.name, company.vendor);
    Ok((StatusCode::CREATED, Json(CompanyResponse { company })))
}

/// Update a company.
#[utoipa::path(
    put,
    path = "/api/companies/{id}",
    tag = "companies",
    params(("id" = String, Path, description = "Company ID (UUID)")),
    request_body = UpdateCompanyRequest,
    responses(
        (status = 200, description = "Company updated", body = CompanyResponse),
        (status = 404, description = "Company not found", body = ErrorResponse),
        (status = 409, description = "Name already exists", body = ErrorResponse)
    )
)]
pub async fn update_company(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<CompanyId>,
    Json(req): Json<UpdateCompanyRequest>,
) -> ApiResult<Json<CompanyResponse>> {
    principal.require_admin()?;
    validate(&req)?;

    let company = state
        .mutate(|catalog| catalog.update_company(id, &req))
        .await
        .map_err(state_error)?;
    Ok(Json(CompanyResponse { company }))
}

/// Delete a company that no device refers to.
#[utoipa::path(
    delete,
    path = "/api/companies/{id}",
    tag = "companies",
    params(("id" = String, Path, description = "Company ID (UUID)")),
    responses(
        (status = 204, description = "Company deleted"),
        (status = 404, description = "Company not found", body = ErrorResponse),
        (status = 409, description = "Company still has devices", body = ErrorResponse)
    )
)]
pub async fn delete_company(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<CompanyId>,
) -> ApiResult<StatusCode> {
    principal.require_admin()?;

    state
        .mutate(|catalog| catalog.delete_company(id).map(|c| ((), c)))
        .await
        .map_err(state_error)?;

    info!("Deleted company {}", id);
    Ok(StatusCode::NO_CONTENT)
}
