//! Alert and alert type API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use tardet_types::api::{
    AlertListQuery, AlertListResponse, AlertResponse, AlertTypeListResponse, AlertTypeResponse,
    CreateAlertRequest, CreateAlertTypeRequest, ErrorResponse, HandleAlertsRequest,
    HandleAlertsResponse, PageQuery, UpdateAlertTypeRequest,
};
use tardet_types::{AlertId, AlertTypeId};
use tracing::info;

use super::{not_found, state_error, validate, ApiResult};
use crate::auth::Principal;
use crate::state::AppState;

// ============================================================================
// Alert types
// ============================================================================

/// List alert types ordered by display index.
#[utoipa::path(
    get,
    path = "/api/alert-types",
    tag = "alerts",
    responses(
        (status = 200, description = "All alert types", body = AlertTypeListResponse)
    )
)]
pub async fn list_alert_types(State(state): State<AppState>) -> Json<AlertTypeListResponse> {
    Json(AlertTypeListResponse {
        alert_types: state.catalog().await.alert_types(),
    })
}

/// Create an alert type. Its display index is assigned automatically.
#[utoipa::path(
    post,
    path = "/api/alert-types",
    tag = "alerts",
    request_body = CreateAlertTypeRequest,
    responses(
        (status = 201, description = "Alert type created", body = AlertTypeResponse),
        (status = 409, description = "Name already exists", body = ErrorResponse)
    )
)]
pub async fn create_alert_type(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<CreateAlertTypeRequest>,
) -> ApiResult<(StatusCode, Json<AlertTypeResponse>)> {
    principal.require_admin()?;
    validate(&req)?;

    let alert_type = state
        .mutate(|catalog| catalog.create_alert_type(&req))
        .await
        .map_err(state_error)?;

    info!(
        "Created alert type '{}' at index {}",
        alert_type.name, alert_type.idx
    );
    Ok((StatusCode::CREATED, Json(AlertTypeResponse { alert_type })))
}

/// Update an alert type's name or display index.
#[utoipa::path(
    put,
    path = "/api/alert-types/{id}",
    tag = "alerts",
    params(("id" = String, Path, description = "Alert type ID (UUID)")),
    request_body = UpdateAlertTypeRequest,
    responses(
        (status = 200, description = "Alert type updated", body = AlertTypeResponse),
        (status = 404, description = "Alert type not found", body = ErrorResponse),
        (status = 409, description = "Name or index already in use", body = ErrorResponse)
    )
)]
pub async fn update_alert_type(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<AlertTypeId>,
    Json(req): Json<UpdateAlertTypeRequest>,
) -> ApiResult<Json<AlertTypeResponse>> {
    principal.require_admin()?;
    validate(&req)?;

    let alert_type = state
        .mutate(|catalog| catalog.update_alert_type(id, &req))
        .await
        .map_err(state_error)?;
    Ok(Json(AlertTypeResponse { alert_type }))
}

/// Delete an alert type that no model or alert refers to.
#[utoipa::path(
    delete,
    path = "/api/alert-types/{id}",
    tag = "alerts",
    params(("id" = String, Path, description = "Alert type ID (UUID)")),
    responses(
        (status = 204, description = "Alert type deleted"),
        (status = 404, description = "Alert type not found", body = ErrorResponse),
        (status = 409, description = "Alert type still in use", body = ErrorResponse)
    )
)]
pub async fn delete_alert_type(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<AlertTypeId>,
) -> ApiResult<StatusCode> {
    principal.require_admin()?;

    state
        .mutate(|catalog| catalog.delete_alert_type(id).map(|c| ((), c)))
        .await
        .map_err(state_error)?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Alerts
// ============================================================================

/// List alerts, newest first.
#[utoipa::path(
    get,
    path = "/api/alerts",
    tag = "alerts",
    params(AlertListQuery, PageQuery),
    responses(
        (status = 200, description = "One page of matching alerts", body = AlertListResponse)
    )
)]
pub async fn list_alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertListQuery>,
    Query(page): Query<PageQuery>,
) -> Json<AlertListResponse> {
    let alerts = state.catalog().await.alerts(&query);
    let total = alerts.len();
    Json(AlertListResponse {
        total,
        alerts: page.apply(alerts),
    })
}

/// Get an alert by ID.
#[utoipa::path(
    get,
    path = "/api/alerts/{id}",
    tag = "alerts",
    params(("id" = String, Path, description = "Alert ID (UUID)")),
    responses(
        (status = 200, description = "Alert found", body = AlertResponse),
        (status = 404, description = "Alert not found", body = ErrorResponse)
    )
)]
pub async fn get_alert(
    State(state): State<AppState>,
    Path(id): Path<AlertId>,
) -> ApiResult<Json<AlertResponse>> {
    let alert = state
        .catalog()
        .await
        .alert(id)
        .cloned()
        .ok_or_else(|| not_found("Alert"))?;
    Ok(Json(AlertResponse { alert }))
}

/// Raise an alert. Callable by administrators and the detection service.
#[utoipa::path(
    post,
    path = "/api/alerts",
    tag = "alerts",
    request_body = CreateAlertRequest,
    responses(
        (status = 201, description = "Alert created", body = AlertResponse),
        (status = 400, description = "Rule does not belong to the model", body = ErrorResponse),
        (status = 404, description = "Referenced record not found", body = ErrorResponse)
    )
)]
pub async fn create_alert(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<CreateAlertRequest>,
) -> ApiResult<(StatusCode, Json<AlertResponse>)> {
    if !matches!(principal, Principal::Service) {
        principal.require_admin()?;
    }
    validate(&req)?;

    let alert = state
        .mutate(|catalog| catalog.create_alert(&req))
        .await
        .map_err(state_error)?;

    info!("Alert {} raised on device {}", alert.id, alert.device_id);
    Ok((StatusCode::CREATED, Json(AlertResponse { alert })))
}

/// Mark one or more alerts as handled.
///
/// The handling user defaults to the calling administrator.
#[utoipa::path(
    post,
    path = "/api/alerts/handle",
    tag = "alerts",
    request_body = HandleAlertsRequest,
    responses(
        (status = 200, description = "Alerts handled", body = HandleAlertsResponse),
        (status = 400, description = "No handling user given", body = ErrorResponse),
        (status = 404, description = "No matching alert or user", body = ErrorResponse)
    )
)]
pub async fn handle_alerts(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<HandleAlertsRequest>,
) -> ApiResult<Json<HandleAlertsResponse>> {
    principal.require_admin()?;
    validate(&req)?;

    let handled_user = req.handled_user.or(principal.user_id()).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("handled_user is required")),
        )
    })?;

    let handled = state
        .mutate(|catalog| catalog.handle_alerts(&req, handled_user))
        .await
        .map_err(state_error)?;

    info!("{} alert(s) handled by {}", handled, handled_user);
    Ok(Json(HandleAlertsResponse { handled }))
}
