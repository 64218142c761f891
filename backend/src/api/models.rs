//! Detection model and rule API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use tardet_types::api::{
    CreateModelRequest, CreateRuleRequest, ErrorResponse, ModelListResponse, ModelResponse,
    RuleListQuery, RuleListResponse, RuleResponse, UpdateModelRequest, UpdateRuleRequest,
};
use tardet_types::{ModelId, RuleId};
use tracing::info;

use super::{not_found, state_error, validate, ApiResult};
use crate::auth::Principal;
use crate::state::AppState;

// ============================================================================
// Models
// ============================================================================

/// List all models.
#[utoipa::path(
    get,
    path = "/api/models",
    tag = "models",
    responses(
        (status = 200, description = "All models ordered by name", body = ModelListResponse)
    )
)]
pub async fn list_models(State(state): State<AppState>) -> Json<ModelListResponse> {
    Json(ModelListResponse {
        models: state.catalog().await.models(),
    })
}

/// Get a model by ID.
#[utoipa::path(
    get,
    path = "/api/models/{id}",
    tag = "models",
    params(("id" = String, Path, description = "Model ID (UUID)")),
    responses(
        (status = 200, description = "Model found", body = ModelResponse),
        (status = 404, description = "Model not found", body = ErrorResponse)
    )
)]
pub async fn get_model(
    State(state): State<AppState>,
    Path(id): Path<ModelId>,
) -> ApiResult<Json<ModelResponse>> {
    let model = state
        .catalog()
        .await
        .model(id)
        .cloned()
        .ok_or_else(|| not_found("Model"))?;
    Ok(Json(ModelResponse { model }))
}

/// Create a model.
#[utoipa::path(
    post,
    path = "/api/models",
    tag = "models",
    request_body = CreateModelRequest,
    responses(
        (status = 201, description = "Model created", body = ModelResponse),
        (status = 404, description = "Alert type not found", body = ErrorResponse),
        (status = 409, description = "Name already exists", body = ErrorResponse)
    )
)]
pub async fn create_model(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<CreateModelRequest>,
) -> ApiResult<(StatusCode, Json<ModelResponse>)> {
    principal.require_admin()?;
    validate(&req)?;

    let model = state
        .mutate(|catalog| catalog.create_model(&req))
        .await
        .map_err(state_error)?;

    info!("Created model '{}'", model.name);
    Ok((StatusCode::CREATED, Json(ModelResponse { model })))
}

/// Update a model.
#[utoipa::path(
    put,
    path = "/api/models/{id}",
    tag = "models",
    params(("id" = String, Path, description = "Model ID (UUID)")),
    request_body = UpdateModelRequest,
    responses(
        (status = 200, description = "Model updated", body = ModelResponse),
        (status = 404, description = "Model or alert type not found", body = ErrorResponse),
        (status = 409, description = "Name already exists", body = ErrorResponse)
    )
)]
pub async fn update_model(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<ModelId>,
    Json(req): Json<UpdateModelRequest>,
) -> ApiResult<Json<ModelResponse>> {
    principal.require_admin()?;
    validate(&req)?;

    let model = state
        .mutate(|catalog| catalog.update_model(id, &req))
        .await
        .map_err(state_error)?;
    Ok(Json(ModelResponse { model }))
}

/// Delete a model together with its rules and bindings.
#[utoipa::path(
    delete,
    path = "/api/models/{id}",
    tag = "models",
    params(("id" = String, Path, description = "Model ID (UUID)")),
    responses(
        (status = 204, description = "Model deleted"),
        (status = 404, description = "Model not found", body = ErrorResponse)
    )
)]
pub async fn delete_model(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<ModelId>,
) -> ApiResult<StatusCode> {
    principal.require_admin()?;

    state
        .mutate(|catalog| catalog.delete_model(id).map(|c| ((), c)))
        .await
        .map_err(state_error)?;

    info!("Deleted model {}", id);
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Rules
// ============================================================================

/// List rules, optionally only those of one model.
#[utoipa::path(
    get,
    path = "/api/rules",
    tag = "models",
    params(RuleListQuery),
    responses(
        (status = 200, description = "Matching rules", body = RuleListResponse)
    )
)]
pub async fn list_rules(
    State(state): State<AppState>,
    Query(query): Query<RuleListQuery>,
) -> Json<RuleListResponse> {
    Json(RuleListResponse {
        rules: state.catalog().await.rules(query.model_id),
    })
}

/// Get a rule by ID.
#[utoipa::path(
    get,
    path = "/api/rules/{id}",
    tag = "models",
    params(("id" = String, Path, description = "Rule ID (UUID)")),
    responses(
        (status = 200, description = "Rule found", body = RuleResponse),
        (status = 404, description = "Rule not found", body = ErrorResponse)
    )
)]
pub async fn get_rule(
    State(state): State<AppState>,
    Path(id): Path<RuleId>,
) -> ApiResult<Json<RuleResponse>> {
    let rule = state
        .catalog()
        .await
        .rule(id)
        .cloned()
        .ok_or_else(|| not_found("Rule"))?;
    Ok(Json(RuleResponse { rule }))
}

/// Create a rule under a model.
#[utoipa::path(
    post,
    path = "/api/rules",
    tag = "models",
    request_body = CreateRuleRequest,
    responses(
        (status = 201, description = "Rule created", body = RuleResponse),
        (status = 404, description = "Model not found", body = ErrorResponse),
        (status = 409, description = "Name already exists", body = ErrorResponse)
    )
)]
pub async fn create_rule(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<CreateRuleRequest>,
) -> ApiResult<(StatusCode, Json<RuleResponse>)> {
    principal.require_admin()?;
    validate(&req)?;

    let rule = state
        .mutate(|catalog| catalog.create_rule(&req))
        .await
        .map_err(state_error)?;

    info!("Created rule '{}' for model {}", rule.name, rule.model_id);
    Ok((StatusCode::CREATED, Json(RuleResponse { rule })))
}

/// Update a rule's name or notes. The rule path cannot change.
#[utoipa::path(
    put,
    path = "/api/rules/{id}",
    tag = "models",
    params(("id" = String, Path, description = "Rule ID (UUID)")),
    request_body = UpdateRuleRequest,
    responses(
        (status = 200, description = "Rule updated", body = RuleResponse),
        (status = 404, description = "Rule not found", body = ErrorResponse),
        (status = 409, description = "Name already exists", body = ErrorResponse)
    )
)]
pub async fn update_rule(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<RuleId>,
    Json(req): Json<UpdateRuleRequest>,
) -> ApiResult<Json<RuleResponse>> {
    principal.require_admin()?;
    validate(&req)?;

    let rule = state
        .mutate(|catalog| catalog.update_rule(id, &req))
        .await
        .map_err(state_error)?;
    Ok(Json(RuleResponse { rule }))
}

/// Delete a rule and drop it from device bindings.
#[utoipa::path(
    delete,
    path = "/api/rules/{id}",
    tag = "models",
    params(("id" = String, Path, description = "Rule ID (UUID)")),
    responses(
        (status = 204, description = "Rule deleted"),
        (status = 404, description = "Rule not found", body = ErrorResponse)
    )
)]
pub async fn delete_rule(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<RuleId>,
) -> ApiResult<StatusCode> {
    principal.require_admin()?;

    state
        .mutate(|catalog| catalog.delete_rule(id).map(|c| ((), c)))
        .await
        .map_err(state_error)?;

    info!("Deleted rule {}", id);
    Ok(StatusCode::NO_CONTENT)
}
