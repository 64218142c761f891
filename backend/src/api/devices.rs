//! Device API handlers, including reachability probes and model bindings.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use tardet_types::api::{
    BindingListResponse, BindingResponse, CreateBindingRequest, CreateDeviceRequest,
    DeviceListQuery, DeviceListResponse, DeviceProbeResponse, DeviceResponse, ErrorResponse,
    UpdateDeviceRequest,
};
use tardet_types::{Device, DeviceId};
use tracing::{info, warn};
use uuid::Uuid;

use super::{catalog_error, internal_error, not_found, state_error, validate, ApiError, ApiResult};
use crate::auth::Principal;
use crate::relay::SecretError;
use crate::state::AppState;

/// Stored credentials never leave the server.
fn redacted(mut device: Device) -> Device {
    device.admin_pwd.clear();
    device
}

fn encrypt(state: &AppState, plaintext: &str) -> Result<String, ApiError> {
    state.encrypt_secret(plaintext).map_err(|e| match e {
        SecretError::NotConfigured => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::new(
                "Credential encryption is not configured on this server",
            )),
        ),
        other => internal_error("Failed to encrypt credentials", other),
    })
}

/// List devices.
#[utoipa::path(
    get,
    path = "/api/devices",
    tag = "devices",
    params(DeviceListQuery),
    responses(
        (status = 200, description = "One page of devices ordered by code", body = DeviceListResponse),
        (status = 404, description = "Node not found", body = ErrorResponse)
    )
)]
pub async fn list_devices(
    State(state): State<AppState>,
    Query(query): Query<DeviceListQuery>,
) -> ApiResult<Json<DeviceListResponse>> {
    let devices = state
        .catalog()
        .await
        .devices(query.node_id)
        .map_err(catalog_error)?;
    let total = devices.len();
    let devices = query
        .page()
        .apply(devices)
        .into_iter()
        .map(redacted)
        .collect();
    Ok(Json(DeviceListResponse { total, devices }))
}

/// Get a device by ID.
#[utoipa::path(
    get,
    path = "/api/devices/{id}",
    tag = "devices",
    params(("id" = String, Path, description = "Device ID (UUID)")),
    responses(
        (status = 200, description = "Device found", body = DeviceResponse),
        (status = 404, description = "Device not found", body = ErrorResponse)
    )
)]
pub async fn get_device(
    State(state): State<AppState>,
    Path(id): Path<DeviceId>,
) -> ApiResult<Json<DeviceResponse>> {
    let device = state
        .catalog()
        .await
        .device(id)
        .cloned()
        .ok_or_else(|| not_found("Device"))?;
    Ok(Json(DeviceResponse {
        device: redacted(device),
    }))
}

/// Register a device.
#[utoipa::path(
    post,
    path = "/api/devices",
    tag = "devices",
    request_body = CreateDeviceRequest,
    responses(
        (status = 201, description = "Device created", body = DeviceResponse),
        (status = 404, description = "Company or node not found", body = ErrorResponse),
        (status = 409, description = "Device code already exists", body = ErrorResponse),
        (status = 503, description = "Credential encryption not configured", body = ErrorResponse)
    )
)]
pub async fn create_device(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<CreateDeviceRequest>,
) -> ApiResult<(StatusCode, Json<DeviceResponse>)> {
    principal.require_admin()?;
    validate(&req)?;

    let encrypted = encrypt(&state, &req.admin_pwd)?;
    let device = state
        .mutate(|catalog| catalog.create_device(&req, encrypted))
        .await
        .map_err(state_error)?;

    info!(
        "Created device '{}' ({}) at {}",
        device.name,
        device.code,
        device.address()
    );
    Ok((
        StatusCode::CREATED,
        Json(DeviceResponse {
            device: redacted(device),
        }),
    ))
}

/// Update a device. A new admin password is re-encrypted.
#[utoipa::path(
    put,
    path = "/api/devices/{id}",
    tag = "devices",
    params(("id" = String, Path, description = "Device ID (UUID)")),
    request_body = UpdateDeviceRequest,
    responses(
        (status = 200, description = "Device updated", body = DeviceResponse),
        (status = 404, description = "Device, company or node not found", body = ErrorResponse)
    )
)]
pub async fn update_device(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<DeviceId>,
    Json(req): Json<UpdateDeviceRequest>,
) -> ApiResult<Json<DeviceResponse>> {
    principal.require_admin()?;
    validate(&req)?;

    let encrypted = req
        .admin_pwd
        .as_deref()
        .map(|pwd| encrypt(&state, pwd))
        .transpose()?;
    let device = state
        .mutate(|catalog| catalog.update_device(id, &req, encrypted))
        .await
        .map_err(state_error)?;

    Ok(Json(DeviceResponse {
        device: redacted(device),
    }))
}

/// Delete a device and its model bindings.
#[utoipa::path(
    delete,
    path = "/api/devices/{id}",
    tag = "devices",
    params(("id" = String, Path, description = "Device ID (UUID)")),
    responses(
        (status = 204, description = "Device deleted"),
        (status = 404, description = "Device not found", body = ErrorResponse)
    )
)]
pub async fn delete_device(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<DeviceId>,
) -> ApiResult<StatusCode> {
    principal.require_admin()?;

    state
        .mutate(|catalog| catalog.delete_device(id).map(|c| ((), c)))
        .await
        .map_err(state_error)?;

    info!("Deleted device {}", id);
    Ok(StatusCode::NO_CONTENT)
}

/// Probe a device's reachability and record the result.
#[utoipa::path(
    post,
    path = "/api/devices/{id}/probe",
    tag = "devices",
    params(("id" = String, Path, description = "Device ID (UUID)")),
    responses(
        (status = 200, description = "Probe finished", body = DeviceProbeResponse),
        (status = 404, description = "Device not found", body = ErrorResponse)
    )
)]
pub async fn probe_device(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<DeviceId>,
) -> ApiResult<Json<DeviceProbeResponse>> {
    principal.require_admin()?;

    let host = state
        .catalog()
        .await
        .device(id)
        .map(|d| d.ip_address.clone())
        .ok_or_else(|| not_found("Device"))?;

    let timeout = state.relay_config().probe_timeout();
    let outcome = state.prober().probe(&host, timeout).await;
    if !outcome.is_reachable() {
        warn!("Device {} at {} is {}", id, host, outcome.as_str());
    }

    let device = state
        .mutate(|catalog| catalog.record_probe(id, outcome.is_reachable()))
        .await
        .map_err(state_error)?;

    Ok(Json(DeviceProbeResponse {
        outcome: outcome.as_str().to_string(),
        device: redacted(device),
    }))
}

/// List a device's model bindings.
#[utoipa::path(
    get,
    path = "/api/devices/{id}/bindings",
    tag = "devices",
    params(("id" = String, Path, description = "Device ID (UUID)")),
    responses(
        (status = 200, description = "Bindings of the device", body = BindingListResponse),
        (status = 404, description = "Device not found", body = ErrorResponse)
    )
)]
pub async fn list_bindings(
    State(state): State<AppState>,
    Path(id): Path<DeviceId>,
) -> ApiResult<Json<BindingListResponse>> {
    let bindings = state
        .catalog()
        .await
        .bindings_for_device(id)
        .map_err(catalog_error)?;
    Ok(Json(BindingListResponse { bindings }))
}

/// Bind a model and some of its rules to a device.
#[utoipa::path(
    post,
    path = "/api/devices/{id}/bindings",
    tag = "devices",
    params(("id" = String, Path, description = "Device ID (UUID)")),
    request_body = CreateBindingRequest,
    responses(
        (status = 201, description = "Binding created", body = BindingResponse),
        (status = 400, description = "Rule does not belong to the model", body = ErrorResponse),
        (status = 404, description = "Device, model or rule not found", body = ErrorResponse),
        (status = 409, description = "Model already bound", body = ErrorResponse)
    )
)]
pub async fn create_binding(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<DeviceId>,
    Json(req): Json<CreateBindingRequest>,
) -> ApiResult<(StatusCode, Json<BindingResponse>)> {
    principal.require_admin()?;
    validate(&req)?;

    let binding = state
        .mutate(|catalog| catalog.create_binding(id, &req))
        .await
        .map_err(state_error)?;

    info!("Bound model {} to device {}", binding.model_id, id);
    Ok((StatusCode::CREATED, Json(BindingResponse { binding })))
}

/// Remove a model binding from a device.
#[utoipa::path(
    delete,
    path = "/api/devices/{id}/bindings/{binding_id}",
    tag = "devices",
    params(
        ("id" = String, Path, description = "Device ID (UUID)"),
        ("binding_id" = String, Path, description = "Binding ID (UUID)")
    ),
    responses(
        (status = 204, description = "Binding deleted"),
        (status = 404, description = "Binding not found", body = ErrorResponse)
    )
)]
pub async fn delete_binding(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((id, binding_id)): Path<(DeviceId, Uuid)>,
) -> ApiResult<StatusCode> {
    principal.require_admin()?;

    state
        .mutate(|catalog| catalog.delete_binding(id, binding_id).map(|c| ((), c)))
        .await
        .map_err(state_error)?;
    Ok(StatusCode::NO_CONTENT)
}
