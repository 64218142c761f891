//! User management API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use tardet_types::api::{
    CreateUserRequest, ErrorResponse, PageQuery, UpdateUserRequest, UserListResponse,
    UserResponse,
};
use tardet_types::UserInfo;
use tracing::info;

use super::{internal_error, not_found, state_error, validate, ApiError, ApiResult};
use crate::auth::Principal;
use crate::state::AppState;

/// Hash a password off the async runtime.
async fn hash_password(state: &AppState, password: String) -> Result<String, ApiError> {
    let auth = state.auth_config().clone();
    tokio::task::spawn_blocking(move || auth.hash_password(&password))
        .await
        .map_err(|e| internal_error("Password hashing task failed", e))?
        .map_err(|e| internal_error("Failed to hash password", e))
}

/// List users.
#[utoipa::path(
    get,
    path = "/api/users",
    tag = "users",
    params(PageQuery),
    responses(
        (status = 200, description = "One page of users", body = UserListResponse)
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> Json<UserListResponse> {
    let users = state.catalog().await.users();
    let total = users.len();
    let users = page.apply(users).iter().map(UserInfo::from).collect();
    Json(UserListResponse { total, users })
}

/// Get a user by usercode.
#[utoipa::path(
    get,
    path = "/api/users/{usercode}",
    tag = "users",
    params(("usercode" = String, Path, description = "Usercode")),
    responses(
        (status = 200, description = "User found", body = UserResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(usercode): Path<String>,
) -> ApiResult<Json<UserResponse>> {
    let catalog = state.catalog().await;
    let user = catalog.user_by_code(&usercode).ok_or_else(|| not_found("User"))?;
    Ok(Json(UserResponse {
        user: UserInfo::from(user),
    }))
}

/// Create a user.
#[utoipa::path(
    post,
    path = "/api/users",
    tag = "users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 403, description = "Administrator role required", body = ErrorResponse),
        (status = 409, description = "Usercode already exists", body = ErrorResponse)
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    principal.require_admin()?;
    validate(&req)?;

    let password_hash = hash_password(&state, req.password.clone()).await?;
    let creator = principal.user_id();
    let user = state
        .mutate(|catalog| catalog.create_user(&req, password_hash, creator))
        .await
        .map_err(state_error)?;

    info!("Created user '{}' ({})", user.usercode, user.role);
    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            user: UserInfo::from(&user),
        }),
    ))
}

/// Update a user.
///
/// Administrators may change anything; other users may change their own
/// name and password.
#[utoipa::path(
    put,
    path = "/api/users/{usercode}",
    tag = "users",
    params(("usercode" = String, Path, description = "Usercode")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 403, description = "Not allowed", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    )
)]
pub async fn update_user(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(usercode): Path<String>,
    Json(req): Json<UpdateUserRequest>,
) -> ApiResult<Json<UserResponse>> {
    let is_self = matches!(&principal, Principal::User { usercode: own, .. } if *own == usercode);
    if !principal.is_admin() && !(is_self && req.role.is_none()) {
        principal.require_admin()?;
    }
    validate(&req)?;

    let password_hash = match req.password.clone() {
        Some(password) => Some(hash_password(&state, password).await?),
        None => None,
    };
    let user = state
        .mutate(|catalog| catalog.update_user(&usercode, &req, password_hash))
        .await
        .map_err(state_error)?;

    // A changed password ends existing logins
    if req.password.is_some() {
        state.tokens().revoke_user(user.id).await;
    }

    info!("Updated user '{}'", user.usercode);
    Ok(Json(UserResponse {
        user: UserInfo::from(&user),
    }))
}

/// Delete a user.
#[utoipa::path(
    delete,
    path = "/api/users/{usercode}",
    tag = "users",
    params(("usercode" = String, Path, description = "Usercode")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 400, description = "Users cannot delete themselves", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    )
)]
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(usercode): Path<String>,
) -> ApiResult<StatusCode> {
    principal.require_admin()?;

    let user_id = state
        .catalog()
        .await
        .user_by_code(&usercode)
        .map(|u| u.id)
        .ok_or_else(|| not_found("User"))?;
    let acting = principal.user_id();
    state
        .mutate(|catalog| catalog.delete_user(&usercode, acting).map(|c| ((), c)))
        .await
        .map_err(state_error)?;
    state.tokens().revoke_user(user_id).await;

    info!("Deleted user '{}'", usercode);
    Ok(StatusCode::NO_CONTENT)
}
