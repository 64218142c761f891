//! Organization node API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use tardet_types::api::{
    CreateNodeRequest, ErrorResponse, NodeListResponse, NodeResponse, NodeTreeResponse, PageQuery,
};
use tardet_types::NodeId;
use tracing::info;

use super::{not_found, state_error, validate, ApiResult};
use crate::auth::Principal;
use crate::state::AppState;

/// List nodes ordered by code.
#[utoipa::path(
    get,
    path = "/api/nodes",
    tag = "nodes",
    params(PageQuery),
    responses(
        (status = 200, description = "One page of nodes", body = NodeListResponse)
    )
)]
pub async fn list_nodes(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> Json<NodeListResponse> {
    let nodes = state.catalog().await.nodes();
    let total = nodes.len();
    Json(NodeListResponse {
        total,
        nodes: page.apply(nodes),
    })
}

/// Get the node hierarchy as a tree.
#[utoipa::path(
    get,
    path = "/api/nodes/tree",
    tag = "nodes",
    responses(
        (status = 200, description = "Root nodes with nested children", body = NodeTreeResponse)
    )
)]
pub async fn node_tree(State(state): State<AppState>) -> Json<NodeTreeResponse> {
    Json(NodeTreeResponse {
        tree: state.catalog().await.node_tree(),
    })
}

/// Get a node by ID.
#[utoipa::path(
    get,
    path = "/api/nodes/{id}",
    tag = "nodes",
    params(("id" = String, Path, description = "Node ID (UUID)")),
    responses(
        (status = 200, description = "Node found", body = NodeResponse),
        (status = 404, description = "Node not found", body = ErrorResponse)
    )
)]
pub async fn get_node(
    State(state): State<AppState>,
    Path(id): Path<NodeId>,
) -> ApiResult<Json<NodeResponse>> {
    let node = state
        .catalog()
        .await
        .node(id)
        .cloned()
        .ok_or_else(|| not_found("Node"))?;
    Ok(Json(NodeResponse { node }))
}

/// Create a node, either a root or under an existing parent.
#[utoipa::path(
    post,
    path = "/api/nodes",
    tag = "nodes",
    request_body = CreateNodeRequest,
    responses(
        (status = 201, description = "Node created", body = NodeResponse),
        (status = 404, description = "Parent node not found", body = ErrorResponse),
        (status = 409, description = "Parent has no free child codes", body = ErrorResponse)
    )
)]
pub async fn create_node(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<CreateNodeRequest>,
) -> ApiResult<(StatusCode, Json<NodeResponse>)> {
    principal.require_admin()?;
    validate(&req)?;

    let node = state
        .mutate(|catalog| catalog.create_node(&req))
        .await
        .map_err(state_error)?;

    info!("Created node '{}' with code {}", node.name, node.code);
    Ok((StatusCode::CREATED, Json(NodeResponse { node })))
}

/// Delete a node and its whole subtree. Devices below it are detached.
#[utoipa::path(
    delete,
    path = "/api/nodes/{id}",
    tag = "nodes",
    params(("id" = String, Path, description = "Node ID (UUID)")),
    responses(
        (status = 204, description = "Node deleted"),
        (status = 404, description = "Node not found", body = ErrorResponse)
    )
)]
pub async fn delete_node(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<NodeId>,
) -> ApiResult<StatusCode> {
    principal.require_admin()?;

    state
        .mutate(|catalog| catalog.delete_node(id).map(|c| ((), c)))
        .await
        .map_err(state_error)?;

    info!("Deleted node {}", id);
    Ok(StatusCode::NO_CONTENT)
}
