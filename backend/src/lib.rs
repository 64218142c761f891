//! Tardet backend library.
//!
//! This module exposes the application builder for use in tests.

use axum::http::HeaderValue;
use axum::http::{header, Method};
use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tower_sessions::{cookie::time::Duration, Expiry, MemoryStore, SessionManagerLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod api;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod openapi;
pub mod paths;
pub mod relay;
pub mod state;
pub mod storage;

use state::AppState;

/// Create the Axum application router with a given state, allowing any origin.
pub fn create_app(state: AppState) -> Router {
    create_app_with_config(state, Vec::new())
}

/// Create the Axum application router with a given state and CORS origins.
///
/// If `cors_allowed_origins` is empty, any origin is allowed.
/// Otherwise, only the specified origins are allowed.
pub fn create_app_with_config(state: AppState, cors_allowed_origins: Vec<String>) -> Router {
    let auth_config = state.auth_config();
    tracing::info!("Authentication: session and bearer tokens");
    if auth_config.has_api_key_auth() {
        tracing::info!("  - Service API key configured");
    }

    // Create session store (in-memory, sessions lost on restart)
    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_expiry(Expiry::OnInactivity(Duration::hours(24)))
        .with_secure(false);

    // Build protected API router (requires authentication)
    let protected_api_router = Router::new()
        // Users
        .route(
            "/users",
            get(api::users::list_users).post(api::users::create_user),
        )
        .route(
            "/users/{usercode}",
            get(api::users::get_user)
                .put(api::users::update_user)
                .delete(api::users::delete_user),
        )
        // Companies
        .route(
            "/companies",
            get(api::companies::list_companies).post(api::companies::create_company),
        )
        .route(
            "/companies/{id}",
            get(api::companies::get_company)
                .put(api::companies::update_company)
                .delete(api::companies::delete_company),
        )
        // Devices
        .route(
            "/devices",
            get(api::devices::list_devices).post(api::devices::create_device),
        )
        .route(
            "/devices/{id}",
            get(api::devices::get_device)
                .put(api::devices::update_device)
                .delete(api::devices::delete_device),
        )
        .route("/devices/{id}/probe", post(api::devices::probe_device))
        .route(
            "/devices/{id}/bindings",
            get(api::devices::list_bindings).post(api::devices::create_binding),
        )
        .route(
            "/devices/{id}/bindings/{binding_id}",
            delete(api::devices::delete_binding),
        )
        // Nodes
        .route(
            "/nodes",
            get(api::nodes::list_nodes).post(api::nodes::create_node),
        )
        .route("/nodes/tree", get(api::nodes::node_tree))
        .route(
            "/nodes/{id}",
            get(api::nodes::get_node).delete(api::nodes::delete_node),
        )
        // Models and rules
        .route(
            "/models",
            get(api::models::list_models).post(api::models::create_model),
        )
        .route(
            "/models/{id}",
            get(api::models::get_model)
                .put(api::models::update_model)
                .delete(api::models::delete_model),
        )
        .route(
            "/rules",
            get(api::models::list_rules).post(api::models::create_rule),
        )
        .route(
            "/rules/{id}",
            get(api::models::get_rule)
                .put(api::models::update_rule)
                .delete(api::models::delete_rule),
        )
        // Alerts
        .route(
            "/alert-types",
            get(api::alerts::list_alert_types).post(api::alerts::create_alert_type),
        )
        .route(
            "/alert-types/{id}",
            axum::routing::put(api::alerts::update_alert_type)
                .delete(api::alerts::delete_alert_type),
        )
        .route(
            "/alerts",
            get(api::alerts::list_alerts).post(api::alerts::create_alert),
        )
        .route("/alerts/handle", post(api::alerts::handle_alerts))
        .route("/alerts/{id}", get(api::alerts::get_alert))
        // Apply authentication middleware to all protected routes
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    // Build public API router (no authentication required)
    let public_api_router = Router::new()
        .route("/login", post(auth::login_handler))
        .route("/refresh", post(auth::refresh_handler))
        .route("/logout", post(auth::logout_handler))
        .route("/auth/status", get(auth::auth_status_handler))
        .route("/play/{device_id}", get(api::play::play_handler));

    let api_router = Router::new()
        .merge(public_api_router)
        .merge(protected_api_router);

    // Build Swagger UI router behind authentication
    let swagger_router = Router::new()
        .merge(
            SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    // Build main router
    Router::new()
        .route("/health", get(health))
        .merge(swagger_router)
        .nest("/api", api_router)
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
        .layer({
            let cors = CorsLayer::new()
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([
                    header::CONTENT_TYPE,
                    header::AUTHORIZATION,
                    header::ACCEPT,
                    header::COOKIE,
                ]);

            // If no origins specified, allow any origin
            // Otherwise, restrict to the specified origins
            if cors_allowed_origins.is_empty() {
                cors.allow_origin(Any)
            } else {
                let origins: Vec<HeaderValue> = cors_allowed_origins
                    .iter()
                    .filter_map(|o| o.parse::<HeaderValue>().ok())
                    .collect();
                cors.allow_origin(origins).allow_credentials(true)
            }
        })
        .with_state(state)
}

/// Health check endpoint.
async fn health() -> &'static str {
    "OK"
}
