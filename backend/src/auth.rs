//! Authentication: cookie sessions, bearer tokens and the service API key.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tardet_types::api::ErrorResponse;
use tardet_types::{Role, UserId};
use tokio::sync::RwLock;
use tower_sessions::Session;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::state::AppState;

const SESSION_USER_KEY: &str = "user_id";

/// Authentication configuration (the `[auth]` config section).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Usercode of the administrator created on first start
    pub admin_user: Option<String>,
    /// Bcrypt hash of the bootstrap administrator's password
    pub admin_password_hash: Option<String>,
    /// API key accepted as a bearer token from machine clients
    pub api_key: Option<String>,
    /// Access token lifetime in minutes
    pub access_token_ttl_minutes: i64,
    /// Refresh token lifetime in days
    pub refresh_token_ttl_days: i64,
    /// Bcrypt cost for newly hashed passwords
    pub bcrypt_cost: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_user: None,
            admin_password_hash: None,
            api_key: None,
            access_token_ttl_minutes: 30,
            refresh_token_ttl_days: 7,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl AuthConfig {
    /// Check if a bootstrap administrator is configured
    pub fn has_bootstrap_admin(&self) -> bool {
        self.admin_user.is_some() && self.admin_password_hash.is_some()
    }

    /// Check if API key authentication is configured
    pub fn has_api_key_auth(&self) -> bool {
        self.api_key.is_some()
    }

    /// Verify API key
    pub fn verify_api_key(&self, key: &str) -> bool {
        self.api_key.as_deref().is_some_and(|k| k == key)
    }

    /// Hash a password with the configured cost.
    pub fn hash_password(&self, password: &str) -> Result<String, bcrypt::BcryptError> {
        bcrypt::hash(password, self.bcrypt_cost)
    }
}

/// Who is making a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    User {
        id: UserId,
        usercode: String,
        role: Role,
    },
    /// A machine client holding the API key
    Service,
}

impl Principal {
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Principal::User { id, .. } => Some(*id),
            Principal::Service => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(
            self,
            Principal::User {
                role: Role::Admin,
                ..
            }
        )
    }

    /// Reject callers that are not administrators.
    pub fn require_admin(&self) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
        if self.is_admin() {
            Ok(())
        } else {
            Err((
                StatusCode::FORBIDDEN,
                Json(ErrorResponse::new("Administrator role required")),
            ))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone)]
struct IssuedToken {
    user_id: UserId,
    kind: TokenKind,
    expires_at: DateTime<Utc>,
}

/// Access and refresh tokens handed out at login.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

/// In-memory registry of opaque bearer tokens.
pub struct TokenRegistry {
    tokens: RwLock<HashMap<String, IssuedToken>>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenRegistry {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
            access_ttl: Duration::minutes(config.access_token_ttl_minutes),
            refresh_ttl: Duration::days(config.refresh_token_ttl_days),
        }
    }

    async fn insert(&self, user_id: UserId, kind: TokenKind) -> String {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let token = Uuid::new_v4().simple().to_string();
        let now = Utc::now();

        let mut tokens = self.tokens.write().await;
        tokens.retain(|_, t| t.expires_at > now);
        tokens.insert(
            token.clone(),
            IssuedToken {
                user_id,
                kind,
                expires_at: now + ttl,
            },
        );
        token
    }

    async fn lookup(&self, token: &str, kind: TokenKind) -> Option<UserId> {
        let tokens = self.tokens.read().await;
        tokens
            .get(token)
            .filter(|t| t.kind == kind && t.expires_at > Utc::now())
            .map(|t| t.user_id)
    }

    /// Issue a fresh access/refresh token pair.
    pub async fn issue(&self, user_id: UserId) -> TokenPair {
        TokenPair {
            access_token: self.insert(user_id, TokenKind::Access).await,
            refresh_token: self.insert(user_id, TokenKind::Refresh).await,
            token_type: "bearer".to_string(),
            expires_in: self.access_ttl.num_seconds(),
        }
    }

    /// Resolve a live access token to its user.
    pub async fn access_user(&self, token: &str) -> Option<UserId> {
        self.lookup(token, TokenKind::Access).await
    }

    /// Resolve a live refresh token to its user.
    pub async fn refresh_user(&self, token: &str) -> Option<UserId> {
        self.lookup(token, TokenKind::Refresh).await
    }

    /// Issue a new access token.
    pub async fn issue_access(&self, user_id: UserId) -> String {
        self.insert(user_id, TokenKind::Access).await
    }

    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    pub async fn revoke(&self, token: &str) {
        self.tokens.write().await.remove(token);
    }

    /// Drop every token held by a user.
    pub async fn revoke_user(&self, user_id: UserId) {
        self.tokens
            .write()
            .await
            .retain(|_, t| t.user_id != user_id);
    }
}

/// Login request payload
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub usercode: String,
    pub password: String,
}

/// Login response
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub usercode: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub success: bool,
    pub message: String,
}

/// Authentication status response
#[derive(Debug, Serialize)]
pub struct AuthStatusResponse {
    pub authenticated: bool,
    pub usercode: Option<String>,
    pub role: Option<Role>,
    pub methods: Vec<String>,
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

/// Resolve a bearer credential: the API key or a live access token.
async fn principal_for_token(state: &AppState, token: &str) -> Option<Principal> {
    if state.auth_config().verify_api_key(token) {
        return Some(Principal::Service);
    }
    let user_id = state.tokens().access_user(token).await?;
    state.principal_for(user_id).await
}

/// Authentication middleware that checks the session, then the bearer header.
pub async fn auth_middleware(
    State(state): State<AppState>,
    session: Session,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let mut principal = None;

    if let Ok(Some(user_id)) = session.get::<UserId>(SESSION_USER_KEY).await {
        principal = state.principal_for(user_id).await;
    }

    if principal.is_none() {
        if let Some(token) = bearer_token(&request) {
            principal = principal_for_token(&state, token).await;
        }
    }

    match principal {
        Some(principal) => {
            request.extensions_mut().insert(principal);
            Ok(next.run(request).await)
        }
        None => Err(StatusCode::UNAUTHORIZED),
    }
}

fn unauthorized(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (StatusCode::UNAUTHORIZED, Json(ErrorResponse::new(message)))
}

/// Login handler
pub async fn login_handler(
    State(state): State<AppState>,
    session: Session,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, (StatusCode, Json<ErrorResponse>)> {
    let user = state.catalog().await.user_by_code(&payload.usercode).cloned();
    let Some(user) = user else {
        debug!("Login attempt for unknown usercode '{}'", payload.usercode);
        return Err(unauthorized("Invalid usercode or password"));
    };

    let hash = user.password_hash.clone();
    let password = payload.password;
    let verified = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .ok()
        .and_then(|result| result.ok())
        .unwrap_or(false);
    if !verified {
        warn!("Failed login for '{}'", user.usercode);
        return Err(unauthorized("Invalid usercode or password"));
    }

    session
        .insert(SESSION_USER_KEY, user.id)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::with_details(
                    "Failed to store session",
                    e.to_string(),
                )),
            )
        })?;

    let tokens = state.tokens().issue(user.id).await;
    info!("User '{}' logged in", user.usercode);

    Ok(Json(LoginResponse {
        tokens,
        usercode: user.usercode,
        role: user.role,
    }))
}

/// Exchange a refresh token for a new access token.
pub async fn refresh_handler(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, (StatusCode, Json<ErrorResponse>)> {
    let user_id = state
        .tokens()
        .refresh_user(&payload.refresh_token)
        .await
        .ok_or_else(|| unauthorized("Invalid or expired refresh token"))?;

    // The user may have been deleted since the token was issued
    if state.principal_for(user_id).await.is_none() {
        state.tokens().revoke(&payload.refresh_token).await;
        return Err(unauthorized("User no longer exists"));
    }

    Ok(Json(RefreshResponse {
        access_token: state.tokens().issue_access(user_id).await,
        token_type: "bearer".to_string(),
        expires_in: state.tokens().access_ttl_seconds(),
    }))
}

/// Logout handler
pub async fn logout_handler(
    State(state): State<AppState>,
    session: Session,
    request: Request,
) -> Result<Json<LogoutResponse>, StatusCode> {
    if let Some(token) = bearer_token(&request) {
        state.tokens().revoke(token).await;
    }

    session
        .delete()
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(LogoutResponse {
        success: true,
        message: "Logged out successfully".to_string(),
    }))
}

/// Get authentication status
pub async fn auth_status_handler(
    State(state): State<AppState>,
    session: Session,
    request: Request,
) -> Json<AuthStatusResponse> {
    let mut principal = None;
    if let Ok(Some(user_id)) = session.get::<UserId>(SESSION_USER_KEY).await {
        principal = state.principal_for(user_id).await;
    }
    if principal.is_none() {
        if let Some(token) = bearer_token(&request) {
            principal = principal_for_token(&state, token).await;
        }
    }

    let mut methods = vec!["session".to_string(), "bearer".to_string()];
    if state.auth_config().has_api_key_auth() {
        methods.push("api_key".to_string());
    }

    let (usercode, role) = match &principal {
        Some(Principal::User { usercode, role, .. }) => (Some(usercode.clone()), Some(*role)),
        _ => (None, None),
    };

    Json(AuthStatusResponse {
        authenticated: principal.is_some(),
        usercode,
        role,
        methods,
    })
}

/// Helper function to generate password hash for setup
/// Usage: echo "password" | tardet hash-password
pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> AuthConfig {
        AuthConfig {
            bcrypt_cost: 4,
            ..Default::default()
        }
    }

    #[test]
    fn test_password_hashing() {
        let config = fast_config();
        let password = "test_password_123";
        let hash = config.hash_password(password).unwrap();

        assert!(bcrypt::verify(password, &hash).unwrap());
        assert!(!bcrypt::verify("wrong_password", &hash).unwrap());
    }

    #[test]
    fn test_api_key_verification() {
        let mut config = fast_config();
        assert!(!config.has_api_key_auth());
        assert!(!config.verify_api_key("anything"));

        config.api_key = Some("sekret".to_string());
        assert!(config.verify_api_key("sekret"));
        assert!(!config.verify_api_key("sekret2"));
    }

    #[test]
    fn test_principal_roles() {
        let admin = Principal::User {
            id: Uuid::new_v4(),
            usercode: "root".to_string(),
            role: Role::Admin,
        };
        let user = Principal::User {
            id: Uuid::new_v4(),
            usercode: "guard".to_string(),
            role: Role::User,
        };

        assert!(admin.require_admin().is_ok());
        assert_eq!(
            user.require_admin().unwrap_err().0,
            StatusCode::FORBIDDEN
        );
        assert!(Principal::Service.require_admin().is_err());
        assert_eq!(Principal::Service.user_id(), None);
    }

    #[tokio::test]
    async fn test_token_kinds_are_not_interchangeable() {
        let registry = TokenRegistry::new(&fast_config());
        let user_id = Uuid::new_v4();
        let pair = registry.issue(user_id).await;

        assert_eq!(pair.token_type, "bearer");
        assert_eq!(pair.expires_in, 30 * 60);
        assert_eq!(registry.access_user(&pair.access_token).await, Some(user_id));
        assert_eq!(registry.access_user(&pair.refresh_token).await, None);
        assert_eq!(registry.refresh_user(&pair.refresh_token).await, Some(user_id));
        assert_eq!(registry.refresh_user(&pair.access_token).await, None);
    }

    #[tokio::test]
    async fn test_expired_tokens_are_rejected() {
        let registry = TokenRegistry::new(&AuthConfig {
            access_token_ttl_minutes: 0,
            ..fast_config()
        });
        let token = registry.issue_access(Uuid::new_v4()).await;
        assert_eq!(registry.access_user(&token).await, None);
    }

    #[tokio::test]
    async fn test_revoke_user_drops_all_tokens() {
        let registry = TokenRegistry::new(&fast_config());
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let a = registry.issue(alice).await;
        let b = registry.issue(bob).await;

        registry.revoke_user(alice).await;
        assert_eq!(registry.access_user(&a.access_token).await, None);
        assert_eq!(registry.refresh_user(&a.refresh_token).await, None);
        assert_eq!(registry.access_user(&b.access_token).await, Some(bob));
    }
}
