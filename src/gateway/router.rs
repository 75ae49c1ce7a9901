//! HTTP router and handlers.

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    body::Body,
    extract::{Path, Request, State},
    middleware,
    response::Response,
    routing::{any, get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use tracing::info;

use super::auth::auth_middleware;
use super::forward::ProxyForwarder;
use crate::provider::IdentityProvider;
use crate::token::{Identity, RefreshedAccess, TokenEngine, TokenPair};
use crate::{Error, Result};

/// Largest request body the proxy will buffer before forwarding.
const MAX_REQUEST_BODY: usize = 32 * 1024 * 1024;

/// Shared application state.
pub struct AppState {
    /// Token issuance and verification
    pub tokens: TokenEngine,
    /// External identity provider
    pub provider: Arc<dyn IdentityProvider>,
    /// Upstream forwarder
    pub forwarder: ProxyForwarder,
}

/// Credentials for login.
#[derive(Debug, Deserialize)]
pub struct Credentials {
    /// Email address
    pub email: String,
    /// Password
    pub password: String,
}

/// Body of a signup request.
#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    /// Email address
    pub email: String,
    /// Password
    pub password: String,
    /// Must match `password`
    pub confirm_password: String,
}

/// Body of a refresh request.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    /// The refresh token from a previous login
    pub refresh_token: String,
}

/// Create the router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/auth/protected", get(protected_handler))
        .route("/proxy/{*path}", any(proxy_handler))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .route("/auth/signup", post(signup_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/refresh", post(refresh_handler))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health
async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// POST /auth/signup - register with the provider, then issue tokens.
async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(signup): Json<SignupRequest>,
) -> Result<Json<TokenPair>> {
    if signup.email.is_empty() {
        return Err(Error::BadRequest("email is required".to_string()));
    }
    if signup.password.is_empty() {
        return Err(Error::BadRequest("password is required".to_string()));
    }
    if signup.password != signup.confirm_password {
        return Err(Error::BadRequest(
            "Password and confirm password do not match".to_string(),
        ));
    }

    let user = state
        .provider
        .sign_up(&signup.email, &signup.password)
        .await?;
    info!(sub = %user.id, "User signed up");
    Ok(Json(state.tokens.issue_token_pair(&user)?))
}

/// POST /auth/login - check credentials with the provider, then issue tokens.
async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<TokenPair>> {
    validate_credentials(&credentials)?;
    let user = state
        .provider
        .sign_in(&credentials.email, &credentials.password)
        .await?;
    info!(sub = %user.id, "User logged in");
    Ok(Json(state.tokens.issue_token_pair(&user)?))
}

/// POST /auth/refresh - mint a new access token from a refresh token.
async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<RefreshedAccess>> {
    if body.refresh_token.is_empty() {
        return Err(Error::BadRequest("refresh_token is required".to_string()));
    }
    let refreshed = state
        .tokens
        .refresh_access_token(&body.refresh_token, state.provider.as_ref())
        .await?;
    Ok(Json(refreshed))
}

/// GET /auth/protected - smoke-test endpoint behind the bearer middleware.
async fn protected_handler(Extension(identity): Extension<Identity>) -> Json<Value> {
    Json(json!({
        "message": "This is a protected route",
        "user_id": identity.sub,
        "email": identity.email,
        "role": identity.role,
    }))
}

/// any /proxy/{*path} - forward an authenticated request upstream.
async fn proxy_handler(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    Extension(identity): Extension<Identity>,
    request: Request<Body>,
) -> Result<Response> {
    let method = request.method().clone();
    let query = request.uri().query().map(ToString::to_string);
    let headers = request.headers().clone();
    let body = axum::body::to_bytes(request.into_body(), MAX_REQUEST_BODY)
        .await
        .map_err(|e| Error::BadRequest(format!("failed to read request body: {e}")))?;

    state
        .forwarder
        .forward(&identity, &method, &path, query.as_deref(), &headers, body)
        .await
}

fn validate_credentials(credentials: &Credentials) -> Result<()> {
    if credentials.email.is_empty() {
        return Err(Error::BadRequest("email is required".to_string()));
    }
    if credentials.password.is_empty() {
        return Err(Error::BadRequest("password is required".to_string()));
    }
    Ok(())
}
