//! End-to-end token flows: signup, login, protected access, refresh.
//!
//! The external identity provider is a local stub; the gateway under test is
//! driven in-process through its router.

mod common;

use axum::{
    Json, Router,
    body::Body,
    extract::Path,
    http::{Request, StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tower::ServiceExt;

use auth_gateway::gateway::router::create_router;

const GOOD_PASSWORD: &str = "correct-horse";

/// GoTrue-shaped provider stub: one known user, password-checked login, and
/// an admin lookup that reports an updated email address.
fn provider_stub() -> Router {
    Router::new()
        .route(
            "/auth/v1/signup",
            post(|Json(body): Json<Value>| async move {
                Json(json!({
                    "id": "u-123",
                    "email": body["email"],
                    "role": "authenticated"
                }))
            }),
        )
        .route(
            "/auth/v1/token",
            post(|Json(body): Json<Value>| async move {
                if body["password"] == json!(GOOD_PASSWORD) {
                    Json(json!({
                        "user": {
                            "id": "u-123",
                            "email": body["email"],
                            "role": "authenticated"
                        }
                    }))
                    .into_response()
                } else {
                    (
                        StatusCode::BAD_REQUEST,
                        Json(json!({ "error": "invalid_grant" })),
                    )
                        .into_response()
                }
            }),
        )
        .route(
            "/auth/v1/admin/users/{id}",
            get(|Path(id): Path<String>| async move {
                Json(json!({
                    "id": id,
                    "email": "renamed@example.com",
                    "role": "authenticated"
                }))
            }),
        )
}

fn post_json(path: &str, body: &Value) -> Request<Body> {
    Request::post(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_with_bearer(path: &str, token: &str) -> Request<Body> {
    Request::get(path)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn test_app() -> Router {
    let provider_addr = common::spawn_server(provider_stub()).await;
    let state = common::gateway_state(&format!("http://{provider_addr}"), "http://127.0.0.1:1");
    create_router(state)
}

#[tokio::test]
async fn signup_returns_a_usable_token_pair() {
    let app = test_app().await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/auth/signup",
            &json!({
                "email": "new@example.com",
                "password": GOOD_PASSWORD,
                "confirm_password": GOOD_PASSWORD
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let pair = json_body(response).await;
    assert_eq!(pair["token_type"], json!("bearer"));
    assert_eq!(pair["expires_in"], json!(3600));
    assert!(!pair["session_id"].as_str().unwrap().is_empty());

    // The freshly issued access token opens the protected route.
    let access = pair["access_token"].as_str().unwrap();
    let response = app
        .oneshot(get_with_bearer("/auth/protected", access))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["user_id"], json!("u-123"));
    assert_eq!(body["email"], json!("new@example.com"));
}

#[tokio::test]
async fn login_with_wrong_password_is_unauthorized() {
    let app = test_app().await;

    let response = app
        .oneshot(post_json(
            "/auth/login",
            &json!({ "email": "a@example.com", "password": "wrong" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    // The client never learns which check failed.
    assert_eq!(body["detail"], json!("Invalid or expired token"));
}

#[tokio::test]
async fn refresh_mints_a_new_access_token_with_current_attributes() {
    let app = test_app().await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/auth/login",
            &json!({ "email": "old@example.com", "password": GOOD_PASSWORD }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let pair = json_body(response).await;
    let refresh = pair["refresh_token"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(post_json(
            "/auth/refresh",
            &json!({ "refresh_token": refresh }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let refreshed = json_body(response).await;
    assert_eq!(refreshed["token_type"], json!("bearer"));
    assert!(refreshed.get("refresh_token").is_none(), "refresh tokens are not rotated");

    // The new access token works and reflects the provider's current view of
    // the user, not the login-time snapshot.
    let access = refreshed["access_token"].as_str().unwrap();
    let response = app
        .oneshot(get_with_bearer("/auth/protected", access))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["email"], json!("renamed@example.com"));
}

#[tokio::test]
async fn access_token_is_rejected_by_refresh() {
    let app = test_app().await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/auth/login",
            &json!({ "email": "a@example.com", "password": GOOD_PASSWORD }),
        ))
        .await
        .unwrap();
    let pair = json_body(response).await;
    let access = pair["access_token"].as_str().unwrap().to_string();

    let response = app
        .oneshot(post_json(
            "/auth/refresh",
            &json!({ "refresh_token": access }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_token_does_not_open_protected_routes() {
    let app = test_app().await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/auth/login",
            &json!({ "email": "a@example.com", "password": GOOD_PASSWORD }),
        ))
        .await
        .unwrap();
    let pair = json_body(response).await;
    let refresh = pair["refresh_token"].as_str().unwrap().to_string();

    let response = app
        .oneshot(get_with_bearer("/auth/protected", &refresh))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
