//! Error types for the authentication gateway.
//!
//! Verification failures always surface to clients as a single 401 class with
//! a generic message; the specific sub-cause (bad signature, unknown kid,
//! expired, ...) is only ever logged server-side.

use std::io;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Result type alias for the gateway.
pub type Result<T> = std::result::Result<T, Error>;

/// Gateway errors.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (fatal at startup).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The signing key could not be loaded or used.
    #[error("Key setup error: {0}")]
    KeySetup(String),

    /// Token verification failed, for any sub-cause.
    #[error("Unauthenticated")]
    Unauthenticated,

    /// Malformed client request (e.g. signup password mismatch).
    #[error("{0}")]
    BadRequest(String),

    /// The upstream did not respond within the forward timeout.
    #[error("Upstream timed out")]
    GatewayTimeout,

    /// Connection-level failure reaching the upstream (DNS, refused, reset).
    #[error("Upstream unreachable: {0}")]
    BadGateway(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// HTTP status for this error kind.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::GatewayTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message. Never contains internal error text for the
    /// 401/500 classes.
    #[must_use]
    pub fn client_message(&self) -> &str {
        match self {
            Self::Unauthenticated => "Invalid or expired token",
            Self::BadRequest(msg) => msg,
            Self::GatewayTimeout => "Target service did not respond in time",
            Self::BadGateway(_) => "Failed to connect to the target service",
            _ => "Internal gateway error",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "Request failed");
        }

        let body = Json(json!({ "detail": self.client_message() }));

        if matches!(self, Self::Unauthenticated) {
            (status, [("WWW-Authenticate", "Bearer")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}
