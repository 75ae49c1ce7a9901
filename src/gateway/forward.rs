//! Upstream request forwarder.
//!
//! Replays an authenticated request against the configured upstream. Headers
//! cross the boundary filtered: hop-by-hop and framing headers are dropped
//! (the client re-frames the request itself), and the verified identity is
//! injected as `x-user-*` headers — always all three, empty when the claim
//! was absent, so the upstream can trust their presence.
//!
//! JSON responses are buffered and re-emitted; everything else streams
//! through chunk by chunk without buffering.

use axum::{
    Json,
    body::Body,
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ProxyConfig;
use crate::token::Identity;
use crate::{Error, Result};

/// Request headers never forwarded upstream. `host` and the framing headers
/// are recomputed by the outbound client; `accept-encoding` is dropped so the
/// upstream responds unencoded and the body can be relayed as-is.
const DROPPED_REQUEST_HEADERS: [&str; 4] =
    ["host", "content-length", "connection", "accept-encoding"];

/// Response headers never relayed back: the relay re-frames the body.
const DROPPED_RESPONSE_HEADERS: [&str; 3] = ["content-length", "transfer-encoding", "connection"];

/// Forwards authenticated requests to the upstream service.
pub struct ProxyForwarder {
    http: reqwest::Client,
    upstream_url: String,
}

impl ProxyForwarder {
    /// Build a forwarder with the configured total-request timeout.
    /// Redirects are followed upstream rather than relayed to the client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] when the HTTP client cannot be built; the
    /// timeout and redirect policy are load-bearing, so there is no default
    /// client to fall back to.
    pub fn new(config: &ProxyConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| Error::Internal(format!("failed to build proxy client: {e}")))?;

        Ok(Self {
            http,
            upstream_url: config.upstream_url.trim_end_matches('/').to_string(),
        })
    }

    /// Forward one request and relay the upstream response.
    ///
    /// # Errors
    ///
    /// [`Error::GatewayTimeout`] when the upstream exceeds the timeout,
    /// [`Error::BadGateway`] for connection and protocol failures.
    pub async fn forward(
        &self,
        identity: &Identity,
        method: &Method,
        path: &str,
        query: Option<&str>,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<Response> {
        // The wildcard capture already excludes the leading slash; strip one
        // defensively so the join never doubles it.
        let path = path.strip_prefix('/').unwrap_or(path);
        let mut url = format!("{}/{path}", self.upstream_url);
        if let Some(q) = query {
            url.push('?');
            url.push_str(q);
        }

        let outbound_method = reqwest::Method::from_bytes(method.as_str().as_bytes())
            .map_err(|_| Error::BadRequest(format!("unsupported method: {method}")))?;

        debug!(method = %method, url = %url, "Forwarding request upstream");

        let response = self
            .http
            .request(outbound_method, &url)
            .headers(outbound_headers(headers, identity))
            .body(body)
            .send()
            .await
            .map_err(|e| map_forward_error(&e))?;

        relay_response(response).await
    }
}

/// Build the outbound header set: everything the client sent minus the
/// dropped list, plus the identity headers.
fn outbound_headers(headers: &HeaderMap, identity: &Identity) -> reqwest::header::HeaderMap {
    let mut outbound = reqwest::header::HeaderMap::new();

    for (name, value) in headers {
        if DROPPED_REQUEST_HEADERS.contains(&name.as_str()) {
            continue;
        }
        // Conversion goes through bytes so nothing couples to header types.
        if let (Ok(n), Ok(v)) = (
            reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes()),
            reqwest::header::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            outbound.append(n, v);
        }
    }

    outbound.insert("x-user-id", identity_header(&identity.sub));
    outbound.insert("x-user-email", identity_header(&identity.email));
    outbound.insert("x-user-role", identity_header(&identity.role));

    outbound
}

fn identity_header(value: &str) -> reqwest::header::HeaderValue {
    reqwest::header::HeaderValue::from_str(value)
        .unwrap_or_else(|_| reqwest::header::HeaderValue::from_static(""))
}

/// Relay an upstream response: JSON is buffered and re-emitted, anything
/// else streams through.
async fn relay_response(response: reqwest::Response) -> Result<Response> {
    let status = StatusCode::from_u16(response.status().as_u16())
        .map_err(|e| Error::Internal(format!("upstream status: {e}")))?;
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if content_type.starts_with("application/json") {
        let bytes = response.bytes().await.map_err(|e| map_forward_error(&e))?;
        return match serde_json::from_slice::<Value>(&bytes) {
            Ok(payload) => Ok((status, Json(payload)).into_response()),
            // Claimed JSON but does not parse: relay the raw payload.
            Err(_) => Ok((
                status,
                [(axum::http::header::CONTENT_TYPE, content_type)],
                bytes,
            )
                .into_response()),
        };
    }

    let mut builder = Response::builder().status(status);
    for (name, value) in response.headers() {
        if DROPPED_RESPONSE_HEADERS.contains(&name.as_str()) {
            continue;
        }
        builder = builder.header(name.as_str(), value.as_bytes());
    }

    builder
        .body(Body::from_stream(response.bytes_stream()))
        .map_err(|e| Error::Internal(format!("failed to build relay response: {e}")))
}

/// Map an outbound client error onto the gateway's taxonomy.
fn map_forward_error(e: &reqwest::Error) -> Error {
    if e.is_timeout() {
        warn!(error = %e, "Upstream request timed out");
        Error::GatewayTimeout
    } else {
        warn!(error = %e, "Upstream request failed");
        Error::BadGateway(e.to_string())
    }
}
