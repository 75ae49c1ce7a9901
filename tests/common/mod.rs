//! Shared helpers for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;

use auth_gateway::config::{JwtConfig, ProviderConfig, ProxyConfig};
use auth_gateway::gateway::forward::ProxyForwarder;
use auth_gateway::gateway::router::AppState;
use auth_gateway::keys::generate_key_pair;
use auth_gateway::provider::HttpIdentityProvider;
use auth_gateway::token::TokenEngine;

/// Serve `app` on an ephemeral port and return its address.
pub async fn spawn_server(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Gateway state with a freshly generated signing key, wired to the given
/// provider and upstream URLs.
#[allow(dead_code)]
pub fn gateway_state(provider_url: &str, upstream_url: &str) -> Arc<AppState> {
    gateway_state_with(provider_url, upstream_url, ProxyConfig {
        upstream_url: upstream_url.to_string(),
        ..ProxyConfig::default()
    })
}

/// Same as [`gateway_state`] but with full control over the proxy settings
/// (used to shrink the forward timeout).
#[allow(dead_code)]
pub fn gateway_state_with(
    provider_url: &str,
    upstream_url: &str,
    proxy: ProxyConfig,
) -> Arc<AppState> {
    let pair = generate_key_pair().unwrap();
    let jwt = JwtConfig {
        private_key: pair.private_jwk.to_string(),
        issuer: "https://auth.test".to_string(),
        ..JwtConfig::default()
    };
    let provider_config = ProviderConfig {
        url: provider_url.to_string(),
        anon_key: "test-anon-key".to_string(),
        service_role_key: "test-service-key".to_string(),
    };
    let proxy = ProxyConfig {
        upstream_url: upstream_url.to_string(),
        ..proxy
    };

    Arc::new(AppState {
        tokens: TokenEngine::new(&jwt).unwrap(),
        provider: Arc::new(HttpIdentityProvider::new(&provider_config).unwrap()),
        forwarder: ProxyForwarder::new(&proxy).unwrap(),
    })
}
