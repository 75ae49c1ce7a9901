//! Gateway server.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

use super::forward::ProxyForwarder;
use super::router::{AppState, create_router};
use crate::config::Config;
use crate::provider::HttpIdentityProvider;
use crate::token::TokenEngine;
use crate::{Error, Result};

/// Authentication gateway server.
pub struct Gateway {
    config: Config,
}

impl Gateway {
    /// Create a new gateway. Fails fast on incomplete configuration so a
    /// misconfigured process never starts listening.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when required fields are missing.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Run the gateway until a shutdown signal arrives.
    ///
    /// # Errors
    ///
    /// Key setup, bind, and serve failures.
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let tokens = TokenEngine::new(&self.config.jwt)?;
        let provider = Arc::new(HttpIdentityProvider::new(&self.config.provider)?);
        let forwarder = ProxyForwarder::new(&self.config.proxy)?;

        let state = Arc::new(AppState {
            tokens,
            provider,
            forwarder,
        });
        let app = create_router(state);

        let listener = TcpListener::bind(addr).await?;

        info!("AUTH GATEWAY v{}", env!("CARGO_PKG_VERSION"));
        info!(host = %self.config.server.host, port = %self.config.server.port, "Listening");
        info!(issuer = %self.config.jwt.issuer, "Token issuance ready");
        info!(provider = %self.config.provider.url, "Identity provider");
        info!(upstream = %self.config.proxy.upstream_url, "Proxy upstream");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        info!("Gateway stopped");
        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
