//! Authentication Gateway Library
//!
//! A reverse proxy that puts an authentication boundary in front of an
//! upstream service.
//!
//! # Features
//!
//! - **ES256 tokens**: access/refresh pairs signed with a local P-256 key
//! - **JWKS verification**: externally issued tokens resolve keys by `kid`
//!   from a cached JWKS endpoint with single-flight refresh
//! - **Identity injection**: verified claims cross to the upstream as
//!   `x-user-*` headers, never as the raw token
//! - **Streaming relay**: non-JSON upstream responses stream through without
//!   buffering

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod keys;
pub mod provider;
pub mod token;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
