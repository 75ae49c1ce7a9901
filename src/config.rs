//! Configuration management.
//!
//! Layered the same way everywhere: YAML file, then `AUTH_GATEWAY_`-prefixed
//! environment variables, then optional `.env` files listed in `env_files`.
//! Secret-bearing values (`jwt.private_key`, provider keys) accept the
//! `env:VAR_NAME` convention so the YAML never has to contain key material.

use std::{env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before resolving `env:` references.
    /// Paths support ~ expansion. Missing files are silently skipped.
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// Token issuance/verification configuration
    pub jwt: JwtConfig,
    /// External identity provider configuration
    pub provider: ProviderConfig,
    /// Upstream proxy configuration
    pub proxy: ProxyConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8600,
        }
    }
}

/// Token engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    /// Private JWK as JSON text (supports `env:VAR_NAME`).
    pub private_key: String,
    /// Expected/emitted `iss` claim.
    pub issuer: String,
    /// Expected/emitted `aud` claim.
    pub audience: String,
    /// Access token lifetime.
    #[serde(with = "humantime_serde")]
    pub access_ttl: Duration,
    /// Refresh token lifetime.
    #[serde(with = "humantime_serde")]
    pub refresh_ttl: Duration,
    /// Clock-skew leeway applied to `exp` checks.
    #[serde(with = "humantime_serde")]
    pub leeway: Duration,
    /// JWKS lookup settings for externally issued tokens.
    pub jwks: JwksConfig,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            private_key: String::new(),
            issuer: String::new(),
            audience: "authenticated".to_string(),
            access_ttl: Duration::from_secs(3600),
            refresh_ttl: Duration::from_secs(30 * 24 * 3600),
            leeway: Duration::from_secs(10),
            jwks: JwksConfig::default(),
        }
    }
}

impl JwtConfig {
    /// Resolve the private key (expand `env:VAR_NAME`).
    #[must_use]
    pub fn resolve_private_key(&self) -> String {
        resolve_secret(&self.private_key)
    }

    /// JWKS URL: explicit override, or the OIDC discovery convention
    /// derived from the issuer.
    #[must_use]
    pub fn jwks_url(&self) -> String {
        self.jwks.url.clone().unwrap_or_else(|| {
            let base = self.issuer.trim_end_matches('/');
            format!("{base}/.well-known/jwks.json")
        })
    }
}

/// JWKS cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JwksConfig {
    /// Explicit JWKS URL; defaults to `{issuer}/.well-known/jwks.json`.
    pub url: Option<String>,
    /// How long a fetched key set stays fresh.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// Timeout for a single JWKS fetch.
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Duration,
}

impl Default for JwksConfig {
    fn default() -> Self {
        Self {
            url: None,
            ttl: Duration::from_secs(3600),
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

/// External identity provider (GoTrue-style HTTP API).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL of the provider.
    pub url: String,
    /// Public (anon) API key sent on signup/login (supports `env:VAR_NAME`).
    pub anon_key: String,
    /// Service-role key for admin user lookup (supports `env:VAR_NAME`).
    pub service_role_key: String,
}

impl ProviderConfig {
    /// Resolve the anon key (expand `env:VAR_NAME`).
    #[must_use]
    pub fn resolve_anon_key(&self) -> String {
        resolve_secret(&self.anon_key)
    }

    /// Resolve the service-role key (expand `env:VAR_NAME`).
    #[must_use]
    pub fn resolve_service_role_key(&self) -> String {
        resolve_secret(&self.service_role_key)
    }
}

/// Upstream proxy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Base URL every forwarded request is replayed against.
    pub upstream_url: String,
    /// Total timeout for one forwarded request. Deliberately generous:
    /// downstream services may be slower than typical API calls.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            upstream_url: String::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed("AUTH_GATEWAY_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        // Make env: references resolvable before anything reads them.
        config.load_env_files();

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = if path_str.starts_with('~') {
                if let Some(home) = dirs::home_dir() {
                    path_str.replacen('~', &home.display().to_string(), 1)
                } else {
                    path_str.clone()
                }
            } else {
                path_str.clone()
            };

            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => {
                        tracing::info!("Loaded env file: {expanded}");
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load env file {expanded}: {e}");
                    }
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// Validate the parts that must be present before serving.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first missing field.
    pub fn validate(&self) -> Result<()> {
        if self.jwt.issuer.is_empty() {
            return Err(Error::Config("jwt.issuer is required".to_string()));
        }
        if self.jwt.audience.is_empty() {
            return Err(Error::Config("jwt.audience is required".to_string()));
        }
        if self.proxy.upstream_url.is_empty() {
            return Err(Error::Config("proxy.upstream_url is required".to_string()));
        }
        if self.provider.url.is_empty() {
            return Err(Error::Config("provider.url is required".to_string()));
        }

        for (field, value) in [
            ("proxy.upstream_url", &self.proxy.upstream_url),
            ("provider.url", &self.provider.url),
            ("jwt.jwks url", &self.jwt.jwks_url()),
        ] {
            url::Url::parse(value)
                .map_err(|e| Error::Config(format!("{field} is not a valid URL: {e}")))?;
        }

        Ok(())
    }
}

/// Expand the `env:VAR_NAME` convention; literal values pass through.
fn resolve_secret(value: &str) -> String {
    if let Some(var_name) = value.strip_prefix("env:") {
        env::var(var_name).unwrap_or_else(|_| value.to_string())
    } else {
        value.to_string()
    }
}
