//! External identity provider client.
//!
//! The account database is not ours: signup/login/password checks are
//! delegated to a GoTrue-style HTTP provider. Login and signup failures are
//! hard failures; the admin lookup used during refresh is soft — callers
//! fall back to the claims embedded in the refresh token when it fails.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::config::ProviderConfig;
use crate::{Error, Result};

/// A user record as the provider reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderUser {
    /// Provider-assigned user id (the token `sub`).
    pub id: String,
    /// Email address.
    #[serde(default)]
    pub email: Option<String>,
    /// Role; providers commonly report `"authenticated"`.
    #[serde(default)]
    pub role: Option<String>,
    /// Free-form per-user metadata.
    #[serde(default)]
    pub user_metadata: Option<Map<String, Value>>,
    /// Free-form application metadata.
    #[serde(default)]
    pub app_metadata: Option<Map<String, Value>>,
}

/// Identity provider operations the gateway depends on.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Register a new account. Hard failure on provider rejection.
    async fn sign_up(&self, email: &str, password: &str) -> Result<ProviderUser>;

    /// Exchange credentials for the user record. Hard failure on bad
    /// credentials.
    async fn sign_in(&self, email: &str, password: &str) -> Result<ProviderUser>;

    /// Admin lookup by user id, used by refresh to re-resolve current
    /// attributes.
    async fn get_user_by_id(&self, user_id: &str) -> Result<ProviderUser>;
}

/// HTTP implementation against a GoTrue-style API.
pub struct HttpIdentityProvider {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    service_role_key: String,
}

/// Shape of a password-grant token response; only the user record matters
/// here since the gateway mints its own tokens.
#[derive(Debug, Deserialize)]
struct PasswordGrantResponse {
    user: ProviderUser,
}

impl HttpIdentityProvider {
    /// Build from configuration, resolving `env:` key references.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] when the HTTP client cannot be built.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Internal(format!("failed to build provider client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.resolve_anon_key(),
            service_role_key: config.resolve_service_role_key(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn sign_up(&self, email: &str, password: &str) -> Result<ProviderUser> {
        let response = self
            .http
            .post(self.endpoint("/auth/v1/signup"))
            .header("apikey", &self.anon_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| Error::BadGateway(e.to_string()))?;

        if !response.status().is_success() {
            debug!(status = %response.status(), "Provider rejected signup");
            return Err(Error::BadRequest("Signup failed".to_string()));
        }

        response
            .json::<ProviderUser>()
            .await
            .map_err(|e| Error::BadGateway(e.to_string()))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<ProviderUser> {
        let response = self
            .http
            .post(self.endpoint("/auth/v1/token"))
            .query(&[("grant_type", "password")])
            .header("apikey", &self.anon_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| Error::BadGateway(e.to_string()))?;

        if !response.status().is_success() {
            debug!(status = %response.status(), "Provider rejected login");
            return Err(Error::Unauthenticated);
        }

        let grant = response
            .json::<PasswordGrantResponse>()
            .await
            .map_err(|e| Error::BadGateway(e.to_string()))?;

        Ok(grant.user)
    }

    async fn get_user_by_id(&self, user_id: &str) -> Result<ProviderUser> {
        let response = self
            .http
            .get(self.endpoint(&format!("/auth/v1/admin/users/{user_id}")))
            .header("apikey", &self.service_role_key)
            .bearer_auth(&self.service_role_key)
            .send()
            .await
            .map_err(|e| Error::BadGateway(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::BadGateway(format!(
                "admin user lookup returned {}",
                response.status()
            )));
        }

        response
            .json::<ProviderUser>()
            .await
            .map_err(|e| Error::BadGateway(e.to_string()))
    }
}
