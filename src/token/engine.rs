//! Token issuance and verification.
//!
//! One engine instance per process. Issuance signs with the configured
//! private key; verification resolves the key by the token's `kid` — the
//! local key for self-issued tokens, the JWKS cache for anything else — and
//! folds every internal failure into the single unauthenticated class.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, Header, encode};
use serde_json::{Map, Value, json};
use tracing::warn;
use uuid::Uuid;

use super::claims::{AmrEntry, Identity, RefreshedAccess, TokenClaims, TokenPair, TokenType};
use super::jwks::JwksCache;
use super::verify::{Verifier, VerifierOptions};
use super::TokenError;
use crate::config::JwtConfig;
use crate::keys::SigningKey;
use crate::provider::{IdentityProvider, ProviderUser};
use crate::{Error, Result};

/// Issues and verifies the gateway's tokens.
pub struct TokenEngine {
    signing_key: SigningKey,
    verifier: Verifier,
    jwks: JwksCache,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenEngine {
    /// Build the engine from configuration. Fails fast when the signing key
    /// is absent or unusable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] or [`Error::KeySetup`] when the private JWK
    /// cannot be loaded, [`Error::Internal`] when the JWKS HTTP client
    /// cannot be built.
    pub fn new(config: &JwtConfig) -> Result<Self> {
        let signing_key = SigningKey::from_private_jwk(&config.resolve_private_key())?;
        let verifier = Verifier::new(
            config.issuer.clone(),
            config.audience.clone(),
            VerifierOptions {
                leeway: config.leeway,
                ..VerifierOptions::default()
            },
        );
        let jwks = JwksCache::new(config.jwks_url(), config.jwks.ttl, config.jwks.fetch_timeout)?;

        Ok(Self {
            signing_key,
            verifier,
            jwks,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            access_ttl: config.access_ttl,
            refresh_ttl: config.refresh_ttl,
        })
    }

    /// Issue a matched access/refresh pair for a resolved user.
    ///
    /// Both tokens share a freshly drawn `session_id`. Issuance is
    /// all-or-nothing: if either signature fails, no pair is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] when signing fails.
    pub fn issue_token_pair(&self, user: &ProviderUser) -> Result<TokenPair> {
        let now = Utc::now().timestamp();
        let session_id = Uuid::new_v4().to_string();

        let access = self.access_claims(user, &session_id, now);
        let refresh = TokenClaims {
            iss: self.issuer.clone(),
            sub: user.id.clone(),
            aud: self.audience.clone(),
            exp: now + ttl_secs(self.refresh_ttl),
            iat: now,
            email: None,
            phone: None,
            role: None,
            user_metadata: None,
            app_metadata: None,
            aal: None,
            amr: None,
            session_id: session_id.clone(),
            token_type: TokenType::Refresh,
            is_anonymous: false,
        };

        let access_token = self.sign(&access)?;
        let refresh_token = self.sign(&refresh)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.access_ttl.as_secs(),
            token_type: "bearer".to_string(),
            session_id,
        })
    }

    /// Mint a new access token from a refresh token.
    ///
    /// The refresh token gets the full verification treatment. Current user
    /// attributes are re-resolved from the provider so the new access token
    /// reflects them; when the lookup fails, the claims embedded in the
    /// refresh token are used instead. The session continues: the new access
    /// token carries the refresh token's `session_id`, and the refresh token
    /// itself is not rotated.
    ///
    /// # Errors
    ///
    /// [`Error::Unauthenticated`] for any verification failure,
    /// [`Error::Internal`] when signing fails.
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
        provider: &dyn IdentityProvider,
    ) -> Result<RefreshedAccess> {
        let claims = self.verify_claims(refresh_token, TokenType::Refresh).await?;

        let user = match provider.get_user_by_id(&claims.sub).await {
            Ok(user) => user,
            Err(e) => {
                warn!(sub = %claims.sub, error = %e, "User lookup failed during refresh; using embedded claims");
                ProviderUser {
                    id: claims.sub.clone(),
                    email: claims.email.clone(),
                    role: claims.role.clone(),
                    user_metadata: claims.user_metadata.clone(),
                    app_metadata: claims.app_metadata.clone(),
                }
            }
        };

        let now = Utc::now().timestamp();
        let access = self.access_claims(&user, &claims.session_id, now);
        let access_token = self.sign(&access)?;

        Ok(RefreshedAccess {
            access_token,
            expires_in: self.access_ttl.as_secs(),
            token_type: "bearer".to_string(),
        })
    }

    /// Verify an access token and project it to an [`Identity`].
    ///
    /// # Errors
    ///
    /// [`Error::Unauthenticated`] for every failure mode; the distinguishing
    /// detail is logged, never returned.
    pub async fn verify(&self, token: &str) -> Result<Identity> {
        let claims = self.verify_claims(token, TokenType::Access).await?;
        Ok(Identity::from(claims))
    }

    /// Shared verification path: resolve the key by kid, then check
    /// signature and claims.
    async fn verify_claims(&self, token: &str, expected_type: TokenType) -> Result<TokenClaims> {
        let result = self.try_verify(token, expected_type).await;
        result.map_err(|e| {
            warn!(error = %e, "Token verification failed");
            Error::Unauthenticated
        })
    }

    async fn try_verify(
        &self,
        token: &str,
        expected_type: TokenType,
    ) -> std::result::Result<TokenClaims, TokenError> {
        let kid = Verifier::key_id(token)?;

        if kid == self.signing_key.kid() {
            return self
                .verifier
                .verify(token, self.signing_key.decoding_key(), expected_type);
        }

        let key: DecodingKey = self.jwks.get_public_key(&kid).await?;
        self.verifier.verify(token, &key, expected_type)
    }

    fn access_claims(&self, user: &ProviderUser, session_id: &str, now: i64) -> TokenClaims {
        let email = user.email.clone().unwrap_or_default();
        let user_metadata = user
            .user_metadata
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| default_user_metadata(&user.id, &email));
        let app_metadata = user
            .app_metadata
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(default_app_metadata);

        TokenClaims {
            iss: self.issuer.clone(),
            sub: user.id.clone(),
            aud: self.audience.clone(),
            exp: now + ttl_secs(self.access_ttl),
            iat: now,
            email: Some(email),
            phone: Some(String::new()),
            role: Some(
                user.role
                    .clone()
                    .unwrap_or_else(|| "authenticated".to_string()),
            ),
            user_metadata: Some(user_metadata),
            app_metadata: Some(app_metadata),
            aal: Some("aal1".to_string()),
            amr: Some(vec![AmrEntry {
                method: "password".to_string(),
                timestamp: now,
            }]),
            session_id: session_id.to_string(),
            token_type: TokenType::Access,
            is_anonymous: false,
        }
    }

    fn sign(&self, claims: &TokenClaims) -> Result<String> {
        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(self.signing_key.kid().to_string());
        encode(&header, claims, self.signing_key.encoding_key())
            .map_err(|e| Error::Internal(format!("token signing failed: {e}")))
    }
}

fn ttl_secs(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)
}

fn default_user_metadata(sub: &str, email: &str) -> Map<String, Value> {
    let mut m = Map::new();
    m.insert("email".to_string(), json!(email));
    m.insert("email_verified".to_string(), json!(true));
    m.insert("phone_verified".to_string(), json!(false));
    m.insert("sub".to_string(), json!(sub));
    m
}

fn default_app_metadata() -> Map<String, Value> {
    let mut m = Map::new();
    m.insert("provider".to_string(), json!("email"));
    m.insert("providers".to_string(), json!(["email"]));
    m
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::keys::generate_key_pair;

    fn test_engine() -> TokenEngine {
        let pair = generate_key_pair().unwrap();
        let config = JwtConfig {
            private_key: pair.private_jwk.to_string(),
            issuer: "https://auth.test".to_string(),
            ..JwtConfig::default()
        };
        TokenEngine::new(&config).unwrap()
    }

    fn test_user() -> ProviderUser {
        ProviderUser {
            id: "user-1".to_string(),
            email: Some("a@example.com".to_string()),
            role: Some("authenticated".to_string()),
            user_metadata: None,
            app_metadata: None,
        }
    }

    struct UnavailableProvider;

    #[async_trait]
    impl IdentityProvider for UnavailableProvider {
        async fn sign_up(&self, _: &str, _: &str) -> Result<ProviderUser> {
            Err(Error::BadGateway("down".to_string()))
        }
        async fn sign_in(&self, _: &str, _: &str) -> Result<ProviderUser> {
            Err(Error::BadGateway("down".to_string()))
        }
        async fn get_user_by_id(&self, _: &str) -> Result<ProviderUser> {
            Err(Error::BadGateway("down".to_string()))
        }
    }

    struct RenamingProvider;

    #[async_trait]
    impl IdentityProvider for RenamingProvider {
        async fn sign_up(&self, _: &str, _: &str) -> Result<ProviderUser> {
            unimplemented!()
        }
        async fn sign_in(&self, _: &str, _: &str) -> Result<ProviderUser> {
            unimplemented!()
        }
        async fn get_user_by_id(&self, id: &str) -> Result<ProviderUser> {
            Ok(ProviderUser {
                id: id.to_string(),
                email: Some("renamed@example.com".to_string()),
                role: Some("authenticated".to_string()),
                user_metadata: None,
                app_metadata: None,
            })
        }
    }

    #[tokio::test]
    async fn issued_access_token_verifies() {
        let engine = test_engine();
        let pair = engine.issue_token_pair(&test_user()).unwrap();

        let identity = engine.verify(&pair.access_token).await.unwrap();
        assert_eq!(identity.sub, "user-1");
        assert_eq!(identity.email, "a@example.com");
        assert_eq!(identity.role, "authenticated");
    }

    #[tokio::test]
    async fn access_claims_carry_default_metadata() {
        let engine = test_engine();
        let pair = engine.issue_token_pair(&test_user()).unwrap();

        let claims = engine
            .verify_claims(&pair.access_token, TokenType::Access)
            .await
            .unwrap();
        let user_md = claims.user_metadata.unwrap();
        assert_eq!(user_md["email"], json!("a@example.com"));
        assert_eq!(user_md["email_verified"], json!(true));
        let app_md = claims.app_metadata.unwrap();
        assert_eq!(app_md["provider"], json!("email"));
        assert_eq!(claims.aal.as_deref(), Some("aal1"));
        assert_eq!(claims.phone.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn refresh_token_is_rejected_as_access_token() {
        let engine = test_engine();
        let pair = engine.issue_token_pair(&test_user()).unwrap();

        let err = engine.verify(&pair.refresh_token).await.unwrap_err();
        assert!(matches!(err, Error::Unauthenticated));
    }

    #[tokio::test]
    async fn pair_shares_one_session_id() {
        let engine = test_engine();
        let pair = engine.issue_token_pair(&test_user()).unwrap();

        let access = engine
            .verify_claims(&pair.access_token, TokenType::Access)
            .await
            .unwrap();
        let refresh = engine
            .verify_claims(&pair.refresh_token, TokenType::Refresh)
            .await
            .unwrap();

        assert_eq!(access.session_id, pair.session_id);
        assert_eq!(refresh.session_id, pair.session_id);
    }

    #[tokio::test]
    async fn tampered_token_is_unauthenticated() {
        let engine = test_engine();
        let pair = engine.issue_token_pair(&test_user()).unwrap();

        let mut tampered = pair.access_token.clone();
        tampered.pop();
        tampered.push('A');

        let err = engine.verify(&tampered).await.unwrap_err();
        assert!(matches!(err, Error::Unauthenticated));
    }

    #[tokio::test]
    async fn token_from_another_key_is_unauthenticated() {
        // Same issuer/audience, different key: the kid neither matches the
        // local key nor resolves from the (unreachable) JWKS endpoint.
        let engine_a = test_engine();
        let engine_b = test_engine();
        let pair = engine_b.issue_token_pair(&test_user()).unwrap();

        let err = engine_a.verify(&pair.access_token).await.unwrap_err();
        assert!(matches!(err, Error::Unauthenticated));
    }

    #[tokio::test]
    async fn refresh_falls_back_to_embedded_claims() {
        let engine = test_engine();
        let pair = engine.issue_token_pair(&test_user()).unwrap();

        let refreshed = engine
            .refresh_access_token(&pair.refresh_token, &UnavailableProvider)
            .await
            .unwrap();
        let claims = engine
            .verify_claims(&refreshed.access_token, TokenType::Access)
            .await
            .unwrap();

        assert_eq!(claims.sub, "user-1");
        // Session continues across the refresh.
        assert_eq!(claims.session_id, pair.session_id);
    }

    #[tokio::test]
    async fn refresh_picks_up_current_user_attributes() {
        let engine = test_engine();
        let pair = engine.issue_token_pair(&test_user()).unwrap();

        let refreshed = engine
            .refresh_access_token(&pair.refresh_token, &RenamingProvider)
            .await
            .unwrap();
        let claims = engine
            .verify_claims(&refreshed.access_token, TokenType::Access)
            .await
            .unwrap();

        assert_eq!(claims.email.as_deref(), Some("renamed@example.com"));
    }

    #[tokio::test]
    async fn expiry_within_leeway_is_accepted() {
        let engine = test_engine();
        let now = Utc::now().timestamp();
        let mut claims = engine.access_claims(&test_user(), "s-1", now - 3600);
        claims.exp = now - 5; // expired, but inside the 10s leeway

        let token = engine.sign(&claims).unwrap();
        assert!(engine.verify(&token).await.is_ok());
    }

    #[tokio::test]
    async fn expiry_past_leeway_is_rejected() {
        let engine = test_engine();
        let now = Utc::now().timestamp();
        let mut claims = engine.access_claims(&test_user(), "s-1", now - 3600);
        claims.exp = now - 60;

        let token = engine.sign(&claims).unwrap();
        let err = engine.verify(&token).await.unwrap_err();
        assert!(matches!(err, Error::Unauthenticated));
    }

    #[tokio::test]
    async fn verification_is_repeatable() {
        let engine = test_engine();
        let pair = engine.issue_token_pair(&test_user()).unwrap();

        let first = engine.verify(&pair.access_token).await.unwrap();
        let second = engine.verify(&pair.access_token).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn access_token_is_rejected_for_refresh() {
        let engine = test_engine();
        let pair = engine.issue_token_pair(&test_user()).unwrap();

        let err = engine
            .refresh_access_token(&pair.access_token, &UnavailableProvider)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthenticated));
    }
}
