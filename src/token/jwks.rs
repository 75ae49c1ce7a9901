//! JWKS cache with single-flight refresh.
//!
//! One process-wide instance serves every concurrent verification. A cache
//! miss (unknown kid, or a stale set) triggers exactly one re-fetch per miss
//! episode: concurrent misses queue on the refresh lock and reuse whatever
//! the first one fetched. A kid that is still absent after the refresh is an
//! authentication failure — there is no fallback to a stale or default key.

use std::time::{Duration, Instant};

use jsonwebtoken::{
    DecodingKey,
    jwk::{AlgorithmParameters, JwkSet},
};
use parking_lot::RwLock;
use tracing::debug;

use super::TokenError;
use crate::Error;

struct CachedJwks {
    keys: JwkSet,
    fetched_at: Instant,
}

/// Cache of the remote public key set, keyed by kid on lookup.
pub struct JwksCache {
    jwks_url: String,
    http: reqwest::Client,
    ttl: Duration,
    cached: RwLock<Option<CachedJwks>>,
    /// Serializes refreshes so N simultaneous misses trigger one fetch.
    refresh_lock: tokio::sync::Mutex<()>,
}

impl JwksCache {
    /// Create a cache for `jwks_url` with the given freshness TTL and
    /// per-fetch timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] when the HTTP client cannot be built; a
    /// client without the fetch timeout would let a slow JWKS endpoint stall
    /// verification indefinitely.
    pub fn new(jwks_url: String, ttl: Duration, fetch_timeout: Duration) -> crate::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .build()
            .map_err(|e| Error::Internal(format!("failed to build JWKS client: {e}")))?;

        Ok(Self {
            jwks_url,
            http,
            ttl,
            cached: RwLock::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Return the decoding key for `kid`.
    ///
    /// # Errors
    ///
    /// [`TokenError::UnknownKeyId`] when the kid is absent even after a
    /// refresh; [`TokenError::Http`] when the fetch itself fails.
    pub async fn get_public_key(&self, kid: &str) -> Result<DecodingKey, TokenError> {
        // Fast path: fresh cache containing the kid.
        let seen_generation = {
            let cached = self.cached.read();
            if let Some(entry) = cached.as_ref() {
                if entry.fetched_at.elapsed() < self.ttl {
                    if let Some(key) = find_key(&entry.keys, kid) {
                        return Ok(key);
                    }
                }
                Some(entry.fetched_at)
            } else {
                None
            }
        };

        // Miss episode: take the refresh lock. Whoever lost the race
        // re-checks first; if another task already refreshed, its result is
        // final for this episode.
        let _guard = self.refresh_lock.lock().await;

        {
            let cached = self.cached.read();
            if let Some(entry) = cached.as_ref() {
                if Some(entry.fetched_at) != seen_generation {
                    return find_key(&entry.keys, kid)
                        .ok_or_else(|| TokenError::UnknownKeyId(kid.to_string()));
                }
            }
        }

        debug!(kid = %kid, url = %self.jwks_url, "Refreshing JWKS");
        let keys: JwkSet = self
            .http
            .get(&self.jwks_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let key = find_key(&keys, kid);
        *self.cached.write() = Some(CachedJwks {
            keys,
            fetched_at: Instant::now(),
        });

        key.ok_or_else(|| TokenError::UnknownKeyId(kid.to_string()))
    }
}

/// Find a JWK by `kid` and convert it to a `DecodingKey`. ES256 only.
fn find_key(jwks: &JwkSet, kid: &str) -> Option<DecodingKey> {
    for jwk in &jwks.keys {
        if jwk.common.key_id.as_deref() != Some(kid) {
            continue;
        }

        return match &jwk.algorithm {
            AlgorithmParameters::EllipticCurve(ec) => {
                DecodingKey::from_ec_components(&ec.x, &ec.y).ok()
            }
            _ => None,
        };
    }
    None
}
