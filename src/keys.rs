//! Signing key management.
//!
//! Keys are P-256 (ES256) pairs carried in JWK form. [`generate_key_pair`]
//! runs at provisioning/rotation time only; [`SigningKey::from_private_jwk`]
//! loads the configured key at startup and is fatal when the material is
//! absent or malformed.

use jsonwebtoken::{DecodingKey, EncodingKey};
use p256::elliptic_curve::rand_core::OsRng;
use p256::pkcs8::{EncodePrivateKey, LineEnding};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{Error, Result};

/// A freshly generated key pair in JWK form.
///
/// The private JWK is what goes into configuration (`jwt.private_key`); the
/// public JWK is what a JWKS endpoint would publish for this kid.
#[derive(Debug, Clone)]
pub struct GeneratedKeyPair {
    /// Key identifier, never reused across invocations.
    pub kid: String,
    /// Private JWK (`kty`, `crv`, `x`, `y`, `d`, `kid`, `use`, `alg`).
    pub private_jwk: Value,
    /// Public JWK (same fields minus `d`).
    pub public_jwk: Value,
}

/// Generate a fresh ES256 key pair with a random kid.
///
/// Each invocation draws a new P-256 key and a new UUIDv4 kid, so kids are
/// never reused.
pub fn generate_key_pair() -> Result<GeneratedKeyPair> {
    let secret = p256::SecretKey::random(&mut OsRng);
    let kid = Uuid::new_v4().to_string();

    let mut private_jwk: Value = serde_json::from_str(&secret.to_jwk_string())?;
    let mut public_jwk: Value = serde_json::from_str(&secret.public_key().to_jwk_string())?;

    for jwk in [&mut private_jwk, &mut public_jwk] {
        let obj = jwk
            .as_object_mut()
            .ok_or_else(|| Error::KeySetup("JWK did not serialize to an object".to_string()))?;
        obj.insert("kid".to_string(), json!(kid));
        obj.insert("use".to_string(), json!("sig"));
        obj.insert("alg".to_string(), json!("ES256"));
    }

    Ok(GeneratedKeyPair {
        kid,
        private_jwk,
        public_jwk,
    })
}

/// The loaded signing key: kid plus ready-to-use JWT key material.
///
/// Immutable for the process lifetime; rotation means restarting with a new
/// configured key.
pub struct SigningKey {
    kid: String,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKey {
    /// Parse a private JWK (JSON text) into a usable signing key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the JWK is missing, lacks a `kid`, is
    /// not a P-256 key, or its material cannot be parsed.
    pub fn from_private_jwk(jwk_json: &str) -> Result<Self> {
        if jwk_json.trim().is_empty() {
            return Err(Error::Config(
                "jwt.private_key is not set; run `auth-gateway generate-keys` and configure the private JWK".to_string(),
            ));
        }

        let jwk: Value = serde_json::from_str(jwk_json)
            .map_err(|e| Error::Config(format!("jwt.private_key is not valid JSON: {e}")))?;

        let kid = jwk
            .get("kid")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Config("jwt.private_key JWK has no 'kid'".to_string()))?
            .to_string();

        // Re-assemble the minimal EC JWK; extra fields like kid/use/alg are
        // not part of the key material.
        let (x, y) = public_components(&jwk)?;
        let d = jwk
            .get("d")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Config("jwt.private_key JWK has no 'd' (not a private key)".to_string()))?;
        let minimal = json!({ "kty": "EC", "crv": "P-256", "x": x, "y": y, "d": d });

        let secret = p256::SecretKey::from_jwk_str(&minimal.to_string())
            .map_err(|e| Error::Config(format!("jwt.private_key is not a valid P-256 JWK: {e}")))?;

        let pem = secret
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| Error::KeySetup(format!("failed to encode signing key: {e}")))?;
        let encoding = EncodingKey::from_ec_pem(pem.as_bytes())
            .map_err(|e| Error::KeySetup(format!("failed to build signing key: {e}")))?;
        let decoding = DecodingKey::from_ec_components(&x, &y)
            .map_err(|e| Error::KeySetup(format!("failed to build verification key: {e}")))?;

        Ok(Self {
            kid,
            encoding,
            decoding,
        })
    }

    /// Key identifier placed in the header of every issued token.
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Key used to sign issued tokens.
    #[must_use]
    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding
    }

    /// Public half, for verifying tokens this process issued.
    #[must_use]
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material is deliberately not printable.
        f.debug_struct("SigningKey").field("kid", &self.kid).finish()
    }
}

/// Extract the base64url `x`/`y` coordinates from a JWK value.
fn public_components(jwk: &Value) -> Result<(String, String)> {
    let x = jwk
        .get("x")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Config("JWK has no 'x' coordinate".to_string()))?;
    let y = jwk
        .get("y")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Config("JWK has no 'y' coordinate".to_string()))?;
    Ok((x.to_string(), y.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_pairs_have_unique_kids() {
        let a = generate_key_pair().unwrap();
        let b = generate_key_pair().unwrap();
        assert_ne!(a.kid, b.kid);
    }

    #[test]
    fn generated_jwks_carry_sig_metadata() {
        let pair = generate_key_pair().unwrap();

        for jwk in [&pair.private_jwk, &pair.public_jwk] {
            assert_eq!(jwk["kty"], "EC");
            assert_eq!(jwk["crv"], "P-256");
            assert_eq!(jwk["use"], "sig");
            assert_eq!(jwk["alg"], "ES256");
            assert_eq!(jwk["kid"], json!(pair.kid));
        }

        // Only the private half carries the secret scalar.
        assert!(pair.private_jwk.get("d").is_some());
        assert!(pair.public_jwk.get("d").is_none());
    }

    #[test]
    fn signing_key_loads_from_generated_private_jwk() {
        let pair = generate_key_pair().unwrap();
        let key = SigningKey::from_private_jwk(&pair.private_jwk.to_string()).unwrap();
        assert_eq!(key.kid(), pair.kid);
    }

    #[test]
    fn empty_private_jwk_is_a_config_error() {
        let err = SigningKey::from_private_jwk("").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn missing_kid_is_a_config_error() {
        let pair = generate_key_pair().unwrap();
        let mut jwk = pair.private_jwk;
        jwk.as_object_mut().unwrap().remove("kid");

        let err = SigningKey::from_private_jwk(&jwk.to_string()).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("kid")));
    }

    #[test]
    fn public_jwk_is_rejected_as_signing_key() {
        let pair = generate_key_pair().unwrap();
        let err = SigningKey::from_private_jwk(&pair.public_jwk.to_string()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn garbage_json_is_a_config_error() {
        let err = SigningKey::from_private_jwk("{not json").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
