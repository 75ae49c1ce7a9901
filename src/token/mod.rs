//! Token engine: issuance, verification, and JWKS-backed key lookup.

pub mod claims;
pub mod engine;
pub mod jwks;
pub mod verify;

pub use claims::{Identity, RefreshedAccess, TokenClaims, TokenPair, TokenType};
pub use engine::TokenEngine;
pub use jwks::JwksCache;
pub use verify::{Verifier, VerifierOptions};

/// Internal verification failure detail.
///
/// Never reaches a client: every variant folds into the gateway's single
/// `Unauthenticated` class, and the detail is only logged.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// JWT decode / signature verification failed.
    #[error("JWT verification failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// The JWT header contains no `kid` field.
    #[error("JWT missing 'kid' field in header")]
    MissingKeyId,

    /// The `kid` is not in the key set, even after one refresh.
    #[error("Unknown key ID: {0}")]
    UnknownKeyId(String),

    /// Token's `iss` did not match the configured issuer.
    #[error("Issuer mismatch: expected {expected}, got {actual}")]
    IssuerMismatch {
        /// Configured issuer.
        expected: String,
        /// Issuer found in the token.
        actual: String,
    },

    /// Token's `aud` did not match the configured audience.
    #[error("Audience mismatch")]
    AudienceMismatch,

    /// An access token was presented where a refresh token was expected,
    /// or vice versa.
    #[error("Wrong token type: expected {expected:?}")]
    WrongTokenType {
        /// Token type required at this call site.
        expected: claims::TokenType,
    },

    /// Only ES256 is accepted; anything else is rejected outright.
    #[error("Unsupported algorithm: {0:?}")]
    UnsupportedAlgorithm(jsonwebtoken::Algorithm),

    /// Network or HTTP error while fetching the JWKS.
    #[error("JWKS fetch error: {0}")]
    Http(#[from] reqwest::Error),
}
