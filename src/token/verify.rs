//! Claim verification.
//!
//! One verifier configuration covers every call site; there are no
//! per-caller "skip the signature" switches. ES256 is pinned: a token whose
//! header advertises any other algorithm is rejected before the signature is
//! even looked at.

use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};

use super::TokenError;
use super::claims::{TokenClaims, TokenType};

/// Which claim checks run. Everything defaults to on; turning a check off is
/// a test-only affordance, never production configuration.
#[derive(Debug, Clone, Copy)]
pub struct VerifierOptions {
    /// Reject tokens whose `exp` (minus leeway) has passed.
    pub check_expiry: bool,
    /// Require `aud` to equal the configured audience.
    pub check_audience: bool,
    /// Require `iss` to equal the configured issuer.
    pub check_issuer: bool,
    /// Clock-skew window applied to the expiry check.
    pub leeway: Duration,
}

impl Default for VerifierOptions {
    fn default() -> Self {
        Self {
            check_expiry: true,
            check_audience: true,
            check_issuer: true,
            leeway: Duration::from_secs(10),
        }
    }
}

/// Verifies signatures and claims against the configured expectations.
#[derive(Debug, Clone)]
pub struct Verifier {
    options: VerifierOptions,
    expected_issuer: String,
    expected_audience: String,
}

impl Verifier {
    /// Create a verifier for the given issuer/audience expectations.
    #[must_use]
    pub fn new(expected_issuer: String, expected_audience: String, options: VerifierOptions) -> Self {
        Self {
            options,
            expected_issuer,
            expected_audience,
        }
    }

    /// Extract the `kid` from a token header without verifying anything else.
    ///
    /// # Errors
    ///
    /// Fails on unparseable headers, non-ES256 algorithms, and missing kids.
    pub fn key_id(token: &str) -> Result<String, TokenError> {
        let header = decode_header(token)?;
        if header.alg != Algorithm::ES256 {
            return Err(TokenError::UnsupportedAlgorithm(header.alg));
        }
        header.kid.ok_or(TokenError::MissingKeyId)
    }

    /// Verify signature and claims, requiring `expected_type`.
    ///
    /// Pure with respect to the token: no side effects, safe to call
    /// concurrently and repeatedly.
    ///
    /// # Errors
    ///
    /// Any signature, expiry, audience, issuer, or token-type failure.
    pub fn verify(
        &self,
        token: &str,
        key: &DecodingKey,
        expected_type: TokenType,
    ) -> Result<TokenClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::ES256);
        validation.leeway = self.options.leeway.as_secs();
        validation.validate_exp = self.options.check_expiry;
        // aud/iss are matched manually below for exact string equality and a
        // precise error kind.
        validation.validate_aud = false;

        let data = decode::<TokenClaims>(token, key, &validation)?;
        let claims = data.claims;

        if self.options.check_issuer && claims.iss != self.expected_issuer {
            return Err(TokenError::IssuerMismatch {
                expected: self.expected_issuer.clone(),
                actual: claims.iss,
            });
        }

        if self.options.check_audience && claims.aud != self.expected_audience {
            return Err(TokenError::AudienceMismatch);
        }

        if claims.token_type != expected_type {
            return Err(TokenError::WrongTokenType {
                expected: expected_type,
            });
        }

        Ok(claims)
    }
}
