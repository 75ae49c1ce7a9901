//! Token claims and the normalized identity projection.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Discriminates access from refresh tokens. The check is load-bearing: a
/// refresh token is never accepted where an access token is expected, and
/// vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Short-lived, authorizes per-request API access.
    Access,
    /// Longer-lived, only good for minting a new access token.
    Refresh,
}

/// One entry of the `amr` (authentication methods) claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmrEntry {
    /// Authentication method, e.g. `"password"`.
    pub method: String,
    /// Unix timestamp of the authentication event.
    pub timestamp: i64,
}

/// JWT payload for both token types.
///
/// Access tokens carry the full identity; refresh tokens only `sub`,
/// `session_id` and `token_type`, with everything optional left out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Issuer
    pub iss: String,
    /// Subject (user id)
    pub sub: String,
    /// Audience
    pub aud: String,
    /// Expiry (Unix timestamp)
    pub exp: i64,
    /// Issued-at (Unix timestamp)
    pub iat: i64,
    /// Email address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Phone number (always present-but-empty on access tokens)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Role, e.g. `"authenticated"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Free-form per-user metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_metadata: Option<Map<String, Value>>,
    /// Free-form application metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_metadata: Option<Map<String, Value>>,
    /// Authenticator assurance level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aal: Option<String>,
    /// Authentication methods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amr: Option<Vec<AmrEntry>>,
    /// Correlates the access/refresh pair issued together
    pub session_id: String,
    /// Access or refresh
    pub token_type: TokenType,
    /// Whether this is an anonymous session
    #[serde(default)]
    pub is_anonymous: bool,
}

/// Normalized verification result. Per-request and never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    /// Subject (user id)
    pub sub: String,
    /// Email, empty when the claim is absent
    pub email: String,
    /// Role, empty when the claim is absent
    pub role: String,
    /// User metadata carried through from the claims
    pub user_metadata: Map<String, Value>,
}

impl From<TokenClaims> for Identity {
    fn from(claims: TokenClaims) -> Self {
        Self {
            sub: claims.sub,
            email: claims.email.unwrap_or_default(),
            role: claims.role.unwrap_or_default(),
            user_metadata: claims.user_metadata.unwrap_or_default(),
        }
    }
}

/// Result of `issue_token_pair`, shaped for the login response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    /// Signed access token
    pub access_token: String,
    /// Signed refresh token
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
    /// Always `"bearer"`
    pub token_type: String,
    /// Session id shared by both tokens
    pub session_id: String,
}

/// Result of `refresh_access_token`. The refresh token is not rotated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshedAccess {
    /// Newly signed access token
    pub access_token: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
    /// Always `"bearer"`
    pub token_type: String,
}
