//! Bearer token issuing and verification.
//!
//! Tokens are compact three-segment JWTs signed with HMAC-SHA256. The payload
//! always carries `sub` (the caller's email), `iat` and `exp` (unix seconds);
//! any further claims are kept in [`Claims::extra`].
//!
//! Verification accepts exactly one algorithm. A token whose header names any
//! other algorithm (including `none`) is rejected before its signature is
//! looked at, and expiry is checked against the wall clock with no leeway.
//!
//! # Example
//!
//! ```rust
//! use pulse_server::auth::{issue_token, verify_token};
//!
//! let token = issue_token("a@b.com", b"secret").unwrap();
//! let claims = verify_token(&token, b"secret").unwrap();
//! assert_eq!(claims.sub, "a@b.com");
//!
//! assert!(verify_token(&token, b"other-secret").is_err());
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

/// Lifetime of an issued token.
pub const TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// The only algorithm tokens are signed with or accepted under.
pub const TOKEN_ALGORITHM: Algorithm = Algorithm::HS256;

/// Errors produced while issuing or verifying a token.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// The token's `exp` claim is in the past.
    #[error("token has expired")]
    Expired,

    /// The signature does not match the payload under the configured secret.
    #[error("token signature is invalid")]
    InvalidSignature,

    /// The header names an algorithm other than [`TOKEN_ALGORITHM`].
    #[error("token algorithm is not allowed")]
    InvalidAlgorithm,

    /// The token could not be parsed or lacks required claims.
    #[error("malformed token: {0}")]
    Malformed(String),

    /// Signing failed while issuing a token.
    #[error("failed to sign token: {0}")]
    Signing(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidAlgorithm => Self::InvalidAlgorithm,
            _ => Self::Malformed(err.to_string()),
        }
    }
}

/// Decoded token payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject; the email the token was issued for.
    pub sub: String,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Expiry, unix seconds.
    pub exp: i64,
    /// Any additional claims carried by the token.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    /// Claims for `subject`, valid from `issued_at` for [`TOKEN_TTL`].
    pub fn new(subject: impl Into<String>, issued_at: DateTime<Utc>) -> Self {
        let iat = issued_at.timestamp();
        Self {
            sub: subject.into(),
            iat,
            exp: iat + TOKEN_TTL.as_secs() as i64,
            extra: Map::new(),
        }
    }
}

/// Issues a token for `subject` that expires [`TOKEN_TTL`] from now.
pub fn issue_token(subject: &str, secret: &[u8]) -> Result<String, TokenError> {
    issue_token_at(subject, secret, Utc::now())
}

/// Issues a token for `subject` as if it were issued at `issued_at`.
pub fn issue_token_at(
    subject: &str,
    secret: &[u8],
    issued_at: DateTime<Utc>,
) -> Result<String, TokenError> {
    encode_claims(&Claims::new(subject, issued_at), secret)
}

/// Signs arbitrary claims with [`TOKEN_ALGORITHM`].
pub fn encode_claims(claims: &Claims, secret: &[u8]) -> Result<String, TokenError> {
    let token = encode(
        &Header::new(TOKEN_ALGORITHM),
        claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|err| TokenError::Signing(err.to_string()))?;

    debug!(subject = %claims.sub, exp = claims.exp, "Issued token");
    Ok(token)
}

/// Verifies `token` against `secret` and returns its claims.
///
/// # Errors
///
/// - [`TokenError::InvalidAlgorithm`] if the header names another algorithm
/// - [`TokenError::InvalidSignature`] if the MAC does not verify
/// - [`TokenError::Expired`] if `exp` has passed
/// - [`TokenError::Malformed`] for anything that does not parse or lacks `sub`/`exp`
pub fn verify_token(token: &str, secret: &[u8]) -> Result<Claims, TokenError> {
    let mut validation = Validation::new(TOKEN_ALGORITHM);
    validation.leeway = 0;
    validation.validate_exp = true;
    validation.set_required_spec_claims(&["exp", "sub"]);

    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)?;
    Ok(data.claims)
}
