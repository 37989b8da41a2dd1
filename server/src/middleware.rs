//! Bearer-token authentication middleware.
//!
//! [`require_bearer`] runs in front of every protected route. It expects
//! exactly `Authorization: Bearer <token>` (case-sensitive scheme, a single
//! space, no extra segments), verifies the token against the configured
//! secret and inserts an [`AuthContext`] into the request extensions.
//! Handlers read it back with `Extension<AuthContext>`.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use tracing::debug;

use crate::auth::{verify_token, Claims};
use crate::error::ApiError;
use crate::routes::AppState;

/// Authentication scheme accepted in the `Authorization` header.
pub const BEARER_SCHEME: &str = "Bearer";

/// Identity of an authenticated caller, scoped to a single request.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthContext {
    /// The token subject (email).
    pub subject: String,
    /// Full decoded claim set.
    pub claims: Claims,
}

impl AuthContext {
    fn from_claims(claims: Claims) -> Self {
        Self {
            subject: claims.sub.clone(),
            claims,
        }
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header.
///
/// # Errors
///
/// - [`ApiError::MissingAuth`] when the header is absent
/// - [`ApiError::BadAuthFormat`] when it is not exactly two space-separated
///   parts with the first being `Bearer`
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let value = headers.get(AUTHORIZATION).ok_or(ApiError::MissingAuth)?;
    let value = value.to_str().map_err(|_| ApiError::BadAuthFormat)?;

    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(BEARER_SCHEME), Some(token), None) => Ok(token),
        _ => Err(ApiError::BadAuthFormat),
    }
}

/// Rejects requests without a valid bearer token; otherwise attaches
/// [`AuthContext`] and passes the request on.
pub async fn require_bearer(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = {
        let token = bearer_token(request.headers())?;
        verify_token(token, state.config.jwt_secret.as_bytes()).map_err(ApiError::InvalidToken)?
    };

    debug!(subject = %claims.sub, path = %request.uri().path(), "Authenticated request");
    request
        .extensions_mut()
        .insert(AuthContext::from_claims(claims));

    Ok(next.run(request).await)
}
