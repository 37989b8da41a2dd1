//! HTTP-facing error type for the Pulse server.
//!
//! Every failure a handler or middleware can produce is an [`ApiError`].
//! Converting one into a response picks the status code, builds the
//! failure envelope, and logs the failure (`warn` for 4xx, `error` for 5xx).
//!
//! | Variant | Status | Body |
//! |---------|--------|------|
//! | `MalformedBody` | 400 | `{success:false, error}` |
//! | `BodyRejected` | rejection's own | `{success:false, error}` |
//! | `MissingAuth` / `BadAuthFormat` | 401 | `{success:false, message}` |
//! | `InvalidToken` | 401 | `{success:false, message, error}` |
//! | `NotFound` | 404 | `{success:false, error}` |
//! | `MethodNotAllowed` | 405 | `{success:false, error}` |
//! | `PublishFailed` | 500 | `{success:false, error}` |
//! | `TokenIssue` | 500 | `{success:false, message, error}` |

use axum::extract::rejection::BytesRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

use crate::auth::TokenError;
use crate::producer::ProducerError;
use crate::response::ApiResponse;
use crate::types::ValidationError;

/// Response text for a missing `Authorization` header.
pub const MSG_AUTH_REQUIRED: &str = "Authorization header required";

/// Response text for an `Authorization` header not shaped `Bearer <token>`.
pub const MSG_BAD_AUTH_FORMAT: &str = "Invalid authorization format. Use: Bearer <token>";

/// Response text for a token that fails verification.
pub const MSG_INVALID_TOKEN: &str = "Invalid or expired token";

/// Response text for a token that could not be signed.
pub const MSG_TOKEN_ISSUE: &str = "Failed to create token";

/// Failure modes surfaced to HTTP clients.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The body did not decode or failed validation.
    #[error("{0}")]
    MalformedBody(String),

    /// axum refused to read the body (too large, bad encoding).
    #[error("{message}")]
    BodyRejected { status: StatusCode, message: String },

    /// No `Authorization` header.
    #[error("Authorization header required")]
    MissingAuth,

    /// `Authorization` header is not exactly `Bearer <token>`.
    #[error("Invalid authorization format. Use: Bearer <token>")]
    BadAuthFormat,

    /// Token failed signature, algorithm, or expiry checks.
    #[error("Invalid or expired token: {0}")]
    InvalidToken(#[source] TokenError),

    /// No route matches the request path.
    #[error("route not found: {0}")]
    NotFound(String),

    /// The path exists but not for this method.
    #[error("method {method} not allowed for {path}")]
    MethodNotAllowed { method: String, path: String },

    /// The producer failed to publish; the message is the producer's own.
    #[error("{0}")]
    PublishFailed(String),

    /// Signing a new token failed.
    #[error("Failed to create token: {0}")]
    TokenIssue(#[source] TokenError),
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MalformedBody(_) => StatusCode::BAD_REQUEST,
            Self::BodyRejected { status, .. } => *status,
            Self::MissingAuth | Self::BadAuthFormat | Self::InvalidToken(_) => {
                StatusCode::UNAUTHORIZED
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::PublishFailed(_) | Self::TokenIssue(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Failure envelope for this error.
    pub fn envelope(&self) -> ApiResponse {
        match self {
            Self::MalformedBody(reason) | Self::PublishFailed(reason) => {
                ApiResponse::failure(reason.clone())
            }
            Self::BodyRejected { message, .. } => ApiResponse::failure(message.clone()),
            Self::MissingAuth => ApiResponse::rejection(MSG_AUTH_REQUIRED),
            Self::BadAuthFormat => ApiResponse::rejection(MSG_BAD_AUTH_FORMAT),
            Self::InvalidToken(err) => {
                ApiResponse::rejection(MSG_INVALID_TOKEN).with_reason(err.to_string())
            }
            Self::NotFound(_) => ApiResponse::failure("route not found"),
            Self::MethodNotAllowed { .. } => ApiResponse::failure("method not allowed"),
            Self::TokenIssue(err) => {
                ApiResponse::rejection(MSG_TOKEN_ISSUE).with_reason(err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "Request rejected");
        }

        self.envelope().into_response_with(status)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::MalformedBody(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedBody(err.to_string())
    }
}

impl From<BytesRejection> for ApiError {
    fn from(rejection: BytesRejection) -> Self {
        Self::BodyRejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<ProducerError> for ApiError {
    fn from(err: ProducerError) -> Self {
        match err {
            ProducerError::Invalid(err) => err.into(),
            other => Self::PublishFailed(other.to_string()),
        }
    }
}
