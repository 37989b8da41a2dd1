//! JSON response envelope shared by every endpoint.
//!
//! ```json
//! {"success": true, "message": "optional", "data": {}}
//! {"success": false, "message": "optional", "error": "reason"}
//! ```
//!
//! `data` only ever appears on success and `error` only on failure. Handlers
//! respond through [`ok`], [`ok_with_message`] and [`error`] (or return an
//! [`ApiError`](crate::error::ApiError)) rather than building bodies by hand.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error as log_error;

/// Top-level body of every JSON response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ApiResponse {
    /// Successful envelope carrying `data`.
    pub fn success(data: Value) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
            error: None,
        }
    }

    /// Failure envelope carrying an `error` reason.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            data: None,
            error: Some(error.into()),
        }
    }

    /// Failure envelope carrying only a human-readable `message`.
    pub fn rejection(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
            error: None,
        }
    }

    /// Adds or replaces the `message` field.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Adds an `error` reason to a failure envelope. No-op on success.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        if !self.success {
            self.error = Some(reason.into());
        }
        self
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Renders the envelope with `status`.
    pub fn into_response_with(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

/// Success response with `data`.
pub fn ok<T: Serialize>(status: StatusCode, data: &T) -> Response {
    match serde_json::to_value(data) {
        Ok(value) => ApiResponse::success(value).into_response_with(status),
        Err(err) => serialization_failure(err),
    }
}

/// Success response with `data` and a `message`.
pub fn ok_with_message<T: Serialize>(
    status: StatusCode,
    message: impl Into<String>,
    data: &T,
) -> Response {
    match serde_json::to_value(data) {
        Ok(value) => ApiResponse::success(value)
            .with_message(message)
            .into_response_with(status),
        Err(err) => serialization_failure(err),
    }
}

/// Failure response with an explicit status and `error` reason.
pub fn error(status: StatusCode, reason: impl Into<String>) -> Response {
    ApiResponse::failure(reason).into_response_with(status)
}

fn serialization_failure(err: serde_json::Error) -> Response {
    log_error!(error = %err, "Failed to serialize response data");
    error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "failed to serialize response",
    )
}
