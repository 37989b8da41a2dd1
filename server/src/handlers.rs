//! HTTP handlers.
//!
//! - `POST /api/v1/auth/login` - issue a bearer token for an email
//! - `POST /api/v1/events/event` - validate and publish an event (protected)
//! - `GET /api/v1/events/stats` - placeholder aggregate (protected)
//! - `GET /health` - liveness
//!
//! A client that disconnects mid-request drops the handler future, and with
//! it any publish still waiting on the bus. Publishes are also cancelled when
//! the server's shutdown token fires after the drain deadline.

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::response::Response;
use axum::Extension;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::auth::issue_token;
use crate::error::ApiError;
use crate::middleware::AuthContext;
use crate::response;
use crate::routes::AppState;
use crate::types::{AddEventRequest, HealthResponse, LoginRequest, LoginResponse, StatsResponse};

/// Decodes a JSON body, mapping any failure to a 400.
fn parse_json<T: DeserializeOwned>(body: Result<Bytes, BytesRejection>) -> Result<T, ApiError> {
    let body = body?;
    Ok(serde_json::from_slice(&body)?)
}

// ============================================================================
// POST /api/v1/auth/login
// ============================================================================

/// Issues a token for the supplied email.
///
/// The password is required but not checked: there is no user store behind
/// this endpoint yet.
///
/// # Responses
///
/// - `200 OK` - `{success, message, data: {email, token}}`
/// - `400 Bad Request` - body missing, not JSON, or a field is empty
/// - `500 Internal Server Error` - token could not be signed
pub async fn login(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    let request: LoginRequest = parse_json(body)?;
    request.validate()?;

    let token = issue_token(&request.email, state.config.jwt_secret.as_bytes())
        .map_err(ApiError::TokenIssue)?;

    info!(
        email = %request.email,
        credentials_checked = false,
        "Issued access token"
    );

    Ok(response::ok_with_message(
        StatusCode::OK,
        "Login successful",
        &LoginResponse {
            email: request.email,
            token,
        },
    ))
}

// ============================================================================
// POST /api/v1/events/event
// ============================================================================

/// Validates the body and publishes it to the event bus.
///
/// The response is only sent once the producer reports the bus has
/// acknowledged the write. A publish still pending when the shutdown token
/// fires fails with a 500.
///
/// # Responses
///
/// - `201 Created` - `{success, message, data: <request echo>}`
/// - `400 Bad Request` - body fails to decode, or `eventType`/`userId` empty
/// - `500 Internal Server Error` - publish failed (producer error text)
pub async fn add_event(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    let request: AddEventRequest = parse_json(body)?;
    request.validate()?;

    let cancel = state.shutdown.child_token();
    let envelope = state.producer.send_event(&request, &cancel).await?;

    info!(
        subject = %auth.subject,
        event_id = %envelope.event_id,
        event_type = %envelope.event_type,
        user_id = %envelope.user_id,
        "Event accepted"
    );

    Ok(response::ok_with_message(
        StatusCode::CREATED,
        "Event added successfully",
        &request,
    ))
}

// ============================================================================
// GET /api/v1/events/stats
// ============================================================================

/// Placeholder statistics. Aggregation happens in downstream consumers.
pub async fn get_stats(Extension(auth): Extension<AuthContext>) -> Response {
    debug!(subject = %auth.subject, "Serving placeholder stats");
    response::ok_with_message(
        StatusCode::OK,
        "Stats endpoint working!",
        &StatsResponse::default(),
    )
}

// ============================================================================
// GET /health
// ============================================================================

pub async fn get_health(State(state): State<AppState>) -> Response {
    response::ok(
        StatusCode::OK,
        &HealthResponse {
            status: "ok".to_string(),
            uptime_seconds: state.start_time.elapsed().as_secs(),
        },
    )
}

/// Fallback for unmatched paths.
pub async fn route_not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(uri.path().to_string())
}

/// Fallback for a known path hit with an unsupported method.
pub async fn method_not_allowed(method: Method, uri: Uri) -> ApiError {
    ApiError::MethodNotAllowed {
        method: method.to_string(),
        path: uri.path().to_string(),
    }
}
