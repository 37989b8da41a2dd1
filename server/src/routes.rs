//! Router and shared application state for the Pulse server.
//!
//! This module wires the HTTP API:
//!
//! - `POST /api/v1/auth/login` - Issue a bearer token
//! - `POST /api/v1/events/event` - Ingest one event (bearer auth)
//! - `GET /api/v1/events/stats` - Placeholder statistics (bearer auth)
//! - `GET /health` - Health check endpoint
//!
//! # Architecture
//!
//! All routes share application state through [`AppState`], which contains:
//! - Configuration (including the token secret)
//! - The event producer shared by every request
//! - Server start time for uptime reporting
//! - A shutdown token that cancels publishes still pending at the drain deadline
//!
//! Layers, outermost first: request tracing, panic recovery, body limit,
//! then bearer authentication on the `/events` group only.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pulse_server::bus::MemoryBus;
//! use pulse_server::config::Config;
//! use pulse_server::routes::{create_router, AppState};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("failed to load config");
//!     let state = AppState::with_bus(config, Arc::new(MemoryBus::new()));
//!     let app = create_router(state);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

use std::any::Any;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{middleware, Router};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::bus::EventBus;
use crate::config::{Config, EVENT_TOPIC};
use crate::handlers::{
    add_event, get_health, get_stats, login, method_not_allowed, route_not_found,
};
use crate::middleware::require_bearer;
use crate::producer::EventProducer;
use crate::response::ApiResponse;

/// Versioned prefix for the public API.
pub const API_PREFIX: &str = "/api/v1";

/// Maximum accepted request body size (1 MB).
pub const MAX_BODY_SIZE: usize = 1024 * 1024;

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for all route handlers.
///
/// Cloned per request; every field is either `Arc`-backed or `Copy`.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<Config>,

    /// Event producer shared by every request.
    pub producer: Arc<EventProducer>,

    /// Server start time for uptime calculation.
    pub start_time: Instant,

    /// Cancelled when in-flight publishes must be abandoned.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Creates application state around an existing producer.
    #[must_use]
    pub fn new(config: Config, producer: Arc<EventProducer>) -> Self {
        Self {
            config: Arc::new(config),
            producer,
            start_time: Instant::now(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Creates application state with a producer for [`EVENT_TOPIC`] on `bus`.
    #[must_use]
    pub fn with_bus(config: Config, bus: Arc<dyn EventBus>) -> Self {
        let producer = EventProducer::new(bus, config.kafka_brokers.clone(), EVENT_TOPIC);
        Self::new(config, Arc::new(producer))
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &"<Config>")
            .field("producer", &self.producer)
            .field("start_time", &self.start_time)
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish()
    }
}

// ============================================================================
// Router
// ============================================================================

/// Creates the application router with all routes configured.
///
/// Every route answers an unsupported method with an enveloped 405.
pub fn create_router(state: AppState) -> Router {
    let events = Router::new()
        .route("/event", post(add_event).fallback(method_not_allowed))
        .route("/stats", get(get_stats).fallback(method_not_allowed))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_bearer,
        ));

    let auth = Router::new().route("/login", post(login).fallback(method_not_allowed));

    let api = Router::new().nest("/events", events).nest("/auth", auth);

    Router::new()
        .nest(API_PREFIX, api)
        .route("/health", get(get_health).fallback(method_not_allowed))
        .fallback(route_not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Converts a handler panic into a generic 500 envelope.
fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");

    error!(panic = %detail, "Handler panicked");
    ApiResponse::failure("internal server error")
        .into_response_with(StatusCode::INTERNAL_SERVER_ERROR)
}

// ============================================================================
// Tests
// ============================================================================
