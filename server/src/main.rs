//! Pulse Server - Main entry point.
//!
//! This binary starts the event ingress server with:
//! - Structured JSON logging
//! - A single event producer shared by all requests
//! - Graceful shutdown handling (SIGTERM/SIGINT) with a drain deadline,
//!   followed by a producer flush
//!
//! # Configuration
//!
//! See [`pulse_server::config`] for environment variable configuration.
//!
//! # Example
//!
//! ```bash
//! # Development mode (in-memory bus, fallback secret)
//! EVENT_BUS=memory cargo run --bin pulse-server
//!
//! # Production mode
//! KAFKA_BROKERS="kafka-1:9092,kafka-2:9092" \
//! JWT_SECRET="change-me" \
//! PORT=8080 \
//! cargo run --release --bin pulse-server
//! ```

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use pulse_server::bus::{EventBus, MemoryBus};
use pulse_server::config::{BusKind, Config, EVENT_TOPIC};
use pulse_server::producer::EventProducer;
use pulse_server::routes::{create_router, AppState};

/// How long in-flight requests may drain before pending publishes are cancelled.
const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Failed to load configuration");
            eprintln!("Error: {err}");
            eprintln!();
            eprintln!("Required environment variables (release builds):");
            eprintln!("  JWT_SECRET     - HMAC secret for signing bearer tokens");
            eprintln!();
            eprintln!("Optional environment variables:");
            eprintln!("  PORT           - HTTP server port (default: 8080)");
            eprintln!("  KAFKA_BROKERS  - Comma-separated brokers (default: localhost:9092)");
            eprintln!("  EVENT_BUS      - 'kafka' or 'memory' (default: kafka)");
            eprintln!("  MONGO_URI      - Reserved for downstream consumers");
            eprintln!("  RUST_LOG       - Log level filter (default: info)");
            return ExitCode::from(1);
        }
    };

    let bus = match build_bus(&config) {
        Ok(bus) => bus,
        Err(err) => {
            error!(error = %format!("{err:#}"), "Failed to create event bus client");
            return ExitCode::from(1);
        }
    };

    info!(
        port = config.port,
        bus = ?config.event_bus,
        broker_count = config.kafka_brokers.len(),
        topic = EVENT_TOPIC,
        "Pulse server starting"
    );

    let producer = Arc::new(EventProducer::new(
        bus,
        config.kafka_brokers.clone(),
        EVENT_TOPIC,
    ));
    let port = config.port;
    let state = AppState::new(config, Arc::clone(&producer));
    let shutdown = state.shutdown.clone();
    let app = create_router(state);

    let bind_addr = format!("0.0.0.0:{port}");
    let listener = match TcpListener::bind(&bind_addr).await {
        Ok(listener) => {
            info!(port, address = %bind_addr, "Server listening");
            listener
        }
        Err(err) => {
            error!(
                error = %err,
                address = %bind_addr,
                "Failed to bind to address"
            );
            return ExitCode::from(1);
        }
    };

    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        spawn_drain_deadline(shutdown);
    });

    info!("Server ready to accept connections");

    if let Err(err) = server.await {
        error!(error = %err, "Server error");
        return ExitCode::from(1);
    }

    info!("Server shutting down gracefully");

    // In-flight requests have drained; flush what the bus still holds.
    if let Err(err) = producer.close().await {
        warn!(error = %err, "Event producer did not close cleanly");
    }

    info!("Server shutdown complete");
    ExitCode::SUCCESS
}

/// Cancels publishes still waiting on the bus once the drain window closes.
fn spawn_drain_deadline(shutdown: CancellationToken) {
    info!(
        timeout_secs = GRACEFUL_SHUTDOWN_TIMEOUT.as_secs(),
        "Waiting for in-flight requests to complete"
    );

    tokio::spawn(async move {
        tokio::time::sleep(GRACEFUL_SHUTDOWN_TIMEOUT).await;
        if !shutdown.is_cancelled() {
            warn!("Drain deadline reached, cancelling pending publishes");
            shutdown.cancel();
        }
    });
}

/// Builds the bus client selected by `EVENT_BUS`.
fn build_bus(config: &Config) -> anyhow::Result<Arc<dyn EventBus>> {
    match config.event_bus {
        BusKind::Memory => {
            warn!("Using in-memory event bus; events will not leave this process");
            Ok(Arc::new(MemoryBus::new()))
        }
        BusKind::Kafka => kafka_bus(config),
    }
}

#[cfg(feature = "kafka")]
fn kafka_bus(config: &Config) -> anyhow::Result<Arc<dyn EventBus>> {
    use anyhow::Context;

    let bus = pulse_server::bus::KafkaBus::connect(&config.kafka_brokers)
        .with_context(|| format!("connecting to brokers {}", config.brokers_csv()))?;
    Ok(Arc::new(bus))
}

#[cfg(not(feature = "kafka"))]
fn kafka_bus(config: &Config) -> anyhow::Result<Arc<dyn EventBus>> {
    anyhow::bail!(
        "EVENT_BUS=kafka (brokers {}) but this binary was built without the `kafka` feature",
        config.brokers_csv()
    )
}

/// Initialize structured logging with tracing.
///
/// JSON output, filtered by `RUST_LOG` with a default of
/// `info,tower_http=debug`.
fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    let json_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_level(true)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .init();
}

/// Resolves when SIGTERM or SIGINT (Ctrl+C) is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        }
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
