//! Server configuration module.
//!
//! Parses configuration from environment variables for the Pulse server.
//! An optional `.env` file is applied first by [`Config::load`]; its bindings
//! never override variables already present in the process environment.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `JWT_SECRET` | Yes* | - | HMAC secret used to sign and verify bearer tokens |
//! | `PORT` | No | 8080 | HTTP server port |
//! | `KAFKA_BROKERS` | No | `localhost:9092` | Format: `host1:port1,host2:port2` |
//! | `EVENT_BUS` | No | `kafka` | `kafka` or `memory` (in-process, development only) |
//! | `MONGO_URI` | No | - | Reserved, not used by the ingestion path |
//!
//! *Debug builds fall back to a placeholder secret and log a warning.

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

/// Default HTTP server port.
pub const DEFAULT_PORT: u16 = 8080;

/// Broker list used when `KAFKA_BROKERS` is unset.
pub const DEFAULT_BROKERS: &str = "localhost:9092";

/// Topic every ingested event is published to.
pub const EVENT_TOPIC: &str = "analytics-events";

/// Placeholder secret accepted only in debug builds.
#[cfg(debug_assertions)]
const DEV_JWT_SECRET: &str = "secret";

/// Errors that can occur when parsing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has invalid format.
    #[error("invalid format for {var}: {message}")]
    InvalidFormat { var: String, message: String },

    /// Port number is invalid.
    #[error("invalid port number: {0}")]
    InvalidPort(#[from] std::num::ParseIntError),

    /// Configuration validation failed.
    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

/// Which event-bus client the process publishes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusKind {
    /// Kafka cluster reached through `KAFKA_BROKERS`.
    Kafka,
    /// In-process recorder; events never leave the process.
    Memory,
}

/// Server configuration parsed from environment variables.
///
/// Built once at startup and shared read-only afterwards.
#[derive(Clone)]
pub struct Config {
    /// HTTP server port.
    pub port: u16,

    /// Event-bus bootstrap brokers (`host:port`).
    pub kafka_brokers: Vec<String>,

    /// Secret used to sign and verify bearer tokens.
    pub jwt_secret: String,

    /// Event-bus client selection.
    pub event_bus: BusKind,

    /// Reserved document-store URI.
    pub mongo_uri: Option<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("kafka_brokers", &self.kafka_brokers)
            .field("jwt_secret", &"<redacted>")
            .field("event_bus", &self.event_bus)
            .field("mongo_uri", &self.mongo_uri.as_ref().map(|_| "<set>"))
            .finish()
    }
}

impl Config {
    /// Apply `.env` from the working directory (if any), then parse the environment.
    ///
    /// # Errors
    ///
    /// See [`Config::from_env`].
    pub fn load() -> Result<Self, ConfigError> {
        apply_env_file(dotenvy::dotenv());
        Self::from_env()
    }

    /// Apply the given environment file, then parse the environment.
    ///
    /// A missing file is not an error; variables already set win over the file.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        apply_env_file(dotenvy::from_path(path).map(|()| path.to_path_buf()));
        Self::from_env()
    }

    /// Parse configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - `JWT_SECRET` is missing in a release build
    /// - Environment variables have invalid format
    /// - Port number is not a valid u16
    /// - The broker list contains no usable entries
    ///
    /// # Example
    ///
    /// ```no_run
    /// use pulse_server::config::Config;
    ///
    /// let config = Config::from_env().expect("Failed to load config");
    /// println!("Server will listen on port {}", config.port);
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = parse_port()?;
        let kafka_brokers = parse_brokers()?;
        let jwt_secret = parse_jwt_secret()?;
        let event_bus = parse_bus_kind()?;
        let mongo_uri = env::var("MONGO_URI").ok().filter(|s| !s.is_empty());

        let config = Self {
            port,
            kafka_brokers,
            jwt_secret,
            event_bus,
            mongo_uri,
        };

        config.validate()?;

        if config.event_bus == BusKind::Memory {
            warn!("EVENT_BUS=memory - events are kept in-process and never reach the bus");
        }

        Ok(config)
    }

    /// Broker list in the comma-joined form bus clients expect.
    pub fn brokers_csv(&self) -> String {
        self.kafka_brokers.join(",")
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.kafka_brokers.is_empty() {
            return Err(ConfigError::ValidationError(
                "KAFKA_BROKERS must name at least one broker".to_string(),
            ));
        }

        if self.jwt_secret.is_empty() {
            return Err(ConfigError::MissingEnvVar("JWT_SECRET".to_string()));
        }

        Ok(())
    }
}

fn apply_env_file(result: Result<PathBuf, dotenvy::Error>) {
    match result {
        Ok(path) => info!(path = %path.display(), "Loaded environment file"),
        Err(err) if err.not_found() => {}
        Err(err) => warn!(error = %err, "Failed to apply environment file"),
    }
}

/// Parse the PORT environment variable.
///
/// Returns the default port if not set.
fn parse_port() -> Result<u16, ConfigError> {
    match env::var("PORT") {
        Ok(port_str) => Ok(port_str.trim().parse()?),
        Err(env::VarError::NotPresent) => Ok(DEFAULT_PORT),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidFormat {
            var: "PORT".to_string(),
            message: "contains invalid unicode".to_string(),
        }),
    }
}

/// Parse the KAFKA_BROKERS environment variable.
///
/// Expected format: `host1:port1,host2:port2`. Blank entries are skipped.
fn parse_brokers() -> Result<Vec<String>, ConfigError> {
    let raw = match env::var("KAFKA_BROKERS") {
        Ok(s) => s,
        Err(env::VarError::NotPresent) => DEFAULT_BROKERS.to_string(),
        Err(env::VarError::NotUnicode(_)) => {
            return Err(ConfigError::InvalidFormat {
                var: "KAFKA_BROKERS".to_string(),
                message: "contains invalid unicode".to_string(),
            })
        }
    };

    let mut brokers = Vec::new();

    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }

        if entry.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidFormat {
                var: "KAFKA_BROKERS".to_string(),
                message: format!("broker '{entry}' contains whitespace"),
            });
        }

        brokers.push(entry.to_string());
    }

    Ok(brokers)
}

fn parse_jwt_secret() -> Result<String, ConfigError> {
    match env::var("JWT_SECRET") {
        Ok(secret) if !secret.is_empty() => Ok(secret),
        Ok(_) | Err(env::VarError::NotPresent) => missing_jwt_secret(),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidFormat {
            var: "JWT_SECRET".to_string(),
            message: "contains invalid unicode".to_string(),
        }),
    }
}

#[cfg(debug_assertions)]
fn missing_jwt_secret() -> Result<String, ConfigError> {
    warn!("JWT_SECRET is not set - using the development placeholder. Do not use in production!");
    Ok(DEV_JWT_SECRET.to_string())
}

#[cfg(not(debug_assertions))]
fn missing_jwt_secret() -> Result<String, ConfigError> {
    Err(ConfigError::MissingEnvVar("JWT_SECRET".to_string()))
}

fn parse_bus_kind() -> Result<BusKind, ConfigError> {
    match env::var("EVENT_BUS") {
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "" | "kafka" => Ok(BusKind::Kafka),
            "memory" => Ok(BusKind::Memory),
            other => Err(ConfigError::InvalidFormat {
                var: "EVENT_BUS".to_string(),
                message: format!("expected 'kafka' or 'memory', got '{other}'"),
            }),
        },
        Err(_) => Ok(BusKind::Kafka),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::io::Write;

    /// Helper to temporarily set environment variables for testing.
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self { vars: Vec::new() }
        }

        fn set(&mut self, key: &str, value: &str) {
            let old_value = env::var(key).ok();
            self.vars.push((key.to_string(), old_value));
            env::set_var(key, value);
        }

        fn remove(&mut self, key: &str) {
            let old_value = env::var(key).ok();
            self.vars.push((key.to_string(), old_value));
            env::remove_var(key);
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.iter().rev() {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }

    fn clear_all(guard: &mut EnvGuard) {
        for key in ["PORT", "KAFKA_BROKERS", "JWT_SECRET", "EVENT_BUS", "MONGO_URI"] {
            guard.remove(key);
        }
    }

    #[test]
    #[serial]
    fn test_config_defaults() {
        let mut guard = EnvGuard::new();
        clear_all(&mut guard);
        guard.set("JWT_SECRET", "top-secret");

        let config = Config::from_env().expect("should parse config");
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.kafka_brokers, vec!["localhost:9092".to_string()]);
        assert_eq!(config.jwt_secret, "top-secret");
        assert_eq!(config.event_bus, BusKind::Kafka);
        assert!(config.mongo_uri.is_none());
    }

    #[test]
    #[serial]
    fn test_config_all_values() {
        let mut guard = EnvGuard::new();
        clear_all(&mut guard);
        guard.set("PORT", "9090");
        guard.set("KAFKA_BROKERS", "kafka-1:9092,kafka-2:9093");
        guard.set("JWT_SECRET", "s3cr3t");
        guard.set("EVENT_BUS", "Memory");
        guard.set("MONGO_URI", "mongodb://localhost:27017");

        let config = Config::from_env().expect("should parse config");
        assert_eq!(config.port, 9090);
        assert_eq!(config.kafka_brokers, vec!["kafka-1:9092", "kafka-2:9093"]);
        assert_eq!(config.brokers_csv(), "kafka-1:9092,kafka-2:9093");
        assert_eq!(config.event_bus, BusKind::Memory);
        assert_eq!(
            config.mongo_uri.as_deref(),
            Some("mongodb://localhost:27017")
        );
    }

    #[test]
    #[serial]
    fn test_parse_brokers_with_whitespace_and_blanks() {
        let mut guard = EnvGuard::new();
        guard.set("KAFKA_BROKERS", " kafka-1:9092 , ,kafka-2:9092,");

        let brokers = parse_brokers().expect("should parse brokers");
        assert_eq!(brokers, vec!["kafka-1:9092", "kafka-2:9092"]);
    }

    #[test]
    #[serial]
    fn test_config_rejects_empty_broker_list() {
        let mut guard = EnvGuard::new();
        clear_all(&mut guard);
        guard.set("JWT_SECRET", "s3cr3t");
        guard.set("KAFKA_BROKERS", " , ");

        let result = Config::from_env();
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    #[serial]
    fn test_parse_brokers_rejects_inner_whitespace() {
        let mut guard = EnvGuard::new();
        guard.set("KAFKA_BROKERS", "kafka 1:9092");

        let result = parse_brokers();
        assert!(
            matches!(result, Err(ConfigError::InvalidFormat { ref var, .. }) if var == "KAFKA_BROKERS")
        );
    }

    #[test]
    #[serial]
    fn test_parse_port_default() {
        let mut guard = EnvGuard::new();
        guard.remove("PORT");

        let port = parse_port().expect("should parse port");
        assert_eq!(port, DEFAULT_PORT);
    }

    #[test]
    #[serial]
    fn test_parse_port_invalid() {
        let mut guard = EnvGuard::new();
        guard.set("PORT", "not-a-number");

        let result = parse_port();
        assert!(matches!(result.unwrap_err(), ConfigError::InvalidPort(_)));
    }

    #[test]
    #[serial]
    fn test_parse_port_out_of_range() {
        let mut guard = EnvGuard::new();
        guard.set("PORT", "99999");

        assert!(parse_port().is_err());
    }

    #[test]
    #[serial]
    fn test_parse_bus_kind_rejects_unknown() {
        let mut guard = EnvGuard::new();
        guard.set("EVENT_BUS", "rabbitmq");

        let result = parse_bus_kind();
        assert!(
            matches!(result, Err(ConfigError::InvalidFormat { ref var, .. }) if var == "EVENT_BUS")
        );
    }

    #[cfg(debug_assertions)]
    #[test]
    #[serial]
    fn test_missing_secret_uses_placeholder_in_debug_builds() {
        let mut guard = EnvGuard::new();
        clear_all(&mut guard);

        let config = Config::from_env().expect("debug builds accept a missing secret");
        assert_eq!(config.jwt_secret, DEV_JWT_SECRET);
    }

    #[cfg(not(debug_assertions))]
    #[test]
    #[serial]
    fn test_missing_secret_is_fatal_in_release_builds() {
        let mut guard = EnvGuard::new();
        clear_all(&mut guard);

        let result = Config::from_env();
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(ref v)) if v == "JWT_SECRET"));
    }

    #[test]
    #[serial]
    fn test_debug_output_redacts_secret() {
        let mut guard = EnvGuard::new();
        clear_all(&mut guard);
        guard.set("JWT_SECRET", "do-not-print-me");

        let config = Config::from_env().expect("should parse config");
        let debug_str = format!("{config:?}");
        assert!(!debug_str.contains("do-not-print-me"));
        assert!(debug_str.contains("<redacted>"));
    }

    #[test]
    #[serial]
    fn test_env_file_does_not_override_process_env() {
        let mut guard = EnvGuard::new();
        clear_all(&mut guard);
        guard.set("PORT", "7000");

        let mut file = tempfile::NamedTempFile::new().expect("create temp env file");
        writeln!(file, "PORT=9999").unwrap();
        writeln!(file, "JWT_SECRET=from-file").unwrap();
        writeln!(file, "KAFKA_BROKERS=file-broker:9092").unwrap();

        // Values the file introduces must be cleaned up after the test.
        guard.remove("JWT_SECRET");
        guard.remove("KAFKA_BROKERS");

        let config = Config::load_from_file(file.path()).expect("should load config");
        assert_eq!(config.port, 7000);
        assert_eq!(config.jwt_secret, "from-file");
        assert_eq!(config.kafka_brokers, vec!["file-broker:9092"]);
    }

    #[test]
    #[serial]
    fn test_missing_env_file_is_not_an_error() {
        let mut guard = EnvGuard::new();
        clear_all(&mut guard);
        guard.set("JWT_SECRET", "s3cr3t");

        let config = Config::load_from_file("/nonexistent/pulse/.env").expect("should load");
        assert_eq!(config.port, DEFAULT_PORT);
    }
}
