//! Event-bus client abstraction.
//!
//! [`EventBus`] is the narrow contract the producer needs from a broker
//! client: keyed, acknowledged publishes to a topic plus a flush on shutdown.
//!
//! - [`KafkaBus`] talks to a Kafka cluster through librdkafka (feature `kafka`).
//! - [`MemoryBus`] records every publish in-process. It backs local
//!   development (`EVENT_BUS=memory`) and the test suite, and can be switched
//!   into a failing mode to simulate a broker outage.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, trace};

use crate::types::EventEnvelope;

/// Errors reported by an event-bus client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The client could not be created (bad configuration, library failure).
    #[error("failed to create event bus client: {0}")]
    Client(String),

    /// The broker did not acknowledge the write. The message is the client's
    /// own error text.
    #[error("{0}")]
    Publish(String),

    /// Pending writes could not be flushed.
    #[error("failed to flush event bus: {0}")]
    Flush(String),
}

/// A keyed publish/subscribe client.
///
/// Implementations must be safe to share across any number of concurrent
/// request handlers.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes `payload` to `topic` with partition key `key`.
    ///
    /// Resolves once the broker has acknowledged the write.
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), BusError>;

    /// Waits up to `timeout` for all outstanding writes to be delivered.
    async fn flush(&self, timeout: Duration) -> Result<(), BusError>;
}

// ============================================================================
// In-memory bus
// ============================================================================

/// One write captured by [`MemoryBus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedRecord {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
}

impl PublishedRecord {
    /// Decodes the payload as an [`EventEnvelope`].
    pub fn envelope(&self) -> serde_json::Result<EventEnvelope> {
        serde_json::from_slice(&self.payload)
    }
}

#[derive(Debug, Default)]
struct MemoryBusState {
    records: Vec<PublishedRecord>,
    failure: Option<String>,
    flushes: usize,
}

/// In-process [`EventBus`] that keeps every acknowledged write.
///
/// Clones share the same record log.
#[derive(Debug, Clone, Default)]
pub struct MemoryBus {
    state: Arc<Mutex<MemoryBusState>>,
    latency: Option<Duration>,
}

impl MemoryBus {
    /// Creates an empty bus that accepts every publish.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bus that rejects every publish with `message`.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        let bus = Self::new();
        bus.set_failure(Some(message.into()));
        bus
    }

    /// Delays every acknowledgement by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Switches outage simulation on (`Some`) or off (`None`).
    pub fn set_failure(&self, failure: Option<String>) {
        self.lock().failure = failure;
    }

    /// Snapshot of all acknowledged writes, oldest first.
    pub fn records(&self) -> Vec<PublishedRecord> {
        self.lock().records.clone()
    }

    /// Number of times [`EventBus::flush`] was called.
    pub fn flush_count(&self) -> usize {
        self.lock().flushes
    }

    fn lock(&self) -> MutexGuard<'_, MemoryBusState> {
        // A poisoned lock only means a test thread panicked mid-push.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl EventBus for MemoryBus {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), BusError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.lock();
        if let Some(message) = &state.failure {
            return Err(BusError::Publish(message.clone()));
        }

        trace!(topic, key, bytes = payload.len(), "Recorded in-memory publish");
        state.records.push(PublishedRecord {
            topic: topic.to_string(),
            key: key.to_string(),
            payload,
        });
        Ok(())
    }

    async fn flush(&self, _timeout: Duration) -> Result<(), BusError> {
        let mut state = self.lock();
        state.flushes += 1;
        debug!(records = state.records.len(), "Flushed in-memory bus");
        Ok(())
    }
}

// ============================================================================
// Kafka bus
// ============================================================================

#[cfg(feature = "kafka")]
pub use self::kafka::KafkaBus;

#[cfg(feature = "kafka")]
mod kafka {
    use std::time::Duration;

    use async_trait::async_trait;
    use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
    use rdkafka::util::Timeout;
    use rdkafka::ClientConfig;
    use tracing::{debug, info};

    use super::{BusError, EventBus};

    /// Upper bound librdkafka spends retrying a single message.
    const MESSAGE_TIMEOUT_MS: &str = "5000";

    /// [`EventBus`] backed by an rdkafka [`FutureProducer`].
    ///
    /// Writes require acknowledgement from all in-sync replicas; librdkafka
    /// retries transparently within [`MESSAGE_TIMEOUT_MS`].
    #[derive(Clone)]
    pub struct KafkaBus {
        producer: FutureProducer,
    }

    impl KafkaBus {
        /// Creates a producer bootstrapped from `brokers`.
        ///
        /// Broker connections are established lazily by librdkafka.
        pub fn connect(brokers: &[String]) -> Result<Self, BusError> {
            let producer: FutureProducer = ClientConfig::new()
                .set("bootstrap.servers", brokers.join(","))
                .set("acks", "all")
                .set("message.timeout.ms", MESSAGE_TIMEOUT_MS)
                .create()
                .map_err(|err| BusError::Client(err.to_string()))?;

            info!(broker_count = brokers.len(), "Kafka producer created");
            Ok(Self { producer })
        }
    }

    impl std::fmt::Debug for KafkaBus {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("KafkaBus").finish_non_exhaustive()
        }
    }

    #[async_trait]
    impl EventBus for KafkaBus {
        async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), BusError> {
            let record = FutureRecord::to(topic).key(key).payload(&payload);
            let (partition, offset) = self
                .producer
                .send(record, Timeout::Never)
                .await
                .map_err(|(err, _)| BusError::Publish(err.to_string()))?;

            debug!(topic, partition, offset, "Kafka delivery acknowledged");
            Ok(())
        }

        async fn flush(&self, timeout: Duration) -> Result<(), BusError> {
            let producer = self.producer.clone();
            tokio::task::spawn_blocking(move || producer.flush(Timeout::After(timeout)))
                .await
                .map_err(|err| BusError::Flush(err.to_string()))?
                .map_err(|err| BusError::Flush(err.to_string()))
        }
    }
}
