//! Event producer: the process-wide handle that turns validated requests
//! into envelopes on the event bus.
//!
//! One [`EventProducer`] is created before the router starts accepting
//! requests and is shared (behind an `Arc`) by every handler. It is closed
//! once, after the HTTP server has stopped accepting connections.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use pulse_server::bus::MemoryBus;
//! use pulse_server::producer::EventProducer;
//! use pulse_server::types::AddEventRequest;
//! use tokio_util::sync::CancellationToken;
//!
//! # tokio_test::block_on(async {
//! let bus = MemoryBus::new();
//! let producer = EventProducer::new(Arc::new(bus.clone()), vec!["localhost:9092".into()], "analytics-events");
//!
//! let request = AddEventRequest {
//!     event_type: "login".to_string(),
//!     user_id: "u1".to_string(),
//!     data: None,
//! };
//! let envelope = producer.send_event(&request, &CancellationToken::new()).await.unwrap();
//!
//! assert_eq!(bus.records()[0].key, envelope.user_id);
//! producer.close().await.unwrap();
//! # });
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{BusError, EventBus};
use crate::types::{AddEventRequest, EventEnvelope, ValidationError};

/// How long [`EventProducer::close`] waits for outstanding writes.
pub const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Failures surfaced by [`EventProducer::send_event`] and [`EventProducer::close`].
#[derive(Debug, Error)]
pub enum ProducerError {
    /// The request failed validation and was never encoded.
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    /// The envelope could not be serialized.
    #[error("failed to encode event envelope: {0}")]
    Encode(String),

    /// The bus rejected or failed the write.
    #[error(transparent)]
    Bus(#[from] BusError),

    /// The caller cancelled before the bus acknowledged.
    #[error("event publish was cancelled")]
    Cancelled,

    /// [`EventProducer::close`] has already been called.
    #[error("event producer is closed")]
    Closed,
}

/// Shared publisher for ingested events.
pub struct EventProducer {
    bus: Arc<dyn EventBus>,
    brokers: Vec<String>,
    topic: String,
    closed: AtomicBool,
}

impl EventProducer {
    /// Creates a producer publishing to `topic` through `bus`.
    ///
    /// `brokers` is kept for reporting; the bus client owns the connections.
    pub fn new(bus: Arc<dyn EventBus>, brokers: Vec<String>, topic: impl Into<String>) -> Self {
        let topic = topic.into();
        debug!(topic = %topic, broker_count = brokers.len(), "Created event producer");
        Self {
            bus,
            brokers,
            topic,
            closed: AtomicBool::new(false),
        }
    }

    /// Topic every envelope is published to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Broker list the producer was configured with.
    pub fn brokers(&self) -> &[String] {
        &self.brokers
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Wraps `request` in an envelope and publishes it, keyed by `userId`.
    ///
    /// Returns the published envelope only after the bus has acknowledged the
    /// write. If `cancel` fires first the publish is abandoned and
    /// [`ProducerError::Cancelled`] is returned. Bus errors are returned as-is;
    /// there is no retry beyond what the bus client does itself.
    pub async fn send_event(
        &self,
        request: &AddEventRequest,
        cancel: &CancellationToken,
    ) -> Result<EventEnvelope, ProducerError> {
        if self.is_closed() {
            return Err(ProducerError::Closed);
        }

        request.validate()?;

        let envelope = EventEnvelope::from_request(request);
        let payload =
            serde_json::to_vec(&envelope).map_err(|err| ProducerError::Encode(err.to_string()))?;

        debug!(
            topic = %self.topic,
            key = %envelope.partition_key(),
            event_id = %envelope.event_id,
            event_type = %envelope.event_type,
            "Publishing event"
        );

        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                warn!(event_id = %envelope.event_id, "Event publish cancelled before acknowledgement");
                Err(ProducerError::Cancelled)
            }
            result = self.bus.publish(&self.topic, envelope.partition_key(), payload) => {
                result?;
                Ok(envelope)
            }
        }
    }

    /// Flushes outstanding writes and marks the producer closed.
    ///
    /// Only the first call flushes; later calls return `Ok(())` immediately.
    pub async fn close(&self) -> Result<(), ProducerError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            debug!("Event producer already closed");
            return Ok(());
        }

        self.bus.flush(CLOSE_FLUSH_TIMEOUT).await?;
        info!(topic = %self.topic, "Event producer closed");
        Ok(())
    }
}

impl fmt::Debug for EventProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventProducer")
            .field("topic", &self.topic)
            .field("brokers", &self.brokers)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
