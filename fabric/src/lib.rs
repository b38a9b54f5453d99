//! Message fabric abstraction for cross-service communication.
//!
//! The fabric is a topic-routed publish/subscribe transport: publishers
//! address a `(topic, routing key)` pair, and a [`QueueBinding`] maps one
//! or more routing-key patterns under a topic to a named queue whose
//! deliveries are fed to a [`MessageHandler`].
//!
//! # Delivery Semantics
//!
//! **At-least-once**: a delivery may be handed to a handler more than once
//! (after a handler failure, a crash before offset commit, or a broker
//! redelivery) and deliveries on different routing keys may arrive out of
//! order relative to publish order. Handlers MUST be idempotent and
//! order-independent; in Ticketline this is guaranteed by the domain
//! guards (ticket CAS, order status guard), not by the transport.
//!
//! # Implementations
//!
//! Two interchangeable backends behind the identical contract, chosen once
//! at startup by [`build_fabric`]:
//!
//! - [`InMemoryFabric`] - single-process simulated queue: asynchronous
//!   handoff after a short fixed delay, bounded requeue on handler error
//! - [`KafkaFabric`] - durable, persisted broker transport with manual
//!   offset commits after handler success

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

pub mod kafka;
pub mod memory;

pub use kafka::KafkaFabric;
pub use memory::InMemoryFabric;

/// Errors that can occur during fabric operations.
#[derive(Error, Debug, Clone)]
pub enum FabricError {
    /// Failed to connect to the transport
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish a message to a topic
    #[error("publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to bind a queue
    #[error("subscription failed for queue '{queue}': {reason}")]
    SubscriptionFailed {
        /// The queue that failed to bind
        queue: String,
        /// The reason for failure
        reason: String,
    },

    /// The fabric has been shut down
    #[error("fabric is shut down")]
    Closed,

    /// Invalid configuration
    #[error("invalid fabric configuration: {0}")]
    InvalidConfig(String),
}

/// Error type returned by message handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// A single message as seen by a consumer.
#[derive(Clone, Debug)]
pub struct Delivery {
    /// Topic the message was published to
    pub topic: String,
    /// Routing key the publisher addressed
    pub routing_key: String,
    /// Opaque payload bytes (JSON envelopes in Ticketline)
    pub payload: Vec<u8>,
}

/// Handler invoked for each delivery on a bound queue.
///
/// Returning `Err` signals the fabric that processing failed: the
/// in-memory backend requeues the delivery (bounded retry); the Kafka
/// backend withholds the offset commit so the message is redelivered.
/// Domain-level rejections that can never succeed on retry (version
/// conflicts, illegal transitions) should be consumed with `Ok(())` and
/// logged instead.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process one delivery.
    ///
    /// # Errors
    ///
    /// Returns an error only for failures where redelivery could help
    /// (store unavailable, downstream publish failed).
    async fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError>;
}

/// Maps routing-key patterns under a topic to a named queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueBinding {
    /// Queue name (also the consumer-group identity on the Kafka backend)
    pub queue: String,
    /// Topic the queue is bound under
    pub topic: String,
    /// Routing-key patterns; `*` matches one dot-separated word, `#`
    /// matches zero or more
    pub routing_keys: Vec<String>,
}

impl QueueBinding {
    /// Creates a binding from a queue name, topic, and routing-key patterns
    pub fn new<I, S>(queue: impl Into<String>, topic: impl Into<String>, routing_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            queue: queue.into(),
            topic: topic.into(),
            routing_keys: routing_keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether a published `(topic, routing key)` pair lands on this queue
    #[must_use]
    pub fn matches(&self, topic: &str, routing_key: &str) -> bool {
        self.topic == topic
            && self
                .routing_keys
                .iter()
                .any(|pattern| routing_key_matches(pattern, routing_key))
    }
}

/// Matches a routing key against a topic-exchange pattern.
///
/// Patterns are dot-separated words where `*` matches exactly one word and
/// `#` matches zero or more words, as in AMQP topic exchanges.
#[must_use]
pub fn routing_key_matches(pattern: &str, key: &str) -> bool {
    fn matches(pattern: &[&str], key: &[&str]) -> bool {
        match (pattern.first(), key.first()) {
            (None, None) => true,
            (Some(&"#"), _) => {
                // '#' absorbs zero words, or one word and stays in play
                matches(&pattern[1..], key)
                    || (!key.is_empty() && matches(pattern, &key[1..]))
            }
            (Some(&"*"), Some(_)) => matches(&pattern[1..], &key[1..]),
            (Some(&word), Some(&k)) if word == k => matches(&pattern[1..], &key[1..]),
            _ => false,
        }
    }

    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = key.split('.').collect();
    matches(&pattern, &key)
}

/// Trait for message fabric implementations.
///
/// Uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn` so
/// the fabric can be held as `Arc<dyn MessageFabric>` across services.
pub trait MessageFabric: Send + Sync {
    /// Publish a payload under `(topic, routing_key)`.
    ///
    /// # Errors
    ///
    /// Returns [`FabricError::PublishFailed`] if the transport rejects the
    /// message, or [`FabricError::Closed`] after shutdown.
    fn publish(
        &self,
        topic: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), FabricError>> + Send + '_>>;

    /// Bind a queue and register the handler that consumes it.
    ///
    /// Consumption runs in a background task owned by the fabric until
    /// [`MessageFabric::shutdown`] is called.
    ///
    /// # Errors
    ///
    /// Returns [`FabricError::SubscriptionFailed`] if the binding cannot
    /// be established.
    fn subscribe(
        &self,
        binding: QueueBinding,
        handler: Arc<dyn MessageHandler>,
    ) -> Pin<Box<dyn Future<Output = Result<(), FabricError>> + Send + '_>>;

    /// Stop accepting publishes and wind down consumer tasks.
    fn shutdown(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Which backend the factory builds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FabricBackend {
    /// Single-process simulated queue
    Memory,
    /// Durable Kafka-compatible broker
    Kafka,
}

impl FromStr for FabricBackend {
    type Err = FabricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" | "inmemory" | "in-memory" => Ok(Self::Memory),
            "kafka" | "redpanda" | "broker" => Ok(Self::Kafka),
            other => Err(FabricError::InvalidConfig(format!(
                "unknown fabric backend '{other}'"
            ))),
        }
    }
}

/// Fabric configuration, resolved once at startup.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FabricConfig {
    /// Backend to build
    pub backend: FabricBackend,
    /// Broker addresses, comma-separated (Kafka backend)
    pub brokers: String,
    /// Producer acknowledgment mode: "0", "1", or "all" (Kafka backend)
    pub producer_acks: String,
    /// Where new consumer groups start reading (Kafka backend)
    pub auto_offset_reset: String,
    /// Fixed handoff delay in milliseconds (in-memory backend)
    pub delivery_delay_ms: u64,
    /// Delay before a failed delivery is retried (in-memory backend)
    pub retry_delay_ms: u64,
    /// Delivery attempts before a message is dropped (in-memory backend)
    pub max_attempts: u32,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            backend: FabricBackend::Memory,
            brokers: "localhost:9092".to_string(),
            producer_acks: "1".to_string(),
            auto_offset_reset: "latest".to_string(),
            delivery_delay_ms: 100,
            retry_delay_ms: 250,
            max_attempts: 3,
        }
    }
}

/// Builds the configured fabric backend.
///
/// This is the single point where a backend is chosen; nothing downstream
/// branches on configuration again.
///
/// # Errors
///
/// Returns [`FabricError::ConnectionFailed`] if the Kafka producer cannot
/// be created.
pub fn build_fabric(config: &FabricConfig) -> Result<Arc<dyn MessageFabric>, FabricError> {
    match config.backend {
        FabricBackend::Memory => {
            tracing::info!(
                delivery_delay_ms = config.delivery_delay_ms,
                max_attempts = config.max_attempts,
                "using in-memory message fabric"
            );
            Ok(Arc::new(
                InMemoryFabric::builder()
                    .delivery_delay(std::time::Duration::from_millis(config.delivery_delay_ms))
                    .retry_delay(std::time::Duration::from_millis(config.retry_delay_ms))
                    .max_attempts(config.max_attempts)
                    .build(),
            ))
        }
        FabricBackend::Kafka => {
            tracing::info!(brokers = %config.brokers, "using Kafka message fabric");
            Ok(Arc::new(
                KafkaFabric::builder()
                    .brokers(&config.brokers)
                    .producer_acks(&config.producer_acks)
                    .auto_offset_reset(&config.auto_offset_reset)
                    .build()?,
            ))
        }
    }
}
