//! Durable fabric backend on a Kafka-compatible broker.
//!
//! Topics map to broker topics and the routing key rides as the message
//! key; each [`QueueBinding`] becomes its own consumer group (the queue
//! name), filtering deliveries client-side against the binding's
//! routing-key patterns.
//!
//! # Delivery Semantics
//!
//! **At-least-once** with manual offset commits: an offset is committed
//! only AFTER the handler returns `Ok`, so a handler failure or a crash
//! mid-processing leads to redelivery. Handlers are idempotent by
//! contract, so redelivery is safe.

use crate::{Delivery, FabricError, MessageFabric, MessageHandler, QueueBinding};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Kafka-backed fabric implementation.
///
/// Producer sends are asynchronous with configurable acknowledgment; each
/// bound queue runs a subscribe-process-reconnect loop in a background
/// task until shutdown.
pub struct KafkaFabric {
    producer: FutureProducer,
    brokers: String,
    timeout: Duration,
    auto_offset_reset: String,
    shutdown: broadcast::Sender<()>,
}

impl KafkaFabric {
    /// Creates a fabric with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`FabricError::ConnectionFailed`] if the producer cannot be
    /// created.
    pub fn new(brokers: &str) -> Result<Self, FabricError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a builder for configuring the fabric
    #[must_use]
    pub fn builder() -> KafkaFabricBuilder {
        KafkaFabricBuilder::default()
    }

    /// Broker addresses this fabric connects to
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }
}

/// Builder for configuring a [`KafkaFabric`].
#[derive(Default)]
pub struct KafkaFabricBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    auto_offset_reset: Option<String>,
}

impl KafkaFabricBuilder {
    /// Set the broker addresses (comma-separated)
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the producer acknowledgment mode: "0", "1", or "all"
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Set the compression codec: "none", "gzip", "snappy", "lz4", "zstd"
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Set the producer send timeout (default: 5 seconds)
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Where new consumer groups start reading: "earliest" or "latest"
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Build the [`KafkaFabric`].
    ///
    /// # Errors
    ///
    /// Returns [`FabricError::ConnectionFailed`] if brokers are not set or
    /// the producer cannot be created.
    pub fn build(self) -> Result<KafkaFabric, FabricError> {
        let brokers = self
            .brokers
            .ok_or_else(|| FabricError::ConnectionFailed("brokers not configured".to_string()))?;

        let mut producer_config = ClientConfig::new();
        producer_config
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", self.producer_acks.as_deref().unwrap_or("1"))
            .set("compression.type", self.compression.as_deref().unwrap_or("none"));

        let producer: FutureProducer = producer_config.create().map_err(|e| {
            FabricError::ConnectionFailed(format!("failed to create producer: {e}"))
        })?;

        let (shutdown, _) = broadcast::channel(1);

        info!(
            brokers = %brokers,
            acks = self.producer_acks.as_deref().unwrap_or("1"),
            "Kafka fabric created"
        );

        Ok(KafkaFabric {
            producer,
            brokers,
            timeout: self.timeout.unwrap_or(Duration::from_secs(5)),
            auto_offset_reset: self.auto_offset_reset.unwrap_or_else(|| "latest".to_string()),
            shutdown,
        })
    }
}

impl MessageFabric for KafkaFabric {
    fn publish(
        &self,
        topic: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), FabricError>> + Send + '_>> {
        let topic = topic.to_string();
        let routing_key = routing_key.to_string();
        let payload = payload.to_vec();
        let timeout = self.timeout;

        Box::pin(async move {
            let record = FutureRecord::to(&topic)
                .payload(&payload)
                .key(routing_key.as_bytes());

            match self.producer.send(record, Timeout::After(timeout)).await {
                Ok((partition, offset)) => {
                    debug!(
                        topic = %topic,
                        routing_key = %routing_key,
                        partition,
                        offset,
                        "message published"
                    );
                    Ok(())
                }
                Err((kafka_error, _)) => {
                    error!(topic = %topic, routing_key = %routing_key, error = %kafka_error, "publish failed");
                    Err(FabricError::PublishFailed {
                        topic,
                        reason: kafka_error.to_string(),
                    })
                }
            }
        })
    }

    fn subscribe(
        &self,
        binding: QueueBinding,
        handler: Arc<dyn MessageHandler>,
    ) -> Pin<Box<dyn Future<Output = Result<(), FabricError>> + Send + '_>> {
        let brokers = self.brokers.clone();
        let auto_offset_reset = self.auto_offset_reset.clone();
        let mut shutdown = self.shutdown.subscribe();

        Box::pin(async move {
            // Fail fast on the first consumer so a misconfigured binding
            // surfaces at startup rather than in the background task.
            let consumer = create_consumer(&brokers, &auto_offset_reset, &binding)?;

            info!(
                queue = %binding.queue,
                topic = %binding.topic,
                keys = ?binding.routing_keys,
                "queue bound to broker"
            );

            tokio::spawn(async move {
                let retry_delay = Duration::from_secs(5);
                let mut current = Some(consumer);

                loop {
                    let consumer = match current.take() {
                        Some(c) => c,
                        None => match create_consumer(&brokers, &auto_offset_reset, &binding) {
                            Ok(c) => c,
                            Err(e) => {
                                error!(queue = %binding.queue, error = %e, "failed to recreate consumer, retrying");
                                tokio::select! {
                                    _ = shutdown.recv() => return,
                                    () = tokio::time::sleep(retry_delay) => continue,
                                }
                            }
                        },
                    };

                    if process_until_disconnect(&consumer, &binding, &handler, &mut shutdown).await {
                        return; // Shutdown requested
                    }

                    warn!(queue = %binding.queue, "consumer stream ended, reconnecting in {retry_delay:?}");
                    tokio::select! {
                        _ = shutdown.recv() => return,
                        () = tokio::time::sleep(retry_delay) => {}
                    }
                }
            });

            Ok(())
        })
    }

    fn shutdown(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            // No receivers just means nothing was subscribed
            let _ = self.shutdown.send(());
            debug!("Kafka fabric shut down");
        })
    }
}

fn create_consumer(
    brokers: &str,
    auto_offset_reset: &str,
    binding: &QueueBinding,
) -> Result<StreamConsumer, FabricError> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .set("group.id", &binding.queue)
        .set("enable.auto.commit", "false") // Manual commit for at-least-once
        .set("auto.offset.reset", auto_offset_reset)
        .set("session.timeout.ms", "6000")
        .set("enable.partition.eof", "false")
        .create()
        .map_err(|e| FabricError::SubscriptionFailed {
            queue: binding.queue.clone(),
            reason: format!("failed to create consumer: {e}"),
        })?;

    consumer
        .subscribe(&[binding.topic.as_str()])
        .map_err(|e| FabricError::SubscriptionFailed {
            queue: binding.queue.clone(),
            reason: format!("failed to subscribe to topic: {e}"),
        })?;

    Ok(consumer)
}

/// Drains the consumer stream until shutdown (returns `true`) or the
/// stream ends (returns `false`, caller reconnects).
async fn process_until_disconnect(
    consumer: &StreamConsumer,
    binding: &QueueBinding,
    handler: &Arc<dyn MessageHandler>,
    shutdown: &mut broadcast::Receiver<()>,
) -> bool {
    use futures::StreamExt;

    let mut stream = consumer.stream();

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!(queue = %binding.queue, "consumer received shutdown signal");
                return true;
            }
            msg = stream.next() => match msg {
                Some(Ok(message)) => {
                    let Some(payload) = message.payload() else {
                        commit(consumer, &message, binding);
                        continue;
                    };

                    let routing_key = message
                        .key()
                        .map(|k| String::from_utf8_lossy(k).into_owned())
                        .unwrap_or_default();

                    // Consumer groups receive every message on the topic;
                    // drop the ones this queue's patterns don't claim.
                    if !binding.matches(&binding.topic, &routing_key) {
                        commit(consumer, &message, binding);
                        continue;
                    }

                    let delivery = Delivery {
                        topic: binding.topic.clone(),
                        routing_key,
                        payload: payload.to_vec(),
                    };

                    match handler.handle(&delivery).await {
                        Ok(()) => commit(consumer, &message, binding),
                        Err(e) => {
                            // Withhold the commit: the broker redelivers
                            // after rebalance or restart.
                            error!(
                                queue = %binding.queue,
                                routing_key = %delivery.routing_key,
                                error = %e,
                                "handler failed, offset not committed"
                            );
                        }
                    }
                }
                Some(Err(e)) => {
                    error!(queue = %binding.queue, error = %e, "transport error on consumer stream");
                }
                None => return false,
            }
        }
    }
}

fn commit(consumer: &StreamConsumer, message: &rdkafka::message::BorrowedMessage<'_>, binding: &QueueBinding) {
    if let Err(e) = consumer.commit_message(message, CommitMode::Async) {
        warn!(
            queue = %binding.queue,
            offset = message.offset(),
            error = %e,
            "failed to commit offset (message may be redelivered)"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kafka_fabric_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<KafkaFabric>();
        assert_sync::<KafkaFabric>();
    }

    #[test]
    fn builder_requires_brokers() {
        assert!(KafkaFabric::builder().build().is_err());
    }
}
