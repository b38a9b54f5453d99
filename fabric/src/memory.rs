//! Single-process simulated fabric backend.
//!
//! Simulates the broker for single-node operation and tests: publishes are
//! handed off asynchronously after a short fixed delay, and a handler
//! error requeues the delivery with a bounded retry budget. Semantics are
//! deliberately at-least-once and unordered, like the durable backend, so
//! code exercised against this backend sees the same contract.

use crate::{Delivery, FabricError, MessageFabric, MessageHandler, QueueBinding};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, error, trace, warn};

/// In-process fabric backend.
///
/// Every subscription is a `(binding, handler)` pair; a publish fans out
/// one background delivery task per matching queue, so deliveries to
/// different queues (and successive deliveries to the same queue) are
/// concurrent and unordered.
pub struct InMemoryFabric {
    delivery_delay: Duration,
    retry_delay: Duration,
    max_attempts: u32,
    subscriptions: RwLock<Vec<Subscription>>,
    closed: Arc<AtomicBool>,
}

struct Subscription {
    binding: QueueBinding,
    handler: Arc<dyn MessageHandler>,
}

impl InMemoryFabric {
    /// Creates a fabric with default timings (100 ms handoff, 250 ms retry
    /// delay, 3 attempts)
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a builder for configuring the fabric
    #[must_use]
    pub fn builder() -> InMemoryFabricBuilder {
        InMemoryFabricBuilder::default()
    }
}

impl Default for InMemoryFabric {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for configuring an [`InMemoryFabric`].
#[derive(Default)]
pub struct InMemoryFabricBuilder {
    delivery_delay: Option<Duration>,
    retry_delay: Option<Duration>,
    max_attempts: Option<u32>,
}

impl InMemoryFabricBuilder {
    /// Fixed delay between publish and handler invocation
    #[must_use]
    pub const fn delivery_delay(mut self, delay: Duration) -> Self {
        self.delivery_delay = Some(delay);
        self
    }

    /// Delay before a failed delivery is retried
    #[must_use]
    pub const fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Total delivery attempts before the message is dropped (minimum 1)
    #[must_use]
    pub const fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Build the [`InMemoryFabric`]
    #[must_use]
    pub fn build(self) -> InMemoryFabric {
        InMemoryFabric {
            delivery_delay: self.delivery_delay.unwrap_or(Duration::from_millis(100)),
            retry_delay: self.retry_delay.unwrap_or(Duration::from_millis(250)),
            max_attempts: self.max_attempts.unwrap_or(3).max(1),
            subscriptions: RwLock::new(Vec::new()),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl MessageFabric for InMemoryFabric {
    fn publish(
        &self,
        topic: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), FabricError>> + Send + '_>> {
        let delivery = Delivery {
            topic: topic.to_string(),
            routing_key: routing_key.to_string(),
            payload: payload.to_vec(),
        };

        Box::pin(async move {
            if self.closed.load(Ordering::SeqCst) {
                return Err(FabricError::Closed);
            }

            // Snapshot matching subscribers so the lock is not held across
            // any await point.
            let targets: Vec<(String, Arc<dyn MessageHandler>)> = {
                let subscriptions = self
                    .subscriptions
                    .read()
                    .map_err(|e| FabricError::PublishFailed {
                        topic: delivery.topic.clone(),
                        reason: format!("subscription registry poisoned: {e}"),
                    })?;
                subscriptions
                    .iter()
                    .filter(|s| s.binding.matches(&delivery.topic, &delivery.routing_key))
                    .map(|s| (s.binding.queue.clone(), Arc::clone(&s.handler)))
                    .collect()
            };

            trace!(
                topic = %delivery.topic,
                routing_key = %delivery.routing_key,
                queues = targets.len(),
                "message published"
            );

            for (queue, handler) in targets {
                tokio::spawn(dispatch(
                    queue,
                    handler,
                    delivery.clone(),
                    self.delivery_delay,
                    self.retry_delay,
                    self.max_attempts,
                    Arc::clone(&self.closed),
                ));
            }

            Ok(())
        })
    }

    fn subscribe(
        &self,
        binding: QueueBinding,
        handler: Arc<dyn MessageHandler>,
    ) -> Pin<Box<dyn Future<Output = Result<(), FabricError>> + Send + '_>> {
        Box::pin(async move {
            if self.closed.load(Ordering::SeqCst) {
                return Err(FabricError::Closed);
            }

            debug!(queue = %binding.queue, topic = %binding.topic, keys = ?binding.routing_keys, "queue bound");

            self.subscriptions
                .write()
                .map_err(|e| FabricError::SubscriptionFailed {
                    queue: binding.queue.clone(),
                    reason: format!("subscription registry poisoned: {e}"),
                })?
                .push(Subscription { binding, handler });

            Ok(())
        })
    }

    fn shutdown(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.closed.store(true, Ordering::SeqCst);
            debug!("in-memory fabric shut down");
        })
    }
}

/// Delivers one message to one queue: delayed handoff, then bounded retry
/// on handler error. Exhausted deliveries are dropped with an error log
/// (the sweeper's TTL path reclaims whatever state they were driving).
async fn dispatch(
    queue: String,
    handler: Arc<dyn MessageHandler>,
    delivery: Delivery,
    delivery_delay: Duration,
    retry_delay: Duration,
    max_attempts: u32,
    closed: Arc<AtomicBool>,
) {
    tokio::time::sleep(delivery_delay).await;

    for attempt in 1..=max_attempts {
        if closed.load(Ordering::SeqCst) {
            return;
        }

        match handler.handle(&delivery).await {
            Ok(()) => {
                trace!(
                    queue = %queue,
                    routing_key = %delivery.routing_key,
                    attempt,
                    "delivery handled"
                );
                return;
            }
            Err(e) if attempt < max_attempts => {
                warn!(
                    queue = %queue,
                    routing_key = %delivery.routing_key,
                    attempt,
                    error = %e,
                    "handler failed, requeueing delivery"
                );
                tokio::time::sleep(retry_delay).await;
            }
            Err(e) => {
                error!(
                    queue = %queue,
                    routing_key = %delivery.routing_key,
                    attempts = max_attempts,
                    error = %e,
                    "delivery dropped after retry budget exhausted"
                );
            }
        }
    }
}
