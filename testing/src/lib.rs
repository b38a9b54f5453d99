//! # Ticketline Testing
//!
//! Test doubles shared across the workspace:
//! - [`FixedClock`] / [`ManualClock`] - deterministic time, so TTL and
//!   sweeper tests advance the clock instead of sleeping
//! - [`RecordingFabric`] - a [`MessageFabric`] that captures published
//!   envelopes for assertions

use chrono::{DateTime, Duration, Utc};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use ticketline_core::Clock;
use ticketline_fabric::{FabricError, MessageFabric, MessageHandler, QueueBinding};

/// Mock implementations for testing.
pub mod mocks {
    use super::{Arc, Clock, DateTime, Duration, Mutex, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Advanceable clock for TTL and sweeper tests.
    ///
    /// Starts at a given instant; tests move it forward explicitly with
    /// [`ManualClock::advance`] instead of sleeping.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        now: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock starting at `start`
        #[must_use]
        pub fn new(start: DateTime<Utc>) -> Self {
            Self { now: Arc::new(Mutex::new(start)) }
        }

        /// Move the clock forward by `delta`.
        ///
        /// # Panics
        ///
        /// Panics if the internal mutex is poisoned (a previous test
        /// panicked while advancing).
        #[allow(clippy::unwrap_used)]
        pub fn advance(&self, delta: Duration) {
            let mut now = self.now.lock().unwrap();
            *now += delta;
        }
    }

    impl Clock for ManualClock {
        #[allow(clippy::unwrap_used)]
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }

    /// Create a default fixed clock for tests (2026-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Create a manual clock starting at the default test instant
    #[must_use]
    pub fn manual_clock() -> ManualClock {
        ManualClock::new(test_clock().now())
    }
}

/// A message captured by [`RecordingFabric`].
#[derive(Clone, Debug)]
pub struct PublishedMessage {
    /// Topic it was published to
    pub topic: String,
    /// Routing key it was addressed with
    pub routing_key: String,
    /// Raw payload bytes
    pub payload: Vec<u8>,
}

/// A [`MessageFabric`] double that records every publish.
///
/// Bindings registered via `subscribe` are remembered but nothing is
/// routed automatically; tests assert on the captured envelopes (and can
/// replay them into handlers by hand when they want delivery).
#[derive(Default)]
pub struct RecordingFabric {
    published: Mutex<Vec<PublishedMessage>>,
    bindings: Mutex<Vec<QueueBinding>>,
}

impl RecordingFabric {
    /// Creates an empty recording fabric
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every captured publish, in publish order
    ///
    /// # Panics
    ///
    /// Panics if the capture mutex is poisoned.
    #[allow(clippy::unwrap_used)]
    #[must_use]
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().unwrap().clone()
    }

    /// Captured publishes addressed to `routing_key`
    #[must_use]
    pub fn published_on(&self, routing_key: &str) -> Vec<PublishedMessage> {
        self.published()
            .into_iter()
            .filter(|m| m.routing_key == routing_key)
            .collect()
    }

    /// Queue bindings registered via `subscribe`
    ///
    /// # Panics
    ///
    /// Panics if the capture mutex is poisoned.
    #[allow(clippy::unwrap_used)]
    #[must_use]
    pub fn bindings(&self) -> Vec<QueueBinding> {
        self.bindings.lock().unwrap().clone()
    }
}

impl MessageFabric for RecordingFabric {
    fn publish(
        &self,
        topic: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), FabricError>> + Send + '_>> {
        let message = PublishedMessage {
            topic: topic.to_string(),
            routing_key: routing_key.to_string(),
            payload: payload.to_vec(),
        };
        Box::pin(async move {
            self.published
                .lock()
                .map_err(|_| FabricError::PublishFailed {
                    topic: message.topic.clone(),
                    reason: "capture mutex poisoned".to_string(),
                })?
                .push(message);
            Ok(())
        })
    }

    fn subscribe(
        &self,
        binding: QueueBinding,
        _handler: Arc<dyn MessageHandler>,
    ) -> Pin<Box<dyn Future<Output = Result<(), FabricError>> + Send + '_>> {
        Box::pin(async move {
            self.bindings
                .lock()
                .map_err(|_| FabricError::SubscriptionFailed {
                    queue: binding.queue.clone(),
                    reason: "capture mutex poisoned".to_string(),
                })?
                .push(binding);
            Ok(())
        })
    }

    fn shutdown(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async {})
    }
}

/// A fabric double whose publishes always fail.
///
/// Used to assert the availability-over-consistency path: an order must
/// still commit locally when the reservation intent cannot be published.
#[derive(Default)]
pub struct FailingFabric;

impl FailingFabric {
    /// Creates the failing fabric
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl MessageFabric for FailingFabric {
    fn publish(
        &self,
        topic: &str,
        _routing_key: &str,
        _payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), FabricError>> + Send + '_>> {
        let topic = topic.to_string();
        Box::pin(async move {
            Err(FabricError::PublishFailed {
                topic,
                reason: "simulated broker outage".to_string(),
            })
        })
    }

    fn subscribe(
        &self,
        _binding: QueueBinding,
        _handler: Arc<dyn MessageHandler>,
    ) -> Pin<Box<dyn Future<Output = Result<(), FabricError>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }

    fn shutdown(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async {})
    }
}

// Re-export commonly used items
pub use mocks::{manual_clock, test_clock, FixedClock, ManualClock};

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn doubles_are_fabrics() {
        fn assert_fabric<T: MessageFabric>() {}
        assert_fabric::<RecordingFabric>();
        assert_fabric::<FailingFabric>();
    }

    #[test]
    fn manual_clock_advances() {
        let clock = manual_clock();
        let start = clock.now();
        clock.advance(Duration::minutes(16));
        assert_eq!(clock.now() - start, Duration::minutes(16));
    }

    #[tokio::test]
    async fn recording_fabric_captures_publishes() {
        let fabric = RecordingFabric::new();
        fabric.publish("ticket.exchange", "ticket.reserve", b"abc").await.unwrap();

        let captured = fabric.published_on("ticket.reserve");
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].payload, b"abc");
        assert!(fabric.published_on("ticket.release").is_empty());
    }

}
