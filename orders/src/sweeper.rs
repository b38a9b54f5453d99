//! TTL sweeper for abandoned reservations.
//!
//! An explicit worker that owns its tick loop: every interval it queries
//! the store for `Pending` orders past their TTL and expires each one,
//! isolating per-order failures so one bad order never aborts the batch.
//! A startup sweep (after a short delay) reclaims orders that expired
//! while the process was not running — this is the system's sole
//! consistency-repair mechanism for orphaned reservations.

use crate::service::OrderService;
use crate::store::OrderStore;
use std::sync::Arc;
use std::time::Duration;
use ticketline_core::Clock;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Sweeper timing configuration.
#[derive(Clone, Copy, Debug)]
pub struct SweeperConfig {
    /// How often a sweep cycle runs
    pub interval: Duration,
    /// Delay before the one-off startup sweep
    pub startup_delay: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            startup_delay: Duration::from_secs(30),
        }
    }
}

/// Periodic task that drives `Pending` orders past their TTL into
/// `Expired`.
pub struct ExpirationSweeper {
    service: OrderService,
    store: Arc<dyn OrderStore>,
    clock: Arc<dyn Clock>,
    config: SweeperConfig,
}

impl ExpirationSweeper {
    /// Creates a sweeper with default timing (60 s interval, 30 s startup
    /// delay)
    #[must_use]
    pub fn new(service: OrderService, store: Arc<dyn OrderStore>, clock: Arc<dyn Clock>) -> Self {
        Self::with_config(service, store, clock, SweeperConfig::default())
    }

    /// Creates a sweeper with explicit timing
    #[must_use]
    pub const fn with_config(
        service: OrderService,
        store: Arc<dyn OrderStore>,
        clock: Arc<dyn Clock>,
        config: SweeperConfig,
    ) -> Self {
        Self { service, store, clock, config }
    }

    /// Run one sweep cycle now.
    ///
    /// Public so tests can advance a manual clock and sweep
    /// deterministically instead of waiting for the tick loop.
    pub async fn sweep_once(&self) {
        let now = self.clock.now();
        debug!("starting expired orders sweep");

        let expired = match self.store.find_expired_pending(now).await {
            Ok(expired) => expired,
            Err(e) => {
                error!(error = %e, "failed to query expired pending orders");
                return;
            }
        };

        if !expired.is_empty() {
            info!(count = expired.len(), "found expired orders to process");
        }

        for order in expired {
            // Per-order isolation: one failure never aborts the batch
            if let Err(e) = self.service.expire_order(order.id).await {
                error!(order_id = %order.id, error = %e, "failed to expire order");
            }
        }

        debug!("expired orders sweep completed");
    }

    /// Spawn the sweeper as a background task.
    ///
    /// Runs a startup sweep after `startup_delay`, then sweeps every
    /// `interval` until the shutdown signal fires.
    #[must_use]
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run(shutdown).await;
        })
    }

    async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval = ?self.config.interval,
            startup_delay = ?self.config.startup_delay,
            "expiration sweeper started"
        );

        // Startup sweep reclaims orders that expired while the process was
        // down.
        tokio::select! {
            _ = shutdown.recv() => {
                info!("expiration sweeper stopped before startup sweep");
                return;
            }
            () = tokio::time::sleep(self.config.startup_delay) => {
                self.sweep_once().await;
            }
        }

        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + self.config.interval,
            self.config.interval,
        );
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("expiration sweeper received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
            }
        }

        info!("expiration sweeper stopped");
    }
}
