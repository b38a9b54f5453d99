//! Configuration management for the Ticketline process.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::time::Duration;
use ticketline_fabric::{FabricBackend, FabricConfig};
use ticketline_orders::{SweeperConfig, DEFAULT_ORDER_TTL_MINUTES};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Message fabric configuration (backend chosen once at startup)
    pub fabric: FabricConfig,
    /// Order lifecycle configuration
    pub orders: OrdersConfig,
}

/// Order service configuration
#[derive(Debug, Clone)]
pub struct OrdersConfig {
    /// TTL for pending orders (set from `ORDER_TTL_MINUTES`)
    pub ttl: chrono::Duration,
    /// Sweeper timing
    pub sweeper: SweeperConfig,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = FabricConfig::default();
        Self {
            fabric: FabricConfig {
                backend: env::var("FABRIC_BACKEND")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(FabricBackend::Memory),
                brokers: env::var("FABRIC_BROKERS")
                    .unwrap_or_else(|_| "localhost:9092".to_string()),
                producer_acks: env::var("FABRIC_PRODUCER_ACKS")
                    .unwrap_or_else(|_| defaults.producer_acks.clone()),
                auto_offset_reset: env::var("FABRIC_AUTO_OFFSET_RESET")
                    .unwrap_or_else(|_| defaults.auto_offset_reset.clone()),
                delivery_delay_ms: env_parse("FABRIC_DELIVERY_DELAY_MS", defaults.delivery_delay_ms),
                retry_delay_ms: env_parse("FABRIC_RETRY_DELAY_MS", defaults.retry_delay_ms),
                max_attempts: env_parse("FABRIC_MAX_ATTEMPTS", defaults.max_attempts),
            },
            orders: OrdersConfig {
                ttl: chrono::Duration::minutes(env_parse(
                    "ORDER_TTL_MINUTES",
                    DEFAULT_ORDER_TTL_MINUTES,
                )),
                sweeper: SweeperConfig {
                    interval: Duration::from_secs(env_parse("SWEEP_INTERVAL_SECS", 60)),
                    startup_delay: Duration::from_secs(env_parse("SWEEP_STARTUP_DELAY_SECS", 30)),
                },
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fabric: FabricConfig::default(),
            orders: OrdersConfig {
                ttl: chrono::Duration::minutes(DEFAULT_ORDER_TTL_MINUTES),
                sweeper: SweeperConfig::default(),
            },
        }
    }
}
