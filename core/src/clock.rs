//! Time abstraction.
//!
//! Anything that stamps timestamps or compares against TTLs takes a
//! `Clock` so tests can advance time deterministically instead of
//! sleeping. See `ticketline-testing` for the deterministic
//! implementations.

use chrono::{DateTime, Utc};

/// Clock trait - abstracts time operations for testability
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
