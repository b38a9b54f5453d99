//! Shared error taxonomy.
//!
//! Every failure the services surface falls into one of these categories.
//! None of them are retried automatically: `VersionConflict` means the
//! caller lost a reservation race and must refetch; `InvalidState` means an
//! illegal transition was attempted and the entity is unchanged.

use crate::ids::{OrderId, TicketId, UserId};
use thiserror::Error;

/// Convenience alias for service results
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the inventory and order services.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// No ticket with the given id
    #[error("ticket {0} not found")]
    TicketNotFound(TicketId),

    /// No order with the given id
    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    /// The requested transition is illegal for the entity's current status.
    /// The entity is left unchanged.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A buyer attempted to purchase their own listing. No order row is
    /// created.
    #[error("user {buyer} cannot purchase their own ticket {ticket}")]
    InvalidOwnership {
        /// The would-be buyer
        buyer: UserId,
        /// The ticket they listed themselves
        ticket: TicketId,
    },

    /// Lost a reservation race: the stored version moved past the one the
    /// caller observed. Surface as "no longer available"; refetch, don't
    /// retry blindly.
    #[error("ticket {ticket} version conflict: expected {expected}, stored {stored}")]
    VersionConflict {
        /// The contested ticket
        ticket: TicketId,
        /// Version the caller submitted
        expected: u64,
        /// Version actually stored
        stored: u64,
    },

    /// A publish or consume operation against the message fabric failed
    #[error("messaging failure: {0}")]
    Messaging(String),

    /// The backing store failed
    #[error("store failure: {0}")]
    Store(String),
}

impl Error {
    /// Shorthand for an [`Error::InvalidState`] with a formatted message
    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }
}
