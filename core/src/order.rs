//! The `Order` aggregate.
//!
//! An order is the buyer's side of the reservation saga: created `Pending`
//! with a TTL, then driven to exactly one terminal status. Terminal orders
//! are retained permanently as the audit trail and never mutated again.

use crate::ids::{OrderId, PaymentId, TicketId, UserId};
use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of an order.
///
/// `Pending` is the only non-terminal status. The three terminal statuses
/// are mutually exclusive and admit no further transitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Created, awaiting payment; the ticket reservation is in flight
    Pending,
    /// Paid for; the ticket is sold
    Completed,
    /// Cancelled by the buyer before payment
    Cancelled,
    /// Reclaimed by the sweeper after the TTL elapsed
    Expired,
}

impl OrderStatus {
    /// Whether this status admits no further transitions
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// A purchase attempt for exactly one ticket.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Unique identifier
    pub id: OrderId,
    /// The purchasing user
    pub buyer_id: UserId,
    /// The ticket being purchased
    pub ticket_id: TicketId,
    /// The ticket's seller, denormalized for seller-side queries
    pub seller_id: UserId,
    /// Event name copied from the ticket snapshot at creation
    pub event_name: String,
    /// Event date copied from the ticket snapshot at creation
    pub event_date: DateTime<Utc>,
    /// Seat details copied from the ticket snapshot at creation
    pub seat_info: Option<String>,
    /// Unit price at the time of purchase
    pub price: Money,
    /// Number of units
    pub quantity: u32,
    /// `price * quantity`
    pub total_amount: Money,
    /// Current lifecycle status
    pub status: OrderStatus,
    /// When the order was created
    pub created_at: DateTime<Utc>,
    /// When the order last changed
    pub updated_at: DateTime<Utc>,
    /// `created_at + TTL`; a `Pending` order past this instant is
    /// eligible for expiry
    pub expires_at: DateTime<Utc>,
    /// Set when the order completes
    pub payment_id: Option<PaymentId>,
    /// Set when the order is cancelled
    pub cancellation_reason: Option<String>,
}

impl Order {
    /// Whether the order has reached a terminal status
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether the TTL has elapsed at `now`
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(OrderStatus::Completed.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Expired.is_terminal());
    }
}
