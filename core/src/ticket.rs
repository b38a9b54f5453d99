//! The `Ticket` aggregate.
//!
//! A ticket is listed by a seller, reserved when a buyer's order is pending,
//! and sold when the order completes. Every accepted mutation increments
//! `version` by exactly one; the inventory store's compare-and-swap uses the
//! version to guarantee at-most-one-buyer under concurrent reservations.

use crate::ids::{TicketId, UserId};
use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a listed ticket.
///
/// Transitions: `Available -> Reserved -> Sold`, with `Reserved ->
/// Available` on release. `Sold` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    /// Listed and purchasable
    Available,
    /// Held by a pending order
    Reserved,
    /// Purchase completed
    Sold,
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available => write!(f, "AVAILABLE"),
            Self::Reserved => write!(f, "RESERVED"),
            Self::Sold => write!(f, "SOLD"),
        }
    }
}

/// Fields a seller supplies when listing a ticket
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewTicket {
    /// Name of the event the ticket admits to
    pub event_name: String,
    /// Listing category (concert, sports, theatre, ...)
    pub category: String,
    /// Venue location
    pub location: String,
    /// When the event takes place
    pub event_date: DateTime<Utc>,
    /// Optional seat or section details
    pub seat_info: Option<String>,
    /// Asking price
    pub price: Money,
    /// The listing seller
    pub seller_id: UserId,
}

/// A listed ticket.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    /// Unique identifier
    pub id: TicketId,
    /// Name of the event the ticket admits to
    pub event_name: String,
    /// Listing category
    pub category: String,
    /// Venue location
    pub location: String,
    /// When the event takes place
    pub event_date: DateTime<Utc>,
    /// Optional seat or section details
    pub seat_info: Option<String>,
    /// Asking price
    pub price: Money,
    /// The listing seller
    pub seller_id: UserId,
    /// Current holder of the ticket. Equal to `seller_id` while listed;
    /// ownership transfer on resale settlement happens outside this core.
    pub owner_user_id: UserId,
    /// Current lifecycle status
    pub status: TicketStatus,
    /// Optimistic-concurrency version, incremented on every accepted mutation
    pub version: u64,
}

impl Ticket {
    /// Creates a freshly listed ticket: `Available`, version 0, owned by
    /// its seller.
    #[must_use]
    pub fn list(draft: NewTicket) -> Self {
        Self {
            id: TicketId::new(),
            event_name: draft.event_name,
            category: draft.category,
            location: draft.location,
            event_date: draft.event_date,
            seat_info: draft.seat_info,
            price: draft.price,
            seller_id: draft.seller_id,
            owner_user_id: draft.seller_id,
            status: TicketStatus::Available,
            version: 0,
        }
    }

    /// Whether the ticket can currently be purchased
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.status == TicketStatus::Available
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn draft() -> NewTicket {
        NewTicket {
            event_name: "Midnight Run".to_string(),
            category: "concert".to_string(),
            location: "Hall C".to_string(),
            event_date: Utc::now(),
            seat_info: Some("Row 4, Seat 12".to_string()),
            price: Money::from_dollars(50),
            seller_id: UserId::new(),
        }
    }

    #[test]
    fn listing_starts_available_at_version_zero() {
        let ticket = Ticket::list(draft());
        assert_eq!(ticket.status, TicketStatus::Available);
        assert_eq!(ticket.version, 0);
        assert_eq!(ticket.owner_user_id, ticket.seller_id);
        assert!(ticket.is_available());
    }

    #[test]
    fn status_serializes_screaming_snake() {
        let json = serde_json::to_string(&TicketStatus::Available).unwrap();
        assert_eq!(json, "\"AVAILABLE\"");
    }
}
