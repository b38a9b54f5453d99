//! # Ticketline Core
//!
//! Shared domain types for the Ticketline marketplace: identifiers, money,
//! the `Ticket` and `Order` aggregates, the closed message contracts that
//! couple the inventory and order services, the shared error taxonomy, and
//! the `Clock` abstraction.
//!
//! The two services (`ticketline-inventory`, `ticketline-orders`) own their
//! stores and state machines; this crate holds only what crosses the wire
//! or the service boundary.

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod clock;
pub mod error;
pub mod ids;
pub mod messages;
pub mod money;
pub mod order;
pub mod ticket;

pub use clock::{Clock, SystemClock};
pub use error::{Error, Result};
pub use ids::{OrderId, PaymentId, TicketId, UserId};
pub use money::Money;
pub use order::{Order, OrderStatus};
pub use ticket::{NewTicket, Ticket, TicketStatus};
