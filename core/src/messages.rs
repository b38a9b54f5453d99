//! Message contracts between the order and inventory services.
//!
//! Every envelope carries the correlation identifiers `{ticketId, orderId,
//! userId}` and a timestamp. The event-type tag is a closed enum with an
//! exhaustive match at every consumer; there is no "unknown event type"
//! fallthrough. Wire format is JSON with camelCase field names and
//! SCREAMING_SNAKE_CASE event-type tags.
//!
//! Delivery is at-least-once and unordered across routing keys, so every
//! message here is safe to re-consume: the domain guards (ticket CAS,
//! order status guard) reject duplicates instead of corrupting state.

use crate::ids::{OrderId, TicketId, UserId};
use crate::money::Money;
use crate::order::OrderStatus;
use crate::ticket::TicketStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Topic (exchange), queue, and routing-key vocabulary.
///
/// A binding maps routing-key patterns under a topic to a queue; both
/// fabric backends honor the same names so the services are wired
/// identically regardless of backend.
pub mod routing {
    /// Topic for ticket-side traffic (reservation intents, status updates)
    pub const TICKET_TOPIC: &str = "ticket.exchange";
    /// Topic for order-side traffic (status events, expiration notices)
    pub const ORDER_TOPIC: &str = "order.exchange";

    /// Queue the inventory service consumes reservation intents from
    pub const TICKET_RESERVATION_QUEUE: &str = "ticket.reservation.queue";
    /// Queue the order service consumes ticket status updates from
    pub const TICKET_STATUS_UPDATE_QUEUE: &str = "ticket.status.update.queue";
    /// Queue order status events are published to
    pub const ORDER_STATUS_QUEUE: &str = "order.status.queue";
    /// Queue order expiration notices are published to
    pub const ORDER_EXPIRATION_QUEUE: &str = "order.expiration.queue";

    /// Routing key for RESERVE_TICKET intents
    pub const TICKET_RESERVE_KEY: &str = "ticket.reserve";
    /// Routing key for RELEASE_TICKET intents
    pub const TICKET_RELEASE_KEY: &str = "ticket.release";
    /// Routing key for MARK_SOLD intents
    pub const TICKET_SOLD_KEY: &str = "ticket.sold";
    /// Routing key for ticket status updates
    pub const TICKET_STATUS_UPDATE_KEY: &str = "ticket.status.update";

    /// Routing key for ORDER_CREATED events
    pub const ORDER_CREATED_KEY: &str = "order.created";
    /// Routing key for ORDER_COMPLETED events
    pub const ORDER_COMPLETED_KEY: &str = "order.completed";
    /// Routing key for ORDER_CANCELLED events
    pub const ORDER_CANCELLED_KEY: &str = "order.cancelled";
    /// Routing key for ORDER_EXPIRED events
    pub const ORDER_EXPIRED_KEY: &str = "order.expired";
    /// Routing key for expiration-schedule notices
    pub const ORDER_EXPIRATION_KEY: &str = "order.expiration";
}

/// The operation a reservation intent asks the inventory service to apply.
///
/// Serialized with an `eventType` tag flattened into the envelope, so the
/// wire shape is `{"eventType": "RESERVE_TICKET", "version": 0, ...}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "eventType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationCommand {
    /// Reserve the ticket if its stored version still matches
    ReserveTicket {
        /// The version the coordinator observed when it created the order
        version: u64,
    },
    /// Return a reserved ticket to the market
    ReleaseTicket {
        /// Why the reservation is being released (cancellation reason,
        /// "Order expired", ...)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Finalize the sale of a reserved ticket
    MarkSold,
}

/// Reservation intent, published by the order coordinator and consumed by
/// the inventory service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketReservationMessage {
    /// The targeted ticket
    pub ticket_id: TicketId,
    /// The order driving the intent
    pub order_id: OrderId,
    /// The buyer
    pub user_id: UserId,
    /// When the intent was published
    pub timestamp: DateTime<Utc>,
    /// The requested operation
    #[serde(flatten)]
    pub command: ReservationCommand,
}

impl TicketReservationMessage {
    /// A RESERVE_TICKET intent carrying the observed ticket version
    #[must_use]
    pub const fn reserve(
        ticket_id: TicketId,
        order_id: OrderId,
        user_id: UserId,
        version: u64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            ticket_id,
            order_id,
            user_id,
            timestamp,
            command: ReservationCommand::ReserveTicket { version },
        }
    }

    /// A RELEASE_TICKET intent
    #[must_use]
    pub const fn release(
        ticket_id: TicketId,
        order_id: OrderId,
        user_id: UserId,
        reason: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            ticket_id,
            order_id,
            user_id,
            timestamp,
            command: ReservationCommand::ReleaseTicket { reason },
        }
    }

    /// A MARK_SOLD intent
    #[must_use]
    pub const fn mark_sold(
        ticket_id: TicketId,
        order_id: OrderId,
        user_id: UserId,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            ticket_id,
            order_id,
            user_id,
            timestamp,
            command: ReservationCommand::MarkSold,
        }
    }

    /// The routing key this intent publishes under
    #[must_use]
    pub const fn routing_key(&self) -> &'static str {
        match self.command {
            ReservationCommand::ReserveTicket { .. } => routing::TICKET_RESERVE_KEY,
            ReservationCommand::ReleaseTicket { .. } => routing::TICKET_RELEASE_KEY,
            ReservationCommand::MarkSold => routing::TICKET_SOLD_KEY,
        }
    }
}

/// What happened to a ticket, from the inventory service's perspective
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatusEvent {
    /// The reservation CAS succeeded
    TicketReserved,
    /// The ticket went back to the market
    TicketReleased,
    /// The sale was finalized
    TicketSold,
}

/// Status update published by the inventory service after it applies a
/// reservation intent. Informational: the order service never blocks on it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketStatusUpdateMessage {
    /// The mutated ticket
    pub ticket_id: TicketId,
    /// The order whose intent triggered the mutation
    pub order_id: OrderId,
    /// The buyer on that order
    pub user_id: UserId,
    /// Status after the mutation
    pub status: TicketStatus,
    /// Status before the mutation
    pub previous_status: TicketStatus,
    /// When the update was published
    pub timestamp: DateTime<Utc>,
    /// Which transition occurred
    pub event_type: TicketStatusEvent,
}

/// Which order transition occurred
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatusEvent {
    /// A new order was committed as `Pending`
    OrderCreated,
    /// The order completed with a payment
    OrderCompleted,
    /// The order was cancelled by the buyer
    OrderCancelled,
    /// The sweeper reclaimed the order
    OrderExpired,
}

impl OrderStatusEvent {
    /// The routing key this event publishes under
    #[must_use]
    pub const fn routing_key(self) -> &'static str {
        match self {
            Self::OrderCreated => routing::ORDER_CREATED_KEY,
            Self::OrderCompleted => routing::ORDER_COMPLETED_KEY,
            Self::OrderCancelled => routing::ORDER_CANCELLED_KEY,
            Self::OrderExpired => routing::ORDER_EXPIRED_KEY,
        }
    }
}

/// Order lifecycle event published by the coordinator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusMessage {
    /// The transitioned order
    pub order_id: OrderId,
    /// The ticket the order targets
    pub ticket_id: TicketId,
    /// The buyer
    pub user_id: UserId,
    /// Status after the transition
    pub status: OrderStatus,
    /// Status before the transition
    pub previous_status: OrderStatus,
    /// The order total
    pub total_amount: Money,
    /// When the event was published
    pub timestamp: DateTime<Utc>,
    /// Optional cancellation/expiry reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Which transition occurred
    pub event_type: OrderStatusEvent,
}

/// Tag for expiration-schedule notices
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderExpirationEvent {
    /// An order's TTL deadline was scheduled
    OrderExpirationScheduled,
}

/// Notice that an order will become eligible for expiry at
/// `expiration_time`. Consumers are informational; the sweeper itself polls
/// the store rather than trusting this notice.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderExpirationMessage {
    /// The order with a scheduled deadline
    pub order_id: OrderId,
    /// The ticket it holds
    pub ticket_id: TicketId,
    /// The buyer
    pub user_id: UserId,
    /// When the order becomes eligible for expiry
    pub expiration_time: DateTime<Utc>,
    /// When the notice was published
    pub timestamp: DateTime<Utc>,
    /// Constant tag
    pub event_type: OrderExpirationEvent,
}
