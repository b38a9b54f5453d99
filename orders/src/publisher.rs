//! Outbound messages of the order service.
//!
//! One place builds every envelope the coordinator emits, so the wire
//! contract (topics, routing keys, correlation fields) cannot drift
//! between call sites.

use serde::Serialize;
use std::sync::Arc;
use ticketline_core::messages::{
    routing, OrderExpirationEvent, OrderExpirationMessage, OrderStatusEvent, OrderStatusMessage,
    TicketReservationMessage,
};
use ticketline_core::{DateTime, Error, Order, OrderStatus, Result, Utc};
use ticketline_fabric::MessageFabric;
use tracing::debug;

/// Publishes the order service's side of the message contracts.
#[derive(Clone)]
pub struct OrderEventPublisher {
    fabric: Arc<dyn MessageFabric>,
}

impl OrderEventPublisher {
    /// Creates a publisher over the fabric
    #[must_use]
    pub fn new(fabric: Arc<dyn MessageFabric>) -> Self {
        Self { fabric }
    }

    async fn publish<T: Serialize>(
        &self,
        topic: &str,
        routing_key: &str,
        message: &T,
    ) -> Result<()> {
        let payload =
            serde_json::to_vec(message).map_err(|e| Error::Messaging(e.to_string()))?;
        self.fabric
            .publish(topic, routing_key, &payload)
            .await
            .map_err(|e| Error::Messaging(e.to_string()))?;
        debug!(topic = %topic, routing_key = %routing_key, "order service message published");
        Ok(())
    }

    /// RESERVE_TICKET intent carrying the ticket version the coordinator
    /// observed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Messaging`] if serialization or the publish fails.
    pub async fn reservation_requested(
        &self,
        order: &Order,
        ticket_version: u64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let message = TicketReservationMessage::reserve(
            order.ticket_id,
            order.id,
            order.buyer_id,
            ticket_version,
            now,
        );
        self.publish(routing::TICKET_TOPIC, message.routing_key(), &message).await
    }

    /// RELEASE_TICKET intent (cancellation or expiry).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Messaging`] if serialization or the publish fails.
    pub async fn release_requested(
        &self,
        order: &Order,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let message = TicketReservationMessage::release(
            order.ticket_id,
            order.id,
            order.buyer_id,
            reason,
            now,
        );
        self.publish(routing::TICKET_TOPIC, message.routing_key(), &message).await
    }

    /// MARK_SOLD intent after a completed payment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Messaging`] if serialization or the publish fails.
    pub async fn sold_requested(&self, order: &Order, now: DateTime<Utc>) -> Result<()> {
        let message =
            TicketReservationMessage::mark_sold(order.ticket_id, order.id, order.buyer_id, now);
        self.publish(routing::TICKET_TOPIC, message.routing_key(), &message).await
    }

    /// Order lifecycle event (`ORDER_CREATED`, `ORDER_COMPLETED`, ...).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Messaging`] if serialization or the publish fails.
    pub async fn order_status(
        &self,
        order: &Order,
        previous_status: OrderStatus,
        event_type: OrderStatusEvent,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let message = OrderStatusMessage {
            order_id: order.id,
            ticket_id: order.ticket_id,
            user_id: order.buyer_id,
            status: order.status,
            previous_status,
            total_amount: order.total_amount,
            timestamp: now,
            reason,
            event_type,
        };
        self.publish(routing::ORDER_TOPIC, event_type.routing_key(), &message).await
    }

    /// ORDER_EXPIRATION_SCHEDULED notice for a freshly created order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Messaging`] if serialization or the publish fails.
    pub async fn expiration_scheduled(&self, order: &Order, now: DateTime<Utc>) -> Result<()> {
        let message = OrderExpirationMessage {
            order_id: order.id,
            ticket_id: order.ticket_id,
            user_id: order.buyer_id,
            expiration_time: order.expires_at,
            timestamp: now,
            event_type: OrderExpirationEvent::OrderExpirationScheduled,
        };
        self.publish(routing::ORDER_TOPIC, routing::ORDER_EXPIRATION_KEY, &message).await
    }
}
