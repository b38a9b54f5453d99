//! Ticket status update consumer.
//!
//! The order service subscribes to the inventory service's status updates
//! purely for observability — there is no synchronous dependency back to
//! the order: a reservation that never confirms is reclaimed by the TTL
//! sweeper, not by reacting to (or missing) one of these messages.

use async_trait::async_trait;
use ticketline_core::messages::{TicketStatusEvent, TicketStatusUpdateMessage};
use ticketline_fabric::{Delivery, HandlerError, MessageHandler};
use tracing::{error, info};

/// Logs ticket status updates correlated to orders.
#[derive(Clone, Copy, Debug, Default)]
pub struct TicketStatusListener;

impl TicketStatusListener {
    /// Creates the listener
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MessageHandler for TicketStatusListener {
    async fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError> {
        let message: TicketStatusUpdateMessage = match serde_json::from_slice(&delivery.payload) {
            Ok(message) => message,
            Err(e) => {
                error!(
                    routing_key = %delivery.routing_key,
                    error = %e,
                    "dropping unparseable ticket status update"
                );
                return Ok(());
            }
        };

        match message.event_type {
            TicketStatusEvent::TicketReserved => {
                info!(
                    ticket_id = %message.ticket_id,
                    order_id = %message.order_id,
                    "ticket reserved for order"
                );
            }
            TicketStatusEvent::TicketReleased => {
                info!(
                    ticket_id = %message.ticket_id,
                    order_id = %message.order_id,
                    "ticket released back to the market"
                );
            }
            TicketStatusEvent::TicketSold => {
                info!(
                    ticket_id = %message.ticket_id,
                    order_id = %message.order_id,
                    "ticket sold"
                );
            }
        }

        Ok(())
    }
}
