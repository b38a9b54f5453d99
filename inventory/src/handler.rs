//! Reservation-intent consumer.
//!
//! Consumes `TicketReservationMessage`s from the fabric, applies the
//! ticket state machine, and publishes `TicketStatusUpdateMessage`s for
//! transitions that actually happened.
//!
//! # Redelivery policy
//!
//! Deliveries are at-least-once, so this handler decides per failure
//! whether redelivery could ever help:
//!
//! - Domain rejections (`VersionConflict`, `InvalidState`, unknown ticket)
//!   are the guards doing their job — a duplicate RESERVE after a RELEASE
//!   landed, a replayed MARK_SOLD. They are logged and consumed.
//! - Malformed payloads can never parse on retry; logged and consumed.
//! - Store and publish failures are returned to the fabric for redelivery.

use crate::service::{Applied, TicketService};
use async_trait::async_trait;
use std::sync::Arc;
use ticketline_core::messages::{
    routing, ReservationCommand, TicketReservationMessage, TicketStatusEvent,
    TicketStatusUpdateMessage,
};
use ticketline_core::{Clock, Error, Ticket, TicketStatus};
use ticketline_fabric::{Delivery, HandlerError, MessageFabric, MessageHandler};
use tracing::{debug, error, info, warn};

/// Consumes reservation intents for the inventory service.
pub struct ReservationHandler {
    service: TicketService,
    fabric: Arc<dyn MessageFabric>,
    clock: Arc<dyn Clock>,
}

impl ReservationHandler {
    /// Creates a handler over the ticket service and fabric
    #[must_use]
    pub fn new(
        service: TicketService,
        fabric: Arc<dyn MessageFabric>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { service, fabric, clock }
    }

    async fn publish_status(
        &self,
        message: &TicketReservationMessage,
        ticket: &Ticket,
        previous_status: TicketStatus,
        event_type: TicketStatusEvent,
    ) -> Result<(), HandlerError> {
        let update = TicketStatusUpdateMessage {
            ticket_id: ticket.id,
            order_id: message.order_id,
            user_id: message.user_id,
            status: ticket.status,
            previous_status,
            timestamp: self.clock.now(),
            event_type,
        };
        let payload = serde_json::to_vec(&update)?;
        self.fabric
            .publish(routing::TICKET_TOPIC, routing::TICKET_STATUS_UPDATE_KEY, &payload)
            .await?;
        Ok(())
    }

    async fn handle_reserve(
        &self,
        message: &TicketReservationMessage,
        version: u64,
    ) -> Result<(), HandlerError> {
        match self.service.reserve(message.ticket_id, version).await {
            Ok(ticket) => {
                info!(
                    ticket_id = %message.ticket_id,
                    order_id = %message.order_id,
                    "ticket reserved for order"
                );
                self.publish_status(
                    message,
                    &ticket,
                    TicketStatus::Available,
                    TicketStatusEvent::TicketReserved,
                )
                .await
            }
            Err(
                rejected @ (Error::VersionConflict { .. }
                | Error::InvalidState(_)
                | Error::TicketNotFound(_)),
            ) => {
                warn!(
                    ticket_id = %message.ticket_id,
                    order_id = %message.order_id,
                    reason = %rejected,
                    "reservation rejected"
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn handle_release(&self, message: &TicketReservationMessage) -> Result<(), HandlerError> {
        match self.service.release(message.ticket_id).await {
            Ok(Applied { ticket, transitioned: true }) => {
                info!(
                    ticket_id = %message.ticket_id,
                    order_id = %message.order_id,
                    "ticket released for order"
                );
                self.publish_status(
                    message,
                    &ticket,
                    TicketStatus::Reserved,
                    TicketStatusEvent::TicketReleased,
                )
                .await
            }
            Ok(Applied { transitioned: false, .. }) => {
                debug!(ticket_id = %message.ticket_id, "release was a no-op, ticket not reserved");
                Ok(())
            }
            Err(Error::TicketNotFound(_)) => {
                warn!(ticket_id = %message.ticket_id, "release targeted an unknown ticket");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn handle_mark_sold(&self, message: &TicketReservationMessage) -> Result<(), HandlerError> {
        match self.service.mark_sold(message.ticket_id).await {
            Ok(Applied { ticket, transitioned: true }) => {
                info!(
                    ticket_id = %message.ticket_id,
                    order_id = %message.order_id,
                    "ticket marked sold for order"
                );
                self.publish_status(
                    message,
                    &ticket,
                    TicketStatus::Reserved,
                    TicketStatusEvent::TicketSold,
                )
                .await
            }
            Ok(Applied { transitioned: false, .. }) => {
                debug!(ticket_id = %message.ticket_id, "mark_sold was a no-op, ticket already sold");
                Ok(())
            }
            Err(rejected @ (Error::InvalidState(_) | Error::TicketNotFound(_))) => {
                warn!(
                    ticket_id = %message.ticket_id,
                    reason = %rejected,
                    "mark_sold rejected"
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl MessageHandler for ReservationHandler {
    async fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError> {
        let message: TicketReservationMessage = match serde_json::from_slice(&delivery.payload) {
            Ok(message) => message,
            Err(e) => {
                // Retrying a payload that does not parse can never succeed
                error!(
                    routing_key = %delivery.routing_key,
                    error = %e,
                    "dropping unparseable reservation message"
                );
                return Ok(());
            }
        };

        debug!(
            ticket_id = %message.ticket_id,
            order_id = %message.order_id,
            command = ?message.command,
            "received reservation intent"
        );

        match message.command {
            ReservationCommand::ReserveTicket { version } => {
                self.handle_reserve(&message, version).await
            }
            ReservationCommand::ReleaseTicket { .. } => self.handle_release(&message).await,
            ReservationCommand::MarkSold => self.handle_mark_sold(&message).await,
        }
    }
}
