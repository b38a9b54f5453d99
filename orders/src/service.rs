//! The order lifecycle coordinator.
//!
//! Validates purchase attempts against a ticket snapshot, commits the
//! order locally, and drives the reservation saga with asynchronous
//! intents. The order row is committed BEFORE reservation confirmation
//! arrives — an explicit availability-over-strict-consistency tradeoff.
//! If a publish fails after the commit, the order simply ages out through
//! the sweeper's TTL path; there is no synchronous rollback.

use crate::directory::TicketDirectory;
use crate::publisher::OrderEventPublisher;
use crate::store::{OrderStore, OrderTransition};
use chrono::Duration;
use std::sync::Arc;
use ticketline_core::messages::OrderStatusEvent;
use ticketline_core::{
    Clock, Error, Order, OrderId, OrderStatus, PaymentId, Result, TicketId, UserId,
};
use tracing::{info, warn};

/// Default TTL for a pending order, in minutes
pub const DEFAULT_ORDER_TTL_MINUTES: i64 = 15;

/// Reason recorded when the sweeper reclaims an order
const EXPIRY_REASON: &str = "Order expired";

/// A purchase attempt
#[derive(Clone, Debug)]
pub struct CreateOrder {
    /// The purchasing user (opaque, already authenticated)
    pub buyer_id: UserId,
    /// The ticket to purchase
    pub ticket_id: TicketId,
    /// Number of units
    pub quantity: u32,
}

/// Coordinates order transitions and the reservation saga.
#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    tickets: Arc<dyn TicketDirectory>,
    publisher: OrderEventPublisher,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl OrderService {
    /// Creates a coordinator with the default 15-minute TTL
    #[must_use]
    pub fn new(
        store: Arc<dyn OrderStore>,
        tickets: Arc<dyn TicketDirectory>,
        publisher: OrderEventPublisher,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_ttl(store, tickets, publisher, clock, Duration::minutes(DEFAULT_ORDER_TTL_MINUTES))
    }

    /// Creates a coordinator with an explicit TTL
    #[must_use]
    pub fn with_ttl(
        store: Arc<dyn OrderStore>,
        tickets: Arc<dyn TicketDirectory>,
        publisher: OrderEventPublisher,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self { store, tickets, publisher, clock, ttl }
    }

    /// Create a `Pending` order for a ticket and start the reservation
    /// saga.
    ///
    /// The order commits locally first; the RESERVE_TICKET intent (carrying
    /// the snapshot's version), the ORDER_CREATED event, and the expiration
    /// notice are then published asynchronously. Publish failures are
    /// logged and do NOT unwind the order — the TTL sweeper is the
    /// reconciliation path for a reservation that never lands.
    ///
    /// # Errors
    ///
    /// - [`Error::TicketNotFound`] if the ticket does not exist
    /// - [`Error::InvalidState`] if the ticket is not available or the
    ///   quantity is zero
    /// - [`Error::InvalidOwnership`] if the buyer listed the ticket
    ///   themselves (checked before any write)
    pub async fn create_order(&self, request: CreateOrder) -> Result<Order> {
        let ticket = self
            .tickets
            .ticket(request.ticket_id)
            .await?
            .ok_or(Error::TicketNotFound(request.ticket_id))?;

        if !ticket.is_available() {
            return Err(Error::invalid_state(format!(
                "ticket {} is {} and not available for purchase",
                ticket.id, ticket.status
            )));
        }
        if request.buyer_id == ticket.seller_id {
            warn!(
                buyer_id = %request.buyer_id,
                ticket_id = %request.ticket_id,
                "purchase blocked: buyer listed this ticket themselves"
            );
            return Err(Error::InvalidOwnership {
                buyer: request.buyer_id,
                ticket: request.ticket_id,
            });
        }
        if request.quantity == 0 {
            return Err(Error::invalid_state("quantity must be at least 1"));
        }

        let now = self.clock.now();
        let order = Order {
            id: OrderId::new(),
            buyer_id: request.buyer_id,
            ticket_id: ticket.id,
            seller_id: ticket.seller_id,
            event_name: ticket.event_name.clone(),
            event_date: ticket.event_date,
            seat_info: ticket.seat_info.clone(),
            price: ticket.price,
            quantity: request.quantity,
            total_amount: ticket.price.multiply(request.quantity),
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
            expires_at: now + self.ttl,
            payment_id: None,
            cancellation_reason: None,
        };

        let order = self.store.insert(order).await?;
        info!(
            order_id = %order.id,
            ticket_id = %order.ticket_id,
            buyer_id = %order.buyer_id,
            total = %order.total_amount,
            expires_at = %order.expires_at,
            "order created"
        );

        // Reservation intent carries the version from the snapshot the
        // validation ran against, so a ticket that moved in the meantime
        // loses at the CAS rather than double-selling.
        if let Err(e) = self.publisher.reservation_requested(&order, ticket.version, now).await {
            warn!(
                order_id = %order.id,
                ticket_id = %order.ticket_id,
                error = %e,
                "reservation intent not published; order stays pending until the sweeper reclaims it"
            );
        }
        if let Err(e) = self
            .publisher
            .order_status(&order, OrderStatus::Pending, OrderStatusEvent::OrderCreated, None, now)
            .await
        {
            warn!(order_id = %order.id, error = %e, "order-created event not published");
        }
        if let Err(e) = self.publisher.expiration_scheduled(&order, now).await {
            warn!(order_id = %order.id, error = %e, "expiration notice not published");
        }

        Ok(order)
    }

    /// Complete a pending, unexpired order with a payment.
    ///
    /// # Errors
    ///
    /// - [`Error::OrderNotFound`] if the id is unknown
    /// - [`Error::InvalidState`] if the order is terminal or past its TTL
    ///   (the first committer already won)
    pub async fn complete_order(&self, id: OrderId, payment_id: PaymentId) -> Result<Order> {
        let now = self.clock.now();
        let order = self.get_order(id).await?;

        if order.status == OrderStatus::Pending && order.is_expired(now) {
            return Err(Error::invalid_state(format!(
                "order {id} expired at {} and can no longer be completed",
                order.expires_at
            )));
        }

        let completed = self
            .store
            .transition_if_pending(
                id,
                OrderTransition {
                    status: OrderStatus::Completed,
                    payment_id: Some(payment_id),
                    cancellation_reason: None,
                    at: now,
                },
            )
            .await?;

        info!(order_id = %id, payment_id = %payment_id, "order completed");

        if let Err(e) = self.publisher.sold_requested(&completed, now).await {
            warn!(order_id = %id, error = %e, "mark-sold intent not published");
        }
        if let Err(e) = self
            .publisher
            .order_status(
                &completed,
                OrderStatus::Pending,
                OrderStatusEvent::OrderCompleted,
                None,
                now,
            )
            .await
        {
            warn!(order_id = %id, error = %e, "order-completed event not published");
        }

        Ok(completed)
    }

    /// Cancel a pending order, releasing its reservation.
    ///
    /// # Errors
    ///
    /// - [`Error::OrderNotFound`] if the id is unknown
    /// - [`Error::InvalidState`] if the order is already terminal
    pub async fn cancel_order(&self, id: OrderId, reason: impl Into<String>) -> Result<Order> {
        let now = self.clock.now();
        let reason = reason.into();

        let cancelled = self
            .store
            .transition_if_pending(
                id,
                OrderTransition {
                    status: OrderStatus::Cancelled,
                    payment_id: None,
                    cancellation_reason: Some(reason.clone()),
                    at: now,
                },
            )
            .await?;

        info!(order_id = %id, reason = %reason, "order cancelled");

        if let Err(e) = self
            .publisher
            .release_requested(&cancelled, Some(reason.clone()), now)
            .await
        {
            warn!(order_id = %id, error = %e, "release intent not published");
        }
        if let Err(e) = self
            .publisher
            .order_status(
                &cancelled,
                OrderStatus::Pending,
                OrderStatusEvent::OrderCancelled,
                Some(reason),
                now,
            )
            .await
        {
            warn!(order_id = %id, error = %e, "order-cancelled event not published");
        }

        Ok(cancelled)
    }

    /// Expire a pending order whose TTL elapsed. Idempotent: unknown ids
    /// and orders already terminal return without side effects, and losing
    /// the race against a concurrent completion or cancellation is benign.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] only for store failures; races and
    /// repeated invocations are not errors.
    pub async fn expire_order(&self, id: OrderId) -> Result<()> {
        let now = self.clock.now();

        let Some(order) = self.store.get(id).await? else {
            return Ok(());
        };
        if order.status != OrderStatus::Pending {
            return Ok(());
        }

        let expired = match self
            .store
            .transition_if_pending(
                id,
                OrderTransition {
                    status: OrderStatus::Expired,
                    payment_id: None,
                    cancellation_reason: None,
                    at: now,
                },
            )
            .await
        {
            Ok(order) => order,
            // A user operation committed between our read and the guard;
            // first-committer-wins, nothing left to do.
            Err(Error::InvalidState(_) | Error::OrderNotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };

        info!(order_id = %id, ticket_id = %expired.ticket_id, "order expired");

        if let Err(e) = self
            .publisher
            .release_requested(&expired, Some(EXPIRY_REASON.to_string()), now)
            .await
        {
            warn!(order_id = %id, error = %e, "release intent not published");
        }
        if let Err(e) = self
            .publisher
            .order_status(
                &expired,
                OrderStatus::Pending,
                OrderStatusEvent::OrderExpired,
                Some(EXPIRY_REASON.to_string()),
                now,
            )
            .await
        {
            warn!(order_id = %id, error = %e, "order-expired event not published");
        }

        Ok(())
    }

    /// Fetch an order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OrderNotFound`] if the id is unknown.
    pub async fn get_order(&self, id: OrderId) -> Result<Order> {
        self.store.get(id).await?.ok_or(Error::OrderNotFound(id))
    }

    /// A buyer's orders, newest first
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the store fails.
    pub async fn list_orders_by_user(&self, buyer: UserId) -> Result<Vec<Order>> {
        self.store.find_by_buyer(buyer).await
    }

    /// A seller's orders, newest first
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the store fails.
    pub async fn list_orders_by_seller(&self, seller: UserId) -> Result<Vec<Order>> {
        self.store.find_by_seller(seller).await
    }

    /// How many pending orders reference a ticket. The reservation guard
    /// keeps this at most 1; the query exists for monitoring that
    /// invariant.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the store fails.
    pub async fn count_pending_orders_for_ticket(&self, ticket: TicketId) -> Result<u64> {
        self.store.count_pending_for_ticket(ticket).await
    }

    /// The order recorded against a payment, if any
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the store fails.
    pub async fn find_order_by_payment_id(&self, payment: PaymentId) -> Result<Option<Order>> {
        self.store.find_by_payment(payment).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::InMemoryOrderStore;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use ticketline_core::messages::{
        routing, OrderStatusMessage, ReservationCommand, TicketReservationMessage,
    };
    use ticketline_core::{Money, NewTicket, Ticket, TicketStatus};
    use ticketline_fabric::MessageFabric;
    use ticketline_testing::{manual_clock, FailingFabric, ManualClock, RecordingFabric};

    /// Directory stub backed by a map of snapshots
    #[derive(Default)]
    struct StubDirectory {
        tickets: Mutex<HashMap<TicketId, Ticket>>,
    }

    impl StubDirectory {
        fn with(ticket: Ticket) -> Arc<Self> {
            let directory = Self::default();
            directory.tickets.lock().unwrap().insert(ticket.id, ticket);
            Arc::new(directory)
        }
    }

    #[async_trait]
    impl TicketDirectory for StubDirectory {
        async fn ticket(&self, id: TicketId) -> Result<Option<Ticket>> {
            Ok(self.tickets.lock().unwrap().get(&id).cloned())
        }
    }

    fn listed_ticket(seller: UserId) -> Ticket {
        Ticket::list(NewTicket {
            event_name: "Marquee Sessions".to_string(),
            category: "concert".to_string(),
            location: "The Annex".to_string(),
            event_date: Utc::now() + Duration::days(10),
            seat_info: Some("GA".to_string()),
            price: Money::from_dollars(50),
            seller_id: seller,
        })
    }

    struct Fixture {
        service: OrderService,
        store: Arc<InMemoryOrderStore>,
        fabric: Arc<RecordingFabric>,
        clock: ManualClock,
        ticket: Ticket,
    }

    fn fixture() -> Fixture {
        let ticket = listed_ticket(UserId::new());
        let store = Arc::new(InMemoryOrderStore::new());
        let fabric = Arc::new(RecordingFabric::new());
        let clock = manual_clock();
        let service = OrderService::new(
            store.clone(),
            StubDirectory::with(ticket.clone()),
            OrderEventPublisher::new(fabric.clone() as Arc<dyn MessageFabric>),
            Arc::new(clock.clone()),
        );
        Fixture { service, store, fabric, clock, ticket }
    }

    fn buyer() -> UserId {
        UserId::new()
    }

    #[tokio::test]
    async fn create_order_commits_pending_row_and_emits_saga_messages() {
        let f = fixture();
        let created_at = f.clock.now();

        let order = f
            .service
            .create_order(CreateOrder { buyer_id: buyer(), ticket_id: f.ticket.id, quantity: 1 })
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_amount, Money::from_dollars(50));
        assert_eq!(order.expires_at, created_at + Duration::minutes(15));

        // RESERVE_TICKET intent carries the snapshot version
        let intents = f.fabric.published_on(routing::TICKET_RESERVE_KEY);
        assert_eq!(intents.len(), 1);
        let intent: TicketReservationMessage = serde_json::from_slice(&intents[0].payload).unwrap();
        assert_eq!(intent.ticket_id, f.ticket.id);
        assert_eq!(intent.order_id, order.id);
        assert_eq!(intent.command, ReservationCommand::ReserveTicket { version: 0 });

        // ORDER_CREATED and the expiration notice go out too
        assert_eq!(f.fabric.published_on(routing::ORDER_CREATED_KEY).len(), 1);
        assert_eq!(f.fabric.published_on(routing::ORDER_EXPIRATION_KEY).len(), 1);
    }

    #[tokio::test]
    async fn create_order_rejects_buying_own_listing_without_side_effects() {
        let f = fixture();

        let err = f
            .service
            .create_order(CreateOrder {
                buyer_id: f.ticket.seller_id,
                ticket_id: f.ticket.id,
                quantity: 1,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidOwnership { .. }));
        assert!(f.fabric.published().is_empty(), "no message may be emitted");
        assert!(
            f.store.find_by_seller(f.ticket.seller_id).await.unwrap().is_empty(),
            "no order row may be persisted"
        );
    }

    #[tokio::test]
    async fn create_order_for_missing_or_reserved_ticket_fails() {
        let f = fixture();
        assert!(matches!(
            f.service
                .create_order(CreateOrder { buyer_id: buyer(), ticket_id: TicketId::new(), quantity: 1 })
                .await,
            Err(Error::TicketNotFound(_))
        ));

        let mut reserved = listed_ticket(UserId::new());
        reserved.status = TicketStatus::Reserved;
        let service = OrderService::new(
            Arc::new(InMemoryOrderStore::new()),
            StubDirectory::with(reserved.clone()),
            OrderEventPublisher::new(Arc::new(RecordingFabric::new()) as Arc<dyn MessageFabric>),
            Arc::new(manual_clock()),
        );
        assert!(matches!(
            service
                .create_order(CreateOrder { buyer_id: buyer(), ticket_id: reserved.id, quantity: 1 })
                .await,
            Err(Error::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn create_order_survives_publish_failure() {
        let ticket = listed_ticket(UserId::new());
        let store = Arc::new(InMemoryOrderStore::new());
        let service = OrderService::new(
            store.clone(),
            StubDirectory::with(ticket.clone()),
            OrderEventPublisher::new(Arc::new(FailingFabric::new()) as Arc<dyn MessageFabric>),
            Arc::new(manual_clock()),
        );

        // The broker is down, but the order still commits locally; the
        // sweeper's TTL path is the reconciliation mechanism.
        let order = service
            .create_order(CreateOrder { buyer_id: buyer(), ticket_id: ticket.id, quantity: 1 })
            .await
            .unwrap();

        let stored = store.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn complete_order_records_payment_and_emits_mark_sold() {
        let f = fixture();
        let order = f
            .service
            .create_order(CreateOrder { buyer_id: buyer(), ticket_id: f.ticket.id, quantity: 1 })
            .await
            .unwrap();
        let payment = PaymentId::new();

        let completed = f.service.complete_order(order.id, payment).await.unwrap();

        assert_eq!(completed.status, OrderStatus::Completed);
        assert_eq!(completed.payment_id, Some(payment));
        assert_eq!(f.fabric.published_on(routing::TICKET_SOLD_KEY).len(), 1);

        let events = f.fabric.published_on(routing::ORDER_COMPLETED_KEY);
        assert_eq!(events.len(), 1);
        let event: OrderStatusMessage = serde_json::from_slice(&events[0].payload).unwrap();
        assert_eq!(event.status, OrderStatus::Completed);
        assert_eq!(event.previous_status, OrderStatus::Pending);

        assert_eq!(
            f.service.find_order_by_payment_id(payment).await.unwrap().map(|o| o.id),
            Some(order.id)
        );
    }

    #[tokio::test]
    async fn complete_after_ttl_fails_and_emits_nothing() {
        let f = fixture();
        let order = f
            .service
            .create_order(CreateOrder { buyer_id: buyer(), ticket_id: f.ticket.id, quantity: 1 })
            .await
            .unwrap();

        f.clock.advance(Duration::minutes(16));

        let err = f.service.complete_order(order.id, PaymentId::new()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        assert!(f.fabric.published_on(routing::TICKET_SOLD_KEY).is_empty());

        let stored = f.store.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Pending, "rejection leaves the order unchanged");
    }

    #[tokio::test]
    async fn complete_expired_order_fails_invalid_state() {
        // Scenario: the sweeper won the race first
        let f = fixture();
        let order = f
            .service
            .create_order(CreateOrder { buyer_id: buyer(), ticket_id: f.ticket.id, quantity: 1 })
            .await
            .unwrap();

        f.clock.advance(Duration::minutes(16));
        f.service.expire_order(order.id).await.unwrap();

        let err = f.service.complete_order(order.id, PaymentId::new()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));

        let stored = f.store.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Expired);
        assert!(f.fabric.published_on(routing::TICKET_SOLD_KEY).is_empty());
    }

    #[tokio::test]
    async fn cancel_order_releases_reservation_with_reason() {
        let f = fixture();
        let order = f
            .service
            .create_order(CreateOrder { buyer_id: buyer(), ticket_id: f.ticket.id, quantity: 1 })
            .await
            .unwrap();

        let cancelled = f.service.cancel_order(order.id, "changed my mind").await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.cancellation_reason.as_deref(), Some("changed my mind"));

        let releases = f.fabric.published_on(routing::TICKET_RELEASE_KEY);
        assert_eq!(releases.len(), 1);
        let release: TicketReservationMessage = serde_json::from_slice(&releases[0].payload).unwrap();
        assert_eq!(
            release.command,
            ReservationCommand::ReleaseTicket { reason: Some("changed my mind".to_string()) }
        );
        assert_eq!(f.fabric.published_on(routing::ORDER_CANCELLED_KEY).len(), 1);
    }

    #[tokio::test]
    async fn expire_order_is_idempotent_and_ignores_terminal_orders() {
        let f = fixture();
        let order = f
            .service
            .create_order(CreateOrder { buyer_id: buyer(), ticket_id: f.ticket.id, quantity: 1 })
            .await
            .unwrap();
        f.service.cancel_order(order.id, "test").await.unwrap();
        let published_before = f.fabric.published().len();

        // Expiring a cancelled order is a no-op with no messages
        f.service.expire_order(order.id).await.unwrap();
        assert_eq!(f.fabric.published().len(), published_before);

        let stored = f.store.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Cancelled);

        // Unknown ids are a no-op too
        f.service.expire_order(OrderId::new()).await.unwrap();
    }

    #[tokio::test]
    async fn expire_pending_order_emits_release_with_expiry_reason() {
        let f = fixture();
        let order = f
            .service
            .create_order(CreateOrder { buyer_id: buyer(), ticket_id: f.ticket.id, quantity: 1 })
            .await
            .unwrap();

        f.clock.advance(Duration::minutes(16));
        f.service.expire_order(order.id).await.unwrap();

        let stored = f.store.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Expired);

        let releases = f.fabric.published_on(routing::TICKET_RELEASE_KEY);
        assert_eq!(releases.len(), 1);
        let release: TicketReservationMessage = serde_json::from_slice(&releases[0].payload).unwrap();
        assert_eq!(
            release.command,
            ReservationCommand::ReleaseTicket { reason: Some("Order expired".to_string()) }
        );
        assert_eq!(f.fabric.published_on(routing::ORDER_EXPIRED_KEY).len(), 1);
    }

    #[tokio::test]
    async fn pending_count_tracks_reservation_guard_invariant() {
        let f = fixture();
        assert_eq!(f.service.count_pending_orders_for_ticket(f.ticket.id).await.unwrap(), 0);

        let order = f
            .service
            .create_order(CreateOrder { buyer_id: buyer(), ticket_id: f.ticket.id, quantity: 1 })
            .await
            .unwrap();
        assert_eq!(f.service.count_pending_orders_for_ticket(f.ticket.id).await.unwrap(), 1);

        f.service.cancel_order(order.id, "test").await.unwrap();
        assert_eq!(f.service.count_pending_orders_for_ticket(f.ticket.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn buyer_and_seller_listings_are_queryable() {
        let f = fixture();
        let buyer_id = buyer();
        let order = f
            .service
            .create_order(CreateOrder { buyer_id, ticket_id: f.ticket.id, quantity: 2 })
            .await
            .unwrap();
        assert_eq!(order.total_amount, Money::from_dollars(100));

        let by_buyer = f.service.list_orders_by_user(buyer_id).await.unwrap();
        assert_eq!(by_buyer.len(), 1);

        let by_seller = f.service.list_orders_by_seller(f.ticket.seller_id).await.unwrap();
        assert_eq!(by_seller.len(), 1);
        assert_eq!(by_seller[0].id, order.id);
    }
}
