//! End-to-end reservation saga tests over the in-memory fabric.
//!
//! Both services run in-process, coupled only by fabric messages, with a
//! manual clock driving TTL expiry deterministically.

#![allow(clippy::unwrap_used)]

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use ticketline_core::messages::routing;
use ticketline_core::{
    Clock, Error, Money, NewTicket, OrderStatus, PaymentId, Ticket, TicketStatus, UserId,
};
use ticketline_fabric::{InMemoryFabric, MessageFabric, QueueBinding};
use ticketline_inventory::{InMemoryTicketStore, ReservationHandler, TicketService};
use ticketline_orders::{
    CreateOrder, ExpirationSweeper, InMemoryOrderStore, OrderEventPublisher, OrderService,
    SweeperConfig,
};
use ticketline_testing::{manual_clock, ManualClock};

struct Harness {
    tickets: TicketService,
    orders: OrderService,
    sweeper: ExpirationSweeper,
    clock: ManualClock,
    fabric: Arc<InMemoryFabric>,
}

/// Wire both services over a fast in-memory fabric, like the app bootstrap
/// but with deterministic time.
async fn harness() -> Harness {
    harness_with_delay(Duration::from_millis(1)).await
}

async fn harness_with_delay(delivery_delay: Duration) -> Harness {
    let fabric = Arc::new(
        InMemoryFabric::builder()
            .delivery_delay(delivery_delay)
            .retry_delay(Duration::from_millis(1))
            .max_attempts(3)
            .build(),
    );
    let clock = manual_clock();
    let clock_arc: Arc<dyn Clock> = Arc::new(clock.clone());

    let tickets = TicketService::new(Arc::new(InMemoryTicketStore::new()));
    let order_store = Arc::new(InMemoryOrderStore::new());
    let orders = OrderService::new(
        order_store.clone(),
        Arc::new(Directory { tickets: tickets.clone() }),
        OrderEventPublisher::new(fabric.clone() as Arc<dyn MessageFabric>),
        Arc::clone(&clock_arc),
    );

    fabric
        .subscribe(
            QueueBinding::new(
                routing::TICKET_RESERVATION_QUEUE,
                routing::TICKET_TOPIC,
                [
                    routing::TICKET_RESERVE_KEY,
                    routing::TICKET_RELEASE_KEY,
                    routing::TICKET_SOLD_KEY,
                ],
            ),
            Arc::new(ReservationHandler::new(
                tickets.clone(),
                fabric.clone() as Arc<dyn MessageFabric>,
                Arc::clone(&clock_arc),
            )),
        )
        .await
        .unwrap();

    let sweeper = ExpirationSweeper::with_config(
        orders.clone(),
        order_store,
        clock_arc,
        SweeperConfig::default(),
    );

    Harness { tickets, orders, sweeper, clock, fabric }
}

struct Directory {
    tickets: TicketService,
}

#[async_trait::async_trait]
impl ticketline_orders::TicketDirectory for Directory {
    async fn ticket(
        &self,
        id: ticketline_core::TicketId,
    ) -> ticketline_core::Result<Option<Ticket>> {
        match self.tickets.get(id).await {
            Ok(ticket) => Ok(Some(ticket)),
            Err(Error::TicketNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

async fn list_ticket(harness: &Harness) -> Ticket {
    harness
        .tickets
        .create(NewTicket {
            event_name: "Causeway Lights".to_string(),
            category: "concert".to_string(),
            location: "East Stage".to_string(),
            event_date: Utc::now() + chrono::Duration::days(45),
            seat_info: None,
            price: Money::from_dollars(50),
            seller_id: UserId::new(),
        })
        .await
        .unwrap()
}

/// Poll until the ticket reaches `status` (messages deliver asynchronously)
async fn wait_for_ticket_status(harness: &Harness, ticket: &Ticket, status: TicketStatus) {
    for _ in 0..500 {
        if harness.tickets.get(ticket.id).await.unwrap().status == status {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let current = harness.tickets.get(ticket.id).await.unwrap();
    assert_eq!(current.status, status, "ticket never reached expected status");
}

#[tokio::test]
async fn purchase_flow_reserves_then_sells_the_ticket() {
    let h = harness().await;
    let ticket = list_ticket(&h).await;

    // createOrder commits PENDING and the reservation intent lands async
    let order = h
        .orders
        .create_order(CreateOrder { buyer_id: UserId::new(), ticket_id: ticket.id, quantity: 1 })
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.total_amount, Money::from_dollars(50));

    wait_for_ticket_status(&h, &ticket, TicketStatus::Reserved).await;
    assert_eq!(h.tickets.get(ticket.id).await.unwrap().version, 1);

    // completeOrder drives MARK_SOLD through the fabric
    let completed = h.orders.complete_order(order.id, PaymentId::new()).await.unwrap();
    assert_eq!(completed.status, OrderStatus::Completed);

    wait_for_ticket_status(&h, &ticket, TicketStatus::Sold).await;
    assert_eq!(h.tickets.get(ticket.id).await.unwrap().version, 2);
}

#[tokio::test]
async fn sweeper_reclaims_abandoned_reservation() {
    let h = harness().await;
    let ticket = list_ticket(&h).await;

    let order = h
        .orders
        .create_order(CreateOrder { buyer_id: UserId::new(), ticket_id: ticket.id, quantity: 1 })
        .await
        .unwrap();
    wait_for_ticket_status(&h, &ticket, TicketStatus::Reserved).await;

    // One minute past the TTL, a sweep cycle runs
    h.clock.advance(chrono::Duration::minutes(16));
    h.sweeper.sweep_once().await;

    assert_eq!(h.orders.get_order(order.id).await.unwrap().status, OrderStatus::Expired);

    // The RELEASE_TICKET intent returns the ticket to the market
    wait_for_ticket_status(&h, &ticket, TicketStatus::Available).await;
    assert_eq!(h.tickets.get(ticket.id).await.unwrap().version, 2);

    // completeOrder after expiry fails and emits no MARK_SOLD
    let err = h.orders.complete_order(order.id, PaymentId::new()).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(h.tickets.get(ticket.id).await.unwrap().status, TicketStatus::Available);
}

#[tokio::test]
async fn two_buyers_race_for_one_ticket() {
    // A longer handoff delay guarantees both orders commit against the
    // same AVAILABLE snapshot before either intent lands.
    let h = harness_with_delay(Duration::from_millis(50)).await;
    let ticket = list_ticket(&h).await;

    // Both orders validate against the same AVAILABLE snapshot and commit
    let first = h
        .orders
        .create_order(CreateOrder { buyer_id: UserId::new(), ticket_id: ticket.id, quantity: 1 })
        .await
        .unwrap();
    let second = h
        .orders
        .create_order(CreateOrder { buyer_id: UserId::new(), ticket_id: ticket.id, quantity: 1 })
        .await
        .unwrap();
    assert_ne!(first.id, second.id);

    // Both RESERVE_TICKET intents carry version 0; the CAS admits exactly
    // one, so the ticket ends Reserved at version 1, not 2.
    wait_for_ticket_status(&h, &ticket, TicketStatus::Reserved).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let stored = h.tickets.get(ticket.id).await.unwrap();
    assert_eq!(stored.status, TicketStatus::Reserved);
    assert_eq!(stored.version, 1, "exactly one reservation may win");

    // The losing order is still PENDING and ages out via the sweeper
    h.clock.advance(chrono::Duration::minutes(16));
    h.sweeper.sweep_once().await;

    let first_status = h.orders.get_order(first.id).await.unwrap().status;
    let second_status = h.orders.get_order(second.id).await.unwrap().status;
    assert_eq!(first_status, OrderStatus::Expired);
    assert_eq!(second_status, OrderStatus::Expired);

    wait_for_ticket_status(&h, &ticket, TicketStatus::Available).await;
}

#[tokio::test]
async fn duplicate_release_deliveries_are_harmless() {
    let h = harness().await;
    let ticket = list_ticket(&h).await;

    let order = h
        .orders
        .create_order(CreateOrder { buyer_id: UserId::new(), ticket_id: ticket.id, quantity: 1 })
        .await
        .unwrap();
    wait_for_ticket_status(&h, &ticket, TicketStatus::Reserved).await;

    h.orders.cancel_order(order.id, "duplicate-delivery drill").await.unwrap();
    wait_for_ticket_status(&h, &ticket, TicketStatus::Available).await;

    // Simulate the broker redelivering the same RELEASE intent
    let duplicate = ticketline_core::messages::TicketReservationMessage::release(
        ticket.id,
        order.id,
        order.buyer_id,
        Some("duplicate-delivery drill".to_string()),
        Utc::now(),
    );
    h.fabric
        .publish(
            routing::TICKET_TOPIC,
            duplicate.routing_key(),
            &serde_json::to_vec(&duplicate).unwrap(),
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    let stored = h.tickets.get(ticket.id).await.unwrap();
    assert_eq!(stored.status, TicketStatus::Available);
    assert_eq!(stored.version, 2, "duplicate release must not bump the version again");
}
