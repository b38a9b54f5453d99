//! End-to-end demo on the in-memory fabric.
//!
//! Lists a ticket, buys it, completes the purchase, then shows the TTL
//! path: a second order is left unpaid and reclaimed by the sweeper.

use chrono::Utc;
use std::time::Duration;
use ticketline_app::{App, Config};
use ticketline_core::{Money, NewTicket, PaymentId, UserId};
use ticketline_orders::{CreateOrder, SweeperConfig};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
#[allow(clippy::too_many_lines)]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ticketline=info,demo=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Fast timings so the demo finishes in seconds
    let mut config = Config::default();
    config.fabric.delivery_delay_ms = 50;
    config.orders.ttl = chrono::Duration::seconds(2);
    config.orders.sweeper = SweeperConfig {
        interval: Duration::from_secs(1),
        startup_delay: Duration::from_millis(200),
    };

    let app = App::start(&config).await?;

    let seller = UserId::new();
    let buyer = UserId::new();

    // Seller lists two tickets
    let paid_ticket = app
        .tickets
        .create(NewTicket {
            event_name: "Riverside Finals".to_string(),
            category: "sports".to_string(),
            location: "North Arena".to_string(),
            event_date: Utc::now() + chrono::Duration::days(20),
            seat_info: Some("Sec 104, Row F".to_string()),
            price: Money::from_dollars(50),
            seller_id: seller,
        })
        .await?;
    let abandoned_ticket = app
        .tickets
        .create(NewTicket {
            event_name: "Riverside Finals".to_string(),
            category: "sports".to_string(),
            location: "North Arena".to_string(),
            event_date: Utc::now() + chrono::Duration::days(20),
            seat_info: Some("Sec 104, Row G".to_string()),
            price: Money::from_dollars(50),
            seller_id: seller,
        })
        .await?;

    // Buyer purchases the first ticket and pays
    let order = app
        .orders
        .create_order(CreateOrder { buyer_id: buyer, ticket_id: paid_ticket.id, quantity: 1 })
        .await?;
    tokio::time::sleep(Duration::from_millis(300)).await;
    info!(ticket = %app.tickets.get(paid_ticket.id).await?.status, "after reservation intent");

    let completed = app.orders.complete_order(order.id, PaymentId::new()).await?;
    tokio::time::sleep(Duration::from_millis(300)).await;
    info!(
        order = %completed.status,
        ticket = %app.tickets.get(paid_ticket.id).await?.status,
        "after completion"
    );

    // Second order is created and never paid; the sweeper reclaims it
    let abandoned = app
        .orders
        .create_order(CreateOrder { buyer_id: buyer, ticket_id: abandoned_ticket.id, quantity: 1 })
        .await?;
    tokio::time::sleep(Duration::from_millis(300)).await;
    info!(ticket = %app.tickets.get(abandoned_ticket.id).await?.status, "abandoned order reserved");

    tokio::time::sleep(Duration::from_secs(4)).await;
    info!(
        order = %app.orders.get_order(abandoned.id).await?.status,
        ticket = %app.tickets.get(abandoned_ticket.id).await?.status,
        "after sweeper pass"
    );

    app.shutdown().await;
    Ok(())
}
