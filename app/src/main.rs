//! Ticketline marketplace process.
//!
//! Runs both services (ticket inventory, order lifecycle) over the
//! configured message fabric, with the expiration sweeper reclaiming
//! abandoned reservations.

use ticketline_app::{App, Config};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ticketline=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("starting ticketline");

    let config = Config::from_env();
    info!(backend = ?config.fabric.backend, ttl_minutes = config.orders.ttl.num_minutes(), "configuration loaded");

    let app = App::start(&config).await?;

    signal::ctrl_c().await?;
    info!("ctrl-c received");

    app.shutdown().await;
    Ok(())
}
