//! Infrastructure setup.
//!
//! Centralizes process wiring: build the fabric via the startup factory,
//! create the stores and services, bind the message queues, and start the
//! sweeper. All resources are `Arc`-shared so consumers and the sweeper
//! can run concurrently.

use crate::config::Config;
use async_trait::async_trait;
use std::sync::Arc;
use ticketline_core::messages::routing;
use ticketline_core::{Clock, Error, Result, SystemClock, Ticket, TicketId};
use ticketline_fabric::{build_fabric, MessageFabric, QueueBinding};
use ticketline_inventory::{InMemoryTicketStore, ReservationHandler, TicketService};
use ticketline_orders::{
    ExpirationSweeper, InMemoryOrderStore, OrderEventPublisher, OrderService, TicketDirectory,
    TicketStatusListener,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

/// In-process implementation of the inventory collaborator seam.
///
/// Both services run in this process, so the directory reads straight
/// from the inventory service; a distributed deployment would swap in a
/// remote client without touching the coordinator.
#[derive(Clone)]
pub struct LocalTicketDirectory {
    tickets: TicketService,
}

impl LocalTicketDirectory {
    /// Wraps the inventory service
    #[must_use]
    pub fn new(tickets: TicketService) -> Self {
        Self { tickets }
    }
}

#[async_trait]
impl TicketDirectory for LocalTicketDirectory {
    async fn ticket(&self, id: TicketId) -> Result<Option<Ticket>> {
        match self.tickets.get(id).await {
            Ok(ticket) => Ok(Some(ticket)),
            Err(Error::TicketNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// The wired process: services, fabric, and background workers.
pub struct App {
    /// Ticket inventory service
    pub tickets: TicketService,
    /// Order lifecycle coordinator
    pub orders: OrderService,
    /// The message fabric both services share
    pub fabric: Arc<dyn MessageFabric>,
    shutdown: broadcast::Sender<()>,
    sweeper: JoinHandle<()>,
}

impl App {
    /// Build every resource from configuration and start the background
    /// workers.
    ///
    /// # Errors
    ///
    /// Returns an error if the fabric cannot be built or a queue binding
    /// fails.
    pub async fn start(config: &Config) -> anyhow::Result<Self> {
        let fabric = build_fabric(&config.fabric)?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self::wire(config, fabric, clock).await
    }

    /// Wire services onto an existing fabric and clock.
    ///
    /// Split out from [`App::start`] so tests can inject a deterministic
    /// clock and fast fabric timings.
    ///
    /// # Errors
    ///
    /// Returns an error if a queue binding fails.
    pub async fn wire(
        config: &Config,
        fabric: Arc<dyn MessageFabric>,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let (shutdown, _) = broadcast::channel(1);

        // Inventory service
        let ticket_store = Arc::new(InMemoryTicketStore::new());
        let tickets = TicketService::new(ticket_store);

        // Order service
        let order_store = Arc::new(InMemoryOrderStore::new());
        let publisher = OrderEventPublisher::new(Arc::clone(&fabric));
        let orders = OrderService::with_ttl(
            order_store.clone(),
            Arc::new(LocalTicketDirectory::new(tickets.clone())),
            publisher,
            Arc::clone(&clock),
            config.orders.ttl,
        );

        // Inventory consumes reservation intents
        let reservation_handler = Arc::new(ReservationHandler::new(
            tickets.clone(),
            Arc::clone(&fabric),
            Arc::clone(&clock),
        ));
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
                reservation_handler,
            )
            .await?;

        // Orders observe ticket status updates (informational)
        fabric
            .subscribe(
                QueueBinding::new(
                    routing::TICKET_STATUS_UPDATE_QUEUE,
                    routing::TICKET_TOPIC,
                    [routing::TICKET_STATUS_UPDATE_KEY],
                ),
                Arc::new(TicketStatusListener::new()),
            )
            .await?;

        // TTL sweeper
        let sweeper = ExpirationSweeper::with_config(
            orders.clone(),
            order_store,
            clock,
            config.orders.sweeper,
        )
        .spawn(shutdown.subscribe());

        info!("ticketline services wired");

        Ok(Self { tickets, orders, fabric, shutdown, sweeper })
    }

    /// Stop the sweeper and wind down the fabric.
    pub async fn shutdown(self) {
        info!("shutting down");
        // Sweeper may already be gone if the runtime is tearing down
        let _ = self.shutdown.send(());
        let _ = self.sweeper.await;
        self.fabric.shutdown().await;
        info!("shutdown complete");
    }
}
