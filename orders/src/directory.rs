//! Inventory collaborator seam.
//!
//! The coordinator never talks to the inventory service's store directly;
//! it reads ticket snapshots through this trait. In a single process the
//! app wires it straight onto the inventory service, in a distributed
//! deployment it would be an HTTP or RPC client — the coordinator cannot
//! tell the difference.

use async_trait::async_trait;
use ticketline_core::{Result, Ticket, TicketId};

/// Read-only view of the ticket inventory.
#[async_trait]
pub trait TicketDirectory: Send + Sync {
    /// Fetch a ticket snapshot, or `None` if the id is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`ticketline_core::Error::Store`] if the inventory cannot
    /// be reached.
    async fn ticket(&self, id: TicketId) -> Result<Option<Ticket>>;
}
