//! Ticket listing operations and the optimistic-concurrency state machine.

use crate::store::TicketStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use ticketline_core::{Error, Money, NewTicket, Result, Ticket, TicketId, TicketStatus};
use tracing::{info, warn};

/// Field edits a seller may apply to a listing
#[derive(Clone, Debug, Default)]
pub struct TicketUpdate {
    /// New venue location
    pub location: Option<String>,
    /// New seat details
    pub seat_info: Option<String>,
    /// New asking price
    pub price: Option<Money>,
}

/// Outcome of an idempotent state-machine operation: the final snapshot
/// plus whether this particular call performed the transition.
#[derive(Clone, Debug)]
pub struct Applied {
    /// Snapshot after the operation
    pub ticket: Ticket,
    /// `false` when the call was an idempotent no-op
    pub transitioned: bool,
}

/// The ticket inventory service.
///
/// State-machine semantics:
/// - `reserve` is a single compare-and-swap: exactly one caller per
///   version value wins; the rest get [`Error::VersionConflict`].
/// - `release` on a non-reserved ticket is a silent no-op. Duplicate
///   RELEASE deliveries are expected under at-least-once messaging and
///   must never corrupt state or error the caller. This is a guarantee.
/// - `mark_sold` on an already-sold ticket is a no-op; on an available
///   one it is [`Error::InvalidState`].
#[derive(Clone)]
pub struct TicketService {
    store: Arc<dyn TicketStore>,
}

impl TicketService {
    /// Creates a service over the given store
    #[must_use]
    pub fn new(store: Arc<dyn TicketStore>) -> Self {
        Self { store }
    }

    /// List a new ticket for sale.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the store rejects the insert.
    pub async fn create(&self, draft: NewTicket) -> Result<Ticket> {
        let ticket = self.store.insert(Ticket::list(draft)).await?;
        info!(ticket_id = %ticket.id, seller_id = %ticket.seller_id, "ticket listed");
        Ok(ticket)
    }

    /// Fetch a ticket snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TicketNotFound`] if the id is unknown.
    pub async fn get(&self, id: TicketId) -> Result<Ticket> {
        self.store.get(id).await?.ok_or(Error::TicketNotFound(id))
    }

    /// Apply seller edits to a listing. Runs through the version guard so
    /// concurrent edits cannot silently overwrite each other.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TicketNotFound`] if the id is unknown.
    pub async fn update(&self, id: TicketId, changes: TicketUpdate) -> Result<Ticket> {
        loop {
            let current = self.get(id).await?;
            let mut updated = current.clone();
            if let Some(location) = changes.location.clone() {
                updated.location = location;
            }
            if let Some(seat_info) = changes.seat_info.clone() {
                updated.seat_info = Some(seat_info);
            }
            if let Some(price) = changes.price {
                updated.price = price;
            }

            match self.store.compare_and_update(id, current.version, updated).await {
                Ok(stored) => return Ok(stored),
                Err(Error::VersionConflict { .. }) => {} // Raced; re-read and reapply
                Err(e) => return Err(e),
            }
        }
    }

    /// Remove a listing (only while `Available`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] once the ticket is reserved or sold.
    pub async fn delete(&self, id: TicketId) -> Result<()> {
        self.store.delete(id).await
    }

    /// All currently purchasable tickets
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the store fails.
    pub async fn list_available(&self) -> Result<Vec<Ticket>> {
        self.store.find_available().await
    }

    /// Search listings by event name, case-insensitively
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the store fails.
    pub async fn search_by_event(&self, query: &str) -> Result<Vec<Ticket>> {
        self.store.search_by_event(query).await
    }

    /// Listings for events within `[from, to]`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the store fails.
    pub async fn happening_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Ticket>> {
        self.store.happening_between(from, to).await
    }

    /// Reserve a ticket with an optimistic-concurrency guard.
    ///
    /// # Errors
    ///
    /// - [`Error::VersionConflict`] if `expected_version` is stale (the
    ///   caller lost the race; surface as "no longer available")
    /// - [`Error::InvalidState`] if the ticket is not `Available`
    /// - [`Error::TicketNotFound`] if the id is unknown
    pub async fn reserve(&self, id: TicketId, expected_version: u64) -> Result<Ticket> {
        let current = self.get(id).await?;

        if current.version != expected_version {
            return Err(Error::VersionConflict {
                ticket: id,
                expected: expected_version,
                stored: current.version,
            });
        }
        if current.status != TicketStatus::Available {
            return Err(Error::invalid_state(format!(
                "ticket {id} is {} and cannot be reserved",
                current.status
            )));
        }

        let mut updated = current;
        updated.status = TicketStatus::Reserved;
        let stored = self.store.compare_and_update(id, expected_version, updated).await?;
        info!(ticket_id = %id, version = stored.version, "ticket reserved");
        Ok(stored)
    }

    /// Return a reserved ticket to the market. Idempotent: releasing a
    /// ticket that is not `Reserved` returns the current snapshot
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TicketNotFound`] if the id is unknown.
    pub async fn release(&self, id: TicketId) -> Result<Applied> {
        loop {
            let current = self.get(id).await?;
            if current.status != TicketStatus::Reserved {
                return Ok(Applied { ticket: current, transitioned: false });
            }

            let mut updated = current.clone();
            updated.status = TicketStatus::Available;
            match self.store.compare_and_update(id, current.version, updated).await {
                Ok(stored) => {
                    info!(ticket_id = %id, version = stored.version, "ticket released");
                    return Ok(Applied { ticket: stored, transitioned: true });
                }
                Err(Error::VersionConflict { .. }) => {
                    // Another caller moved the ticket; re-evaluate from the
                    // fresh snapshot (it may no longer be Reserved).
                    warn!(ticket_id = %id, "release raced with another mutation, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Finalize the sale of a reserved ticket. Idempotent for tickets
    /// already `Sold` (message redelivery can duplicate this call).
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if the ticket is `Available`
    /// - [`Error::TicketNotFound`] if the id is unknown
    pub async fn mark_sold(&self, id: TicketId) -> Result<Applied> {
        loop {
            let current = self.get(id).await?;
            match current.status {
                TicketStatus::Sold => {
                    return Ok(Applied { ticket: current, transitioned: false });
                }
                TicketStatus::Available => {
                    return Err(Error::invalid_state(format!(
                        "ticket {id} is AVAILABLE and cannot be marked sold"
                    )));
                }
                TicketStatus::Reserved => {
                    let mut updated = current.clone();
                    updated.status = TicketStatus::Sold;
                    match self.store.compare_and_update(id, current.version, updated).await {
                        Ok(stored) => {
                            info!(ticket_id = %id, version = stored.version, "ticket sold");
                            return Ok(Applied { ticket: stored, transitioned: true });
                        }
                        Err(Error::VersionConflict { .. }) => {
                            warn!(ticket_id = %id, "mark_sold raced with another mutation, retrying");
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }
    }
}
