//! Ticket persistence boundary.
//!
//! The store exposes plain get/save/delete/find operations plus the one
//! primitive the whole saga leans on: a version-guarded conditional update.
//! The guard is expressed as a typed result (`Error::VersionConflict`), not
//! an exception smuggled across a layer boundary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use ticketline_core::{Error, Result, Ticket, TicketId, TicketStatus};

/// Persistence contract for `Ticket` aggregates.
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Fetch a ticket by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the backing store fails.
    async fn get(&self, id: TicketId) -> Result<Option<Ticket>>;

    /// Insert a freshly listed ticket.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the id already exists or the backing
    /// store fails.
    async fn insert(&self, ticket: Ticket) -> Result<Ticket>;

    /// Version-guarded conditional update (compare-and-swap).
    ///
    /// Replaces the stored ticket with `updated` if and only if the stored
    /// version equals `expected_version`; the stored version becomes
    /// `expected_version + 1` regardless of what `updated.version` says.
    /// This is the atomic write that guarantees at-most-one-winner per
    /// version value.
    ///
    /// # Errors
    ///
    /// - [`Error::TicketNotFound`] if the id is unknown
    /// - [`Error::VersionConflict`] if the stored version moved
    async fn compare_and_update(
        &self,
        id: TicketId,
        expected_version: u64,
        updated: Ticket,
    ) -> Result<Ticket>;

    /// Delete a listing. Permitted only while `Available`; reserved or
    /// sold tickets are part of the audit trail and are never removed.
    ///
    /// # Errors
    ///
    /// - [`Error::TicketNotFound`] if the id is unknown
    /// - [`Error::InvalidState`] if the ticket is not `Available`
    async fn delete(&self, id: TicketId) -> Result<()>;

    /// All tickets currently purchasable
    async fn find_available(&self) -> Result<Vec<Ticket>>;

    /// Tickets whose event name contains `query`, case-insensitively
    async fn search_by_event(&self, query: &str) -> Result<Vec<Ticket>>;

    /// Tickets whose event date falls within `[from, to]`
    async fn happening_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Ticket>>;
}

/// In-memory `TicketStore`.
///
/// All mutations run under one write lock, which is what makes
/// `compare_and_update` a genuine compare-and-swap: the version check and
/// the write are indivisible.
#[derive(Debug, Default)]
pub struct InMemoryTicketStore {
    tickets: RwLock<HashMap<TicketId, Ticket>>,
}

impl InMemoryTicketStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_poisoned() -> Error {
    Error::Store("ticket store lock poisoned".to_string())
}

#[async_trait]
impl TicketStore for InMemoryTicketStore {
    async fn get(&self, id: TicketId) -> Result<Option<Ticket>> {
        let tickets = self.tickets.read().map_err(|_| lock_poisoned())?;
        Ok(tickets.get(&id).cloned())
    }

    async fn insert(&self, ticket: Ticket) -> Result<Ticket> {
        let mut tickets = self.tickets.write().map_err(|_| lock_poisoned())?;
        if tickets.contains_key(&ticket.id) {
            return Err(Error::Store(format!("ticket {} already exists", ticket.id)));
        }
        tickets.insert(ticket.id, ticket.clone());
        Ok(ticket)
    }

    async fn compare_and_update(
        &self,
        id: TicketId,
        expected_version: u64,
        mut updated: Ticket,
    ) -> Result<Ticket> {
        let mut tickets = self.tickets.write().map_err(|_| lock_poisoned())?;
        let stored = tickets.get_mut(&id).ok_or(Error::TicketNotFound(id))?;

        if stored.version != expected_version {
            return Err(Error::VersionConflict {
                ticket: id,
                expected: expected_version,
                stored: stored.version,
            });
        }

        updated.id = id;
        updated.version = expected_version + 1;
        *stored = updated.clone();
        Ok(updated)
    }

    async fn delete(&self, id: TicketId) -> Result<()> {
        let mut tickets = self.tickets.write().map_err(|_| lock_poisoned())?;
        let stored = tickets.get(&id).ok_or(Error::TicketNotFound(id))?;
        if stored.status != TicketStatus::Available {
            return Err(Error::invalid_state(format!(
                "ticket {id} is {} and cannot be deleted",
                stored.status
            )));
        }
        tickets.remove(&id);
        Ok(())
    }

    async fn find_available(&self) -> Result<Vec<Ticket>> {
        let tickets = self.tickets.read().map_err(|_| lock_poisoned())?;
        Ok(tickets
            .values()
            .filter(|t| t.status == TicketStatus::Available)
            .cloned()
            .collect())
    }

    async fn search_by_event(&self, query: &str) -> Result<Vec<Ticket>> {
        let needle = query.to_lowercase();
        let tickets = self.tickets.read().map_err(|_| lock_poisoned())?;
        Ok(tickets
            .values()
            .filter(|t| t.event_name.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn happening_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Ticket>> {
        let tickets = self.tickets.read().map_err(|_| lock_poisoned())?;
        Ok(tickets
            .values()
            .filter(|t| t.event_date >= from && t.event_date <= to)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ticketline_core::{Money, NewTicket, UserId};

    fn listed() -> Ticket {
        Ticket::list(NewTicket {
            event_name: "Harborside Jazz".to_string(),
            category: "concert".to_string(),
            location: "Pier 9".to_string(),
            event_date: Utc::now(),
            seat_info: None,
            price: Money::from_dollars(40),
            seller_id: UserId::new(),
        })
    }

    #[tokio::test]
    async fn cas_bumps_version_by_exactly_one() {
        let store = InMemoryTicketStore::new();
        let ticket = store.insert(listed()).await.unwrap();

        let mut updated = ticket.clone();
        updated.status = TicketStatus::Reserved;
        let stored = store.compare_and_update(ticket.id, 0, updated).await.unwrap();

        assert_eq!(stored.version, 1);
        assert_eq!(stored.status, TicketStatus::Reserved);
    }

    #[tokio::test]
    async fn cas_rejects_stale_version() {
        let store = InMemoryTicketStore::new();
        let ticket = store.insert(listed()).await.unwrap();

        let mut updated = ticket.clone();
        updated.status = TicketStatus::Reserved;
        store.compare_and_update(ticket.id, 0, updated.clone()).await.unwrap();

        let err = store.compare_and_update(ticket.id, 0, updated).await.unwrap_err();
        assert!(matches!(err, Error::VersionConflict { expected: 0, stored: 1, .. }));
    }

    #[tokio::test]
    async fn delete_refuses_reserved_tickets() {
        let store = InMemoryTicketStore::new();
        let ticket = store.insert(listed()).await.unwrap();
        let mut updated = ticket.clone();
        updated.status = TicketStatus::Reserved;
        store.compare_and_update(ticket.id, 0, updated).await.unwrap();

        assert!(matches!(store.delete(ticket.id).await, Err(Error::InvalidState(_))));
    }

    #[tokio::test]
    async fn search_is_case_insensitive() {
        let store = InMemoryTicketStore::new();
        store.insert(listed()).await.unwrap();

        assert_eq!(store.search_by_event("harborside").await.unwrap().len(), 1);
        assert_eq!(store.search_by_event("JAZZ").await.unwrap().len(), 1);
        assert!(store.search_by_event("opera").await.unwrap().is_empty());
    }
}
