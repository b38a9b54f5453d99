//! Order persistence boundary.
//!
//! Besides the usual lookups, the store provides exactly one mutation
//! primitive for committed orders: [`OrderStore::transition_if_pending`],
//! an atomic status-guarded write. There is no unconditional update —
//! terminal orders are immutable by construction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use ticketline_core::{Error, Order, OrderId, OrderStatus, PaymentId, Result, TicketId, UserId};

/// A guarded terminal transition: applied only if the order is `Pending`
/// at the instant of the write.
#[derive(Clone, Debug)]
pub struct OrderTransition {
    /// Target status (one of the three terminal statuses)
    pub status: OrderStatus,
    /// Payment to record (completion)
    pub payment_id: Option<PaymentId>,
    /// Reason to record (cancellation / expiry)
    pub cancellation_reason: Option<String>,
    /// `updated_at` stamp for the transition
    pub at: DateTime<Utc>,
}

/// Persistence contract for `Order` aggregates.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Fetch an order by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the backing store fails.
    async fn get(&self, id: OrderId) -> Result<Option<Order>>;

    /// Persist a new order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the id already exists or the backing
    /// store fails.
    async fn insert(&self, order: Order) -> Result<Order>;

    /// Atomically transition a `Pending` order to a terminal status.
    ///
    /// The status check and the write are indivisible per order: when a
    /// user operation and the sweeper race, exactly one transition
    /// commits and the loser observes [`Error::InvalidState`].
    ///
    /// # Errors
    ///
    /// - [`Error::OrderNotFound`] if the id is unknown
    /// - [`Error::InvalidState`] if the order is no longer `Pending`
    async fn transition_if_pending(
        &self,
        id: OrderId,
        transition: OrderTransition,
    ) -> Result<Order>;

    /// A buyer's orders, newest first
    async fn find_by_buyer(&self, buyer: UserId) -> Result<Vec<Order>>;

    /// A seller's orders, newest first
    async fn find_by_seller(&self, seller: UserId) -> Result<Vec<Order>>;

    /// How many `Pending` orders currently reference the ticket
    async fn count_pending_for_ticket(&self, ticket: TicketId) -> Result<u64>;

    /// The order recorded against a payment, if any
    async fn find_by_payment(&self, payment: PaymentId) -> Result<Option<Order>>;

    /// `Pending` orders whose `expires_at` lies strictly before `now` —
    /// the sweeper's work list
    async fn find_expired_pending(&self, now: DateTime<Utc>) -> Result<Vec<Order>>;
}

/// In-memory `OrderStore`.
///
/// A single write lock serializes mutations, making the status guard in
/// `transition_if_pending` atomic per order.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<OrderId, Order>>,
}

impl InMemoryOrderStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_poisoned() -> Error {
    Error::Store("order store lock poisoned".to_string())
}

fn newest_first(mut orders: Vec<Order>) -> Vec<Order> {
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    orders
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        let orders = self.orders.read().map_err(|_| lock_poisoned())?;
        Ok(orders.get(&id).cloned())
    }

    async fn insert(&self, order: Order) -> Result<Order> {
        let mut orders = self.orders.write().map_err(|_| lock_poisoned())?;
        if orders.contains_key(&order.id) {
            return Err(Error::Store(format!("order {} already exists", order.id)));
        }
        orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn transition_if_pending(
        &self,
        id: OrderId,
        transition: OrderTransition,
    ) -> Result<Order> {
        let mut orders = self.orders.write().map_err(|_| lock_poisoned())?;
        let stored = orders.get_mut(&id).ok_or(Error::OrderNotFound(id))?;

        if stored.status != OrderStatus::Pending {
            return Err(Error::invalid_state(format!(
                "order {id} is {} and admits no further transitions",
                stored.status
            )));
        }

        stored.status = transition.status;
        stored.updated_at = transition.at;
        if let Some(payment_id) = transition.payment_id {
            stored.payment_id = Some(payment_id);
        }
        if let Some(reason) = transition.cancellation_reason {
            stored.cancellation_reason = Some(reason);
        }
        Ok(stored.clone())
    }

    async fn find_by_buyer(&self, buyer: UserId) -> Result<Vec<Order>> {
        let orders = self.orders.read().map_err(|_| lock_poisoned())?;
        Ok(newest_first(
            orders.values().filter(|o| o.buyer_id == buyer).cloned().collect(),
        ))
    }

    async fn find_by_seller(&self, seller: UserId) -> Result<Vec<Order>> {
        let orders = self.orders.read().map_err(|_| lock_poisoned())?;
        Ok(newest_first(
            orders.values().filter(|o| o.seller_id == seller).cloned().collect(),
        ))
    }

    async fn count_pending_for_ticket(&self, ticket: TicketId) -> Result<u64> {
        let orders = self.orders.read().map_err(|_| lock_poisoned())?;
        Ok(orders
            .values()
            .filter(|o| o.ticket_id == ticket && o.status == OrderStatus::Pending)
            .count() as u64)
    }

    async fn find_by_payment(&self, payment: PaymentId) -> Result<Option<Order>> {
        let orders = self.orders.read().map_err(|_| lock_poisoned())?;
        Ok(orders.values().find(|o| o.payment_id == Some(payment)).cloned())
    }

    async fn find_expired_pending(&self, now: DateTime<Utc>) -> Result<Vec<Order>> {
        let orders = self.orders.read().map_err(|_| lock_poisoned())?;
        Ok(orders
            .values()
            .filter(|o| o.status == OrderStatus::Pending && o.expires_at < now)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ticketline_core::Money;

    fn pending_order(created_at: DateTime<Utc>) -> Order {
        Order {
            id: OrderId::new(),
            buyer_id: UserId::new(),
            ticket_id: TicketId::new(),
            seller_id: UserId::new(),
            event_name: "Spring Derby".to_string(),
            event_date: created_at + Duration::days(30),
            seat_info: None,
            price: Money::from_dollars(75),
            quantity: 1,
            total_amount: Money::from_dollars(75),
            status: OrderStatus::Pending,
            created_at,
            updated_at: created_at,
            expires_at: created_at + Duration::minutes(15),
            payment_id: None,
            cancellation_reason: None,
        }
    }

    #[tokio::test]
    async fn transition_applies_once_and_only_once() {
        let store = InMemoryOrderStore::new();
        let now = Utc::now();
        let order = store.insert(pending_order(now)).await.unwrap();

        let completed = store
            .transition_if_pending(
                order.id,
                OrderTransition {
                    status: OrderStatus::Completed,
                    payment_id: Some(PaymentId::new()),
                    cancellation_reason: None,
                    at: now,
                },
            )
            .await
            .unwrap();
        assert_eq!(completed.status, OrderStatus::Completed);
        assert!(completed.payment_id.is_some());

        // The losing racer observes InvalidState and the order is unchanged
        let err = store
            .transition_if_pending(
                order.id,
                OrderTransition {
                    status: OrderStatus::Expired,
                    payment_id: None,
                    cancellation_reason: None,
                    at: now,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));

        let stored = store.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Completed);
    }

    #[tokio::test]
    async fn expired_pending_window_excludes_terminal_and_fresh_orders() {
        let store = InMemoryOrderStore::new();
        let now = Utc::now();

        let stale = store.insert(pending_order(now - Duration::minutes(20))).await.unwrap();
        let fresh = store.insert(pending_order(now)).await.unwrap();
        let cancelled = store.insert(pending_order(now - Duration::minutes(20))).await.unwrap();
        store
            .transition_if_pending(
                cancelled.id,
                OrderTransition {
                    status: OrderStatus::Cancelled,
                    payment_id: None,
                    cancellation_reason: Some("changed my mind".to_string()),
                    at: now,
                },
            )
            .await
            .unwrap();

        let expired = store.find_expired_pending(now).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, stale.id);
        assert_ne!(expired[0].id, fresh.id);
    }

    #[tokio::test]
    async fn buyer_orders_come_back_newest_first() {
        let store = InMemoryOrderStore::new();
        let buyer = UserId::new();
        let now = Utc::now();

        let mut older = pending_order(now - Duration::hours(2));
        older.buyer_id = buyer;
        let mut newer = pending_order(now);
        newer.buyer_id = buyer;
        store.insert(older.clone()).await.unwrap();
        store.insert(newer.clone()).await.unwrap();

        let orders = store.find_by_buyer(buyer).await.unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].id, newer.id);
        assert_eq!(orders[1].id, older.id);
    }
}
