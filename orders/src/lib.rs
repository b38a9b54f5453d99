//! # Ticketline Orders
//!
//! The order lifecycle service: owns `Order` aggregates, coordinates the
//! reservation saga by publishing intents to the inventory service, and
//! reclaims abandoned reservations through the TTL sweeper.
//!
//! Orders move `PENDING -> COMPLETED | CANCELLED | EXPIRED`; every
//! transition is guarded by an atomic status check at the point of
//! mutation, so a user operation and the sweeper racing on the same order
//! resolve first-committer-wins.

pub mod directory;
pub mod listener;
pub mod publisher;
pub mod service;
pub mod store;
pub mod sweeper;

pub use directory::TicketDirectory;
pub use listener::TicketStatusListener;
pub use publisher::OrderEventPublisher;
pub use service::{CreateOrder, OrderService, DEFAULT_ORDER_TTL_MINUTES};
pub use store::{InMemoryOrderStore, OrderStore, OrderTransition};
pub use sweeper::{ExpirationSweeper, SweeperConfig};
