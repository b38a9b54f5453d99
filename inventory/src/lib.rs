//! # Ticketline Inventory
//!
//! The ticket inventory service: owns the `Ticket` aggregates behind a
//! version-guarded store, applies the ticket state machine
//! (`AVAILABLE -> RESERVED -> SOLD`, with release back to `AVAILABLE`),
//! and consumes reservation intents from the message fabric.
//!
//! The only hard mutual-exclusion requirement in the system lives here:
//! for any ticket and version, exactly one concurrent `reserve` wins; the
//! rest observe a typed `VersionConflict`.

pub mod handler;
pub mod service;
pub mod store;

pub use handler::ReservationHandler;
pub use service::{Applied, TicketService, TicketUpdate};
pub use store::{InMemoryTicketStore, TicketStore};
