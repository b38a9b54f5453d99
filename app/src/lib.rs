//! # Ticketline App
//!
//! Wires the inventory and order services, the message fabric, and the
//! expiration sweeper into one process: configuration from environment
//! variables, a startup bootstrap, and graceful shutdown.

pub mod bootstrap;
pub mod config;

pub use bootstrap::{App, LocalTicketDirectory};
pub use config::Config;
