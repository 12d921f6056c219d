//! event-push library crate.
//!
//! Push-notification subscription lifecycle for live event feeds: the
//! client-side subscription core (capability probing, ledger, subscribe
//! protocol, staleness reconciliation, delivery agent) and the topic binder
//! plus fan-out service it talks to.

pub mod api;
pub mod binder;
pub mod config;
pub mod database;
pub mod domain;
pub mod error;
pub mod logging;
pub mod notification;
pub mod subscription;
pub mod time;
pub mod utils;

pub use error::{Error, Result};
