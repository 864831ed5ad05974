//! # Broker Module
//!
//! - `server`: the [`Broker`] itself, relaying publisher messages to consumers
//! - `listener`: the accept loop shared by both sides
//! - `handler`: ingress (publisher) and egress (consumer) connection tasks
//! - `client`: a thin client for publishing and subscribing

pub mod client;
mod handler;
pub mod listener;
pub mod server;

pub use self::client::Client;
pub use self::listener::{ListenerService, Role};
pub use self::server::{Broker, BrokerState};
