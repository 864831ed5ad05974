//! Core data types shared by the broker, its listeners and the client.
//!
//! - `message`: the opaque payload relayed from a publisher to one consumer
//! - `error`: typed faults raised by listeners and the broker

pub mod error;
pub mod message;

pub use error::{BrokerError, ListenerError};
pub use message::Message;
