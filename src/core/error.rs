use std::io;
use thiserror::Error;

use crate::broker::{BrokerState, Role};

/// Faults raised by a listener service.
///
/// Only the resolve/bind variants ever cross into the broker; accept
/// failures are logged where they happen.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("address {addr}: missing port in address")]
    MissingPort { addr: String },

    #[error("address {port}: invalid port")]
    InvalidPort { port: String },

    #[error("lookup {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("lookup {host}: no addresses found")]
    NoAddress { host: String },

    #[error("listen tcp {addr}: bind: address already in use")]
    AddrInUse { addr: String },

    #[error("listen tcp {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("accept tcp {addr}: {source}")]
    Accept {
        addr: String,
        #[source]
        source: io::Error,
    },
}

impl ListenerError {
    /// Maps a failed `bind` into the matching variant.
    pub(crate) fn from_bind(addr: &str, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::AddrInUse {
            ListenerError::AddrInUse {
                addr: addr.to_owned(),
            }
        } else {
            ListenerError::Bind {
                addr: addr.to_owned(),
                source,
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("{role} listener failed: {source}")]
    Listener {
        role: Role,
        #[source]
        source: ListenerError,
    },

    #[error("broker cannot start from state {0}")]
    NotIdle(BrokerState),
}
