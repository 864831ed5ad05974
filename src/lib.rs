//! relaymq – a minimal TCP message relay.
//!
//! Publishers connect, write one message and close; the broker hands each
//! message to exactly one connected consumer as a `\n`-terminated line.
//!
//! This crate exports
//!  * `broker`  – the broker, its two listeners and a thin client
//!  * `core`    – message and error types
//!  * `config`  – TOML/env driven runtime configuration
//!  * `logging` – tracing setup and the injectable fault logger

// ───────────────────────────────────────────────────────────
// Public modules
// ───────────────────────────────────────────────────────────
pub mod broker;
pub mod config;
pub mod core;
pub mod logging;
pub mod util;

// ───────────────────────────────────────────────────────────
// Re-exports
// ───────────────────────────────────────────────────────────
pub use broker::{Broker, BrokerState, Client, ListenerService, Role};
pub use config::{load_config, Config};
pub use self::core::{BrokerError, ListenerError, Message};
pub use logging::{Logger, MemoryLogger, TracingLogger};
