//! Logging for relaymq.
//!
//! Two layers live here:
//!  * `init_logging` – installs the process-wide `tracing` subscriber
//!  * `Logger`       – the small sink the broker reports faults through,
//!    injectable so embedders and tests can capture what gets reported

use std::fmt;
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt as tfmt, EnvFilter, Registry};

pub fn init_logging() {
    let filter: EnvFilter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let formatting_layer = tfmt::layer()
        .with_timer(UtcTime::rfc_3339())
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_target(true)
        .compact();

    let subscriber = Registry::default().with(filter).with(formatting_layer);

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set global subscriber");
}

/// Fault sink used by the broker and its listeners.
///
/// The broker only ever calls `print`/`printf`; the `fatal` pair exists for
/// embedding applications and is expected to end the process.
pub trait Logger: Send + Sync + 'static {
    fn print(&self, msg: &str);

    fn printf(&self, args: fmt::Arguments<'_>) {
        match args.as_str() {
            Some(s) => self.print(s),
            None => self.print(&args.to_string()),
        }
    }

    fn fatal(&self, msg: &str) -> !;

    fn fatalf(&self, args: fmt::Arguments<'_>) -> ! {
        self.fatal(&args.to_string())
    }
}

/// Default sink: forwards every line to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn print(&self, msg: &str) {
        tracing::warn!(target: "relaymq", "{msg}");
    }

    fn fatal(&self, msg: &str) -> ! {
        tracing::error!(target: "relaymq", "{msg}");
        std::process::exit(1)
    }
}

/// The sink used when no logger is handed to the broker.
pub fn default_logger() -> Arc<dyn Logger> {
    Arc::new(TracingLogger)
}

/// Records every line in memory.
///
/// `fatal` records the line and then panics instead of exiting, so a test
/// harness can observe it.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    lines: Mutex<Vec<String>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything logged so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines
            .lock()
            .map(|l| l.iter().any(|line| line.contains(needle)))
            .unwrap_or(false)
    }

    fn push(&self, msg: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(msg.trim_end_matches('\n').to_owned());
        }
    }
}

impl Logger for MemoryLogger {
    fn print(&self, msg: &str) {
        self.push(msg);
    }

    fn fatal(&self, msg: &str) -> ! {
        self.push(msg);
        panic!("fatal: {msg}");
    }
}
