use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::broker::listener::{ListenerService, Role};
use crate::config::Config;
use crate::core::{BrokerError, ListenerError};
use crate::logging::{default_logger, Logger};

/// Broker lifecycle: `Idle → Running → Stopped`. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerState {
    Idle,
    Running,
    Stopped,
}

impl fmt::Display for BrokerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerState::Idle => f.write_str("idle"),
            BrokerState::Running => f.write_str("running"),
            BrokerState::Stopped => f.write_str("stopped"),
        }
    }
}

/// Relays each publisher message to exactly one connected consumer.
///
/// Owns the publisher-facing and consumer-facing listeners. A fatal error on
/// either side stops the whole broker; there is no half-running mode.
pub struct Broker {
    publishers: Arc<ListenerService>,
    consumers: Arc<ListenerService>,
    log: Arc<dyn Logger>,
    state: watch::Sender<BrokerState>,
}

impl Broker {
    /// Broker reporting faults through the default tracing-backed logger.
    pub fn new(publishers_addr: impl Into<String>, consumers_addr: impl Into<String>) -> Self {
        Self::with_logger(publishers_addr, consumers_addr, default_logger())
    }

    pub fn with_logger(
        publishers_addr: impl Into<String>,
        consumers_addr: impl Into<String>,
        log: Arc<dyn Logger>,
    ) -> Self {
        let publishers = ListenerService::new(Role::Publisher, publishers_addr, Arc::clone(&log));
        let consumers = ListenerService::new(Role::Consumer, consumers_addr, Arc::clone(&log));
        Self::from_services(publishers, consumers, log)
    }

    pub fn from_config(config: &Config, log: Arc<dyn Logger>) -> Self {
        let backoff = config.listener.accept_backoff();
        let publishers = ListenerService::new(
            Role::Publisher,
            config.server.publishers_addr.clone(),
            Arc::clone(&log),
        )
        .with_accept_backoff(backoff.clone());
        let consumers = ListenerService::new(
            Role::Consumer,
            config.server.consumers_addr.clone(),
            Arc::clone(&log),
        )
        .with_accept_backoff(backoff);
        Self::from_services(publishers, consumers, log)
    }

    fn from_services(
        publishers: ListenerService,
        consumers: ListenerService,
        log: Arc<dyn Logger>,
    ) -> Self {
        let (state, _) = watch::channel(BrokerState::Idle);
        Self {
            publishers: Arc::new(publishers),
            consumers: Arc::new(consumers),
            log,
            state,
        }
    }

    pub fn state(&self) -> BrokerState {
        *self.state.borrow()
    }

    pub fn publishers(&self) -> &ListenerService {
        &self.publishers
    }

    pub fn consumers(&self) -> &ListenerService {
        &self.consumers
    }

    /// Waits until the publisher listener is bound; `None` if it never was.
    pub async fn publishers_addr(&self) -> Option<SocketAddr> {
        self.publishers.wait_started().await
    }

    /// Waits until the consumer listener is bound; `None` if it never was.
    pub async fn consumers_addr(&self) -> Option<SocketAddr> {
        self.consumers.wait_started().await
    }

    /// Runs both listeners and the relay loop.
    ///
    /// Returns once the broker is stopped (`Ok`) or a listener failed to
    /// resolve or bind (`Err`, already logged). Both listeners have released
    /// their sockets by the time this returns.
    pub async fn start(&self) -> Result<(), BrokerError> {
        let mut from = BrokerState::Idle;
        let began = self.state.send_if_modified(|s| {
            from = *s;
            if *s == BrokerState::Idle {
                *s = BrokerState::Running;
                true
            } else {
                false
            }
        });
        if !began {
            return Err(BrokerError::NotIdle(from));
        }

        info!(
            publishers = self.publishers.addr(),
            consumers = self.consumers.addr(),
            "broker starting"
        );

        let publishers = spawn_listener(&self.publishers);
        let consumers = spawn_listener(&self.consumers);

        let result = self.relay().await;
        self.stop();

        for (role, task) in [(Role::Publisher, publishers), (Role::Consumer, consumers)] {
            if let Err(e) = task.await {
                debug!(role = %role, error = %e, "listener task ended abnormally");
            }
        }

        info!("broker stopped");
        result
    }

    /// Requests shutdown and stops both listeners.
    ///
    /// Fire-and-forget; safe from any task and any number of times.
    pub fn stop(&self) {
        let prev = self.state.send_replace(BrokerState::Stopped);
        if prev != BrokerState::Stopped {
            debug!(from = %prev, "broker stop requested");
        }
        self.publishers.stop();
        self.consumers.stop();
    }

    async fn relay(&self) -> Result<(), BrokerError> {
        let publisher_errors = self.publishers.errors();
        let consumer_errors = self.consumers.errors();
        let inbound = self.publishers.receiver();
        let outbound = self.consumers.sender();
        let mut state = self.state.subscribe();

        loop {
            let msg = tokio::select! {
                biased;
                _ = stopped(&mut state) => return Ok(()),
                Ok(err) = publisher_errors.recv_async() => return Err(self.fail(Role::Publisher, err)),
                Ok(err) = consumer_errors.recv_async() => return Err(self.fail(Role::Consumer, err)),
                Ok(msg) = inbound.recv_async() => msg,
            };

            // blocks until some consumer handler takes it
            tokio::select! {
                biased;
                _ = stopped(&mut state) => return Ok(()),
                Ok(err) = consumer_errors.recv_async() => return Err(self.fail(Role::Consumer, err)),
                sent = outbound.send_async(msg) => {
                    if sent.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn fail(&self, role: Role, err: ListenerError) -> BrokerError {
        self.log.printf(format_args!("{err}"));
        self.stop();
        BrokerError::Listener { role, source: err }
    }
}

impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("state", &self.state())
            .field("publishers", &self.publishers)
            .field("consumers", &self.consumers)
            .finish()
    }
}

fn spawn_listener(service: &Arc<ListenerService>) -> JoinHandle<()> {
    let service = Arc::clone(service);
    tokio::spawn(async move { service.start().await })
}

async fn stopped(state: &mut watch::Receiver<BrokerState>) {
    let _ = state.wait_for(|s| *s == BrokerState::Stopped).await;
}
