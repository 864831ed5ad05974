//! Listener service: one TCP accept loop and the channels around it.
//!
//! The same service backs both sides of the broker; its [`Role`] decides
//! which connection handler is spawned for each accepted socket.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use flume::{Receiver, Sender};
use socket2::SockRef;
use tokio::net::{lookup_host, TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::broker::handler::{self, stopped};
use crate::core::{ListenerError, Message};
use crate::logging::Logger;
use crate::util::AcceptBackoff;

/// Which side of the broker a listener serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Accepts publishers; each connection yields one message.
    Publisher,
    /// Accepts consumers; each connection drains the shared channel.
    Consumer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Publisher => f.write_str("publisher"),
            Role::Consumer => f.write_str("consumer"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Listening(SocketAddr),
    Closed,
}

pub struct ListenerService {
    role: Role,
    addr: String,
    log: Arc<dyn Logger>,
    backoff: AcceptBackoff,

    // rendezvous: a send completes only when some receiver takes it
    stream_tx: Sender<Message>,
    stream_rx: Receiver<Message>,

    // capacity 1, first error wins
    errors_tx: Sender<ListenerError>,
    errors_rx: Receiver<ListenerError>,

    stop: watch::Sender<bool>,
    phase: watch::Sender<Phase>,
    started: AtomicBool,
}

impl ListenerService {
    pub fn new(role: Role, addr: impl Into<String>, log: Arc<dyn Logger>) -> Self {
        let (stream_tx, stream_rx) = flume::bounded(0);
        let (errors_tx, errors_rx) = flume::bounded(1);
        let (stop, _) = watch::channel(false);
        let (phase, _) = watch::channel(Phase::Idle);

        Self {
            role,
            addr: addr.into(),
            log,
            backoff: AcceptBackoff::default(),
            stream_tx,
            stream_rx,
            errors_tx,
            errors_rx,
            stop,
            phase,
            started: AtomicBool::new(false),
        }
    }

    pub fn with_accept_backoff(mut self, backoff: AcceptBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Sending half of the message channel (publisher side writes here).
    pub fn sender(&self) -> Sender<Message> {
        self.stream_tx.clone()
    }

    /// Receiving half of the message channel (consumer side reads here).
    pub fn receiver(&self) -> Receiver<Message> {
        self.stream_rx.clone()
    }

    /// Emits at most the first fatal condition of this service.
    pub fn errors(&self) -> Receiver<ListenerError> {
        self.errors_rx.clone()
    }

    /// Bound address, present only between a successful bind and `stop`.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match *self.phase.borrow() {
            Phase::Listening(addr) => Some(addr),
            _ => None,
        }
    }

    /// Waits for the start confirmation.
    ///
    /// Returns the bound address, or `None` if the service failed to bind or
    /// was stopped first.
    pub async fn wait_started(&self) -> Option<SocketAddr> {
        let mut rx = self.phase.subscribe();
        let phase = match rx.wait_for(|p| *p != Phase::Idle).await {
            Ok(p) => *p,
            Err(_) => return None,
        };
        match phase {
            Phase::Listening(addr) => Some(addr),
            _ => None,
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }

    /// Binds and runs the accept loop until `stop` is called.
    ///
    /// Resolve and bind failures go to the error channel; this never panics
    /// or exits the process.
    pub async fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!(role = %self.role, "listener already started");
            return;
        }
        if self.is_stopped() {
            debug!(role = %self.role, "listener stopped before start");
            return;
        }

        let listener = match self.bind().await {
            Ok(l) => l,
            Err(e) => {
                self.phase.send_replace(Phase::Closed);
                self.fail(e);
                return;
            }
        };
        let local = match listener.local_addr() {
            Ok(a) => a,
            Err(e) => {
                self.phase.send_replace(Phase::Closed);
                self.fail(ListenerError::from_bind(&self.addr, e));
                return;
            }
        };

        // a stop that raced the bind wins
        let confirmed = self.phase.send_if_modified(|p| {
            if *p == Phase::Idle {
                *p = Phase::Listening(local);
                true
            } else {
                false
            }
        });
        if !confirmed || self.is_stopped() {
            debug!(role = %self.role, "listener stopped before accepting");
            return;
        }

        info!(role = %self.role, addr = %local, "listening");
        self.accept_loop(listener, local).await;
        info!(role = %self.role, addr = %local, "listener closed");
    }

    /// Sets the stop flag and releases the listening socket.
    ///
    /// Safe to call from any task, any number of times.
    pub fn stop(&self) {
        self.stop.send_replace(true);
        self.phase.send_replace(Phase::Closed);
    }

    async fn bind(&self) -> Result<TcpListener, ListenerError> {
        let target = resolve(&self.addr).await?;
        TcpListener::bind(target)
            .await
            .map_err(|e| ListenerError::from_bind(&self.addr, e))
    }

    async fn accept_loop(&self, listener: TcpListener, local: SocketAddr) {
        let mut stop = self.stop.subscribe();
        let mut backoff = self.backoff.clone();

        loop {
            let accepted = tokio::select! {
                biased;
                _ = stopped(&mut stop) => return,
                res = listener.accept() => res,
            };

            match accepted {
                Ok((stream, peer)) => {
                    backoff.reset();
                    self.spawn_handler(stream, peer);
                }
                Err(e) => {
                    if self.is_stopped() {
                        return;
                    }
                    let err = ListenerError::Accept {
                        addr: local.to_string(),
                        source: e,
                    };
                    self.log.printf(format_args!("{err}"));
                    backoff.snooze().await;
                }
            }
        }
    }

    fn spawn_handler(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = SockRef::from(&stream).set_keepalive(true) {
            self.log.printf(format_args!("set keepalive {peer}: {e}"));
        }
        debug!(role = %self.role, peer = %peer, "accepted connection");

        let log = Arc::clone(&self.log);
        let stop = self.stop.subscribe();
        match self.role {
            Role::Publisher => {
                tokio::spawn(handler::ingress(log, self.sender(), stream, peer, stop));
            }
            Role::Consumer => {
                tokio::spawn(handler::egress(log, self.receiver(), stream, peer, stop));
            }
        }
    }

    fn fail(&self, err: ListenerError) {
        debug!(role = %self.role, error = %err, "listener failed");
        // first error wins; later ones are dropped
        let _ = self.errors_tx.try_send(err);
    }
}

impl fmt::Debug for ListenerService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerService")
            .field("role", &self.role)
            .field("addr", &self.addr)
            .field("phase", &*self.phase.borrow())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Splits `host:port` where the host is optional (`":3000"` listens on all
/// interfaces).
pub(crate) fn split_host_port(addr: &str) -> Result<(&str, u16), ListenerError> {
    let Some((host, port)) = addr.rsplit_once(':') else {
        return Err(ListenerError::MissingPort {
            addr: addr.to_owned(),
        });
    };
    let port: u16 = port.parse().map_err(|_| ListenerError::InvalidPort {
        port: port.to_owned(),
    })?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    Ok((host, port))
}

async fn resolve(addr: &str) -> Result<SocketAddr, ListenerError> {
    let (host, port) = split_host_port(addr)?;
    let host = if host.is_empty() { "0.0.0.0" } else { host };

    let mut addrs = lookup_host((host, port))
        .await
        .map_err(|source| ListenerError::Resolve {
            host: host.to_owned(),
            source,
        })?;
    addrs.next().ok_or_else(|| ListenerError::NoAddress {
        host: host.to_owned(),
    })
}
