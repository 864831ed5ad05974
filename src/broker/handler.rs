//! Per-connection tasks.
//!
//! Every accepted connection is owned by exactly one of these handlers and is
//! closed when the handler returns.

use std::net::SocketAddr;
use std::sync::Arc;

use flume::{Receiver, Sender};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::debug;

use crate::core::Message;
use crate::logging::Logger;

/// Resolves once `stop` flips to `true` (or its sender is gone).
pub(crate) async fn stopped(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|s| *s).await;
}

/// Publisher side: read the connection to EOF and forward it as one message.
///
/// A read error is logged and whatever arrived before it is still forwarded.
/// The send blocks until the relay loop takes the message.
pub(crate) async fn ingress(
    log: Arc<dyn Logger>,
    out: Sender<Message>,
    mut stream: TcpStream,
    peer: SocketAddr,
    mut stop: watch::Receiver<bool>,
) {
    let mut buf = Vec::new();
    if let Err(e) = stream.read_to_end(&mut buf).await {
        log.printf(format_args!("read {peer}: {e}"));
    }

    let msg = Message::from(buf);
    debug!(peer = %peer, len = msg.len(), "publisher message received");

    tokio::select! {
        res = out.send_async(msg) => {
            if res.is_err() {
                debug!(peer = %peer, "relay gone; message dropped");
            }
        }
        _ = stopped(&mut stop) => {
            debug!(peer = %peer, "listener stopped; message dropped");
        }
    }

    if let Err(e) = stream.shutdown().await {
        log.printf(format_args!("close {peer}: {e}"));
    }
}

/// Consumer side: push every message from the shared channel as `payload\n`.
///
/// Several egress handlers receive from the same channel, so each message
/// reaches only one consumer. The handler exits when its consumer closes, on
/// the first failed write, or when the listener stops; messages it has not
/// taken stay in the channel for the other consumers.
pub(crate) async fn egress(
    log: Arc<dyn Logger>,
    inbound: Receiver<Message>,
    stream: TcpStream,
    peer: SocketAddr,
    mut stop: watch::Receiver<bool>,
) {
    let (mut reader, mut writer) = stream.into_split();
    let mut scratch = [0u8; 512];

    loop {
        tokio::select! {
            biased;

            _ = stopped(&mut stop) => break,

            read = reader.read(&mut scratch) => match read {
                Ok(0) => {
                    debug!(peer = %peer, "consumer closed connection");
                    break;
                }
                // consumers have nothing to say; drop it
                Ok(_) => {}
                Err(e) => {
                    log.printf(format_args!("read {peer}: {e}"));
                    break;
                }
            },

            msg = inbound.recv_async() => {
                let Ok(msg) = msg else { break };
                if let Err(e) = writer.write_all(&msg.to_frame()).await {
                    log.printf(format_args!("write {peer}: {e}"));
                    break;
                }
            }
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!(peer = %peer, error = %e, "consumer shutdown failed");
    }
}
