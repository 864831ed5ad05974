use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use crate::core::message::FRAME_DELIMITER;

/// Thin client for both sides of the broker.
///
/// Point it at the publisher address to `send_message`, or at the consumer
/// address to `subscribe`.
#[derive(Debug)]
pub struct Client {
    addr: String,
    subscription: Option<Subscription>,
}

#[derive(Debug)]
struct Subscription {
    // held so the connection stays open; dropping it sends FIN
    _writer: OwnedWriteHalf,
    reader: JoinHandle<()>,
}

impl Client {
    /// `host` and `port` are joined as-is, so `("localhost", ":3000")` and
    /// `("localhost:3000", "")` both work.
    pub fn new(host: &str, port: &str) -> Self {
        Self {
            addr: format!("{host}{port}"),
            subscription: None,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Publishes one message: dial, write, close.
    pub async fn send_message(&self, payload: impl AsRef<[u8]>) -> anyhow::Result<()> {
        let mut stream = self.dial().await?;
        stream
            .write_all(payload.as_ref())
            .await
            .with_context(|| format!("write to {}", self.addr))?;
        stream.shutdown().await?;
        Ok(())
    }

    /// Subscribes: dial, then call `callback` with every message on a
    /// background task until the connection fails or `stop` is called.
    ///
    /// The delivered value has its trailing newline removed. A previous
    /// subscription held by this client is closed first.
    pub async fn subscribe<F>(&mut self, callback: F) -> anyhow::Result<()>
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.stop();

        let stream = self.dial().await?;
        let (reader, writer) = stream.into_split();
        let addr = self.addr.clone();
        let reader = tokio::spawn(async move {
            if let Err(e) = read_frames(reader, callback).await {
                tracing::debug!(addr = %addr, error = %e, "subscription ended");
            }
        });

        self.subscription = Some(Subscription {
            _writer: writer,
            reader,
        });
        Ok(())
    }

    /// Closes the held subscription connection, if any.
    pub fn stop(&mut self) {
        if let Some(sub) = self.subscription.take() {
            sub.reader.abort();
        }
    }

    async fn dial(&self) -> anyhow::Result<TcpStream> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .with_context(|| format!("dial tcp {}", self.addr))?;
        socket2::SockRef::from(&stream).set_keepalive(true)?;
        Ok(stream)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn read_frames<F>(reader: OwnedReadHalf, callback: F) -> std::io::Result<()>
where
    F: Fn(String),
{
    let mut reader = BufReader::new(reader);
    let mut frame = Vec::with_capacity(256);

    loop {
        frame.clear();
        if reader.read_until(FRAME_DELIMITER, &mut frame).await? == 0 {
            return Ok(());
        }
        if frame.last() == Some(&FRAME_DELIMITER) {
            frame.pop();
        } else {
            // EOF in the middle of a frame
            return Ok(());
        }
        callback(String::from_utf8_lossy(&frame).into_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tokio::time::{sleep, timeout};

    #[tokio::test]
    async fn send_message_writes_payload_and_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = Client::new(&addr.to_string(), "");
        let server = tokio::spawn(async move {
            let (mut s, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            s.read_to_end(&mut buf).await.unwrap();
            buf
        });

        client.send_message("Test123").await.unwrap();
        let got = timeout(Duration::from_secs(2), server).await.unwrap().unwrap();
        assert_eq!(got, b"Test123");
    }

    #[tokio::test]
    async fn subscribe_strips_newlines_and_drops_partial_tail() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut client = Client::new("127.0.0.1", &format!(":{}", addr.port()));
        let sink = Arc::clone(&seen);
        let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
        client
            .subscribe(move |msg| sink.lock().unwrap().push(msg))
            .await
            .unwrap();

        let mut server = accept.await.unwrap();
        server.write_all(b"a b\n\nlast\npartial").await.unwrap();
        drop(server);

        for _ in 0..100 {
            if seen.lock().unwrap().len() == 3 {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["a b".to_string(), String::new(), "last".to_string()]
        );
        client.stop();
    }

    #[tokio::test]
    async fn dial_failure_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = Client::new(&addr.to_string(), "");
        let err = client.send_message("x").await.unwrap_err();
        assert!(err.to_string().starts_with("dial tcp"));
    }
}
