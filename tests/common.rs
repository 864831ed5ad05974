#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use relaymq::{Broker, BrokerError, Client, Logger};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        relaymq::logging::init_logging();
    });
}

/// Broker running on ephemeral loopback ports.
pub struct RunningBroker {
    pub broker: Arc<Broker>,
    pub publishers: SocketAddr,
    pub consumers: SocketAddr,
    task: JoinHandle<Result<(), BrokerError>>,
}

impl RunningBroker {
    pub fn publisher(&self) -> Client {
        Client::new(&self.publishers.to_string(), "")
    }

    pub fn consumer(&self) -> Client {
        Client::new(&self.consumers.to_string(), "")
    }

    /// Stops the broker and waits for `start` to return.
    pub async fn shutdown(self) -> Result<(), BrokerError> {
        self.broker.stop();
        timeout(Duration::from_secs(5), self.task)
            .await
            .expect("broker did not stop in time")
            .expect("broker task panicked")
    }
}

pub async fn spawn_broker(log: Arc<dyn Logger>) -> RunningBroker {
    let broker = Arc::new(Broker::with_logger("127.0.0.1:0", "127.0.0.1:0", log));
    let runner = Arc::clone(&broker);
    let task = tokio::spawn(async move { runner.start().await });

    let publishers = broker
        .publishers_addr()
        .await
        .expect("publisher listener failed to bind");
    let consumers = broker
        .consumers_addr()
        .await
        .expect("consumer listener failed to bind");

    RunningBroker {
        broker,
        publishers,
        consumers,
        task,
    }
}

/// Messages received by subscribed consumers, tagged with the consumer name.
pub type Inbox = Arc<Mutex<Vec<String>>>;

pub fn inbox() -> Inbox {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn recorder(inbox: &Inbox, tag: &'static str) -> impl Fn(String) + Send + Sync + 'static {
    let inbox = Arc::clone(inbox);
    move |msg| inbox.lock().unwrap().push(format!("{tag}:{msg}"))
}

pub fn snapshot(inbox: &Inbox) -> Vec<String> {
    inbox.lock().unwrap().clone()
}

/// Polls `cond` every 10ms until it holds or `within` elapses.
pub async fn eventually<F>(within: Duration, cond: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + within;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(10)).await;
    }
}

/// Gives freshly accepted consumer connections time to reach the channel.
pub async fn settle() {
    sleep(Duration::from_millis(50)).await;
}
