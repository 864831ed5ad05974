mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{eventually, inbox, recorder, settle, snapshot, spawn_broker};
use relaymq::MemoryLogger;
use tokio::time::sleep;

const MESSAGE: &str = "Test123";

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn each_message_reaches_exactly_one_consumer() {
    common::init_logging();
    let running = spawn_broker(Arc::new(MemoryLogger::new())).await;
    let received = inbox();

    let mut node1 = running.consumer();
    node1.subscribe(recorder(&received, "node1")).await.unwrap();
    let mut node2 = running.consumer();
    node2.subscribe(recorder(&received, "node2")).await.unwrap();
    settle().await;

    let publisher = running.publisher();
    let publisher2 = running.publisher();
    publisher.send_message(MESSAGE).await.unwrap();
    publisher.send_message(MESSAGE).await.unwrap();
    publisher2.send_message(MESSAGE).await.unwrap();
    publisher2.send_message(MESSAGE).await.unwrap();

    assert!(
        eventually(Duration::from_secs(2), || snapshot(&received).len() == 4).await,
        "got {:?}",
        snapshot(&received)
    );

    // nothing shows up twice
    sleep(Duration::from_millis(100)).await;
    let all = snapshot(&received);
    assert_eq!(all.len(), 4);
    assert!(all
        .iter()
        .all(|m| m == "node1:Test123" || m == "node2:Test123"));

    node1.stop();
    node2.stop();
    running.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn messages_wait_for_a_late_consumer() {
    common::init_logging();
    let running = spawn_broker(Arc::new(MemoryLogger::new())).await;
    let received = inbox();

    let publisher = running.publisher();
    for _ in 0..4 {
        publisher.send_message(MESSAGE).await.unwrap();
    }

    // subscribe after the pushes
    let mut consumer = running.consumer();
    consumer.subscribe(recorder(&received, "node1")).await.unwrap();

    assert!(eventually(Duration::from_secs(2), || snapshot(&received).len() == 4).await);
    assert!(snapshot(&received).iter().all(|m| m == "node1:Test123"));

    consumer.stop();
    running.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn remaining_consumers_keep_receiving_after_one_leaves() {
    common::init_logging();
    let running = spawn_broker(Arc::new(MemoryLogger::new())).await;
    let received = inbox();

    let mut node1 = running.consumer();
    node1.subscribe(recorder(&received, "node1")).await.unwrap();
    let mut node2 = running.consumer();
    node2.subscribe(recorder(&received, "node2")).await.unwrap();
    settle().await;

    let publisher = running.publisher();
    publisher.send_message(MESSAGE).await.unwrap();
    publisher.send_message(MESSAGE).await.unwrap();
    assert!(eventually(Duration::from_secs(2), || snapshot(&received).len() == 2).await);

    node1.stop();
    settle().await;
    let before = snapshot(&received).len();

    for _ in 0..3 {
        publisher.send_message(MESSAGE).await.unwrap();
    }

    assert!(
        eventually(Duration::from_secs(2), || {
            let all = snapshot(&received);
            let late_node2 = all[before..].iter().filter(|m| m.starts_with("node2:")).count();
            all.len() >= 3 && late_node2 >= 1
        })
        .await,
        "got {:?}",
        snapshot(&received)
    );

    node2.stop();
    running.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn payload_is_delivered_verbatim() {
    common::init_logging();
    let running = spawn_broker(Arc::new(MemoryLogger::new())).await;
    let received = inbox();

    let publisher = running.publisher();
    publisher.send_message(MESSAGE).await.unwrap();

    let mut consumer = running.consumer();
    consumer.subscribe(recorder(&received, "c")).await.unwrap();
    assert!(eventually(Duration::from_secs(2), || snapshot(&received) == vec!["c:Test123".to_string()]).await);

    publisher.send_message("héllo wörld  \t 123").await.unwrap();
    assert!(
        eventually(Duration::from_secs(2), || {
            snapshot(&received).last().map(String::as_str) == Some("c:héllo wörld  \t 123")
        })
        .await
    );

    consumer.stop();
    running.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn large_payload_arrives_in_one_piece() {
    common::init_logging();
    let running = spawn_broker(Arc::new(MemoryLogger::new())).await;
    let received = inbox();

    let mut consumer = running.consumer();
    consumer.subscribe(recorder(&received, "c")).await.unwrap();
    settle().await;

    let payload = "x".repeat(256 * 1024);
    running.publisher().send_message(&payload).await.unwrap();

    assert!(eventually(Duration::from_secs(5), || snapshot(&received).len() == 1).await);
    assert_eq!(snapshot(&received)[0], format!("c:{payload}"));

    consumer.stop();
    running.shutdown().await.unwrap();
}
