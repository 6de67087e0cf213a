//! Integration tests for PUB/SUB through the broker with several
//! publishers and subscribers.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use feedbus_queues::broker::{BrokerConfig, EventBroker};
use feedbus_queues::transport::Transport;
use feedbus_queues::{Message, MessageBrokerQueue, QueuePublisher, QueueSubscriber};
use feedbus_queues::{ZmqPublisher, ZmqSubscriber};

const TIMEOUT: Duration = Duration::from_secs(5);
const SETTLE: Duration = Duration::from_millis(200);

#[tokio::test]
async fn multiple_publishers_single_subscriber() {
    let cfg = BrokerConfig::tcp("127.0.0.1", 16100, 16101, 16102);
    let handle = tokio::spawn(async move {
        let _ = EventBroker::new(cfg).run().await;
    });
    tokio::time::sleep(SETTLE).await;

    let frontend = Transport::tcp("127.0.0.1", 16100);
    let backend = Transport::tcp("127.0.0.1", 16101);

    // The fetcher and the feed handler publish independently.
    let fetcher = ZmqPublisher::connect(&frontend).await.unwrap();
    let handler = ZmqPublisher::connect(&frontend).await.unwrap();

    let sub = ZmqSubscriber::connect(&backend).await.unwrap();
    sub.subscribe(MessageBrokerQueue::UrlFetchCompleted).await.unwrap();
    sub.subscribe(MessageBrokerQueue::FeedRejectedDisableFeed)
        .await
        .unwrap();
    tokio::time::sleep(SETTLE).await;

    fetcher
        .publish(Message::new(MessageBrokerQueue::UrlFetchCompleted, &"https://a.example/rss").unwrap())
        .await
        .unwrap();
    handler
        .publish(Message::new(MessageBrokerQueue::FeedRejectedDisableFeed, &"feed-3").unwrap())
        .await
        .unwrap();

    let mut received = HashSet::new();
    for _ in 0..2 {
        let msg = timeout(TIMEOUT, sub.recv()).await.expect("timed out").unwrap();
        received.insert(msg.queue);
    }
    assert_eq!(
        received,
        HashSet::from([
            MessageBrokerQueue::UrlFetchCompleted,
            MessageBrokerQueue::FeedRejectedDisableFeed,
        ])
    );

    handle.abort();
}

#[tokio::test]
async fn every_queue_survives_the_broker() {
    let cfg = BrokerConfig::tcp("127.0.0.1", 16110, 16111, 16112);
    let handle = tokio::spawn(async move {
        let _ = EventBroker::new(cfg).run().await;
    });
    tokio::time::sleep(SETTLE).await;

    let publisher = ZmqPublisher::connect(&Transport::tcp("127.0.0.1", 16110))
        .await
        .unwrap();
    let sub = ZmqSubscriber::connect(&Transport::tcp("127.0.0.1", 16111))
        .await
        .unwrap();
    sub.subscribe_all().await.unwrap();
    tokio::time::sleep(SETTLE).await;

    for queue in MessageBrokerQueue::ALL {
        publisher
            .publish(Message::new(queue, &queue.name()).unwrap())
            .await
            .unwrap();
    }

    let mut seen = HashSet::new();
    for _ in 0..MessageBrokerQueue::ALL.len() {
        let msg = timeout(TIMEOUT, sub.recv()).await.expect("timed out").unwrap();
        assert_eq!(msg.decode::<String>().unwrap(), msg.queue.name());
        seen.insert(msg.queue);
    }
    assert_eq!(seen.len(), MessageBrokerQueue::ALL.len());

    handle.abort();
}

#[tokio::test]
async fn shared_publisher_behind_arc() {
    let cfg = BrokerConfig::tcp("127.0.0.1", 16120, 16121, 16122);
    let handle = tokio::spawn(async move {
        let _ = EventBroker::new(cfg).run().await;
    });
    tokio::time::sleep(SETTLE).await;

    let publisher: Arc<dyn QueuePublisher> = Arc::new(
        ZmqPublisher::connect(&Transport::tcp("127.0.0.1", 16120))
            .await
            .unwrap(),
    );
    let sub = ZmqSubscriber::connect(&Transport::tcp("127.0.0.1", 16121))
        .await
        .unwrap();
    sub.subscribe(MessageBrokerQueue::UrlFetchBatch).await.unwrap();
    tokio::time::sleep(SETTLE).await;

    let mut tasks = Vec::new();
    for i in 0..4u32 {
        let publisher = publisher.clone();
        tasks.push(tokio::spawn(async move {
            publisher
                .publish(Message::new(MessageBrokerQueue::UrlFetchBatch, &i).unwrap())
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let mut values = Vec::new();
    for _ in 0..4 {
        let msg = timeout(TIMEOUT, sub.recv()).await.expect("timed out").unwrap();
        values.push(msg.decode::<u32>().unwrap());
    }
    values.sort();
    assert_eq!(values, vec![0, 1, 2, 3]);

    handle.abort();
}
