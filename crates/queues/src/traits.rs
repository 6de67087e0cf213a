use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BusError;
use crate::message::Message;
use crate::queue::MessageBrokerQueue;

/// Publishes messages to the broker.
///
/// The queue a message goes to is carried by the message itself, so a
/// publisher can only ever target a registered queue.
#[async_trait]
pub trait QueuePublisher: Send + Sync {
    async fn publish(&self, message: Message) -> Result<(), BusError>;
}

/// Blanket implementation so `Arc<dyn QueuePublisher>` can be used directly.
#[async_trait]
impl<T: QueuePublisher + ?Sized> QueuePublisher for Arc<T> {
    async fn publish(&self, message: Message) -> Result<(), BusError> {
        (**self).publish(message).await
    }
}

/// Receives messages for the queues it has subscribed to.
#[async_trait]
pub trait QueueSubscriber: Send + Sync {
    /// Start receiving messages published to `queue`.
    async fn subscribe(&self, queue: MessageBrokerQueue) -> Result<(), BusError>;

    /// Subscribe to every registered queue.
    async fn subscribe_all(&self) -> Result<(), BusError> {
        for queue in MessageBrokerQueue::ALL {
            self.subscribe(queue).await?;
        }
        Ok(())
    }

    /// Receive the next message. Waits until one is available.
    ///
    /// Implementations may hold the underlying socket while waiting, so
    /// subscribe to everything you need before the first `recv`.
    async fn recv(&self) -> Result<Message, BusError>;
}

#[async_trait]
impl<T: QueueSubscriber + ?Sized> QueueSubscriber for Arc<T> {
    async fn subscribe(&self, queue: MessageBrokerQueue) -> Result<(), BusError> {
        (**self).subscribe(queue).await
    }

    async fn recv(&self) -> Result<Message, BusError> {
        (**self).recv().await
    }
}
