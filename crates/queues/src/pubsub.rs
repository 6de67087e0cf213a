use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use zeromq::prelude::*;
use zeromq::{PubSocket, SubSocket, ZmqMessage};

use crate::error::BusError;
use crate::message::Message;
use crate::queue::MessageBrokerQueue;
use crate::traits::{QueuePublisher, QueueSubscriber};
use crate::transport::Transport;

/// ZeroMQ PUB socket publisher.
///
/// Messages are sent as two frames:
/// 1. the routing key (used by SUB sockets for filtering)
/// 2. the MessagePack-encoded [`Message`] envelope
pub struct ZmqPublisher {
    socket: Mutex<PubSocket>,
}

impl ZmqPublisher {
    /// Connect to the broker's frontend endpoint.
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn connect(transport: &Transport) -> Result<Self, BusError> {
        let mut socket = PubSocket::new();
        let endpoint = transport.endpoint();
        info!(endpoint = %endpoint, "connecting PUB socket to broker frontend");
        socket.connect(&endpoint).await?;
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }

    /// Bind to the given endpoint for brokerless PUB/SUB.
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn bind(transport: &Transport) -> Result<Self, BusError> {
        transport.ensure_ipc_dir()?;
        let mut socket = PubSocket::new();
        let endpoint = transport.endpoint();
        info!(endpoint = %endpoint, "binding PUB socket");
        socket.bind(&endpoint).await?;
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }
}

#[async_trait]
impl QueuePublisher for ZmqPublisher {
    async fn publish(&self, message: Message) -> Result<(), BusError> {
        let routing_key = message.routing_key();
        let envelope_bytes = message.to_bytes()?;

        let mut zmq_msg = ZmqMessage::from(routing_key);
        zmq_msg.push_back(envelope_bytes.into());

        let mut socket = self.socket.lock().await;
        socket.send(zmq_msg).await?;

        debug!(queue = %routing_key, correlation_id = %message.correlation_id, "published message");
        Ok(())
    }
}

/// ZeroMQ SUB socket subscriber.
///
/// SUB sockets filter by prefix; `recv` additionally drops any envelope
/// whose queue was not subscribed, so delivery is by exact queue.
///
/// `recv` holds the socket lock until a message arrives, so a concurrent
/// `subscribe` waits for the next delivery. Subscribe up front.
pub struct ZmqSubscriber {
    socket: Mutex<SubSocket>,
    subscribed: Mutex<HashSet<MessageBrokerQueue>>,
}

impl ZmqSubscriber {
    /// Connect to the broker's backend endpoint, or directly to a bound
    /// publisher.
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn connect(transport: &Transport) -> Result<Self, BusError> {
        let mut socket = SubSocket::new();
        let endpoint = transport.endpoint();
        info!(endpoint = %endpoint, "connecting SUB socket");
        socket.connect(&endpoint).await?;
        Ok(Self {
            socket: Mutex::new(socket),
            subscribed: Mutex::new(HashSet::new()),
        })
    }

    /// Queues this subscriber currently receives.
    pub async fn subscriptions(&self) -> Vec<MessageBrokerQueue> {
        let mut queues: Vec<_> = self.subscribed.lock().await.iter().copied().collect();
        queues.sort();
        queues
    }
}

#[async_trait]
impl QueueSubscriber for ZmqSubscriber {
    async fn subscribe(&self, queue: MessageBrokerQueue) -> Result<(), BusError> {
        let mut socket = self.socket.lock().await;
        let mut subscribed = self.subscribed.lock().await;
        if subscribed.contains(&queue) {
            return Ok(());
        }
        socket.subscribe(queue.routing_key()).await?;
        subscribed.insert(queue);
        info!(queue = %queue, "subscribed to queue");
        Ok(())
    }

    async fn recv(&self) -> Result<Message, BusError> {
        let mut socket = self.socket.lock().await;
        loop {
            let zmq_msg = socket.recv().await?;
            let message = decode_frames(&zmq_msg)?;

            if self.subscribed.lock().await.contains(&message.queue) {
                debug!(queue = %message.queue, "received message");
                return Ok(message);
            }
            debug!(queue = %message.queue, "dropping message for unsubscribed queue");
        }
    }
}

/// Decode a `[routing_key, envelope]` frame pair.
///
/// A single frame is treated as the bare envelope.
pub(crate) fn decode_frames(zmq_msg: &ZmqMessage) -> Result<Message, BusError> {
    let frames: Vec<&[u8]> = zmq_msg.iter().map(|frame| frame.as_ref()).collect();
    match frames.as_slice() {
        [] => Err(BusError::Transport("empty ZMQ message".into())),
        [envelope] => Ok(Message::from_bytes(envelope)?),
        [key, envelope, ..] => {
            let message = Message::from_bytes(envelope)?;
            let key: &[u8] = key;
            if key != message.routing_key().as_bytes() {
                warn!(
                    frame = %String::from_utf8_lossy(key),
                    queue = %message.queue,
                    "routing key frame does not match envelope queue"
                );
            }
            Ok(message)
        }
    }
}
