//! Queue topology for the feed pipeline.
//!
//! [`MessageBrokerQueue`] is the single source of truth for every routing key
//! that producers publish to and consumers subscribe from. The rest of the
//! crate carries that contract onto the wire: a MessagePack [`Message`]
//! envelope, ZeroMQ publisher/subscriber, a proxy [`EventBroker`] that only
//! forwards registered routing keys, and snapshot tooling that flags breaking
//! changes to the wire strings before deployment.

pub mod broker;
pub mod config;
pub mod error;
pub mod message;
pub mod metrics;
pub mod pubsub;
pub mod queue;
pub mod registry;
pub mod traits;
pub mod transport;

pub use broker::{BrokerConfig, EventBroker};
pub use config::{BrokerSection, FeedbusConfig, ServiceConfig};
pub use error::BusError;
pub use message::Message;
pub use metrics::MetricsCollector;
pub use pubsub::{ZmqPublisher, ZmqSubscriber};
pub use queue::{MessageBrokerQueue, QueueDomain};
pub use registry::{verify_registry, QueueEntry, RegistrySnapshot, TopologyChange};
pub use traits::{QueuePublisher, QueueSubscriber};
pub use transport::Transport;
