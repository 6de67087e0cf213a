use thiserror::Error;

/// Errors that can occur in the feedbus queue layer.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),

    #[error("deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),

    #[error("snapshot json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("zeromq error: {0}")]
    Zmq(#[from] zeromq::ZmqError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown routing key '{0}'")]
    UnknownRoutingKey(String),

    #[error("unknown queue name '{0}'")]
    UnknownQueueName(String),

    #[error("invalid registry: {0}")]
    InvalidRegistry(String),
}
