use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ── Top-level config ────────────────────────────────────────────────

/// Deployment configuration for the feed pipeline's queue layer.
///
/// Parsed from `feedbus.toml`, then overridden from `FEEDBUS_*` environment
/// variables. Names the broker endpoints and, per service, which queues it
/// publishes to and consumes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbusConfig {
    #[serde(default)]
    pub broker: BrokerSection,

    /// Services keyed by name (e.g. `feed-requests`, `user-feeds`).
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,
}

// ── Section configs ─────────────────────────────────────────────────

/// Broker endpoints and policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerSection {
    /// Publishers connect here.
    #[serde(default = "default_broker_frontend")]
    pub frontend: String,

    /// Subscribers connect here.
    #[serde(default = "default_broker_backend")]
    pub backend: String,

    /// Liveness probe endpoint.
    #[serde(default = "default_broker_health")]
    pub health: String,

    /// HTTP port for `/metrics` and `/queues`.
    pub metrics_port: Option<u16>,

    /// Drop frames whose routing key is not registered.
    #[serde(default = "default_reject_unregistered")]
    pub reject_unregistered: bool,
}

fn default_broker_frontend() -> String {
    "ipc:///tmp/feedbus/broker-frontend.sock".into()
}

fn default_broker_backend() -> String {
    "ipc:///tmp/feedbus/broker-backend.sock".into()
}

fn default_broker_health() -> String {
    "ipc:///tmp/feedbus/broker-health.sock".into()
}

fn default_reject_unregistered() -> bool {
    true
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            frontend: default_broker_frontend(),
            backend: default_broker_backend(),
            health: default_broker_health(),
            metrics_port: None,
            reject_unregistered: default_reject_unregistered(),
        }
    }
}

/// A producer and/or consumer service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Routing keys this service publishes to.
    #[serde(default)]
    pub publishes: Vec<String>,

    /// Routing keys this service subscribes to.
    #[serde(default)]
    pub consumes: Vec<String>,
}
