use std::collections::BTreeMap;
use std::path::Path;

use crate::broker::BrokerConfig;
use crate::error::BusError;
use crate::queue::MessageBrokerQueue;
use crate::transport::Transport;

use super::types::{BrokerSection, FeedbusConfig};

impl FeedbusConfig {
    /// Parse and validate config from a TOML string.
    ///
    /// Environment overrides are not applied; see [`from_file`](Self::from_file).
    pub fn from_toml(toml_str: &str) -> Result<Self, BusError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path, then apply `FEEDBUS_BROKER_*` overrides
    /// before validating.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, BusError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let mut config: Self = toml::from_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Single-host deployment over IPC sockets, no services declared.
    pub fn local() -> Self {
        Self {
            broker: BrokerSection::default(),
            services: BTreeMap::new(),
        }
    }

    /// Distributed deployment with the broker on `host`, using four
    /// consecutive ports starting at `base_port` (frontend, backend, health,
    /// metrics).
    pub fn distributed(host: &str, base_port: u16) -> Result<Self, BusError> {
        let port = |offset: u16| {
            base_port.checked_add(offset).ok_or_else(|| {
                BusError::Config(format!(
                    "base port {base_port} leaves no room for the broker's four ports"
                ))
            })
        };
        Ok(Self {
            broker: BrokerSection {
                frontend: format!("tcp://{host}:{base_port}"),
                backend: format!("tcp://{host}:{}", port(1)?),
                health: format!("tcp://{host}:{}", port(2)?),
                metrics_port: Some(port(3)?),
                reject_unregistered: true,
            },
            services: BTreeMap::new(),
        })
    }

    /// Socket layout for [`EventBroker`](crate::broker::EventBroker).
    pub fn broker_config(&self) -> Result<BrokerConfig, BusError> {
        Ok(BrokerConfig {
            frontend: parse_endpoint("broker.frontend", &self.broker.frontend)?,
            backend: parse_endpoint("broker.backend", &self.broker.backend)?,
            health: parse_endpoint("broker.health", &self.broker.health)?,
            metrics_port: self.broker.metrics_port,
            reject_unregistered: self.broker.reject_unregistered,
        })
    }

    pub fn broker_frontend_transport(&self) -> Result<Transport, BusError> {
        parse_endpoint("broker.frontend", &self.broker.frontend)
    }

    pub fn broker_backend_transport(&self) -> Result<Transport, BusError> {
        parse_endpoint("broker.backend", &self.broker.backend)
    }

    /// Queues a named service publishes to. `None` if the service is unknown.
    pub fn published_by(&self, service: &str) -> Option<Result<Vec<MessageBrokerQueue>, BusError>> {
        self.services
            .get(service)
            .map(|svc| resolve_all(&svc.publishes))
    }

    /// Queues a named service consumes. `None` if the service is unknown.
    pub fn consumed_by(&self, service: &str) -> Option<Result<Vec<MessageBrokerQueue>, BusError>> {
        self.services
            .get(service)
            .map(|svc| resolve_all(&svc.consumes))
    }

    /// Services declared as publishing to `queue`, in name order.
    pub fn producers_of(&self, queue: MessageBrokerQueue) -> Vec<&str> {
        self.services
            .iter()
            .filter(|(_, svc)| svc.publishes.iter().any(|k| k == queue.routing_key()))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Services declared as consuming `queue`, in name order.
    pub fn consumers_of(&self, queue: MessageBrokerQueue) -> Vec<&str> {
        self.services
            .iter()
            .filter(|(_, svc)| svc.consumes.iter().any(|k| k == queue.routing_key()))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    // ── Environment variable overrides ──────────────────────────────

    /// Apply environment variable overrides.
    ///
    /// - `FEEDBUS_BROKER_FRONTEND` -> `broker.frontend`
    /// - `FEEDBUS_BROKER_BACKEND` -> `broker.backend`
    /// - `FEEDBUS_BROKER_HEALTH` -> `broker.health`
    /// - `FEEDBUS_BROKER_METRICS_PORT` -> `broker.metrics_port`
    /// - `FEEDBUS_BROKER_REJECT_UNREGISTERED` -> `broker.reject_unregistered`
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source.
    pub(crate) fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("FEEDBUS_BROKER_FRONTEND") {
            self.broker.frontend = v;
        }
        if let Some(v) = var("FEEDBUS_BROKER_BACKEND") {
            self.broker.backend = v;
        }
        if let Some(v) = var("FEEDBUS_BROKER_HEALTH") {
            self.broker.health = v;
        }
        if let Some(v) = var("FEEDBUS_BROKER_METRICS_PORT") {
            match v.parse::<u16>() {
                Ok(port) => self.broker.metrics_port = Some(port),
                Err(_) => tracing::warn!(value = %v, "ignoring invalid FEEDBUS_BROKER_METRICS_PORT"),
            }
        }
        if let Some(v) = var("FEEDBUS_BROKER_REJECT_UNREGISTERED") {
            match v.parse::<bool>() {
                Ok(flag) => self.broker.reject_unregistered = flag,
                Err(_) => tracing::warn!(
                    value = %v,
                    "ignoring invalid FEEDBUS_BROKER_REJECT_UNREGISTERED"
                ),
            }
        }
    }
}

impl Default for FeedbusConfig {
    fn default() -> Self {
        Self::local()
    }
}

pub(super) fn parse_endpoint(field: &str, endpoint: &str) -> Result<Transport, BusError> {
    Transport::parse(endpoint).ok_or_else(|| {
        BusError::Config(format!(
            "{field}: invalid endpoint '{endpoint}', expected ipc:///tmp/feedbus/<name>.sock or tcp://<host>:<port>"
        ))
    })
}

pub(super) fn resolve_all(keys: &[String]) -> Result<Vec<MessageBrokerQueue>, BusError> {
    keys.iter().map(|k| k.parse()).collect()
}
