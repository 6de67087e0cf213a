use std::collections::HashSet;

use super::loading::parse_endpoint;
use super::types::FeedbusConfig;
use crate::error::BusError;
use crate::queue::MessageBrokerQueue;

impl FeedbusConfig {
    /// Validate endpoints and every routing key the services reference.
    pub fn validate(&self) -> Result<(), BusError> {
        self.validate_endpoints()?;
        self.validate_service_queues()?;
        for queue in self.unproduced_queues() {
            tracing::warn!(
                queue = %queue,
                consumers = ?self.consumers_of(queue),
                "queue is consumed but no configured service publishes to it"
            );
        }
        Ok(())
    }

    /// Queues some service consumes that no configured service publishes.
    pub fn unproduced_queues(&self) -> Vec<MessageBrokerQueue> {
        MessageBrokerQueue::ALL
            .into_iter()
            .filter(|&q| !self.consumers_of(q).is_empty() && self.producers_of(q).is_empty())
            .collect()
    }

    fn validate_endpoints(&self) -> Result<(), BusError> {
        let endpoints = [
            ("broker.frontend", &self.broker.frontend),
            ("broker.backend", &self.broker.backend),
            ("broker.health", &self.broker.health),
        ];
        let mut seen = Vec::with_capacity(endpoints.len());
        for (field, endpoint) in endpoints {
            let transport = parse_endpoint(field, endpoint)?;
            if seen.contains(&transport) {
                return Err(BusError::Config(format!(
                    "{field}: endpoint '{endpoint}' is already used by another broker socket"
                )));
            }
            seen.push(transport);
        }
        Ok(())
    }

    fn validate_service_queues(&self) -> Result<(), BusError> {
        for (name, service) in &self.services {
            for (direction, keys) in [("publishes", &service.publishes), ("consumes", &service.consumes)] {
                let mut seen = HashSet::new();
                for key in keys {
                    if key.parse::<MessageBrokerQueue>().is_err() {
                        return Err(BusError::Config(format!(
                            "service '{name}' {direction} unknown routing key '{key}'"
                        )));
                    }
                    if !seen.insert(key.as_str()) {
                        return Err(BusError::Config(format!(
                            "service '{name}' lists '{key}' twice under {direction}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
