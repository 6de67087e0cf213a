//! TOML deployment configuration: broker endpoints and per-service queue usage.

mod loading;
mod types;
mod validation;

#[cfg(test)]
mod tests;

pub use types::{BrokerSection, FeedbusConfig, ServiceConfig};
