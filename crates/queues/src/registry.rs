//! Snapshots of the queue registry and the checks run against them.
//!
//! The compiled [`MessageBrokerQueue`] enum is the source of truth. A
//! snapshot is that enum written out as JSON so that a deployed set of
//! routing keys can be compared against the next build before rollout.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BusError;
use crate::queue::MessageBrokerQueue;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u16 = 1;

/// One queue as recorded in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub name: String,
    pub routing_key: String,
}

impl From<MessageBrokerQueue> for QueueEntry {
    fn from(queue: MessageBrokerQueue) -> Self {
        Self {
            name: queue.name().to_string(),
            routing_key: queue.routing_key().to_string(),
        }
    }
}

/// A serialized copy of the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    #[serde(default = "default_version")]
    pub version: u16,
    pub generated_at: DateTime<Utc>,
    pub queues: Vec<QueueEntry>,
}

fn default_version() -> u16 {
    SNAPSHOT_VERSION
}

impl PartialEq for RegistrySnapshot {
    /// Two snapshots are equal when they record the same mapping; the
    /// generation time is ignored.
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version && self.queues == other.queues
    }
}

impl RegistrySnapshot {
    /// Capture the compiled registry.
    pub fn current() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            generated_at: Utc::now(),
            queues: MessageBrokerQueue::ALL.into_iter().map(QueueEntry::from).collect(),
        }
    }

    /// Find the routing key recorded for a symbolic name.
    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.queues
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.routing_key.as_str())
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, BusError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and verify a snapshot.
    pub fn from_json(json: &str) -> Result<Self, BusError> {
        let snapshot: Self = serde_json::from_str(json)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(BusError::InvalidRegistry(format!(
                "unsupported snapshot version {}, expected {SNAPSHOT_VERSION}",
                snapshot.version
            )));
        }
        snapshot.verify()?;
        Ok(snapshot)
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), BusError> {
        std::fs::write(path.as_ref(), self.to_json()?)?;
        tracing::debug!(path = %path.as_ref().display(), queues = self.queues.len(), "wrote registry snapshot");
        Ok(())
    }

    pub fn read_from(path: impl AsRef<Path>) -> Result<Self, BusError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    /// Check the registry invariants.
    ///
    /// - names and routing keys are unique
    /// - routing keys are non-empty and use only `[a-z0-9.-]`
    /// - no routing key is a strict prefix of another, since SUB sockets
    ///   filter by prefix
    pub fn verify(&self) -> Result<(), BusError> {
        let mut names = HashSet::new();
        let mut keys = HashSet::new();

        for entry in &self.queues {
            if entry.name.is_empty() {
                return Err(BusError::InvalidRegistry("queue with empty name".into()));
            }
            if !names.insert(entry.name.as_str()) {
                return Err(BusError::InvalidRegistry(format!(
                    "duplicate queue name '{}'",
                    entry.name
                )));
            }
            if !is_valid_routing_key(&entry.routing_key) {
                return Err(BusError::InvalidRegistry(format!(
                    "queue '{}' has malformed routing key '{}'",
                    entry.name, entry.routing_key
                )));
            }
            if !keys.insert(entry.routing_key.as_str()) {
                return Err(BusError::InvalidRegistry(format!(
                    "routing key '{}' is used by more than one queue",
                    entry.routing_key
                )));
            }
        }

        for a in &self.queues {
            for b in &self.queues {
                if a.routing_key != b.routing_key && b.routing_key.starts_with(&a.routing_key) {
                    return Err(BusError::InvalidRegistry(format!(
                        "routing key '{}' is a prefix of '{}'",
                        a.routing_key, b.routing_key
                    )));
                }
            }
        }

        Ok(())
    }

    /// Changes needed to go from `self` (e.g. the deployed snapshot) to `next`.
    ///
    /// Entries are matched by name first. Unmatched entries that share a
    /// routing key are reported as renames.
    pub fn diff(&self, next: &RegistrySnapshot) -> Vec<TopologyChange> {
        let old_by_name: HashMap<&str, &str> = self
            .queues
            .iter()
            .map(|e| (e.name.as_str(), e.routing_key.as_str()))
            .collect();
        let new_by_name: HashMap<&str, &str> = next
            .queues
            .iter()
            .map(|e| (e.name.as_str(), e.routing_key.as_str()))
            .collect();

        let mut changes = Vec::new();
        let mut removed: Vec<&QueueEntry> = Vec::new();
        let mut added: Vec<&QueueEntry> = Vec::new();

        for entry in &self.queues {
            match new_by_name.get(entry.name.as_str()) {
                Some(&key) if key == entry.routing_key => {}
                Some(&key) => changes.push(TopologyChange::RoutingKeyChanged {
                    name: entry.name.clone(),
                    from: entry.routing_key.clone(),
                    to: key.to_string(),
                }),
                None => removed.push(entry),
            }
        }
        for entry in &next.queues {
            if !old_by_name.contains_key(entry.name.as_str()) {
                added.push(entry);
            }
        }

        for old in removed {
            if let Some(pos) = added.iter().position(|e| e.routing_key == old.routing_key) {
                let new = added.remove(pos);
                changes.push(TopologyChange::Renamed {
                    from: old.name.clone(),
                    to: new.name.clone(),
                    routing_key: old.routing_key.clone(),
                });
            } else {
                changes.push(TopologyChange::Removed {
                    name: old.name.clone(),
                    routing_key: old.routing_key.clone(),
                });
            }
        }
        for new in added {
            changes.push(TopologyChange::Added {
                name: new.name.clone(),
                routing_key: new.routing_key.clone(),
            });
        }

        changes
    }
}

/// Verify the compiled registry.
pub fn verify_registry() -> Result<(), BusError> {
    RegistrySnapshot::current().verify()
}

fn is_valid_routing_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('.')
        && !key.ends_with('.')
        && key
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'.' || b == b'-')
}

/// A difference between two registry snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum TopologyChange {
    Added {
        name: String,
        routing_key: String,
    },
    Removed {
        name: String,
        routing_key: String,
    },
    RoutingKeyChanged {
        name: String,
        from: String,
        to: String,
    },
    Renamed {
        from: String,
        to: String,
        routing_key: String,
    },
}

impl TopologyChange {
    /// Whether deployed producers or consumers stop agreeing on the wire.
    pub fn is_breaking(&self) -> bool {
        matches!(self, Self::Removed { .. } | Self::RoutingKeyChanged { .. })
    }
}

impl std::fmt::Display for TopologyChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Added { name, routing_key } => write!(f, "added {name} ({routing_key})"),
            Self::Removed { name, routing_key } => {
                write!(f, "removed {name} ({routing_key}) [breaking]")
            }
            Self::RoutingKeyChanged { name, from, to } => {
                write!(f, "changed {name}: {from} -> {to} [breaking]")
            }
            Self::Renamed {
                from,
                to,
                routing_key,
            } => write!(f, "renamed {from} -> {to} ({routing_key})"),
        }
    }
}
