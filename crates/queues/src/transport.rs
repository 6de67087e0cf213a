use std::path::Path;

use serde::{Deserialize, Serialize};

/// Directory holding IPC socket files.
const IPC_DIR: &str = "/tmp/feedbus";

/// Transport layer for ZeroMQ connections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "address")]
pub enum Transport {
    /// Unix domain socket, for services on the same host.
    Ipc(String),

    /// TCP, for services spread across hosts.
    Tcp { host: String, port: u16 },
}

impl Transport {
    /// IPC transport; `name` becomes `/tmp/feedbus/<name>.sock`.
    pub fn ipc(name: &str) -> Self {
        Self::Ipc(name.to_string())
    }

    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Parse an endpoint string such as `ipc:///tmp/feedbus/broker.sock`
    /// or `tcp://host:port`.
    ///
    /// IPC sockets must be `<name>.sock` directly inside `/tmp/feedbus`.
    pub fn parse(endpoint: &str) -> Option<Self> {
        if let Some(path) = endpoint.strip_prefix("ipc://") {
            let path = Path::new(path);
            if path.parent() != Some(Path::new(IPC_DIR))
                || path.extension().and_then(|e| e.to_str()) != Some("sock")
            {
                return None;
            }
            let name = path.file_stem()?.to_str()?;
            Some(Self::ipc(name))
        } else if let Some(addr) = endpoint.strip_prefix("tcp://") {
            let (host, port) = addr.rsplit_once(':')?;
            if host.is_empty() {
                return None;
            }
            Some(Self::tcp(host, port.parse().ok()?))
        } else {
            None
        }
    }

    /// The ZeroMQ endpoint address string.
    pub fn endpoint(&self) -> String {
        match self {
            Self::Ipc(name) => format!("ipc://{IPC_DIR}/{name}.sock"),
            Self::Tcp { host, port } => format!("tcp://{host}:{port}"),
        }
    }

    /// Create the socket directory for IPC transports. No-op for TCP.
    pub fn ensure_ipc_dir(&self) -> std::io::Result<()> {
        if let Self::Ipc(_) = self {
            std::fs::create_dir_all(IPC_DIR)?;
        }
        Ok(())
    }

    /// Remove an IPC socket file left behind by a previous run.
    ///
    /// A leftover `.sock` file makes the next bind fail with `EADDRINUSE`.
    pub fn remove_stale_socket(&self) -> std::io::Result<()> {
        if let Self::Ipc(name) = self {
            let path = format!("{IPC_DIR}/{name}.sock");
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    tracing::debug!(path = %path, "removed stale IPC socket");
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.endpoint())
    }
}
