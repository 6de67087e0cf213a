use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use zeromq::prelude::*;
use zeromq::{PubSocket, RepSocket, SubSocket, ZmqMessage};

use crate::error::BusError;
use crate::metrics::MetricsCollector;
use crate::queue::MessageBrokerQueue;
use crate::transport::Transport;

/// How often the proxy loop wakes to check for shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Socket layout and policy for the broker.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Publishers connect here (broker binds SUB).
    pub frontend: Transport,
    /// Subscribers connect here (broker binds PUB).
    pub backend: Transport,
    /// REP socket answering liveness probes with "ok".
    pub health: Transport,
    /// Optional HTTP port for `/metrics` and `/queues`.
    pub metrics_port: Option<u16>,
    /// Drop frames whose routing key is not in the registry.
    pub reject_unregistered: bool,
}

impl BrokerConfig {
    /// Local IPC broker.
    pub fn local() -> Self {
        Self {
            frontend: Transport::ipc("broker-frontend"),
            backend: Transport::ipc("broker-backend"),
            health: Transport::ipc("broker-health"),
            metrics_port: None,
            reject_unregistered: true,
        }
    }

    /// TCP broker bound on `host`.
    pub fn tcp(host: &str, frontend_port: u16, backend_port: u16, health_port: u16) -> Self {
        Self {
            frontend: Transport::tcp(host, frontend_port),
            backend: Transport::tcp(host, backend_port),
            health: Transport::tcp(host, health_port),
            metrics_port: None,
            reject_unregistered: true,
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self::local()
    }
}

/// What the broker decided to do with one incoming frame set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Routing {
    Forward(MessageBrokerQueue),
    ForwardUnregistered,
    Reject,
}

/// Classify a frame set by its first frame.
pub(crate) fn route(msg: &ZmqMessage, reject_unregistered: bool) -> Routing {
    let queue = msg
        .iter()
        .next()
        .and_then(|frame| std::str::from_utf8(frame.as_ref()).ok())
        .and_then(MessageBrokerQueue::from_routing_key);
    match queue {
        Some(queue) => Routing::Forward(queue),
        None if reject_unregistered => Routing::Reject,
        None => Routing::ForwardUnregistered,
    }
}

/// PUB/SUB proxy between feed-pipeline producers and consumers.
///
/// - Publishers connect to the **frontend** (SUB, subscribed to everything).
/// - Subscribers connect to the **backend** (PUB).
/// - Frames are forwarded unchanged; the first frame must be a registered
///   routing key unless `reject_unregistered` is off.
///
/// `zeromq` 0.4 has no XPUB/XSUB sockets, so the proxy is emulated with
/// plain PUB+SUB.
pub struct EventBroker {
    config: BrokerConfig,
    collector: MetricsCollector,
    forwarded: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
}

impl EventBroker {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            collector: MetricsCollector::new(),
            forwarded: Arc::new(AtomicU64::new(0)),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn collector(&self) -> &MetricsCollector {
        &self.collector
    }

    /// Total frames forwarded to the backend so far.
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    /// Ask the proxy loop to stop.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Whether shutdown was requested or the proxy loop has ended.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Bind all sockets and run the proxy loop until shutdown.
    pub async fn run(&self) -> Result<(), BusError> {
        for transport in [
            &self.config.frontend,
            &self.config.backend,
            &self.config.health,
        ] {
            transport.ensure_ipc_dir()?;
            transport.remove_stale_socket()?;
        }

        let mut frontend = SubSocket::new();
        frontend.bind(&self.config.frontend.endpoint()).await?;
        frontend.subscribe("").await?;
        tracing::info!(
            endpoint = %self.config.frontend,
            "broker frontend (SUB) bound, publishers connect here"
        );

        let mut backend = PubSocket::new();
        backend.bind(&self.config.backend.endpoint()).await?;
        tracing::info!(
            endpoint = %self.config.backend,
            "broker backend (PUB) bound, subscribers connect here"
        );

        let mut health = RepSocket::new();
        health.bind(&self.config.health.endpoint()).await?;
        tracing::info!(endpoint = %self.config.health, "broker health check (REP) bound");

        // Background tasks are released however this future ends: normal
        // return, error, or being dropped/aborted mid-loop.
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        let _guard = ShutdownGuard {
            flag: self.shutdown.clone(),
            tx: shutdown_tx,
        };

        let shutdown_flag = self.shutdown.clone();
        tokio::spawn(async move {
            health_loop(&mut health, &shutdown_flag).await;
        });

        let _tick_handle =
            crate::metrics::spawn_tick_task(self.collector.clone(), shutdown_rx.clone());
        let _http_handle = self.config.metrics_port.map(|port| {
            crate::metrics::spawn_metrics_server(port, self.collector.clone(), shutdown_rx)
        });

        tracing::info!(
            queues = MessageBrokerQueue::ALL.len(),
            reject_unregistered = self.config.reject_unregistered,
            "broker proxy loop started"
        );

        while !self.shutdown.load(Ordering::SeqCst) {
            let msg = match tokio::time::timeout(POLL_INTERVAL, frontend.recv()).await {
                Ok(Ok(msg)) => msg,
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "frontend recv error");
                    continue;
                }
                Err(_) => continue,
            };

            let byte_size: u64 = msg.iter().map(|f| f.len() as u64).sum();

            match route(&msg, self.config.reject_unregistered) {
                Routing::Forward(queue) => {
                    self.collector.record_message(queue, byte_size).await;
                    tracing::debug!(queue = %queue, bytes = byte_size, "forwarding message");
                }
                Routing::ForwardUnregistered => {
                    self.collector.record_rejected().await;
                    tracing::warn!(bytes = byte_size, "forwarding frame with unregistered routing key");
                }
                Routing::Reject => {
                    self.collector.record_rejected().await;
                    tracing::warn!(bytes = byte_size, "dropping frame with unregistered routing key");
                    continue;
                }
            }

            if let Err(e) = backend.send(msg).await {
                tracing::warn!(error = %e, "backend send error");
                continue;
            }
            self.forwarded.fetch_add(1, Ordering::Relaxed);
        }

        tracing::info!(forwarded = self.forwarded(), "broker stopped");
        Ok(())
    }
}

/// Stops the health, tick and HTTP tasks when the proxy loop goes away.
struct ShutdownGuard {
    flag: Arc<AtomicBool>,
    tx: tokio::sync::watch::Sender<bool>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.flag.store(true, Ordering::SeqCst);
        let _ = self.tx.send(true);
    }
}

/// Reply "ok" to every health request until shutdown.
async fn health_loop(health: &mut RepSocket, shutdown: &AtomicBool) {
    while !shutdown.load(Ordering::SeqCst) {
        match tokio::time::timeout(Duration::from_millis(500), health.recv()).await {
            Ok(Ok(_request)) => {
                let reply: ZmqMessage = "ok".into();
                if let Err(e) = health.send(reply).await {
                    tracing::warn!(error = %e, "health reply error");
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "health recv error");
            }
            Err(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_endpoints() {
        let cfg = BrokerConfig::local();
        assert!(cfg.frontend.endpoint().contains("broker-frontend"));
        assert!(cfg.backend.endpoint().contains("broker-backend"));
        assert!(cfg.health.endpoint().contains("broker-health"));
        assert!(cfg.reject_unregistered);
    }

    #[test]
    fn tcp_endpoints() {
        let cfg = BrokerConfig::tcp("0.0.0.0", 5555, 5556, 5557);
        assert_eq!(cfg.frontend.endpoint(), "tcp://0.0.0.0:5555");
        assert_eq!(cfg.backend.endpoint(), "tcp://0.0.0.0:5556");
        assert_eq!(cfg.health.endpoint(), "tcp://0.0.0.0:5557");
    }

    #[test]
    fn routes_registered_key() {
        let msg: ZmqMessage = "feed.deleted".into();
        assert_eq!(route(&msg, true), Routing::Forward(MessageBrokerQueue::FeedDeleted));
    }

    #[test]
    fn rejects_unregistered_key() {
        let msg: ZmqMessage = "feed.created".into();
        assert_eq!(route(&msg, true), Routing::Reject);
        assert_eq!(route(&msg, false), Routing::ForwardUnregistered);
    }

    #[test]
    fn rejects_non_utf8_key() {
        let msg = ZmqMessage::from(vec![0xffu8, 0xfe]);
        assert_eq!(route(&msg, true), Routing::Reject);
    }
}
