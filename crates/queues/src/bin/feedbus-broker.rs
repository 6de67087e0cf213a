//! feedbus-broker: central PUB/SUB hub for the feed pipeline's queues.
//!
//! Proxies frames from publishers (SUB frontend) to subscribers (PUB backend),
//! drops frames whose routing key is not registered, counts traffic per queue
//! and answers liveness probes on a REP socket.
//!
//! # Usage
//!
//! ```bash
//! # Local IPC (default)
//! feedbus-broker
//!
//! # From a deployment file
//! feedbus-broker --config config/feedbus.toml
//!
//! # TCP with custom ports
//! feedbus-broker --transport tcp --host 0.0.0.0 --frontend-port 5555 --backend-port 5556 --health-port 5557
//! ```

use std::sync::Arc;

use clap::Parser;
use feedbus_queues::{verify_registry, BrokerConfig, EventBroker, FeedbusConfig, Transport};

/// Central PUB/SUB broker for the feed pipeline's queues.
#[derive(Parser, Debug)]
#[command(name = "feedbus-broker", version, about)]
struct Cli {
    /// Deployment file. When given, the socket flags below are ignored.
    #[arg(long, env = "FEEDBUS_CONFIG")]
    config: Option<String>,

    /// Transport type: "ipc" or "tcp".
    #[arg(long, env = "FEEDBUS_TRANSPORT", default_value = "ipc")]
    transport: String,

    /// TCP host to bind to (tcp only).
    #[arg(long, env = "FEEDBUS_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port publishers connect to (tcp only).
    #[arg(long, env = "FEEDBUS_FRONTEND_PORT", default_value_t = 5555)]
    frontend_port: u16,

    /// Port subscribers connect to (tcp only).
    #[arg(long, env = "FEEDBUS_BACKEND_PORT", default_value_t = 5556)]
    backend_port: u16,

    /// Health check port (tcp only).
    #[arg(long, env = "FEEDBUS_HEALTH_PORT", default_value_t = 5557)]
    health_port: u16,

    /// IPC socket name prefix (ipc only).
    #[arg(long, env = "FEEDBUS_IPC_PREFIX", default_value = "broker")]
    ipc_prefix: String,

    /// HTTP port for `/metrics` and `/queues` (0 = disabled).
    #[arg(long, env = "FEEDBUS_METRICS_PORT", default_value_t = 0)]
    metrics_port: u16,

    /// Seconds between metrics log lines (0 = disabled).
    #[arg(long, env = "FEEDBUS_METRICS_INTERVAL", default_value_t = 30)]
    metrics_interval: u64,

    /// Forward frames with unregistered routing keys instead of dropping them.
    #[arg(long, env = "FEEDBUS_ALLOW_UNREGISTERED")]
    allow_unregistered: bool,
}

impl Cli {
    fn broker_config(&self) -> anyhow::Result<BrokerConfig> {
        if let Some(path) = &self.config {
            let mut cfg = FeedbusConfig::from_file(path)?.broker_config()?;
            if self.allow_unregistered {
                cfg.reject_unregistered = false;
            }
            return Ok(cfg);
        }

        let metrics_port = (self.metrics_port > 0).then_some(self.metrics_port);
        let mut cfg = match self.transport.as_str() {
            "tcp" => BrokerConfig::tcp(
                &self.host,
                self.frontend_port,
                self.backend_port,
                self.health_port,
            ),
            "ipc" => BrokerConfig {
                frontend: Transport::ipc(&format!("{}-frontend", self.ipc_prefix)),
                backend: Transport::ipc(&format!("{}-backend", self.ipc_prefix)),
                health: Transport::ipc(&format!("{}-health", self.ipc_prefix)),
                ..BrokerConfig::local()
            },
            other => anyhow::bail!("invalid transport '{other}', expected 'ipc' or 'tcp'"),
        };
        cfg.metrics_port = metrics_port;
        cfg.reject_unregistered = !self.allow_unregistered;
        Ok(cfg)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    tracing::info!(?cli, "starting feedbus-broker");

    verify_registry()?;

    let metrics_interval = cli.metrics_interval;
    let broker = Arc::new(EventBroker::new(cli.broker_config()?));

    let broker_for_signal = broker.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("shutdown signal received");
        broker_for_signal.shutdown();
    });

    if metrics_interval > 0 {
        let collector = broker.collector().clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
            loop {
                interval.tick().await;
                let snap = collector.snapshot().await;
                tracing::info!(
                    total_messages = snap.total_messages,
                    rejected_messages = snap.rejected_messages,
                    active_queues = snap.queues.len(),
                    "broker metrics"
                );
                for (routing_key, queue) in &snap.queues {
                    tracing::debug!(
                        queue = %routing_key,
                        total = queue.total_messages,
                        rate = queue.messages_per_sec,
                        "queue stats"
                    );
                }
            }
        });
    }

    broker.run().await?;

    tracing::info!("feedbus-broker exited cleanly");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to register SIGTERM handler");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = ctrl_c.await {
            tracing::warn!(error = %e, "failed to listen for ctrl_c");
        }
    }
}
