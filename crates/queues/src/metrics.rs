//! Per-queue traffic metrics for the broker and their HTTP exposure.
//!
//! `GET /metrics` returns throughput per queue plus a short time series;
//! `GET /queues` returns the registry snapshot the broker was built with.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex;

use crate::queue::MessageBrokerQueue;
use crate::registry::RegistrySnapshot;

/// 5 minutes at 1-second granularity.
const RING_BUFFER_CAPACITY: usize = 300;

const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(1);

// ── Per-queue stats ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
struct QueueStats {
    total_messages: u64,
    total_bytes: u64,
    window_messages: u64,
    window_bytes: u64,
    messages_per_sec: f64,
    bytes_per_sec: f64,
}

/// JSON-serializable queue metrics.
#[derive(Debug, Clone, Serialize)]
pub struct QueueMetrics {
    pub name: &'static str,
    pub total_messages: u64,
    pub total_bytes: u64,
    pub messages_per_sec: f64,
    pub bytes_per_sec: f64,
}

// ── Ring buffer ──────────────────────────────────────────────────────

/// A fixed-size ring buffer backed by `VecDeque`.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    buf: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push an item, evicting the oldest if at capacity.
    pub fn push(&mut self, item: T) {
        if self.capacity == 0 {
            return;
        }
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buf.iter()
    }
}

/// A point-in-time sample stored in the ring buffer.
#[derive(Debug, Clone, Serialize)]
pub struct TimeSeriesPoint {
    /// Seconds since the collector was created.
    pub elapsed_secs: f64,
    pub total_messages: u64,
    /// Messages/sec per routing key during the window that just closed.
    pub queue_rates: BTreeMap<&'static str, f64>,
}

/// Full JSON response for `GET /metrics`, keyed by routing key.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsResponse {
    pub queues: BTreeMap<&'static str, QueueMetrics>,
    pub rejected_messages: u64,
    pub time_series: Vec<TimeSeriesPoint>,
    pub total_messages: u64,
    pub uptime_secs: f64,
}

// ── MetricsCollector ─────────────────────────────────────────────────

#[derive(Debug)]
struct Inner {
    queues: HashMap<MessageBrokerQueue, QueueStats>,
    ring: RingBuffer<TimeSeriesPoint>,
    total_messages: u64,
    rejected_messages: u64,
}

/// Thread-safe metrics collector for the broker.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<Inner>>,
    start: Instant,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                queues: HashMap::new(),
                ring: RingBuffer::new(RING_BUFFER_CAPACITY),
                total_messages: 0,
                rejected_messages: 0,
            })),
            start: Instant::now(),
        }
    }

    /// Record a forwarded message.
    pub async fn record_message(&self, queue: MessageBrokerQueue, byte_size: u64) {
        let mut inner = self.inner.lock().await;
        inner.total_messages += 1;
        let stats = inner.queues.entry(queue).or_default();
        stats.total_messages += 1;
        stats.total_bytes += byte_size;
        stats.window_messages += 1;
        stats.window_bytes += byte_size;
    }

    /// Record a frame whose routing key is not in the registry.
    pub async fn record_rejected(&self) {
        self.inner.lock().await.rejected_messages += 1;
    }

    /// Close the current 1-second window and push a time-series point.
    pub async fn tick(&self) {
        let mut inner = self.inner.lock().await;
        let elapsed = self.start.elapsed().as_secs_f64();

        let mut queue_rates = BTreeMap::new();
        for (queue, stats) in &mut inner.queues {
            stats.messages_per_sec = stats.window_messages as f64;
            stats.bytes_per_sec = stats.window_bytes as f64;
            queue_rates.insert(queue.routing_key(), stats.messages_per_sec);
            stats.window_messages = 0;
            stats.window_bytes = 0;
        }

        let point = TimeSeriesPoint {
            elapsed_secs: elapsed,
            total_messages: inner.total_messages,
            queue_rates,
        };
        inner.ring.push(point);
    }

    pub async fn snapshot(&self) -> MetricsResponse {
        let inner = self.inner.lock().await;

        let queues = inner
            .queues
            .iter()
            .map(|(queue, stats)| {
                (
                    queue.routing_key(),
                    QueueMetrics {
                        name: queue.name(),
                        total_messages: stats.total_messages,
                        total_bytes: stats.total_bytes,
                        messages_per_sec: stats.messages_per_sec,
                        bytes_per_sec: stats.bytes_per_sec,
                    },
                )
            })
            .collect();

        MetricsResponse {
            queues,
            rejected_messages: inner.rejected_messages,
            time_series: inner.ring.iter().cloned().collect(),
            total_messages: inner.total_messages,
            uptime_secs: self.start.elapsed().as_secs_f64(),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

// ── HTTP server ──────────────────────────────────────────────────────

/// Build the metrics router. Split out so it can be served on any listener.
pub fn router(collector: MetricsCollector) -> axum::Router {
    axum::Router::new()
        .route("/metrics", axum::routing::get(metrics_handler))
        .route("/queues", axum::routing::get(queues_handler))
        .with_state(collector)
}

/// Spawn the metrics HTTP server on the given port.
pub fn spawn_metrics_server(
    port: u16,
    collector: MetricsCollector,
    shutdown: tokio::sync::watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(collector);

        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(port, error = %e, "failed to bind metrics HTTP server");
                return;
            }
        };

        tracing::info!(port, "metrics HTTP server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut rx = shutdown;
                while !*rx.borrow() {
                    if rx.changed().await.is_err() {
                        break;
                    }
                }
            })
            .await
            .ok();

        tracing::info!("metrics HTTP server stopped");
    })
}

/// Spawn the background task that closes rate windows every second.
pub fn spawn_tick_task(
    collector: MetricsCollector,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SNAPSHOT_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    collector.tick().await;
                }
                changed = shutdown.changed() => {
                    // A dropped sender means the broker is gone.
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

async fn metrics_handler(
    axum::extract::State(collector): axum::extract::State<MetricsCollector>,
) -> axum::Json<MetricsResponse> {
    axum::Json(collector.snapshot().await)
}

async fn queues_handler() -> axum::Json<RegistrySnapshot> {
    axum::Json(RegistrySnapshot::current())
}
