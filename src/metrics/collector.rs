//! Metrics collector using prometheus-client.
//!
//! Tracks forwarding sessions, transferred bytes, connect failures, and
//! backend health.

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use std::time::Duration;

/// Labels identifying a backend.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct BackendLabels {
    pub backend: String,
}

/// Labels for bytes transferred metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct BytesLabels {
    pub backend: String,
    pub direction: Direction,
}

/// Direction of a byte transfer.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum Direction {
    ToBackend,
    ToClient,
}

/// Collects and stores all metrics.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<MetricsCollectorInner>,
}

struct MetricsCollectorInner {
    /// Completed forwarding sessions per backend.
    sessions_total: Family<BackendLabels, Counter>,
    /// Session duration histogram (in seconds).
    session_duration_seconds: Family<BackendLabels, Histogram>,
    /// Currently active sessions.
    active_sessions: Gauge,
    /// Backend health (1 = healthy, 0 = unhealthy).
    backend_health: Family<BackendLabels, Gauge>,
    /// Bytes transferred per backend and direction.
    bytes_total: Family<BytesLabels, Counter>,
    /// Failed backend connection attempts.
    connect_failures_total: Family<BackendLabels, Counter>,
    /// Connections dropped because no backend was in rotation.
    no_healthy_backend_total: Counter,
    /// The prometheus registry.
    registry: Registry,
}

impl MetricsCollector {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let sessions_total = Family::<BackendLabels, Counter>::default();
        let session_duration_seconds =
            Family::<BackendLabels, Histogram>::new_with_constructor(|| {
                // Buckets from 1ms up to ~15min; long-lived streams land in +Inf.
                Histogram::new(exponential_buckets(0.001, 2.5, 15))
            });
        let active_sessions = Gauge::default();
        let backend_health = Family::<BackendLabels, Gauge>::default();
        let bytes_total = Family::<BytesLabels, Counter>::default();
        let connect_failures_total = Family::<BackendLabels, Counter>::default();
        let no_healthy_backend_total = Counter::default();

        registry.register(
            "tcplb_sessions",
            "Total number of completed forwarding sessions",
            sessions_total.clone(),
        );
        registry.register(
            "tcplb_session_duration_seconds",
            "Forwarding session duration in seconds",
            session_duration_seconds.clone(),
        );
        registry.register(
            "tcplb_active_sessions",
            "Number of sessions currently being forwarded",
            active_sessions.clone(),
        );
        registry.register(
            "tcplb_backend_health",
            "Backend health status (1=healthy, 0=unhealthy)",
            backend_health.clone(),
        );
        registry.register(
            "tcplb_bytes",
            "Total bytes transferred",
            bytes_total.clone(),
        );
        registry.register(
            "tcplb_connect_failures",
            "Total number of failed backend connection attempts",
            connect_failures_total.clone(),
        );
        registry.register(
            "tcplb_no_healthy_backend",
            "Connections dropped because no backend was in rotation",
            no_healthy_backend_total.clone(),
        );

        Self {
            inner: Arc::new(MetricsCollectorInner {
                sessions_total,
                session_duration_seconds,
                active_sessions,
                backend_health,
                bytes_total,
                connect_failures_total,
                no_healthy_backend_total,
                registry,
            }),
        }
    }

    /// The registry for text encoding.
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// A session started (accepted connection handed to a handler).
    pub fn session_opened(&self) {
        self.inner.active_sessions.inc();
    }

    /// A session ended, whatever the outcome.
    pub fn session_closed(&self) {
        self.inner.active_sessions.dec();
    }

    /// Record a completed forwarding session.
    pub fn record_session(
        &self,
        backend: &str,
        bytes_to_backend: u64,
        bytes_to_client: u64,
        duration: Duration,
    ) {
        let labels = BackendLabels {
            backend: backend.to_string(),
        };
        self.inner.sessions_total.get_or_create(&labels).inc();
        self.inner
            .session_duration_seconds
            .get_or_create(&labels)
            .observe(duration.as_secs_f64());
        self.inner
            .bytes_total
            .get_or_create(&BytesLabels {
                backend: backend.to_string(),
                direction: Direction::ToBackend,
            })
            .inc_by(bytes_to_backend);
        self.inner
            .bytes_total
            .get_or_create(&BytesLabels {
                backend: backend.to_string(),
                direction: Direction::ToClient,
            })
            .inc_by(bytes_to_client);
    }

    /// Record a failed backend connection attempt.
    pub fn record_connect_failure(&self, backend: &str) {
        self.inner
            .connect_failures_total
            .get_or_create(&BackendLabels {
                backend: backend.to_string(),
            })
            .inc();
    }

    /// Record a client dropped for lack of healthy backends.
    pub fn record_no_backend(&self) {
        self.inner.no_healthy_backend_total.inc();
    }

    /// Publish a backend's current health state.
    pub fn set_backend_health(&self, backend: &str, healthy: bool) {
        self.inner
            .backend_health
            .get_or_create(&BackendLabels {
                backend: backend.to_string(),
            })
            .set(if healthy { 1 } else { 0 });
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
