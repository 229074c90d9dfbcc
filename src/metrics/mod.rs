//! Prometheus metrics collection and exposition.

mod collector;
mod server;

pub use collector::{BackendLabels, BytesLabels, Direction, MetricsCollector};
pub use server::MetricsServer;
