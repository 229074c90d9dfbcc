//! Passive health monitoring.
//!
//! Observes per-connection outcomes reported by the proxy layer and drives
//! each backend's health flag through consecutive-counter thresholds. No
//! probing happens here; real traffic is the only signal.

use crate::backend::Backend;
use crate::config::PassiveMonitoringOptions;
use crate::health::ErrorWindow;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Records connection outcomes and flips backend health at thresholds.
///
/// Windows are created lazily on the first outcome observed for a backend and
/// keyed by backend name, so counters survive across selections. The flag flip
/// does not zero the counters; the first opposite-kind outcome resets them.
#[derive(Debug)]
pub struct PassiveHealthMonitor {
    windows: DashMap<String, Arc<ErrorWindow>>,
    failure_threshold: u32,
    success_threshold: u32,
}

impl PassiveHealthMonitor {
    /// Create a monitor with explicit thresholds.
    pub fn new(failure_threshold: u32, success_threshold: u32) -> Self {
        Self {
            windows: DashMap::new(),
            failure_threshold,
            success_threshold,
        }
    }

    /// Create a monitor from configuration.
    pub fn from_options(options: &PassiveMonitoringOptions) -> Self {
        Self::new(options.failure_threshold, options.success_threshold)
    }

    fn window(&self, backend: &Backend) -> Arc<ErrorWindow> {
        self.windows
            .entry(backend.name().to_string())
            .or_default()
            .clone()
    }

    /// Record a failed connection attempt or forwarding fault.
    ///
    /// Marks the backend unhealthy once consecutive failures reach the
    /// threshold while it is still in rotation.
    pub fn record_failure(&self, backend: &Backend) {
        let failures = self.window(backend).record_error();

        if failures >= self.failure_threshold && backend.health().is_healthy() {
            backend.health().mark_unhealthy();
            warn!(
                backend = %backend,
                failures,
                "backend marked unhealthy, removing from rotation"
            );
        } else {
            debug!(
                backend = %backend,
                failures,
                threshold = self.failure_threshold,
                "connection failure recorded"
            );
        }
    }

    /// Record a successfully completed forwarding session.
    ///
    /// Marks the backend healthy once consecutive successes reach the
    /// threshold while it is out of rotation.
    pub fn record_success(&self, backend: &Backend) {
        let successes = self.window(backend).record_success();

        if successes >= self.success_threshold && !backend.health().is_healthy() {
            backend.health().mark_healthy();
            info!(
                backend = %backend,
                successes,
                "backend marked healthy, returning to rotation"
            );
        } else {
            debug!(
                backend = %backend,
                successes,
                threshold = self.success_threshold,
                "connection success recorded"
            );
        }
    }

    /// Current consecutive failure count for a backend (0 if never observed).
    pub fn consecutive_failures(&self, backend: &Backend) -> u32 {
        self.windows
            .get(backend.name())
            .map(|w| w.consecutive_failures())
            .unwrap_or(0)
    }

    /// Current consecutive success count for a backend (0 if never observed).
    pub fn consecutive_successes(&self, backend: &Backend) -> u32 {
        self.windows
            .get(backend.name())
            .map(|w| w.consecutive_successes())
            .unwrap_or(0)
    }

    /// Discard windows for backends that are no longer configured.
    ///
    /// Called after a pool update so removed backends do not leak counters.
    pub fn retain(&self, names: &HashSet<String>) {
        self.windows.retain(|name, _| names.contains(name));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_backend(name: &str) -> Backend {
        Backend::new(name.to_string(), "127.0.0.1".to_string(), 9001, 1)
    }

    #[test]
    fn test_failures_reach_threshold() {
        let monitor = PassiveHealthMonitor::new(3, 2);
        let backend = test_backend("b1");

        monitor.record_failure(&backend);
        assert!(backend.health().is_healthy());

        monitor.record_failure(&backend);
        assert!(backend.health().is_healthy());

        monitor.record_failure(&backend);
        assert!(!backend.health().is_healthy());
    }

    #[test]
    fn test_recovery_after_successes() {
        let monitor = PassiveHealthMonitor::new(3, 2);
        let backend = test_backend("b1");

        monitor.record_failure(&backend);
        monitor.record_failure(&backend);
        monitor.record_failure(&backend);
        assert!(!backend.health().is_healthy());

        monitor.record_success(&backend);
        assert!(!backend.health().is_healthy());

        monitor.record_success(&backend);
        assert!(backend.health().is_healthy());
    }

    #[test]
    fn test_success_resets_failure_count() {
        let monitor = PassiveHealthMonitor::new(3, 2);
        let backend = test_backend("b1");

        monitor.record_failure(&backend);
        monitor.record_failure(&backend);
        monitor.record_success(&backend);

        // Counter was reset, so two more failures are not enough.
        monitor.record_failure(&backend);
        monitor.record_failure(&backend);
        assert!(backend.health().is_healthy());

        monitor.record_failure(&backend);
        assert!(!backend.health().is_healthy());
    }

    #[test]
    fn test_reset_law() {
        let monitor = PassiveHealthMonitor::new(3, 2);
        let backend = test_backend("b1");

        monitor.record_failure(&backend);
        monitor.record_success(&backend);

        assert_eq!(monitor.consecutive_failures(&backend), 0);
        assert_eq!(monitor.consecutive_successes(&backend), 1);
    }

    #[test]
    fn test_counters_survive_transition() {
        let monitor = PassiveHealthMonitor::new(2, 1);
        let backend = test_backend("b1");

        monitor.record_failure(&backend);
        monitor.record_failure(&backend);
        assert!(!backend.health().is_healthy());

        // The flip does not zero the counter; further failures keep counting.
        monitor.record_failure(&backend);
        assert_eq!(monitor.consecutive_failures(&backend), 3);
        assert!(!backend.health().is_healthy());

        monitor.record_success(&backend);
        assert!(backend.health().is_healthy());
        assert_eq!(monitor.consecutive_failures(&backend), 0);
    }

    #[test]
    fn test_unobserved_backend_has_zero_counters() {
        let monitor = PassiveHealthMonitor::new(3, 2);
        let backend = test_backend("never-seen");

        assert_eq!(monitor.consecutive_failures(&backend), 0);
        assert_eq!(monitor.consecutive_successes(&backend), 0);
    }

    #[test]
    fn test_retain_discards_removed_backends() {
        let monitor = PassiveHealthMonitor::new(3, 2);
        let kept = test_backend("kept");
        let removed = test_backend("removed");

        monitor.record_failure(&kept);
        monitor.record_failure(&removed);

        let names: HashSet<String> = ["kept".to_string()].into_iter().collect();
        monitor.retain(&names);

        assert_eq!(monitor.consecutive_failures(&kept), 1);
        assert_eq!(monitor.consecutive_failures(&removed), 0);
    }
}
