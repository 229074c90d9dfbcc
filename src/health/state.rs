//! Per-backend health primitives.
//!
//! `BackendHealth` is the atomically readable healthy flag consulted by the
//! selector; `ErrorWindow` holds the consecutive-outcome counters the passive
//! monitor uses to decide transitions.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Healthy/unhealthy flag for a single backend.
///
/// Backends start healthy. Reads never block; a transition is a single
/// atomic store, so observers see either the old or the new state.
#[derive(Debug)]
pub struct BackendHealth {
    healthy: AtomicBool,
}

impl BackendHealth {
    /// Create a new flag in the healthy state.
    pub fn new() -> Self {
        Self {
            healthy: AtomicBool::new(true),
        }
    }

    /// Is this backend currently in rotation?
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// Put the backend back into rotation. Idempotent.
    pub fn mark_healthy(&self) {
        self.healthy.store(true, Ordering::Release);
    }

    /// Take the backend out of rotation. Idempotent.
    pub fn mark_unhealthy(&self) {
        self.healthy.store(false, Ordering::Release);
    }
}

impl Default for BackendHealth {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
struct WindowCounters {
    failures: u32,
    successes: u32,
}

/// Consecutive failure/success counters for one backend.
///
/// Recording an event of one kind resets the opposite counter, so at most one
/// of the two is non-zero after any recorded event. Each record is a single
/// critical section; readers never observe a half-updated pair.
#[derive(Debug, Default)]
pub struct ErrorWindow {
    counters: Mutex<WindowCounters>,
}

impl ErrorWindow {
    /// Create an empty window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failed connection outcome.
    ///
    /// Returns the updated consecutive failure count.
    pub fn record_error(&self) -> u32 {
        let mut counters = self.counters.lock();
        counters.successes = 0;
        counters.failures = counters.failures.saturating_add(1);
        counters.failures
    }

    /// Record a successful connection outcome.
    ///
    /// Returns the updated consecutive success count.
    pub fn record_success(&self) -> u32 {
        let mut counters = self.counters.lock();
        counters.failures = 0;
        counters.successes = counters.successes.saturating_add(1);
        counters.successes
    }

    /// Current consecutive failure count.
    pub fn consecutive_failures(&self) -> u32 {
        self.counters.lock().failures
    }

    /// Current consecutive success count.
    pub fn consecutive_successes(&self) -> u32 {
        self.counters.lock().successes
    }

    /// Both counters, read under one lock.
    pub fn counters(&self) -> (u32, u32) {
        let counters = self.counters.lock();
        (counters.failures, counters.successes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_backend_starts_healthy() {
        let health = BackendHealth::new();
        assert!(health.is_healthy());
    }

    #[test]
    fn test_mark_transitions() {
        let health = BackendHealth::new();

        health.mark_unhealthy();
        assert!(!health.is_healthy());

        health.mark_healthy();
        assert!(health.is_healthy());
    }

    #[test]
    fn test_marks_are_idempotent() {
        let health = BackendHealth::new();

        health.mark_healthy();
        health.mark_healthy();
        assert!(health.is_healthy());

        health.mark_unhealthy();
        health.mark_unhealthy();
        assert!(!health.is_healthy());
    }

    #[test]
    fn test_record_error_resets_successes() {
        let window = ErrorWindow::new();

        window.record_success();
        window.record_success();
        assert_eq!(window.consecutive_successes(), 2);

        assert_eq!(window.record_error(), 1);
        assert_eq!(window.consecutive_failures(), 1);
        assert_eq!(window.consecutive_successes(), 0);
    }

    #[test]
    fn test_record_success_resets_failures() {
        let window = ErrorWindow::new();

        window.record_error();
        window.record_error();
        window.record_error();
        assert_eq!(window.consecutive_failures(), 3);

        assert_eq!(window.record_success(), 1);
        assert_eq!(window.consecutive_failures(), 0);
        assert_eq!(window.consecutive_successes(), 1);
    }

    #[test]
    fn test_at_most_one_counter_nonzero() {
        let window = ErrorWindow::new();

        for i in 0..50 {
            if i % 3 == 0 {
                window.record_success();
            } else {
                window.record_error();
            }
            let (failures, successes) = window.counters();
            assert!(
                failures == 0 || successes == 0,
                "both counters non-zero: {failures} failures, {successes} successes"
            );
        }
    }

    #[test]
    fn test_concurrent_recording_stays_consistent() {
        let window = Arc::new(ErrorWindow::new());

        let recorders: Vec<_> = (0..4)
            .map(|i| {
                let window = Arc::clone(&window);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        if i % 2 == 0 {
                            window.record_error();
                        } else {
                            window.record_success();
                        }
                        let (failures, successes) = window.counters();
                        assert!(failures == 0 || successes == 0);
                    }
                })
            })
            .collect();

        for recorder in recorders {
            recorder.join().unwrap();
        }
    }
}
