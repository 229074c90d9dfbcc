//! Round-robin backend selection.

use crate::backend::{Backend, BackendPool};
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

/// Lock-free round-robin selector over the pool's healthy backends.
///
/// A single signed 32-bit counter is incremented per selection. The counter
/// starts at -1 so the first selection lands on index 0. Wraparound is benign:
/// the sign bit is masked off before the modulo, keeping the index
/// non-negative without an unsigned atomic.
#[derive(Debug)]
pub struct RoundRobinSelector {
    counter: AtomicI32,
}

impl RoundRobinSelector {
    /// Create a selector whose first pick is index 0.
    pub fn new() -> Self {
        Self {
            counter: AtomicI32::new(-1),
        }
    }

    /// Select the next healthy backend, or `None` when the rotation is empty.
    ///
    /// Selection is approximately uniform under concurrent callers; exact
    /// ⌊N/K⌋ / ⌈N/K⌉ fairness holds for sequential callers against a stable
    /// pool. Tie-break is index order within the snapshot.
    pub fn select(&self, pool: &BackendPool) -> Option<Arc<Backend>> {
        let healthy = pool.healthy_backends();
        if healthy.is_empty() {
            return None;
        }

        let ticket = self.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        let index = (ticket & 0x7FFF_FFFF) as usize % healthy.len();
        Some(Arc::clone(&healthy[index]))
    }
}

impl Default for RoundRobinSelector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn pool_of(count: u16) -> BackendPool {
        let backends = (0..count)
            .map(|i| {
                Arc::new(Backend::new(
                    format!("b{}", i + 1),
                    "127.0.0.1".to_string(),
                    9001 + i,
                    1,
                ))
            })
            .collect();
        BackendPool::new(backends).unwrap()
    }

    #[test]
    fn test_cycles_in_order() {
        let pool = pool_of(3);
        let selector = RoundRobinSelector::new();

        let names: Vec<String> = (0..4)
            .map(|_| selector.select(&pool).unwrap().name().to_string())
            .collect();

        assert_eq!(names, ["b1", "b2", "b3", "b1"]);
    }

    #[test]
    fn test_empty_rotation_returns_none() {
        let pool = pool_of(2);
        for backend in pool.snapshot().iter() {
            backend.health().mark_unhealthy();
        }

        let selector = RoundRobinSelector::new();
        assert!(selector.select(&pool).is_none());
    }

    #[test]
    fn test_skips_unhealthy_backends() {
        let pool = pool_of(3);
        pool.snapshot()[1].health().mark_unhealthy();

        let selector = RoundRobinSelector::new();
        for _ in 0..10 {
            let selected = selector.select(&pool).unwrap();
            assert_ne!(selected.name(), "b2");
        }
    }

    #[test]
    fn test_fair_split_over_stable_pool() {
        let pool = pool_of(3);
        let selector = RoundRobinSelector::new();

        let mut counts: HashMap<String, u32> = HashMap::new();
        let selections = 100;
        for _ in 0..selections {
            let backend = selector.select(&pool).unwrap();
            *counts.entry(backend.name().to_string()).or_default() += 1;
        }

        // 100 selections over 3 backends: each gets 33 or 34.
        for (name, count) in counts {
            assert!(
                count == 33 || count == 34,
                "backend {name} selected {count} times"
            );
        }
    }

    #[test]
    fn test_counter_wraparound_is_benign() {
        let pool = pool_of(3);
        let selector = RoundRobinSelector::new();
        selector.counter.store(i32::MAX - 2, Ordering::Relaxed);

        for _ in 0..8 {
            assert!(selector.select(&pool).is_some());
        }
    }
}
