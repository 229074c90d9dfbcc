//! Backend pool with atomically published snapshots.

use crate::backend::Backend;
use crate::config::BackendOptions;
use arc_swap::ArcSwap;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Errors from pool construction and updates.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("backend list must not be empty")]
    EmptyBackends,
}

/// Owns the current list of backends.
///
/// The list is a read-mostly snapshot: readers perform a single atomic load
/// and may iterate without observing concurrent modification; updates publish
/// a whole new vector. The healthy projection is computed on demand because
/// healthiness changes asynchronously to pool updates.
#[derive(Debug)]
pub struct BackendPool {
    snapshot: ArcSwap<Vec<Arc<Backend>>>,
}

impl BackendPool {
    /// Create a pool from an initial backend list.
    pub fn new(backends: Vec<Arc<Backend>>) -> Result<Self, PoolError> {
        if backends.is_empty() {
            return Err(PoolError::EmptyBackends);
        }
        Ok(Self {
            snapshot: ArcSwap::from_pointee(backends),
        })
    }

    /// Create a pool from configuration entries.
    pub fn from_options(options: &[BackendOptions]) -> Result<Self, PoolError> {
        Self::new(
            options
                .iter()
                .map(|o| Arc::new(Backend::from_options(o)))
                .collect(),
        )
    }

    /// The full current snapshot, healthy or not.
    pub fn snapshot(&self) -> Arc<Vec<Arc<Backend>>> {
        self.snapshot.load_full()
    }

    /// Backends currently in rotation.
    ///
    /// The result is stable for the caller; a later call may differ.
    pub fn healthy_backends(&self) -> Vec<Arc<Backend>> {
        self.snapshot
            .load()
            .iter()
            .filter(|b| b.health().is_healthy())
            .cloned()
            .collect()
    }

    /// Number of configured backends.
    pub fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    /// True when no backends are configured. Cannot happen after construction.
    pub fn is_empty(&self) -> bool {
        self.snapshot.load().is_empty()
    }

    /// Names of all configured backends.
    pub fn backend_names(&self) -> HashSet<String> {
        self.snapshot
            .load()
            .iter()
            .map(|b| b.name().to_string())
            .collect()
    }

    /// Atomically replace the backend list.
    ///
    /// Entries matching an existing backend's identity keep that backend's
    /// handle, so health state survives the update; new entries start
    /// healthy. An empty replacement is rejected.
    pub fn update_backends(&self, backends: Vec<Arc<Backend>>) -> Result<(), PoolError> {
        if backends.is_empty() {
            return Err(PoolError::EmptyBackends);
        }

        let current = self.snapshot.load();
        let merged: Vec<Arc<Backend>> = backends
            .into_iter()
            .map(|incoming| {
                current
                    .iter()
                    .find(|existing| existing.same_identity(&incoming))
                    .cloned()
                    .unwrap_or(incoming)
            })
            .collect();

        info!(backends = merged.len(), "backend pool updated");
        self.snapshot.store(Arc::new(merged));
        Ok(())
    }

    /// Replace the backend list from configuration entries.
    pub fn update_from_options(&self, options: &[BackendOptions]) -> Result<(), PoolError> {
        self.update_backends(
            options
                .iter()
                .map(|o| Arc::new(Backend::from_options(o)))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(name: &str, port: u16) -> Arc<Backend> {
        Arc::new(Backend::new(
            name.to_string(),
            "127.0.0.1".to_string(),
            port,
            1,
        ))
    }

    #[test]
    fn test_empty_pool_rejected() {
        assert!(matches!(
            BackendPool::new(Vec::new()),
            Err(PoolError::EmptyBackends)
        ));
    }

    #[test]
    fn test_healthy_backends_filters_flag() {
        let b1 = backend("b1", 9001);
        let b2 = backend("b2", 9002);
        let b3 = backend("b3", 9003);
        let pool = BackendPool::new(vec![b1, Arc::clone(&b2), b3]).unwrap();

        assert_eq!(pool.healthy_backends().len(), 3);

        b2.health().mark_unhealthy();
        let healthy = pool.healthy_backends();
        assert_eq!(healthy.len(), 2);
        assert!(healthy.iter().all(|b| b.health().is_healthy()));
        assert!(healthy.iter().all(|b| b.name() != "b2"));
    }

    #[test]
    fn test_update_rejects_empty() {
        let pool = BackendPool::new(vec![backend("b1", 9001)]).unwrap();
        assert!(matches!(
            pool.update_backends(Vec::new()),
            Err(PoolError::EmptyBackends)
        ));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_update_replaces_snapshot() {
        let pool = BackendPool::new(vec![backend("b1", 9001)]).unwrap();

        pool.update_backends(vec![backend("b2", 9002), backend("b3", 9003)])
            .unwrap();

        assert_eq!(pool.len(), 2);
        assert!(pool.backend_names().contains("b2"));
        assert!(!pool.backend_names().contains("b1"));
    }

    #[test]
    fn test_update_preserves_health_for_surviving_backends() {
        let b1 = backend("b1", 9001);
        let pool = BackendPool::new(vec![Arc::clone(&b1)]).unwrap();

        b1.health().mark_unhealthy();

        // Same identity arrives in the update; health must carry over.
        pool.update_backends(vec![backend("b1", 9001), backend("b2", 9002)])
            .unwrap();

        let snapshot = pool.snapshot();
        let survivor = snapshot.iter().find(|b| b.name() == "b1").unwrap();
        assert!(!survivor.health().is_healthy());
        assert!(Arc::ptr_eq(survivor, &b1));

        let fresh = snapshot.iter().find(|b| b.name() == "b2").unwrap();
        assert!(fresh.health().is_healthy());
    }

    #[test]
    fn test_snapshot_is_stable_across_updates() {
        let pool = BackendPool::new(vec![backend("b1", 9001)]).unwrap();
        let before = pool.snapshot();

        pool.update_backends(vec![backend("b2", 9002)]).unwrap();

        // The caller's snapshot is unaffected by the published update.
        assert_eq!(before.len(), 1);
        assert_eq!(before[0].name(), "b1");
        assert_eq!(pool.snapshot()[0].name(), "b2");
    }
}
