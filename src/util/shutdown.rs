//! Graceful shutdown coordination.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;

/// Fans one shutdown request out to the accept loop, the config watcher, the
/// metrics endpoint, and every in-flight forwarding session.
///
/// The request is latched: a task that starts waiting after the signal has
/// already fired still observes it instead of parking forever.
#[derive(Clone)]
pub struct ShutdownSignal {
    sender: broadcast::Sender<()>,
    triggered: Arc<AtomicBool>,
}

impl ShutdownSignal {
    /// Create an untriggered signal.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(16);
        Self {
            sender,
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A receiver for select loops that multiplex shutdown with other events
    /// over the whole loop lifetime.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    /// Has shutdown been requested?
    pub fn is_shutdown(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    /// Request shutdown. Idempotent.
    pub fn shutdown(&self) {
        self.triggered.store(true, Ordering::Release);
        let _ = self.sender.send(());
    }

    /// Completes once shutdown has been requested, however late the caller
    /// arrives.
    pub async fn wait(&self) {
        // Subscribe before checking the latch so a request landing between
        // the two is seen either way.
        let mut receiver = self.sender.subscribe();
        if self.is_shutdown() {
            return;
        }
        let _ = receiver.recv().await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
