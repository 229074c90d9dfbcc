//! Configuration file watcher for hot reload.
//!
//! Watches the configuration file and invokes a reload callback with each
//! successfully parsed and validated new configuration. A file change that
//! fails to load is logged and ignored; the previous configuration stays
//! active.

use crate::config::{Config, load_config};
use crate::util::ShutdownSignal;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Invoked with each successfully reloaded configuration.
pub type ReloadCallback = Box<dyn Fn(Config) + Send + Sync>;

/// Watches a configuration file for changes and triggers reloads.
pub struct ConfigWatcher {
    path: PathBuf,
    on_reload: ReloadCallback,
}

impl ConfigWatcher {
    /// Create a new configuration watcher.
    pub fn new(path: PathBuf, on_reload: ReloadCallback) -> Self {
        Self { path, on_reload }
    }

    /// Run the watcher until shutdown.
    pub async fn run(self, shutdown: ShutdownSignal) {
        let (tx, mut rx) = mpsc::channel::<notify::Result<Event>>(16);

        let mut watcher = match notify::recommended_watcher(move |event| {
            let _ = tx.blocking_send(event);
        }) {
            Ok(watcher) => watcher,
            Err(e) => {
                error!(error = %e, "failed to create config watcher");
                return;
            }
        };

        // Watch the parent directory: editors and orchestrators replace the
        // file, which would otherwise detach a watch on the path itself.
        let watch_target = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));

        if let Err(e) = watcher.watch(watch_target, RecursiveMode::NonRecursive) {
            error!(error = %e, path = %self.path.display(), "failed to watch config file");
            return;
        }

        info!(path = %self.path.display(), "config watcher started");

        loop {
            tokio::select! {
                event = rx.recv() => {
                    match event {
                        Some(Ok(event)) if self.is_relevant(&event) => {
                            // Writers emit bursts of events; let the file settle
                            // and drain the burst before re-reading.
                            tokio::time::sleep(Duration::from_millis(200)).await;
                            while rx.try_recv().is_ok() {}
                            self.reload();
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => warn!(error = %e, "config watch error"),
                        None => break,
                    }
                }

                _ = shutdown.wait() => {
                    info!("config watcher shutting down");
                    break;
                }
            }
        }
    }

    fn is_relevant(&self, event: &Event) -> bool {
        if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
            return false;
        }
        let Some(file_name) = self.path.file_name() else {
            return false;
        };
        event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(file_name))
    }

    fn reload(&self) {
        match load_config(&self.path) {
            Ok(config) => {
                info!(path = %self.path.display(), "configuration reloaded");
                (self.on_reload)(config);
            }
            Err(e) => {
                warn!(
                    error = %e,
                    path = %self.path.display(),
                    "config reload failed, keeping previous configuration"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(file: &mut NamedTempFile, port: u16) {
        let yaml = format!(
            "load_balancer:\n  backends:\n    - name: Backend-1\n      address: 127.0.0.1\n      port: {port}\n"
        );
        file.as_file_mut().set_len(0).unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file.flush().unwrap();
    }

    #[test]
    fn test_reload_invokes_callback_on_valid_config() {
        let mut file = NamedTempFile::new().unwrap();
        write_config(&mut file, 19301);

        let reloads = Arc::new(AtomicU32::new(0));
        let count = Arc::clone(&reloads);

        let watcher = ConfigWatcher::new(
            file.path().to_path_buf(),
            Box::new(move |config| {
                assert_eq!(config.load_balancer.backends[0].port, 19301);
                count.fetch_add(1, Ordering::SeqCst);
            }),
        );

        watcher.reload();
        assert_eq!(reloads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reload_skips_callback_on_invalid_config() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"load_balancer:\n  backends: []\n").unwrap();
        file.flush().unwrap();

        let reloads = Arc::new(AtomicU32::new(0));
        let count = Arc::clone(&reloads);

        let watcher = ConfigWatcher::new(
            file.path().to_path_buf(),
            Box::new(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            }),
        );

        watcher.reload();
        assert_eq!(reloads.load(Ordering::SeqCst), 0);
    }
}
