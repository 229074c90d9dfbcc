//! TCP accept loop and per-connection session handling.

use crate::backend::{Backend, BackendPool, RoundRobinSelector};
use crate::config::LoadBalancerOptions;
use crate::health::PassiveHealthMonitor;
use crate::metrics::MetricsCollector;
use crate::proxy::forward;
use crate::util::{SessionId, ShutdownSignal};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, broadcast};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Backend dial error.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("failed to connect to backend {0}: {1}")]
    Refused(String, #[source] io::Error),

    #[error("connection to backend {0} timed out")]
    TimedOut(String),
}

/// Accepts client connections and forwards each to a selected backend.
pub struct ProxyListener {
    listener: TcpListener,
    pool: Arc<BackendPool>,
    selector: Arc<RoundRobinSelector>,
    monitor: Arc<PassiveHealthMonitor>,
    metrics: MetricsCollector,
    connect_timeout: Duration,
    limiter: Option<Arc<Semaphore>>,
}

impl ProxyListener {
    /// Bind the listening socket.
    ///
    /// `SO_REUSEADDR` is set so a restart does not trip over sockets still in
    /// TIME_WAIT.
    pub async fn bind(
        options: &LoadBalancerOptions,
        pool: Arc<BackendPool>,
        monitor: Arc<PassiveHealthMonitor>,
        metrics: MetricsCollector,
    ) -> io::Result<Self> {
        let endpoint = options.listen_endpoint();

        let socket = Socket::new(Domain::for_address(endpoint), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&endpoint.into())?;
        socket.listen(1024)?;
        let listener = TcpListener::from_std(socket.into())?;

        let limiter = match options.connection.max_concurrent_connections {
            0 => None,
            cap => Some(Arc::new(Semaphore::new(cap as usize))),
        };

        info!(
            listen = %listener.local_addr()?,
            backends = pool.len(),
            "proxy listener bound"
        );

        Ok(Self {
            listener,
            pool,
            selector: Arc::new(RoundRobinSelector::new()),
            monitor,
            metrics,
            connect_timeout: options.connection.connect_timeout(),
            limiter,
        })
    }

    /// The bound listening address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the accept loop until shutdown.
    ///
    /// Accept errors are logged and the loop continues; only the shutdown
    /// signal stops it. Each accepted connection is handled on its own task.
    pub async fn run(self, shutdown: ShutdownSignal) {
        let mut shutdown_rx = shutdown.subscribe();
        info!("proxy listener starting");

        loop {
            // With a connection cap, hold a permit before accepting so the
            // accept stays suspended while at capacity.
            let permit = match &self.limiter {
                Some(semaphore) => {
                    tokio::select! {
                        permit = Arc::clone(semaphore).acquire_owned() => {
                            match permit {
                                Ok(permit) => Some(permit),
                                Err(_) => break,
                            }
                        }
                        _ = shutdown_rx.recv() => break,
                    }
                }
                None => None,
            };

            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, client_addr)) => {
                            self.handle_connection(stream, client_addr, permit, &shutdown);
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                        }
                    }
                }

                _ = shutdown_rx.recv() => break,
            }
        }

        info!("proxy listener shutting down");
    }

    /// Spawn an independent handler for an accepted connection.
    fn handle_connection(
        &self,
        stream: TcpStream,
        client_addr: SocketAddr,
        permit: Option<OwnedSemaphorePermit>,
        shutdown: &ShutdownSignal,
    ) {
        if let Err(e) = stream.set_nodelay(true) {
            warn!(error = %e, "failed to set TCP_NODELAY on client connection");
        }

        let pool = Arc::clone(&self.pool);
        let selector = Arc::clone(&self.selector);
        let monitor = Arc::clone(&self.monitor);
        let metrics = self.metrics.clone();
        let connect_timeout = self.connect_timeout;
        let shutdown_rx = shutdown.subscribe();
        let session_id = SessionId::next();

        metrics.session_opened();

        tokio::spawn(async move {
            let _permit = permit;
            handle_session(
                stream,
                client_addr,
                pool,
                selector,
                monitor,
                metrics.clone(),
                connect_timeout,
                shutdown_rx,
                session_id,
            )
            .await;
            metrics.session_closed();
        });
    }
}

/// Handle one client connection end to end.
///
/// Selects a backend, dials it under the connect timeout, forwards bytes
/// bidirectionally, and reports the outcome to the passive health monitor.
/// Only outcomes attributable to the backend connection are recorded: a
/// missing rotation records nothing, and a cancelled session records
/// nothing. All errors are handled here; none escape to the accept loop.
#[allow(clippy::too_many_arguments)]
async fn handle_session(
    client_stream: TcpStream,
    client_addr: SocketAddr,
    pool: Arc<BackendPool>,
    selector: Arc<RoundRobinSelector>,
    monitor: Arc<PassiveHealthMonitor>,
    metrics: MetricsCollector,
    connect_timeout: Duration,
    shutdown: broadcast::Receiver<()>,
    session_id: SessionId,
) {
    let Some(backend) = selector.select(&pool) else {
        warn!(
            session = %session_id,
            client = %client_addr,
            "no healthy backends available, dropping connection"
        );
        metrics.record_no_backend();
        return;
    };

    debug!(
        session = %session_id,
        client = %client_addr,
        backend = %backend,
        "backend selected"
    );

    let backend_stream = match connect_to_backend(&backend, connect_timeout).await {
        Ok(stream) => stream,
        Err(e) => {
            error!(
                session = %session_id,
                backend = %backend,
                error = %e,
                "backend connect failed"
            );
            monitor.record_failure(&backend);
            metrics.record_connect_failure(backend.name());
            metrics.set_backend_health(backend.name(), backend.health().is_healthy());
            return;
        }
    };

    let started = Instant::now();
    match forward(client_stream, backend_stream, shutdown).await {
        Ok(summary) => {
            monitor.record_success(&backend);
            metrics.record_session(
                backend.name(),
                summary.bytes_to_backend,
                summary.bytes_to_client,
                started.elapsed(),
            );
            debug!(
                session = %session_id,
                client = %client_addr,
                backend = %backend,
                bytes_to_backend = summary.bytes_to_backend,
                bytes_to_client = summary.bytes_to_client,
                duration_ms = started.elapsed().as_millis() as u64,
                "session completed"
            );
        }
        Err(e) => {
            error!(
                session = %session_id,
                backend = %backend,
                error = %e,
                "forwarding failed"
            );
            monitor.record_failure(&backend);
        }
    }
    metrics.set_backend_health(backend.name(), backend.health().is_healthy());
}

/// Connect to a backend with a dial deadline.
pub async fn connect_to_backend(
    backend: &Backend,
    connect_timeout: Duration,
) -> Result<TcpStream, ConnectError> {
    debug!(backend = %backend, "connecting to backend");

    match timeout(connect_timeout, TcpStream::connect(backend.endpoint())).await {
        Ok(Ok(stream)) => {
            if let Err(e) = stream.set_nodelay(true) {
                warn!(error = %e, "failed to set TCP_NODELAY on backend connection");
            }
            Ok(stream)
        }
        Ok(Err(e)) => Err(ConnectError::Refused(backend.to_string(), e)),
        Err(_) => Err(ConnectError::TimedOut(backend.to_string())),
    }
}
