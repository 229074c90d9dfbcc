//! Operational HTTP endpoint.
//!
//! Serves the Prometheus registry in text exposition format, plus a live
//! rotation report sourced from the backend pool so an operator can see at a
//! glance which backends are in rotation.

use crate::backend::BackendPool;
use crate::metrics::MetricsCollector;
use crate::util::ShutdownSignal;
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus_client::encoding::text::encode;
use std::convert::Infallible;
use std::fmt::Write;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

/// HTTP server exposing metrics and the current backend rotation.
pub struct MetricsServer {
    listener: TcpListener,
    path: String,
    collector: MetricsCollector,
    pool: Arc<BackendPool>,
}

impl MetricsServer {
    /// Bind the operational endpoint.
    pub async fn bind(
        address: SocketAddr,
        path: String,
        collector: MetricsCollector,
        pool: Arc<BackendPool>,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(address).await?;

        info!(
            address = %listener.local_addr()?,
            path = %path,
            "metrics endpoint bound"
        );

        Ok(Self {
            listener,
            path,
            collector,
            pool,
        })
    }

    /// The bound address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve requests until shutdown.
    pub async fn run(self, shutdown: ShutdownSignal) {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, _addr)) => self.serve_connection(stream),
                        Err(e) => error!(error = %e, "failed to accept metrics connection"),
                    }
                }

                _ = shutdown.wait() => {
                    info!("metrics endpoint shutting down");
                    break;
                }
            }
        }
    }

    fn serve_connection(&self, stream: TcpStream) {
        let collector = self.collector.clone();
        let pool = Arc::clone(&self.pool);
        let metrics_path = self.path.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let collector = collector.clone();
                let pool = Arc::clone(&pool);
                let metrics_path = metrics_path.clone();
                async move { Ok::<_, Infallible>(route(req, &collector, &pool, &metrics_path)) }
            });

            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                debug!(error = %e, "metrics connection error");
            }
        });
    }
}

/// Dispatch one request.
fn route(
    req: Request<hyper::body::Incoming>,
    collector: &MetricsCollector,
    pool: &BackendPool,
    metrics_path: &str,
) -> Response<Full<Bytes>> {
    if req.method() != Method::GET {
        return text_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed\n");
    }

    match req.uri().path() {
        path if path == metrics_path => encoded_registry(collector),
        "/backends" => text_response(StatusCode::OK, rotation_report(pool)),
        _ => text_response(StatusCode::NOT_FOUND, "not found\n"),
    }
}

fn encoded_registry(collector: &MetricsCollector) -> Response<Full<Bytes>> {
    let mut buffer = String::new();
    if let Err(e) = encode(&mut buffer, collector.registry()) {
        error!(error = %e, "failed to encode metrics");
        return text_response(StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed\n");
    }

    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/plain; version=0.0.4; charset=utf-8")
        .body(Full::new(Bytes::from(buffer)))
        .unwrap()
}

/// One line per configured backend: name, endpoint, rotation state.
fn rotation_report(pool: &BackendPool) -> String {
    let mut report = String::new();
    for backend in pool.snapshot().iter() {
        let state = if backend.health().is_healthy() {
            "healthy"
        } else {
            "unhealthy"
        };
        let _ = writeln!(
            report,
            "{} {}:{} {}",
            backend.name(),
            backend.address(),
            backend.port(),
            state
        );
    }
    report
}

fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("content-type", "text/plain; charset=utf-8")
        .body(Full::new(body.into()))
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backend;

    fn test_pool() -> BackendPool {
        let b1 = Arc::new(Backend::new(
            "Backend-1".to_string(),
            "127.0.0.1".to_string(),
            19301,
            1,
        ));
        let b2 = Arc::new(Backend::new(
            "Backend-2".to_string(),
            "127.0.0.1".to_string(),
            19302,
            1,
        ));
        b2.health().mark_unhealthy();
        BackendPool::new(vec![b1, b2]).unwrap()
    }

    #[test]
    fn test_rotation_report_lists_every_backend() {
        let report = rotation_report(&test_pool());

        assert!(report.contains("Backend-1 127.0.0.1:19301 healthy"));
        assert!(report.contains("Backend-2 127.0.0.1:19302 unhealthy"));
        assert_eq!(report.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_bind_on_ephemeral_port() {
        let server = MetricsServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            "/metrics".to_string(),
            MetricsCollector::new(),
            Arc::new(test_pool()),
        )
        .await
        .unwrap();

        assert_ne!(server.local_addr().unwrap().port(), 0);
    }
}
