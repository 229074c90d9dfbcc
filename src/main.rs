//! tcplb - a Layer 4 TCP reverse proxy and load balancer
//!
//! Usage:
//!     tcplb --config <path>
//!
//! See --help for more options.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use tcplb::backend::BackendPool;
use tcplb::config::{Config, ConfigWatcher, load_config};
use tcplb::health::PassiveHealthMonitor;
use tcplb::metrics::{MetricsCollector, MetricsServer};
use tcplb::proxy::ProxyListener;
use tcplb::util::{ShutdownSignal, init_logging};

/// A Layer 4 TCP reverse proxy and load balancer.
#[derive(Parser, Debug)]
#[command(name = "tcplb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,

    /// Disable config file watching
    #[arg(long)]
    no_watch: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config).with_context(|| {
        format!(
            "failed to load configuration from '{}'",
            cli.config.display()
        )
    })?;

    // CLI overrides config
    let log_level = cli
        .log_level
        .as_deref()
        .unwrap_or(&config.global.log_level);

    init_logging(log_level, &config.global.log_format);

    if cli.validate {
        info!("Configuration is valid");
        println!("Configuration is valid.");
        println!("  Listen: {}", config.load_balancer.listen_endpoint());
        println!("  Backends: {}", config.load_balancer.backends.len());
        for backend in &config.load_balancer.backends {
            println!(
                "    - {} -> {}:{} (weight {})",
                backend.name, backend.address, backend.port, backend.weight
            );
        }
        return Ok(());
    }

    info!(
        config_path = %cli.config.display(),
        listen = %config.load_balancer.listen_endpoint(),
        backends = config.load_balancer.backends.len(),
        "tcplb starting"
    );

    for backend in &config.load_balancer.backends {
        info!(
            name = %backend.name,
            address = %backend.address,
            port = backend.port,
            weight = backend.weight,
            "configured backend"
        );
    }

    run(config, cli.config, cli.no_watch)
}

/// Run the load balancer with the given configuration.
fn run(config: Config, config_path: PathBuf, no_watch: bool) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(async { run_async(config, config_path, no_watch).await })
}

/// Async entry point for the load balancer.
async fn run_async(config: Config, config_path: PathBuf, no_watch: bool) -> Result<()> {
    let shutdown = ShutdownSignal::new();

    let pool = Arc::new(
        BackendPool::from_options(&config.load_balancer.backends)
            .context("failed to build backend pool")?,
    );
    let monitor = Arc::new(PassiveHealthMonitor::from_options(
        &config.load_balancer.health.passive_monitoring,
    ));
    let metrics = MetricsCollector::new();

    for backend in pool.snapshot().iter() {
        metrics.set_backend_health(backend.name(), true);
    }

    let mut handles = Vec::new();

    // Start the metrics endpoint. A bind failure is logged but does not
    // prevent the proxy from serving traffic.
    if config.global.metrics.enabled {
        match MetricsServer::bind(
            config.global.metrics.address,
            config.global.metrics.path.clone(),
            metrics.clone(),
            Arc::clone(&pool),
        )
        .await
        {
            Ok(server) => {
                let server_shutdown = shutdown.clone();
                handles.push(tokio::spawn(async move {
                    server.run(server_shutdown).await;
                }));
            }
            Err(e) => {
                error!(
                    error = %e,
                    address = %config.global.metrics.address,
                    "failed to bind metrics endpoint"
                );
            }
        }
    }

    // Start config watcher (unless disabled). Only the backend list is
    // hot-swappable; listener endpoint and thresholds apply on restart.
    if !no_watch {
        let watcher_pool = Arc::clone(&pool);
        let watcher_monitor = Arc::clone(&monitor);
        let watcher = ConfigWatcher::new(
            config_path,
            Box::new(move |new_config| {
                let backends = &new_config.load_balancer.backends;
                match watcher_pool.update_from_options(backends) {
                    Ok(()) => {
                        watcher_monitor.retain(&watcher_pool.backend_names());
                        info!(backends = backends.len(), "backend pool reloaded");
                    }
                    Err(e) => {
                        warn!(error = %e, "rejected backend pool update");
                    }
                }
            }),
        );
        let watcher_shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            watcher.run(watcher_shutdown).await;
        }));
    }

    // Start the proxy listener
    let listener = ProxyListener::bind(
        &config.load_balancer,
        Arc::clone(&pool),
        Arc::clone(&monitor),
        metrics.clone(),
    )
    .await
    .with_context(|| {
        format!(
            "failed to bind listener on {}",
            config.load_balancer.listen_endpoint()
        )
    })?;

    let listener_shutdown = shutdown.clone();
    handles.push(tokio::spawn(async move {
        listener.run(listener_shutdown).await;
    }));

    info!("tcplb is running");
    info!("press Ctrl+C to stop");

    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("received shutdown signal");
        }
        Err(e) => {
            error!(error = %e, "failed to listen for shutdown signal");
        }
    }

    info!("initiating graceful shutdown");
    shutdown.shutdown();

    // Wait for all tasks to finish with timeout
    let shutdown_timeout = Duration::from_secs(30);
    let shutdown_deadline = tokio::time::sleep(shutdown_timeout);
    tokio::pin!(shutdown_deadline);

    for (i, handle) in handles.into_iter().enumerate() {
        tokio::select! {
            result = handle => {
                if let Err(e) = result {
                    warn!(task = i, error = %e, "task panicked during shutdown");
                }
            }
            _ = &mut shutdown_deadline => {
                warn!("shutdown timeout reached, forcing exit");
                break;
            }
        }
    }

    info!("tcplb shut down complete");
    Ok(())
}
