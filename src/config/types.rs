//! Configuration data types.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Global settings
    #[serde(default)]
    pub global: GlobalConfig,

    /// Load balancer settings (listener, backends, health, connections)
    pub load_balancer: LoadBalancerOptions,
}

/// Global configuration settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GlobalConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,

    /// Metrics endpoint configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::Json,
            metrics: MetricsConfig::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Metrics endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// Whether the metrics endpoint is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Address to bind the metrics server
    #[serde(default = "default_metrics_address")]
    pub address: SocketAddr,

    /// Path for the metrics endpoint
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: default_metrics_address(),
            path: default_metrics_path(),
        }
    }
}

/// Listener, backend pool, health, and connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoadBalancerOptions {
    /// Address to bind the proxy listener
    #[serde(default = "default_listen_address")]
    pub listen_address: IpAddr,

    /// Port to bind the proxy listener
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Upstream backends; an empty list is a fatal startup error
    #[serde(default)]
    pub backends: Vec<BackendOptions>,

    /// Health monitoring settings
    #[serde(default)]
    pub health: HealthOptions,

    /// Connection handling settings
    #[serde(default)]
    pub connection: ConnectionOptions,
}

impl LoadBalancerOptions {
    /// The socket address the proxy listener binds.
    pub fn listen_endpoint(&self) -> SocketAddr {
        SocketAddr::new(self.listen_address, self.listen_port)
    }
}

impl Default for LoadBalancerOptions {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            listen_port: default_listen_port(),
            backends: Vec::new(),
            health: HealthOptions::default(),
            connection: ConnectionOptions::default(),
        }
    }
}

/// Configuration for a single upstream backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendOptions {
    /// Display name
    pub name: String,

    /// Host or IP literal
    pub address: String,

    /// TCP port
    pub port: u16,

    /// Weight, reserved for weighted selection policies (default: 1)
    #[serde(default = "default_weight")]
    pub weight: u32,
}

/// Health monitoring settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HealthOptions {
    /// Passive (traffic-driven) monitoring settings
    #[serde(default)]
    pub passive_monitoring: PassiveMonitoringOptions,
}

/// Passive health monitoring settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PassiveMonitoringOptions {
    /// Whether passive monitoring is enabled (reserved)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Consecutive failures before a backend leaves rotation
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Consecutive successes before a backend rejoins rotation
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,

    /// Observation window in seconds (reserved; counters are not time-bound)
    #[serde(default = "default_time_window_seconds")]
    pub time_window_seconds: u64,
}

impl Default for PassiveMonitoringOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            time_window_seconds: default_time_window_seconds(),
        }
    }
}

/// Connection handling settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionOptions {
    /// Backend dial deadline in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Idle timeout in milliseconds, 0 disables (reserved; not enforced)
    #[serde(default)]
    pub idle_timeout_ms: u64,

    /// Cap on concurrently handled connections, 0 means unlimited
    #[serde(default)]
    pub max_concurrent_connections: u32,
}

impl ConnectionOptions {
    /// Backend dial deadline as a duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            idle_timeout_ms: 0,
            max_concurrent_connections: 0,
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Json
}

fn default_true() -> bool {
    true
}

fn default_metrics_address() -> SocketAddr {
    "127.0.0.1:9090".parse().unwrap()
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_listen_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_listen_port() -> u16 {
    8000
}

fn default_weight() -> u32 {
    1
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_success_threshold() -> u32 {
    2
}

fn default_time_window_seconds() -> u64 {
    30
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let options = LoadBalancerOptions::default();
        assert_eq!(options.listen_endpoint().to_string(), "0.0.0.0:8000");
        assert_eq!(options.health.passive_monitoring.failure_threshold, 3);
        assert_eq!(options.health.passive_monitoring.success_threshold, 2);
        assert_eq!(options.connection.connect_timeout_ms, 5000);
        assert_eq!(options.connection.max_concurrent_connections, 0);
    }

    #[test]
    fn test_minimal_yaml_fills_defaults() {
        let yaml = r#"
load_balancer:
  backends:
    - name: Backend-1
      address: 127.0.0.1
      port: 19301
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.global.log_level, "info");
        assert_eq!(config.load_balancer.listen_port, 8000);
        assert_eq!(config.load_balancer.backends.len(), 1);
        assert_eq!(config.load_balancer.backends[0].weight, 1);
        assert!(config.load_balancer.health.passive_monitoring.enabled);
    }

    #[test]
    fn test_full_yaml_parses() {
        let yaml = r#"
global:
  log_level: debug
  log_format: pretty
load_balancer:
  listen_address: 127.0.0.1
  listen_port: 9000
  backends:
    - name: Backend-1
      address: 127.0.0.1
      port: 19301
      weight: 2
    - name: Backend-2
      address: backend-2.internal
      port: 19302
  health:
    passive_monitoring:
      failure_threshold: 5
      success_threshold: 3
  connection:
    connect_timeout_ms: 1500
    max_concurrent_connections: 1024
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.global.log_format, LogFormat::Pretty);
        assert_eq!(config.load_balancer.listen_endpoint().to_string(), "127.0.0.1:9000");
        assert_eq!(config.load_balancer.backends[1].address, "backend-2.internal");
        assert_eq!(config.load_balancer.health.passive_monitoring.failure_threshold, 5);
        assert_eq!(
            config.load_balancer.connection.connect_timeout(),
            Duration::from_millis(1500)
        );
        assert_eq!(config.load_balancer.connection.max_concurrent_connections, 1024);
    }
}
