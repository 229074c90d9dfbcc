//! Configuration validation.

use crate::config::Config;
use std::collections::HashSet;

/// Validate the configuration.
///
/// Checks for:
/// - A non-empty backend list
/// - Unique, non-empty backend names
/// - Resolvable-looking addresses and non-zero ports
/// - Weights and thresholds of at least 1
/// - A usable connect timeout and listen port
///
/// # Returns
///
/// `Ok(())` if valid, or an error message describing every problem found.
pub fn validate_config(config: &Config) -> Result<(), String> {
    let mut errors = Vec::new();
    let lb = &config.load_balancer;

    if lb.listen_port == 0 {
        errors.push("listen_port must be between 1 and 65535".to_string());
    }

    if lb.backends.is_empty() {
        errors.push("at least one backend must be defined".to_string());
    }

    let mut names = HashSet::new();
    for backend in &lb.backends {
        if backend.name.is_empty() {
            errors.push("backend name cannot be empty".to_string());
        }

        if !names.insert(backend.name.as_str()) {
            errors.push(format!("duplicate backend name: {}", backend.name));
        }

        if backend.address.is_empty() {
            errors.push(format!("backend '{}' has an empty address", backend.name));
        }

        if backend.port == 0 {
            errors.push(format!(
                "backend '{}' port must be between 1 and 65535",
                backend.name
            ));
        }

        if backend.weight == 0 {
            errors.push(format!(
                "backend '{}' has weight 0 (must be >= 1)",
                backend.name
            ));
        }
    }

    let passive = &lb.health.passive_monitoring;
    if passive.failure_threshold == 0 {
        errors.push("health.passive_monitoring.failure_threshold must be >= 1".to_string());
    }
    if passive.success_threshold == 0 {
        errors.push("health.passive_monitoring.success_threshold must be >= 1".to_string());
    }

    if lb.connection.connect_timeout_ms == 0 {
        errors.push("connection.connect_timeout_ms must be >= 1".to_string());
    }

    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.global.log_level.to_lowercase().as_str()) {
        errors.push(format!(
            "invalid log level '{}', must be one of: {}",
            config.global.log_level,
            valid_levels.join(", ")
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}
