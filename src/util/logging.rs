//! Logging initialization and configuration.

use crate::config::LogFormat;
use tracing_subscriber::EnvFilter;

/// Initialize the logging system.
///
/// The `RUST_LOG` environment variable takes precedence over the configured
/// level. Safe to call more than once; later calls keep the subscriber that
/// is already installed.
pub fn init_logging(level: &str, format: &LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };

    if installed.is_err() {
        tracing::debug!("logging already initialized, keeping existing subscriber");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_init_is_harmless() {
        init_logging("info", &LogFormat::Pretty);
        init_logging("debug", &LogFormat::Json);
    }
}
