/*!
 * Logging functionality for LoRaBridge.
 *
 * This module provides tracing setup and span helpers so that every gateway
 * task logs with the same layout and component tagging.
 */
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Initialize the logging system from the logging section of the configuration
pub fn init_from_config(config: &LoggingConfig) -> Result<()> {
    init_with_filter(&config.level, config.show_target)
}

/// Initialize the logging system with a specific filter
///
/// `RUST_LOG`, when set, takes precedence over `filter`.
///
/// # Arguments
///
/// * `filter` - The log filter string (e.g., "info", "debug", "lorabridge_gateway=trace")
/// * `show_target` - Whether each line carries the module path of its origin
pub fn init_with_filter(filter: &str, show_target: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .map_err(|e| Error::config(format!("Invalid log filter '{}': {}", filter, e)))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(show_target))
        .with(filter)
        .try_init()
        .map_err(|e| Error::runtime(format!("Failed to initialize logging: {}", e)))?;

    Ok(())
}

/// A type alias for a tracing span
pub type Span = tracing::Span;

/// Create a new span for a component
///
/// # Arguments
///
/// * `name` - The name of the component
/// * `id` - An optional ID for the component instance
pub fn component_span(name: &str, id: Option<&str>) -> Span {
    match id {
        Some(id) => tracing::info_span!("component", name = %name, id = %id),
        None => tracing::info_span!("component", name = %name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_from_config() {
        // Only the first subscriber in a process wins
        let _ = init_from_config(&LoggingConfig::default());
    }

    #[test]
    fn test_invalid_filter_is_rejected() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        assert!(matches!(
            init_with_filter("lorabridge=notalevel", true),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_component_span() {
        let span = component_span("scheduler", Some("0x5A"));
        assert!(span.is_none()); // No subscriber enabled for the span

        let span = component_span("scheduler", None);
        assert!(span.is_none());
    }
}
