//! Tracing initialization
//!
//! Provides the standardized subscriber setup shared by the runtime binary
//! and standalone tool servers.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging
///
/// Sets up logging to stderr with:
/// - Formatted output without ANSI colors (for clean logs)
/// - Environment-based filtering via RUST_LOG
/// - A default directive of `<crate_name>=<level>`, where `level` falls back
///   to `info` when not supplied
///
/// Set `LOG_FORMAT=json` for structured JSON output (useful for production/log aggregation).
/// Default is human-readable text output.
///
/// # Arguments
///
/// * `crate_name` - The target to apply the default level to (e.g., "astra_runtime")
/// * `level` - Level taken from configuration or CLI flags, if any
///
/// # Example
///
/// ```rust,ignore
/// astra_common::init_tracing("astra_runtime", Some("debug"))?;
/// ```
pub fn init_tracing(crate_name: &str, level: Option<&str>) -> anyhow::Result<()> {
    let directive = default_directive(crate_name, level);
    let filter = EnvFilter::from_default_env().add_directive(directive.parse()?);

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);

    if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false)
                    .with_thread_names(true),
            )
            .try_init()?;
    }

    Ok(())
}

/// Build the `<target>=<level>` directive, normalizing the level name
fn default_directive(crate_name: &str, level: Option<&str>) -> String {
    let level = level
        .map(|l| l.trim().to_ascii_lowercase())
        .filter(|l| matches!(l.as_str(), "trace" | "debug" | "info" | "warn" | "error"))
        .unwrap_or_else(|| "info".to_string());
    format!("{}={}", crate_name, level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive_falls_back_to_info() {
        assert_eq!(default_directive("astra", None), "astra=info");
        assert_eq!(default_directive("astra", Some("verbose")), "astra=info");
    }

    #[test]
    fn test_default_directive_normalizes_level() {
        assert_eq!(default_directive("astra", Some("DEBUG")), "astra=debug");
        assert_eq!(default_directive("astra", Some(" warn ")), "astra=warn");
    }
}
