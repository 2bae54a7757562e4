//! Logging infrastructure for promptloom.
//!
//! Initializes the tracing subscriber for structured logging. All logs go to
//! stderr so stdout carries nothing but the assembled prompt.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{AppError, AppResult};

/// Initialize the tracing subscriber with stderr output.
///
/// # Arguments
/// * `log_level` - Optional filter override (e.g., "debug", "loom_transform=trace")
/// * `no_color` - Disable colored output
///
/// # Example
/// ```no_run
/// use loom_core::logging::init_logging;
///
/// init_logging(None, false).expect("Failed to initialize logging");
/// ```
pub fn init_logging(log_level: Option<&str>, no_color: bool) -> AppResult<()> {
    let env_filter = build_filter(log_level)?;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_ansi(!no_color && supports_color());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| AppError::Config(format!("Failed to init logging: {}", e)))?;

    Ok(())
}

/// Crates a bare level like `debug` applies to.
const LOOM_TARGETS: &[&str] = &["loom", "loom_core", "loom_prompt", "loom_transform"];

/// Resolve the filter from the explicit level, then `RUST_LOG`, then "info".
fn build_filter(log_level: Option<&str>) -> AppResult<EnvFilter> {
    let default_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let filter_str = log_level.unwrap_or(&default_level);

    EnvFilter::try_new(expand_level(filter_str))
        .map_err(|e| AppError::Config(format!("Invalid log filter: {}", e)))
}

/// Scope a bare level to the loom crates; dependencies stay at `warn`.
/// Full directive strings pass through unchanged.
fn expand_level(filter: &str) -> String {
    let filter = filter.trim();
    if filter.contains('=') || filter.contains(',') {
        return filter.to_string();
    }

    let mut directives = vec!["warn".to_string()];
    directives.extend(LOOM_TARGETS.iter().map(|t| format!("{}={}", t, filter)));
    directives.join(",")
}

fn supports_color() -> bool {
    std::env::var("NO_COLOR").is_err()
}
