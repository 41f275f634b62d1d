//! Logging setup for Converse
//!
//! Installs a `tracing-subscriber` registry writing to stderr so stdout stays
//! free for streamed chat output.

use converse_config::{LogFormat, LoggingConfig};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global subscriber
///
/// The filter comes from the config file, then `RUST_LOG`, then
/// `default_filter`.
///
/// # Errors
///
/// Returns an error if the filter directive is invalid or a global
/// subscriber is already installed
pub fn init(config: Option<&LoggingConfig>, default_filter: &str) -> anyhow::Result<()> {
    let filter = build_filter(config, default_filter)?;
    let format = config.map(|c| c.format).unwrap_or_default();

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(false)
        .with_line_number(false);

    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry.with(fmt_layer).try_init(),
        LogFormat::Json => registry.with(fmt_layer.json()).try_init(),
    }
    .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}

fn build_filter(config: Option<&LoggingConfig>, default_filter: &str) -> anyhow::Result<EnvFilter> {
    if let Some(directive) = config.and_then(|c| c.filter.as_deref()) {
        return EnvFilter::try_new(directive).map_err(|e| anyhow::anyhow!("invalid log filter '{directive}': {e}"));
    }

    Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
}
