//! Tracing setup for the binary

use std::env;

use anyhow::{anyhow, Result};
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt, EnvFilter, Layer};

/// Filter directive: `info` (or `debug` when verbose) followed by `RUST_LOG`
fn directive(verbose: bool, rust_log: Option<String>) -> String {
    let level = if verbose { "debug" } else { "info" };
    match rust_log {
        Some(extra) if !extra.is_empty() => format!("{},{}", level, extra),
        _ => level.to_string(),
    }
}

/// Install the global subscriber; logs go to stderr
///
/// `LOG_FORMAT` selects `default`, `compact`, `pretty` or `json` output.
pub fn init_tracing(verbose: bool) -> Result<()> {
    let directive = directive(verbose, env::var(EnvFilter::DEFAULT_ENV).ok());
    let layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let layer = match env::var("LOG_FORMAT").ok() {
        Some(format) => match format.to_lowercase().as_str() {
            "default" => layer.boxed(),
            "compact" => layer.compact().boxed(),
            "pretty" => layer.pretty().boxed(),
            "json" => layer.json().boxed(),
            s => Err(anyhow!("LOG_FORMAT '{}' is not supported", s))?,
        },
        None => layer.boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(EnvFilter::new(directive)))
        .try_init()?;
    tracing::debug!("initialized global tracing subscriber");
    Ok(())
}
