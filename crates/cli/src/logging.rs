//! Logging setup
//!
//! Logs always go to stderr so stdout carries only the operator report.
//! `HIJACKLAB_LOG_FORMAT=json` switches to JSON lines; `RUST_LOG` overrides
//! the verbosity flags.

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter for `-v` repetitions
fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "hijacklab=warn",
        1 => "hijacklab=info",
        2 => "hijacklab=debug",
        _ => "hijacklab=trace",
    }
}

/// Initialize the global subscriber
///
/// The returned guard flushes the log file on drop and must outlive the
/// operation.
pub fn init(verbosity: u8, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let log_format = std::env::var("HIJACKLAB_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive(verbosity)))
        .context("Failed to create env filter")?;

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer().json().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(file_layer)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .try_init()
                .context("Failed to install subscriber")?;
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(file_layer)
                .with(fmt::layer().pretty().with_writer(std::io::stderr))
                .try_init()
                .context("Failed to install subscriber")?;
        }
    }

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_raises_level() {
        assert_eq!(default_directive(0), "hijacklab=warn");
        assert_eq!(default_directive(1), "hijacklab=info");
        assert_eq!(default_directive(2), "hijacklab=debug");
        assert_eq!(default_directive(7), "hijacklab=trace");
    }
}
