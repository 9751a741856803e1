//! # Structured Logging Module
//!
//! Console logging for the provisioner binary. The library never installs a
//! subscriber on its own; components receive their parent span at
//! construction and log through it.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::{LogFormat, LoggingConfig};

/// Install the global tracing subscriber for the current process.
///
/// `RUST_LOG` wins over the configured level when set. Returns `false` when a
/// subscriber was already installed (embedders, tests); that is not an error.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(&config.level)));

    let layer = match config.format {
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_ansi(false)
            .json()
            .boxed(),
    };

    let initialized = tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .is_ok();

    if initialized {
        tracing::info!(
            level = %config.level,
            format = ?config.format,
            pid = std::process::id(),
            "STRUCTURED LOGGING: Initialized"
        );
    } else {
        tracing::debug!("Global tracing subscriber already initialized - continuing");
    }

    initialized
}

/// Build the filter directive: the configured level for this crate and the
/// http stack, `warn` for everything else.
fn filter_directive(level: &str) -> String {
    let level = match level.trim().to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" => "error",
        _ => "info",
    };
    format!("warn,provisioner_core={level},provisioner_server={level},tower_http={level}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive_levels() {
        assert!(filter_directive("DEBUG").contains("provisioner_core=debug"));
        assert!(filter_directive("warning").contains("provisioner_core=warn"));
        assert!(filter_directive("nonsense").contains("provisioner_core=info"));
    }
}
