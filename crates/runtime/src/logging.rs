//! Structured logging setup with tracing.

use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    prelude::*,
};

use fftnet_core::LoggingConfig;

/// Logging format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable text format.
    #[default]
    Text,
    /// JSON format for structured logging.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown log format: {s}")),
        }
    }
}

/// Initialize the logging subsystem.
///
/// `RUST_LOG`, when set, overrides `level`. Calling this twice is harmless;
/// the second subscriber is ignored.
///
/// # Example
/// ```ignore
/// use runtime::logging::{init_logging, LogFormat};
/// init_logging("info", LogFormat::Text);
/// ```
pub fn init_logging(level: &str, format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Text => {
            let subscriber = tracing_subscriber::registry().with(env_filter).with(
                fmt::layer()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE),
            );

            let _ = tracing::subscriber::set_global_default(subscriber);
        }
        LogFormat::Json => {
            let subscriber = tracing_subscriber::registry().with(env_filter).with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_span_events(FmtSpan::CLOSE),
            );

            let _ = tracing::subscriber::set_global_default(subscriber);
        }
    }
}

/// Initialize logging from the `logging` section of a config file.
///
/// An unrecognized format falls back to text.
pub fn init_from_config(config: &LoggingConfig) {
    let format = config.format.parse().unwrap_or_default();
    init_logging(&config.level, format);
}
