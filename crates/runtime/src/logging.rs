//! Structured logging setup with tracing.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::Subscriber;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    prelude::*,
    registry::LookupSpan,
};
use tts_core::TtsResult;

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

/// Plain-text copy of the log written to a file, without ANSI colours.
fn file_layer<S>(file: Option<File>) -> Option<Box<dyn Layer<S> + Send + Sync>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    file.map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(Mutex::new(file))
            .boxed()
    })
}

/// Initialize the logging subsystem.
///
/// # Arguments
/// * `level` - Log level filter (e.g., "info", "debug", "trace"); `RUST_LOG` wins if set
/// * `format` - Output format on stderr (text or JSON)
/// * `log_file` - Optional file that receives a plain-text copy of every event
///
/// Installing twice is a no-op.
///
/// # Example
/// ```ignore
/// use runtime::logging::{init_logging, LogFormat};
/// init_logging("info", LogFormat::Json, Some(Path::new("tts_server.log")))?;
/// ```
pub fn init_logging(level: &str, format: LogFormat, log_file: Option<&Path>) -> TtsResult<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let file = log_file
        .map(|path| OpenOptions::new().create(true).append(true).open(path))
        .transpose()?;

    match format {
        LogFormat::Text => {
            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_span_events(FmtSpan::CLOSE),
                )
                .with(file_layer(file));

            let _ = tracing::subscriber::set_global_default(subscriber);
        }
        LogFormat::Json => {
            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_span_events(FmtSpan::CLOSE),
                )
                .with(file_layer(file));

            let _ = tracing::subscriber::set_global_default(subscriber);
        }
    }

    Ok(())
}

/// Logging settings read from `RUST_LOG`, `LOG_FORMAT` and `LOG_FILE`.
fn env_settings(
    default_level: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> (String, LogFormat, Option<PathBuf>) {
    let level = lookup("RUST_LOG").unwrap_or_else(|| default_level.to_string());
    let format = lookup("LOG_FORMAT")
        .and_then(|s| s.parse().ok())
        .unwrap_or_default();
    let log_file = lookup("LOG_FILE").filter(|s| !s.is_empty()).map(PathBuf::from);
    (level, format, log_file)
}

/// Initialize logging from environment variables.
///
/// Uses:
/// - `RUST_LOG` for log level (default: `default_level`)
/// - `LOG_FORMAT` for format (default: "text")
/// - `LOG_FILE` for an optional log file
pub fn init_logging_from_env(default_level: &str) -> TtsResult<()> {
    let (level, format, log_file) = env_settings(default_level, |name| std::env::var(name).ok());
    init_logging(&level, format, log_file.as_deref())
}
