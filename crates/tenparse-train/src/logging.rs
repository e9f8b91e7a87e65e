//! Structured logging for training runs
//!
//! Training emits `tracing` spans per epoch and events per evaluation; the
//! library crates log through `log`, which the subscriber picks up as well.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: filter directive (default `tenparse=info,warn`)
//! - `TENPARSE_LOG_FORMAT`: `pretty`, `json` or `compact` (default `pretty`)

use anyhow::Result;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_FILTER: &str = "tenparse=info,warn";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
    /// One line per event
    Compact,
}

impl LogFormat {
    /// Unknown names fall back to `Pretty`
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub filter: String,
    pub with_ansi: bool,
    pub with_target: bool,
    pub with_thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let format = std::env::var("TENPARSE_LOG_FORMAT")
            .map(|s| LogFormat::parse(&s))
            .unwrap_or(LogFormat::Pretty);
        let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.to_string());
        Self {
            format,
            filter,
            with_ansi: true,
            with_target: true,
            with_thread_ids: false,
        }
    }
}

/// Install the global subscriber. Fails if one is already installed.
#[cfg(feature = "tracing")]
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.filter)?;
    let registry = tracing_subscriber::registry();

    match config.format {
        LogFormat::Pretty => {
            let layer = fmt::layer()
                .pretty()
                .with_ansi(config.with_ansi)
                .with_target(config.with_target)
                .with_thread_ids(config.with_thread_ids)
                .with_filter(filter);
            registry.with(layer).try_init()?;
        }
        LogFormat::Json => {
            let layer = fmt::layer()
                .json()
                .with_target(config.with_target)
                .with_thread_ids(config.with_thread_ids)
                .with_filter(filter);
            registry.with(layer).try_init()?;
        }
        LogFormat::Compact => {
            let layer = fmt::layer()
                .compact()
                .with_ansi(config.with_ansi)
                .with_target(config.with_target)
                .with_thread_ids(config.with_thread_ids)
                .with_filter(filter);
            registry.with(layer).try_init()?;
        }
    }
    Ok(())
}

#[cfg(not(feature = "tracing"))]
pub fn init_logging(_config: LoggingConfig) -> Result<()> {
    Ok(())
}
