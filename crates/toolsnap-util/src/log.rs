//! Opt-in logging setup for hosts embedding toolsnap.
//!
//! The library crates only emit `tracing` events; nothing installs a
//! subscriber unless the host calls [`init`].

use crate::path;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Parse a log level from a string, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Print events to the console.
    pub print: bool,
    /// Base level; a set `RUST_LOG` overrides it.
    pub level: LogLevel,
    /// Include file/line locations in printed events.
    pub include_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            print: true,
            level: LogLevel::Info,
            include_location: false,
        }
    }
}

/// Install the global subscriber for this process.
///
/// Returns `false` when a subscriber is already installed; the existing
/// one stays in place, so embedding hosts and tests can call this
/// freely.
pub fn init(config: LogConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));
    let registry = tracing_subscriber::registry().with(filter);

    if config.print {
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location);
        registry.with(fmt_layer).try_init().is_ok()
    } else {
        // Spans and filtering still work; events go nowhere
        registry.try_init().is_ok()
    }
}

/// Default location for a host that logs to a file.
pub fn default_log_path() -> Option<PathBuf> {
    path::data_dir().map(|dir| dir.join("logs").join("toolsnap.log"))
}
