//! Structured logging setup
//!
//! Logs are written to stderr so that CLI output on stdout stays parseable.
//! Settings come from the environment:
//!
//! | Variable     | Values                             | Default |
//! |--------------|------------------------------------|---------|
//! | `LOG_LEVEL`  | error, warn, info, debug, trace    | info    |
//! | `LOG_FORMAT` | json, pretty, compact              | json    |
//! | `LOG_SPANS`  | true, false                        | false   |
//! | `RUST_LOG`   | `EnvFilter` directives, wins if set |         |
//!
//! ```bash
//! LOG_FORMAT=compact LOG_LEVEL=debug agent-router route --capability code
//! ```

use std::env;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
    /// Single-line colored output without targets
    Compact,
}

impl LogFormat {
    /// Parse log format from string; anything unrecognised falls back to JSON
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Json,
        }
    }
}

/// Parse a log level name; unknown names fall back to INFO
pub fn parse_level(s: &str) -> Level {
    match s.trim().to_uppercase().as_str() {
        "ERROR" => Level::ERROR,
        "WARN" => Level::WARN,
        "INFO" => Level::INFO,
        "DEBUG" => Level::DEBUG,
        "TRACE" => Level::TRACE,
        _ => Level::INFO,
    }
}

fn span_events(include_spans: bool) -> fmt::format::FmtSpan {
    if include_spans {
        fmt::format::FmtSpan::NEW | fmt::format::FmtSpan::CLOSE
    } else {
        fmt::format::FmtSpan::NONE
    }
}

/// Initialize logging with manual configuration.
///
/// Logs go to stderr so command output on stdout stays machine-readable.
/// Calling this twice is harmless; the second subscriber is not installed.
pub fn init_logging(level: Level, format: LogFormat, include_spans: bool) {
    let filter = match env::var("RUST_LOG") {
        Ok(rust_log) => EnvFilter::new(rust_log),
        Err(_) => EnvFilter::new(level.to_string()).add_directive(
            "tokio=warn"
                .parse()
                .unwrap_or_else(|_| Level::WARN.into()),
        ),
    };

    let subscriber = tracing_subscriber::registry().with(filter);

    let result = match format {
        LogFormat::Json => subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_span_events(span_events(include_spans)),
            )
            .try_init(),
        LogFormat::Pretty => subscriber
            .with(
                fmt::layer()
                    .pretty()
                    .with_ansi(true)
                    .with_writer(std::io::stderr)
                    .with_span_events(span_events(include_spans)),
            )
            .try_init(),
        LogFormat::Compact => subscriber
            .with(
                fmt::layer()
                    .compact()
                    .with_ansi(true)
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_span_events(span_events(include_spans)),
            )
            .try_init(),
    };

    if result.is_err() {
        tracing::debug!("Global tracing subscriber already installed");
    }
}

/// Resolved logging settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggingSettings {
    pub level: Level,
    pub format: LogFormat,
    pub include_spans: bool,
}

impl LoggingSettings {
    /// Read `LOG_LEVEL`, `LOG_FORMAT` and `LOG_SPANS` from the process environment
    pub fn from_env(verbose: u8) -> Self {
        Self::from_lookup(verbose, |key| env::var(key).ok())
    }

    /// Resolve settings through `lookup`. Each `-v` raises the level one step
    /// above INFO and overrides `LOG_LEVEL`.
    pub fn from_lookup<F>(verbose: u8, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let level = match verbose {
            0 => lookup("LOG_LEVEL").map_or(Level::INFO, |v| parse_level(&v)),
            1 => Level::DEBUG,
            _ => Level::TRACE,
        };
        let format = lookup("LOG_FORMAT").map_or(LogFormat::Json, |v| LogFormat::parse(&v));
        let include_spans = lookup("LOG_SPANS").is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));

        Self {
            level,
            format,
            include_spans,
        }
    }

    pub fn init(self) {
        init_logging(self.level, self.format, self.include_spans);
    }
}

/// Initialize logging from environment variables
pub fn init_default_logging() {
    init_logging_with_verbosity(0);
}

/// Initialize logging from the environment, raising the level by CLI `-v` count
pub fn init_logging_with_verbosity(verbose: u8) {
    LoggingSettings::from_env(verbose).init();
}

/// Create a routing decision span with contextual information
#[macro_export]
macro_rules! route_span {
    ($($field:tt)*) => {
        tracing::info_span!("route_request", $($field)*)
    };
}

/// Create a shadow test span
#[macro_export]
macro_rules! shadow_span {
    ($($field:tt)*) => {
        tracing::info_span!("shadow_test", $($field)*)
    };
}

pub use {route_span, shadow_span};
