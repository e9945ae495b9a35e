//! Observability: structured logging and routing metrics

pub mod logging;
pub mod metrics;

// Re-export for convenience
pub use logging::{
    init_default_logging, init_logging, init_logging_with_verbosity, parse_level, LogFormat,
    LoggingSettings,
};
pub use metrics::{MetricsSnapshot, RouterMetrics};

// Span macros for structured logging
pub use logging::{route_span, shadow_span};
