//! Error types for the agent router
//!
//! Routing failures are surfaced directly to the caller. Health reports and
//! shadow-test bookkeeping never produce errors; they are logged instead.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Main error type for router operations
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("No available agent for capability '{capability}'")]
    NoAvailableAgent { capability: String },

    #[error("Unknown routing strategy: {name}")]
    UnknownStrategy { name: String },

    #[error("Unknown agent: {agent_id}")]
    UnknownAgent { agent_id: String },

    #[error("Invalid pricing tier: {value}")]
    InvalidPricingTier { value: String },

    #[error("Invalid agent ID '{agent_id}': must match [a-zA-Z0-9._-]+")]
    InvalidAgentId { agent_id: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RouterError {
    /// Create no-available-agent error
    pub fn no_available_agent<S: Into<String>>(capability: S) -> Self {
        Self::NoAvailableAgent {
            capability: capability.into(),
        }
    }

    /// Create unknown strategy error
    pub fn unknown_strategy<S: Into<String>>(name: S) -> Self {
        Self::UnknownStrategy { name: name.into() }
    }

    /// Create unknown agent error
    pub fn unknown_agent<S: Into<String>>(agent_id: S) -> Self {
        Self::UnknownAgent {
            agent_id: agent_id.into(),
        }
    }

    /// Create invalid input error
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Whether the caller could succeed by retrying later without changing the request
    pub fn is_transient(&self) -> bool {
        matches!(self, RouterError::NoAvailableAgent { .. })
    }
}

static SECRET_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+").ok());

static SENSITIVE_PATH_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+").ok()
});

const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Scrub credentials and sensitive paths out of backend error messages before
/// they are retained in health records and exposed through agent stats.
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = message.to_string();

    if let Some(pattern) = SECRET_PATTERN.as_ref() {
        sanitized = pattern.replace_all(&sanitized, "${1}=***").to_string();
    }

    if let Some(pattern) = SENSITIVE_PATH_PATTERN.as_ref() {
        sanitized = pattern
            .replace_all(&sanitized, "/***REDACTED***/")
            .to_string();
    }

    if sanitized.len() > MAX_ERROR_MESSAGE_LEN {
        let truncate_suffix = "...[truncated]";
        let mut cut = MAX_ERROR_MESSAGE_LEN - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}

/// Result type for router operations
pub type RouterResult<T> = Result<T, RouterError>;
