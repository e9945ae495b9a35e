//! Router configuration
//!
//! Loaded from TOML. Every section is optional; a missing section takes its
//! defaults, so an empty file is a valid (if agent-less) router.

use crate::agent::{validate_agent_id, AgentDescriptor};
use crate::canonical::DEFAULT_CHARS_PER_TOKEN;
use crate::routing::rate_limiter::DEFAULT_WINDOW_SECS;
use crate::routing::strategy::Strategy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Top-level router configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RouterConfig {
    #[serde(default)]
    pub router: RouterSection,
    #[serde(default)]
    pub rate_limit: RateLimitSection,
    #[serde(default)]
    pub shadow: ShadowSection,
    /// Agents registered at startup
    #[serde(default)]
    pub agents: Vec<AgentDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouterSection {
    /// Strategy used when a request does not name one
    #[serde(default = "default_strategy_name")]
    pub default_strategy: String,
    /// Fixed RNG seed for reproducible tie-breaking
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            default_strategy: default_strategy_name(),
            seed: None,
        }
    }
}

fn default_strategy_name() -> String {
    Strategy::default().as_str().to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateLimitSection {
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: u64,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            chars_per_token: default_chars_per_token(),
        }
    }
}

fn default_window_secs() -> u64 {
    DEFAULT_WINDOW_SECS
}

fn default_chars_per_token() -> u64 {
    DEFAULT_CHARS_PER_TOKEN
}

/// Shadow testing settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShadowSection {
    #[serde(default)]
    pub enabled: bool,
    /// Worker tasks draining the dispatch queue
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Retained records; the oldest is evicted beyond this
    #[serde(default = "default_max_records")]
    pub max_records: usize,
    #[serde(default = "default_pending_timeout_secs")]
    pub pending_timeout_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Upper bound on a single shadow execution
    #[serde(default = "default_execution_timeout_secs")]
    pub execution_timeout_secs: u64,
}

impl Default for ShadowSection {
    fn default() -> Self {
        Self {
            enabled: false,
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            max_records: default_max_records(),
            pending_timeout_secs: default_pending_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            execution_timeout_secs: default_execution_timeout_secs(),
        }
    }
}

impl ShadowSection {
    pub fn pending_timeout(&self) -> Duration {
        Duration::from_secs(self.pending_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs)
    }
}

/// Upper bound for shadow timing settings (one week)
pub const MAX_SHADOW_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

fn default_workers() -> usize {
    2
}

fn default_queue_capacity() -> usize {
    256
}

fn default_max_records() -> usize {
    10_000
}

fn default_pending_timeout_secs() -> u64 {
    300 // 5 minutes
}

fn default_sweep_interval_secs() -> u64 {
    30
}

fn default_execution_timeout_secs() -> u64 {
    30
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid agent ID format: {0}")]
    InvalidAgentId(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RouterConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: RouterConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde alone cannot reject
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.default_strategy()?;

        if self.rate_limit.window_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "rate_limit.window_secs must be greater than zero".to_string(),
            ));
        }
        if self.rate_limit.chars_per_token == 0 {
            return Err(ConfigError::InvalidConfig(
                "rate_limit.chars_per_token must be greater than zero".to_string(),
            ));
        }

        let shadow = &self.shadow;
        let non_zero = [
            ("shadow.workers", shadow.workers as u64),
            ("shadow.queue_capacity", shadow.queue_capacity as u64),
            ("shadow.max_records", shadow.max_records as u64),
            ("shadow.pending_timeout_secs", shadow.pending_timeout_secs),
            ("shadow.sweep_interval_secs", shadow.sweep_interval_secs),
            ("shadow.execution_timeout_secs", shadow.execution_timeout_secs),
        ];
        if let Some((name, _)) = non_zero.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::InvalidConfig(format!(
                "{name} must be greater than zero"
            )));
        }

        let bounded = [
            ("shadow.pending_timeout_secs", shadow.pending_timeout_secs),
            ("shadow.sweep_interval_secs", shadow.sweep_interval_secs),
            ("shadow.execution_timeout_secs", shadow.execution_timeout_secs),
        ];
        if let Some((name, value)) = bounded
            .iter()
            .find(|(_, value)| *value > MAX_SHADOW_DURATION_SECS)
        {
            return Err(ConfigError::InvalidConfig(format!(
                "{name} = {value} exceeds the maximum of {MAX_SHADOW_DURATION_SECS}s"
            )));
        }

        let mut seen = HashSet::new();
        for agent in &self.agents {
            validate_agent_id(&agent.agent_id)
                .map_err(|_| ConfigError::InvalidAgentId(format!(
                    "Agent ID '{}' must match pattern [a-zA-Z0-9._-]+",
                    agent.agent_id
                )))?;

            if !seen.insert(agent.agent_id.as_str()) {
                return Err(ConfigError::InvalidConfig(format!(
                    "Agent '{}' is defined more than once",
                    agent.agent_id
                )));
            }

            if agent.capabilities.is_empty() {
                return Err(ConfigError::InvalidConfig(format!(
                    "Agent '{}' must declare at least one capability",
                    agent.agent_id
                )));
            }
        }

        Ok(())
    }

    /// The configured default strategy, parsed
    pub fn default_strategy(&self) -> Result<Strategy, ConfigError> {
        self.router.default_strategy.parse().map_err(|_| {
            ConfigError::InvalidConfig(format!(
                "Unknown default_strategy '{}' (expected one of: balanced, cost, performance)",
                self.router.default_strategy
            ))
        })
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[router]
default_strategy = "balanced"
seed = 7

[shadow]
enabled = true

[[agents]]
id = "code-economy"
capabilities = ["code"]
pricing_tier = "economy"

[[agents]]
id = "code-premium"
capabilities = ["code", "review"]
pricing_tier = "premium"

[[agents]]
id = "code-canary"
capabilities = ["code"]
is_shadow = true
"#;
        Self::from_toml_str(toml_content).expect("Test config should parse")
    }
}
