//! Agent descriptors and pricing tiers

use crate::error::RouterError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default per-minute token budget for a newly registered agent
pub const DEFAULT_MAX_TOKENS_PER_MIN: u64 = 100_000;
/// Default per-minute request budget for a newly registered agent
pub const DEFAULT_MAX_REQUESTS_PER_MIN: u64 = 1_000;

/// Coarse cost classification, ordered cheapest first
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PricingTier {
    Economy,
    #[default]
    Standard,
    Premium,
}

impl PricingTier {
    /// All tiers in preference order for cost-aware routing
    pub const ALL: [PricingTier; 3] = [
        PricingTier::Economy,
        PricingTier::Standard,
        PricingTier::Premium,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PricingTier::Economy => "economy",
            PricingTier::Standard => "standard",
            PricingTier::Premium => "premium",
        }
    }
}

impl fmt::Display for PricingTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PricingTier {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "economy" => Ok(PricingTier::Economy),
            "standard" => Ok(PricingTier::Standard),
            "premium" => Ok(PricingTier::Premium),
            _ => Err(RouterError::InvalidPricingTier {
                value: s.to_string(),
            }),
        }
    }
}

/// Static description of a backend agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentDescriptor {
    /// Agent identifier
    #[serde(alias = "id")]
    pub agent_id: String,
    /// Capability tags this agent can serve
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub pricing_tier: PricingTier,
    #[serde(default = "default_max_tokens_per_min")]
    pub max_tokens_per_min: u64,
    #[serde(default = "default_max_requests_per_min")]
    pub max_requests_per_min: u64,
    /// Shadow agents only ever receive cloned comparison traffic
    #[serde(default)]
    pub is_shadow: bool,
}

fn default_max_tokens_per_min() -> u64 {
    DEFAULT_MAX_TOKENS_PER_MIN
}

fn default_max_requests_per_min() -> u64 {
    DEFAULT_MAX_REQUESTS_PER_MIN
}

impl AgentDescriptor {
    /// Create a standard-tier production agent with default budgets
    pub fn new<S: Into<String>>(agent_id: S, capabilities: Vec<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            capabilities,
            pricing_tier: PricingTier::default(),
            max_tokens_per_min: DEFAULT_MAX_TOKENS_PER_MIN,
            max_requests_per_min: DEFAULT_MAX_REQUESTS_PER_MIN,
            is_shadow: false,
        }
    }

    pub fn with_pricing_tier(mut self, tier: PricingTier) -> Self {
        self.pricing_tier = tier;
        self
    }

    pub fn with_max_tokens_per_min(mut self, max_tokens_per_min: u64) -> Self {
        self.max_tokens_per_min = max_tokens_per_min;
        self
    }

    pub fn with_max_requests_per_min(mut self, max_requests_per_min: u64) -> Self {
        self.max_requests_per_min = max_requests_per_min;
        self
    }

    /// Mark this agent as a shadow agent
    pub fn as_shadow(mut self) -> Self {
        self.is_shadow = true;
        self
    }

    /// Check if agent can handle a given capability (case-insensitive)
    pub fn can_handle(&self, capability: &str) -> bool {
        let capability_lower = capability.to_lowercase();
        self.capabilities
            .iter()
            .any(|c| c.to_lowercase() == capability_lower)
    }
}

/// Validate agent ID format ([a-zA-Z0-9._-]+)
pub fn validate_agent_id(agent_id: &str) -> Result<(), RouterError> {
    let valid_chars = agent_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');

    if agent_id.is_empty() || !valid_chars {
        return Err(RouterError::InvalidAgentId {
            agent_id: agent_id.to_string(),
        });
    }

    Ok(())
}
