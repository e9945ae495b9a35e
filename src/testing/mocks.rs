//! Mock implementations for testing
//!
//! Provides a scriptable [`ShadowExecutor`] and helpers for building routers
//! with a known agent population, so routing and shadow behaviour can be
//! exercised without real backends.

use crate::agent::{AgentDescriptor, PricingTier};
use crate::config::RouterConfig;
use crate::error::RouterResult;
use crate::routing::router::Router;
use crate::shadow::dispatcher::{ShadowExecutionError, ShadowExecutor};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// How the mock answers
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Return the request unchanged
    Echo,
    /// Return the same value for every call
    Fixed(Value),
    /// Fail every call with this message
    Fail(String),
}

/// Shadow executor that records every call
#[derive(Debug, Clone)]
pub struct MockShadowExecutor {
    behavior: MockBehavior,
    delay: Option<Duration>,
    calls: Arc<Mutex<Vec<(String, Value)>>>,
}

impl MockShadowExecutor {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            delay: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn echo() -> Self {
        Self::new(MockBehavior::Echo)
    }

    pub fn fixed(result: Value) -> Self {
        Self::new(MockBehavior::Fixed(result))
    }

    pub fn failing<S: Into<String>>(message: S) -> Self {
        Self::new(MockBehavior::Fail(message.into()))
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// `(shadow_agent_id, request)` for every call so far
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl ShadowExecutor for MockShadowExecutor {
    async fn execute(
        &self,
        shadow_agent_id: &str,
        request: &Value,
    ) -> Result<Value, ShadowExecutionError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((shadow_agent_id.to_string(), request.clone()));

        match &self.behavior {
            MockBehavior::Echo => Ok(request.clone()),
            MockBehavior::Fixed(result) => Ok(result.clone()),
            MockBehavior::Fail(message) => {
                Err(ShadowExecutionError::failed(shadow_agent_id, message.clone()))
            }
        }
    }
}

/// Descriptor with a single capability
pub fn agent(id: &str, capability: &str) -> AgentDescriptor {
    AgentDescriptor::new(id, vec![capability.to_string()])
}

/// Descriptor with a single capability and a pricing tier
pub fn priced_agent(id: &str, capability: &str, tier: PricingTier) -> AgentDescriptor {
    agent(id, capability).with_pricing_tier(tier)
}

/// Config with a fixed seed and shadow testing switched on or off
pub fn test_router_config(shadow_enabled: bool) -> RouterConfig {
    let mut config = RouterConfig::default();
    config.router.seed = Some(2389);
    config.shadow.enabled = shadow_enabled;
    config
}

/// Seeded router with the given agents registered
pub fn router_with_agents<I>(shadow_enabled: bool, agents: I) -> RouterResult<Router>
where
    I: IntoIterator<Item = AgentDescriptor>,
{
    let router = Router::from_config(&test_router_config(shadow_enabled))?;
    for descriptor in agents {
        router.register_agent(descriptor)?;
    }
    Ok(router)
}
