//! Router facade
//!
//! The only public entry point for routing. A call to [`Router::route`] is
//! one-shot and synchronous:
//!
//! ```text
//! reset expired windows → filter candidates → apply strategy
//!     → consume budget → (open shadow test) → RoutingDecision
//! ```
//!
//! Candidate selection and budget consumption happen under a single hold of
//! the registry read lock, the health read lock and the limiter mutex, taken
//! in that order. Two concurrent calls can therefore never both spend the
//! last unit of an agent's budget. Shadow work is queued after the locks are
//! released and never delays the decision.
//!
//! # Example
//!
//! ```rust
//! use agent_router::agent::{AgentDescriptor, PricingTier};
//! use agent_router::routing::{Router, RoutingRequest};
//! use serde_json::json;
//!
//! let router = Router::new();
//! router
//!     .register_agent(
//!         AgentDescriptor::new("code-economy", vec!["code".to_string()])
//!             .with_pricing_tier(PricingTier::Economy),
//!     )
//!     .unwrap();
//!
//! let request = RoutingRequest::new("code")
//!     .with_payload(json!({"prompt": "fn main() {}"}))
//!     .with_strategy("cost");
//! let decision = router.route(&request).unwrap();
//! assert_eq!(decision.agent_id, "code-economy");
//! ```

use crate::agent::{validate_agent_id, AgentDescriptor, AgentRegistry, PricingTier};
use crate::config::{RouterConfig, ShadowSection};
use crate::error::{RouterError, RouterResult};
use crate::health::{HealthStatus, HealthTracker};
use crate::observability::metrics::{MetricsSnapshot, RouterMetrics};
use crate::routing::rate_limiter::{RateBudget, RateLimiter};
use crate::routing::selector::CandidateSelector;
use crate::routing::strategy::{Strategy, StrategyEngine};
use crate::shadow::{
    ShadowCoordinator, ShadowDispatcher, ShadowExecutor, ShadowJob, ShadowSummary,
    ShadowTestRecord,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A request that needs an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingRequest {
    /// Capability the chosen agent must have
    pub capability: String,
    /// Opaque request body; sized for the token estimate and cloned for shadows
    #[serde(default = "empty_payload")]
    pub payload: Value,
    #[serde(default)]
    pub pricing_preference: Option<PricingTier>,
    /// Strategy name; the router default applies when absent
    #[serde(default)]
    pub strategy: Option<String>,
}

fn empty_payload() -> Value {
    Value::Object(serde_json::Map::new())
}

impl RoutingRequest {
    pub fn new<S: Into<String>>(capability: S) -> Self {
        Self {
            capability: capability.into(),
            payload: empty_payload(),
            pricing_preference: None,
            strategy: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_pricing_preference(mut self, tier: PricingTier) -> Self {
        self.pricing_preference = Some(tier);
        self
    }

    pub fn with_strategy<S: Into<String>>(mut self, strategy: S) -> Self {
        self.strategy = Some(strategy.into());
        self
    }
}

/// Outcome of a successful routing call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingDecision {
    pub agent_id: String,
    pub capability: String,
    pub payload: Value,
    pub strategy: Strategy,
    /// Tokens charged against the agent's budget
    pub estimated_tokens: u64,
    /// Set when a shadow comparison was opened for this call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shadow_test_id: Option<String>,
}

/// Token and request figures for one agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoadFigures {
    pub tokens_per_min: u64,
    pub requests_per_min: u64,
}

/// Observability snapshot for one agent
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentStats {
    pub agent_id: String,
    pub capabilities: Vec<String>,
    pub pricing_tier: PricingTier,
    pub is_shadow: bool,
    pub health_status: HealthStatus,
    pub latency_ms: u64,
    pub error_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub current_load: LoadFigures,
    pub capacity: LoadFigures,
    pub window_start: DateTime<Utc>,
    pub registered_at: DateTime<Utc>,
}

/// Capability-based request router
#[derive(Debug)]
pub struct Router {
    registry: AgentRegistry,
    health: HealthTracker,
    limiter: RateLimiter,
    selector: CandidateSelector,
    engine: StrategyEngine,
    default_strategy: Strategy,
    shadow_settings: ShadowSection,
    shadow: ShadowCoordinator,
    dispatcher: Option<ShadowDispatcher>,
    metrics: Arc<RouterMetrics>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Router with default settings, no agents and shadow testing off
    pub fn new() -> Self {
        Self::build(&RouterConfig::default(), Strategy::default())
    }

    /// Build a router from configuration and register its agents
    pub fn from_config(config: &RouterConfig) -> RouterResult<Self> {
        config.validate()?;
        let default_strategy = config.default_strategy()?;

        let router = Self::build(config, default_strategy);
        for descriptor in &config.agents {
            router.register_agent(descriptor.clone())?;
        }

        info!(
            agents = router.agent_count(),
            default_strategy = %default_strategy,
            shadow_enabled = config.shadow.enabled,
            "Router initialized from configuration"
        );
        Ok(router)
    }

    fn build(config: &RouterConfig, default_strategy: Strategy) -> Self {
        let metrics = Arc::new(RouterMetrics::new());
        let engine = match config.router.seed {
            Some(seed) => StrategyEngine::with_seed(seed),
            None => StrategyEngine::new(),
        };

        Self {
            registry: AgentRegistry::new(),
            health: HealthTracker::new(),
            limiter: RateLimiter::new(
                config.rate_limit.window_secs,
                config.rate_limit.chars_per_token,
            ),
            selector: CandidateSelector::new(),
            engine,
            default_strategy,
            shadow_settings: config.shadow.clone(),
            shadow: ShadowCoordinator::from_config(&config.shadow, metrics.clone()),
            dispatcher: None,
            metrics,
        }
    }

    /// Execute shadow requests through `executor` on a background worker
    /// pool. Must be called from within a Tokio runtime.
    pub fn with_shadow_executor(mut self, executor: Arc<dyn ShadowExecutor>) -> Self {
        self.dispatcher = Some(ShadowDispatcher::spawn(
            executor,
            self.shadow.clone(),
            &self.shadow_settings,
        ));
        self
    }

    pub fn shadow_enabled(&self) -> bool {
        self.shadow_settings.enabled
    }

    pub fn default_strategy(&self) -> Strategy {
        self.default_strategy
    }

    /// Register or overwrite an agent. Returns `true` for a new id.
    ///
    /// Overwriting restarts the agent's rate window but keeps its health.
    pub fn register_agent(&self, descriptor: AgentDescriptor) -> RouterResult<bool> {
        validate_agent_id(&descriptor.agent_id)?;

        let agent_id = descriptor.agent_id.clone();
        let budget = RateBudget {
            max_tokens_per_min: descriptor.max_tokens_per_min,
            max_requests_per_min: descriptor.max_requests_per_min,
        };

        // health and budget first, so a routable agent always has both
        self.health.track(&agent_id);
        self.limiter.track(&agent_id, budget);
        let is_new = self.registry.register(descriptor);

        if is_new {
            info!(agent_id = %agent_id, "Registered agent");
        } else {
            info!(agent_id = %agent_id, "Re-registered agent");
        }
        Ok(is_new)
    }

    /// Remove an agent along with its usage window and health record
    pub fn deregister_agent(&self, agent_id: &str) -> RouterResult<AgentDescriptor> {
        let descriptor = self
            .registry
            .deregister(agent_id)
            .ok_or_else(|| RouterError::unknown_agent(agent_id))?;

        self.limiter.forget(agent_id);
        self.health.forget(agent_id);

        info!(agent_id = %agent_id, "Deregistered agent");
        Ok(descriptor)
    }

    /// Route by positional arguments
    pub fn route_request(
        &self,
        capability: &str,
        payload: Value,
        pricing_preference: Option<PricingTier>,
        strategy: &str,
    ) -> RouterResult<RoutingDecision> {
        let mut request = RoutingRequest::new(capability)
            .with_payload(payload)
            .with_strategy(strategy);
        request.pricing_preference = pricing_preference;
        self.route(&request)
    }

    /// Choose an agent for `request` and charge its budget
    pub fn route(&self, request: &RoutingRequest) -> RouterResult<RoutingDecision> {
        self.route_at(request, Utc::now())
    }

    /// [`Router::route`] with an explicit clock reading
    pub fn route_at(
        &self,
        request: &RoutingRequest,
        now: DateTime<Utc>,
    ) -> RouterResult<RoutingDecision> {
        self.metrics.route_attempted();

        let strategy = match &request.strategy {
            Some(name) => name.parse::<Strategy>().map_err(|e| {
                self.metrics.route_unknown_strategy();
                warn!(strategy = %name, "Unknown routing strategy");
                e
            })?,
            None => self.default_strategy,
        };

        let span = crate::route_span!(
            capability = %request.capability,
            strategy = %strategy
        );
        let _enter = span.enter();

        let selection = {
            let registry = self.registry.read();
            let health = self.health.read();
            let mut limiter = self.limiter.lock();

            limiter.reset_all_expired(now);

            let (candidates, trace) = self.selector.select(
                &registry,
                &health,
                &limiter,
                &request.capability,
                request.pricing_preference,
            );

            match self.engine.choose(strategy, &candidates) {
                None => Err(trace),
                Some(chosen) => {
                    let agent_id = chosen.agent_id.clone();
                    let tokens = limiter.consume(&agent_id, &request.payload).unwrap_or(0);

                    let shadow_agent = if self.shadow_settings.enabled {
                        registry
                            .shadow_agents_for(&request.capability)
                            .into_iter()
                            .find(|id| *id != agent_id && health.is_healthy(id))
                    } else {
                        None
                    };
                    Ok((agent_id, tokens, shadow_agent))
                }
            }
        };

        let (agent_id, tokens, shadow_agent) = match selection {
            Ok(selected) => selected,
            Err(trace) => {
                self.metrics.route_no_agent();
                warn!(
                    capability = %request.capability,
                    pricing = ?request.pricing_preference,
                    matched = trace.capability,
                    healthy = trace.healthy,
                    within_budget = trace.within_budget,
                    "No available agent"
                );
                return Err(RouterError::no_available_agent(&request.capability));
            }
        };

        self.metrics.route_succeeded(strategy, &agent_id, tokens);
        info!(agent_id = %agent_id, tokens, "Routed request");

        let shadow_test_id = match shadow_agent {
            Some(shadow_agent_id) => {
                Some(self.start_shadow_test(&shadow_agent_id, &agent_id, request))
            }
            None => {
                if self.shadow_settings.enabled {
                    self.metrics.shadow_skipped();
                    debug!(capability = %request.capability, "No shadow candidate, skipping");
                }
                None
            }
        };

        Ok(RoutingDecision {
            agent_id,
            capability: request.capability.clone(),
            payload: request.payload.clone(),
            strategy,
            estimated_tokens: tokens,
            shadow_test_id,
        })
    }

    /// Open a pending record and queue the shadow run. Never fails the
    /// production decision.
    fn start_shadow_test(
        &self,
        shadow_agent_id: &str,
        production_agent_id: &str,
        request: &RoutingRequest,
    ) -> String {
        let record = self.shadow.open(
            shadow_agent_id,
            production_agent_id,
            &request.capability,
            &request.payload,
        );
        let test_id = record.test_id.clone();

        match &self.dispatcher {
            Some(dispatcher) => {
                let job = ShadowJob {
                    test_id: record.test_id,
                    shadow_agent_id: record.shadow_agent_id,
                    request: record.request,
                };
                match dispatcher.try_dispatch(job) {
                    Ok(()) => self.metrics.shadow_dispatched(),
                    Err(e) => {
                        debug!(test_id = %test_id, error = %e, "Shadow dispatch failed");
                    }
                }
            }
            None => {
                debug!(
                    test_id = %test_id,
                    "No shadow executor attached, awaiting externally reported results"
                );
            }
        }

        test_id
    }

    /// Apply a health report; reports for unknown agents are logged and
    /// dropped. Returns whether the report was applied.
    pub fn update_health(
        &self,
        agent_id: &str,
        status: HealthStatus,
        latency_ms: u64,
        error: Option<&str>,
    ) -> bool {
        let applied = self.health.update(agent_id, status, latency_ms, error);
        self.metrics.health_report(applied);
        applied
    }

    /// Compare both results of a shadow test. Returns the match outcome, or
    /// `None` if the test id is unknown.
    pub fn record_shadow_result(
        &self,
        test_id: &str,
        shadow_result: Value,
        production_result: Value,
    ) -> Option<bool> {
        self.shadow
            .record_shadow_result(test_id, shadow_result, production_result)
    }

    /// Report only the production result; the comparison runs once the
    /// shadow result is in as well
    pub fn record_production_result(&self, test_id: &str, production_result: Value) -> Option<bool> {
        self.shadow.record_production_result(test_id, production_result)
    }

    pub fn get_agent_stats(&self, agent_id: &str) -> RouterResult<AgentStats> {
        let registered = self
            .registry
            .get_registered(agent_id)
            .ok_or_else(|| RouterError::unknown_agent(agent_id))?;
        let usage = self
            .limiter
            .usage(agent_id)
            .ok_or_else(|| RouterError::unknown_agent(agent_id))?;
        let health = self
            .health
            .get(agent_id)
            .ok_or_else(|| RouterError::unknown_agent(agent_id))?;

        let descriptor = registered.descriptor;
        Ok(AgentStats {
            agent_id: descriptor.agent_id,
            capabilities: descriptor.capabilities,
            pricing_tier: descriptor.pricing_tier,
            is_shadow: descriptor.is_shadow,
            health_status: health.status,
            latency_ms: health.latency_ms,
            error_count: health.error_count,
            last_error: health.last_error,
            current_load: LoadFigures {
                tokens_per_min: usage.current_tokens_per_min,
                requests_per_min: usage.current_requests_per_min,
            },
            capacity: LoadFigures {
                tokens_per_min: usage.budget.max_tokens_per_min,
                requests_per_min: usage.budget.max_requests_per_min,
            },
            window_start: usage.window_start,
            registered_at: registered.registered_at,
        })
    }

    /// Stats for every registered agent, sorted by id
    pub fn all_agent_stats(&self) -> Vec<AgentStats> {
        self.agent_ids()
            .iter()
            .filter_map(|id| self.get_agent_stats(id).ok())
            .collect()
    }

    pub fn agent_ids(&self) -> Vec<String> {
        self.registry.agent_ids()
    }

    pub fn agent_count(&self) -> usize {
        self.registry.agent_count()
    }

    pub fn shadow_test(&self, test_id: &str) -> Option<ShadowTestRecord> {
        self.shadow.get(test_id)
    }

    /// Retained shadow tests, oldest first
    pub fn shadow_tests(&self) -> Vec<ShadowTestRecord> {
        self.shadow.records()
    }

    pub fn pending_shadow_tests(&self) -> Vec<ShadowTestRecord> {
        self.shadow.pending()
    }

    pub fn shadow_summary(&self) -> ShadowSummary {
        self.shadow.summary()
    }

    /// Expire stale pending shadow tests now
    pub fn expire_shadow_tests(&self) -> usize {
        self.shadow.expire_stale()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Drain queued shadow work and stop background tasks
    pub async fn shutdown(&self) {
        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.shutdown().await;
        }
    }
}
