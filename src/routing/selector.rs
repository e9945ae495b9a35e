//! Candidate selection
//!
//! Narrows the agents registered for a capability down to the ones that may
//! take a production request right now. The selector never retries and never
//! relaxes a constraint; an empty result is reported to the caller as-is.

use crate::agent::{PricingTier, RegistryView};
use crate::health::HealthView;
use crate::routing::rate_limiter::RateLimiterGuard;
use serde::Serialize;
use tracing::debug;

/// Snapshot of one eligible agent, taken under the routing locks
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub agent_id: String,
    pub pricing_tier: PricingTier,
    /// current_requests_per_min / max_requests_per_min
    pub load: f64,
    pub latency_ms: u64,
}

/// How many agents survived each filter stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterTrace {
    pub capability: usize,
    pub healthy: usize,
    pub pricing: usize,
    pub within_budget: usize,
    pub production: usize,
}

/// Candidate filtering pipeline
#[derive(Debug, Clone, Copy, Default)]
pub struct CandidateSelector;

impl CandidateSelector {
    pub fn new() -> Self {
        Self
    }

    /// capability → health → pricing → rate budget → shadow exclusion
    pub fn select(
        &self,
        registry: &RegistryView<'_>,
        health: &HealthView<'_>,
        limiter: &RateLimiterGuard<'_>,
        capability: &str,
        pricing_preference: Option<PricingTier>,
    ) -> (Vec<Candidate>, FilterTrace) {
        let mut trace = FilterTrace::default();

        let matched = registry.with_capability(capability);
        trace.capability = matched.len();

        let healthy: Vec<&String> = matched
            .iter()
            .filter(|id| health.is_healthy(id.as_str()))
            .collect();
        trace.healthy = healthy.len();

        let priced: Vec<&String> = match pricing_preference {
            Some(tier) => {
                let tier_members = registry.with_pricing_tier(tier);
                healthy
                    .into_iter()
                    .filter(|id| tier_members.contains(*id))
                    .collect()
            }
            None => healthy,
        };
        trace.pricing = priced.len();

        let in_budget: Vec<&String> = priced
            .into_iter()
            .filter(|id| limiter.within_budget(id.as_str()))
            .collect();
        trace.within_budget = in_budget.len();

        let candidates: Vec<Candidate> = in_budget
            .into_iter()
            .filter_map(|id| {
                let agent = registry.get(id)?;
                if agent.is_shadow {
                    return None;
                }
                Some(Candidate {
                    agent_id: id.clone(),
                    pricing_tier: agent.pricing_tier,
                    load: limiter.load(id),
                    latency_ms: health.latency_ms(id),
                })
            })
            .collect();
        trace.production = candidates.len();

        debug!(
            capability = %capability,
            matched = trace.capability,
            healthy = trace.healthy,
            priced = trace.pricing,
            within_budget = trace.within_budget,
            eligible = trace.production,
            "Candidate filtering complete"
        );

        (candidates, trace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentDescriptor, AgentRegistry};
    use crate::health::{HealthStatus, HealthTracker};
    use crate::routing::rate_limiter::{RateBudget, RateLimiter};
    use serde_json::json;

    struct Fixture {
        registry: AgentRegistry,
        health: HealthTracker,
        limiter: RateLimiter,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                registry: AgentRegistry::new(),
                health: HealthTracker::new(),
                limiter: RateLimiter::default(),
            }
        }

        fn add(&self, descriptor: AgentDescriptor) {
            self.health.track(&descriptor.agent_id);
            self.limiter.track(
                &descriptor.agent_id,
                RateBudget {
                    max_tokens_per_min: descriptor.max_tokens_per_min,
                    max_requests_per_min: descriptor.max_requests_per_min,
                },
            );
            self.registry.register(descriptor);
        }

        fn select(&self, capability: &str, tier: Option<PricingTier>) -> Vec<String> {
            let registry = self.registry.read();
            let health = self.health.read();
            let limiter = self.limiter.lock();
            CandidateSelector::new()
                .select(&registry, &health, &limiter, capability, tier)
                .0
                .into_iter()
                .map(|c| c.agent_id)
                .collect()
        }
    }

    fn agent(id: &str, capability: &str) -> AgentDescriptor {
        AgentDescriptor::new(id, vec![capability.to_string()])
    }

    #[test]
    fn test_capability_based_selection() {
        let fixture = Fixture::new();
        fixture.add(agent("email-processor", "email"));
        fixture.add(agent("calendar-processor", "calendar"));

        assert_eq!(fixture.select("calendar", None), vec!["calendar-processor"]);
    }

    #[test]
    fn test_capability_not_found() {
        let fixture = Fixture::new();
        fixture.add(agent("email-processor", "email"));

        assert!(fixture.select("nonexistent", None).is_empty());
    }

    #[test]
    fn test_unhealthy_and_degraded_agents_excluded() {
        let fixture = Fixture::new();
        fixture.add(agent("ok", "email"));
        fixture.add(agent("slow", "email"));
        fixture.add(agent("down", "email"));
        fixture.health.update("slow", HealthStatus::Degraded, 900, None);
        fixture.health.update("down", HealthStatus::Unhealthy, 0, Some("503"));

        assert_eq!(fixture.select("email", None), vec!["ok"]);
    }

    #[test]
    fn test_pricing_preference_filters() {
        let fixture = Fixture::new();
        fixture.add(agent("cheap", "code").with_pricing_tier(PricingTier::Economy));
        fixture.add(agent("pricey", "code").with_pricing_tier(PricingTier::Premium));

        assert_eq!(
            fixture.select("code", Some(PricingTier::Premium)),
            vec!["pricey"]
        );
        assert!(fixture.select("code", Some(PricingTier::Standard)).is_empty());
    }

    #[test]
    fn test_exhausted_agents_excluded() {
        let fixture = Fixture::new();
        fixture.add(agent("tiny", "code").with_max_requests_per_min(1));
        fixture.add(agent("roomy", "code"));
        fixture.limiter.try_acquire("tiny", &json!({}));

        assert_eq!(fixture.select("code", None), vec!["roomy"]);
    }

    #[test]
    fn test_shadow_agents_never_candidates() {
        let fixture = Fixture::new();
        fixture.add(agent("prod", "chat"));
        fixture.add(agent("shadow", "chat").as_shadow());

        assert_eq!(fixture.select("chat", None), vec!["prod"]);
    }

    #[test]
    fn test_trace_counts_each_stage() {
        let fixture = Fixture::new();
        fixture.add(agent("a", "code").with_pricing_tier(PricingTier::Economy));
        fixture.add(agent("b", "code").with_pricing_tier(PricingTier::Economy));
        fixture.add(agent("c", "code"));
        fixture.add(agent("d", "code").with_pricing_tier(PricingTier::Economy).as_shadow());
        fixture.health.update("b", HealthStatus::Unhealthy, 0, Some("down"));

        let registry = fixture.registry.read();
        let health = fixture.health.read();
        let limiter = fixture.limiter.lock();
        let (candidates, trace) = CandidateSelector::new().select(
            &registry,
            &health,
            &limiter,
            "code",
            Some(PricingTier::Economy),
        );

        assert_eq!(
            trace,
            FilterTrace {
                capability: 4,
                healthy: 3,
                pricing: 2,
                within_budget: 2,
                production: 1,
            }
        );
        assert_eq!(candidates[0].agent_id, "a");
        assert_eq!(candidates[0].pricing_tier, PricingTier::Economy);
    }
}
