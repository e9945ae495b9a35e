//! Thread-safe metrics collection
//!
//! Atomic counters for the hot routing path and mutex-protected maps for the
//! per-agent breakdown. Each router owns its own collector so independent
//! routers (and tests) never share counts.

use crate::routing::strategy::Strategy;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Routing and shadow-testing counters
#[derive(Debug, Default)]
pub struct RouterMetrics {
    // Routing (atomic for high frequency)
    routes_attempted: AtomicU64,
    routes_succeeded: AtomicU64,
    routes_no_agent: AtomicU64,
    routes_unknown_strategy: AtomicU64,
    balanced_selections: AtomicU64,
    cost_selections: AtomicU64,
    performance_selections: AtomicU64,
    tokens_estimated: AtomicU64,

    // Health reports
    health_reports: AtomicU64,
    health_reports_unknown: AtomicU64,

    // Shadow testing
    shadow_dispatched: AtomicU64,
    shadow_skipped: AtomicU64,
    shadow_matched: AtomicU64,
    shadow_mismatched: AtomicU64,
    shadow_failed: AtomicU64,
    shadow_expired: AtomicU64,
    shadow_evicted: AtomicU64,

    // Per-agent selections (mutex protected for map updates)
    selections_by_agent: Mutex<HashMap<String, u64>>,
}

impl RouterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route_attempted(&self) {
        self.routes_attempted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn route_succeeded(&self, strategy: Strategy, agent_id: &str, tokens: u64) {
        self.routes_succeeded.fetch_add(1, Ordering::Relaxed);
        self.tokens_estimated.fetch_add(tokens, Ordering::Relaxed);

        let counter = match strategy {
            Strategy::Balanced => &self.balanced_selections,
            Strategy::Cost => &self.cost_selections,
            Strategy::Performance => &self.performance_selections,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        let mut by_agent = self
            .selections_by_agent
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *by_agent.entry(agent_id.to_string()).or_insert(0) += 1;
    }

    pub fn route_no_agent(&self) {
        self.routes_no_agent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn route_unknown_strategy(&self) {
        self.routes_unknown_strategy.fetch_add(1, Ordering::Relaxed);
    }

    pub fn health_report(&self, known_agent: bool) {
        self.health_reports.fetch_add(1, Ordering::Relaxed);
        if !known_agent {
            self.health_reports_unknown.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn shadow_dispatched(&self) {
        self.shadow_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn shadow_skipped(&self) {
        self.shadow_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn shadow_completed(&self, matched: bool) {
        if matched {
            self.shadow_matched.fetch_add(1, Ordering::Relaxed);
        } else {
            self.shadow_mismatched.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn shadow_failed(&self) {
        self.shadow_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn shadow_expired(&self, count: u64) {
        self.shadow_expired.fetch_add(count, Ordering::Relaxed);
    }

    pub fn shadow_evicted(&self, count: u64) {
        self.shadow_evicted.fetch_add(count, Ordering::Relaxed);
    }

    /// Get a point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        let selections_by_agent = self
            .selections_by_agent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        MetricsSnapshot {
            routing: RoutingMetrics {
                attempted: self.routes_attempted.load(Ordering::Relaxed),
                succeeded: self.routes_succeeded.load(Ordering::Relaxed),
                no_available_agent: self.routes_no_agent.load(Ordering::Relaxed),
                unknown_strategy: self.routes_unknown_strategy.load(Ordering::Relaxed),
                balanced: self.balanced_selections.load(Ordering::Relaxed),
                cost: self.cost_selections.load(Ordering::Relaxed),
                performance: self.performance_selections.load(Ordering::Relaxed),
                tokens_estimated: self.tokens_estimated.load(Ordering::Relaxed),
                selections_by_agent,
            },
            health: HealthReportMetrics {
                reports: self.health_reports.load(Ordering::Relaxed),
                unknown_agent_reports: self.health_reports_unknown.load(Ordering::Relaxed),
            },
            shadow: ShadowMetrics {
                dispatched: self.shadow_dispatched.load(Ordering::Relaxed),
                skipped: self.shadow_skipped.load(Ordering::Relaxed),
                matched: self.shadow_matched.load(Ordering::Relaxed),
                mismatched: self.shadow_mismatched.load(Ordering::Relaxed),
                failed: self.shadow_failed.load(Ordering::Relaxed),
                expired: self.shadow_expired.load(Ordering::Relaxed),
                evicted: self.shadow_evicted.load(Ordering::Relaxed),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricsSnapshot {
    pub routing: RoutingMetrics,
    pub health: HealthReportMetrics,
    pub shadow: ShadowMetrics,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RoutingMetrics {
    pub attempted: u64,
    pub succeeded: u64,
    pub no_available_agent: u64,
    pub unknown_strategy: u64,
    pub balanced: u64,
    pub cost: u64,
    pub performance: u64,
    pub tokens_estimated: u64,
    pub selections_by_agent: HashMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HealthReportMetrics {
    pub reports: u64,
    pub unknown_agent_reports: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ShadowMetrics {
    pub dispatched: u64,
    pub skipped: u64,
    pub matched: u64,
    pub mismatched: u64,
    pub failed: u64,
    pub expired: u64,
    pub evicted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_counters() {
        let metrics = RouterMetrics::new();
        metrics.route_attempted();
        metrics.route_attempted();
        metrics.route_attempted();
        metrics.route_succeeded(Strategy::Cost, "cheap", 12);
        metrics.route_succeeded(Strategy::Balanced, "cheap", 3);
        metrics.route_no_agent();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.routing.attempted, 3);
        assert_eq!(snapshot.routing.succeeded, 2);
        assert_eq!(snapshot.routing.no_available_agent, 1);
        assert_eq!(snapshot.routing.cost, 1);
        assert_eq!(snapshot.routing.balanced, 1);
        assert_eq!(snapshot.routing.performance, 0);
        assert_eq!(snapshot.routing.tokens_estimated, 15);
        assert_eq!(snapshot.routing.selections_by_agent.get("cheap"), Some(&2));
    }

    #[test]
    fn test_shadow_counters() {
        let metrics = RouterMetrics::new();
        metrics.shadow_dispatched();
        metrics.shadow_completed(true);
        metrics.shadow_completed(false);
        metrics.shadow_expired(3);
        metrics.shadow_evicted(2);
        metrics.shadow_failed();
        metrics.shadow_skipped();

        let shadow = metrics.snapshot().shadow;
        assert_eq!(shadow.dispatched, 1);
        assert_eq!(shadow.matched, 1);
        assert_eq!(shadow.mismatched, 1);
        assert_eq!(shadow.expired, 3);
        assert_eq!(shadow.evicted, 2);
        assert_eq!(shadow.failed, 1);
        assert_eq!(shadow.skipped, 1);
    }

    #[test]
    fn test_health_report_counters() {
        let metrics = RouterMetrics::new();
        metrics.health_report(true);
        metrics.health_report(false);

        let health = metrics.snapshot().health;
        assert_eq!(health.reports, 2);
        assert_eq!(health.unknown_agent_reports, 1);
    }

    #[test]
    fn test_snapshot_serializes() {
        let json = serde_json::to_value(RouterMetrics::new().snapshot()).unwrap();
        assert_eq!(json["routing"]["attempted"], 0);
        assert_eq!(json["shadow"]["dispatched"], 0);
    }
}
