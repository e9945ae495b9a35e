//! Request routing
//!
//! ## Components
//!
//! - `rate_limiter`: per-agent token and request budgets over a sliding-start window
//! - `selector`: capability, health, pricing and budget filtering
//! - `strategy`: balanced, cost and performance selection with seeded tie-breaking
//! - `router`: the facade tying the pieces together

pub mod rate_limiter;
pub mod router;
pub mod selector;
pub mod strategy;

pub use rate_limiter::{RateBudget, RateLimiter, UsageWindow};
pub use router::{AgentStats, LoadFigures, Router, RoutingDecision, RoutingRequest};
pub use selector::{Candidate, CandidateSelector, FilterTrace};
pub use strategy::{Strategy, StrategyEngine};
