//! Agent Router
//!
//! A capability-based request router for agent backends. For every request
//! that needs a named capability it decides which registered agent should
//! handle it, subject to per-agent rate budgets, health and pricing
//! constraints, and can replay the request against a shadow agent for safe
//! rollout validation.
//!
//! # Overview
//!
//! - Agent registry with incremental capability and pricing indices
//! - Per-agent token and request budgets over a sliding-start window
//! - Health tracking fed by caller reports
//! - Balanced, cost and performance strategies with seedable tie-breaking
//! - Non-blocking shadow testing with canonical, key-order-independent
//!   result comparison
//!
//! The router never calls agents itself; the caller invokes the agent named
//! in the returned [`RoutingDecision`] and reports health and results back.
//!
//! # Quick Start
//!
//! ```rust
//! use agent_router::agent::AgentDescriptor;
//! use agent_router::health::HealthStatus;
//! use agent_router::routing::{Router, RoutingRequest};
//! use serde_json::json;
//!
//! let router = Router::new();
//! router
//!     .register_agent(AgentDescriptor::new("search-a", vec!["search".to_string()]))
//!     .unwrap();
//! router
//!     .register_agent(AgentDescriptor::new("search-b", vec!["search".to_string()]))
//!     .unwrap();
//!
//! router.update_health("search-a", HealthStatus::Healthy, 40, None);
//! router.update_health("search-b", HealthStatus::Healthy, 250, None);
//!
//! let decision = router
//!     .route(
//!         &RoutingRequest::new("search")
//!             .with_payload(json!({"query": "rust async"}))
//!             .with_strategy("performance"),
//!     )
//!     .unwrap();
//! assert_eq!(decision.agent_id, "search-a");
//! ```

pub mod agent;
pub mod canonical;
pub mod config;
pub mod error;
pub mod health;
pub mod observability;
pub mod routing;
pub mod shadow;
pub mod testing;

pub use agent::{AgentDescriptor, PricingTier};
pub use config::{ConfigError, RouterConfig};
pub use error::{RouterError, RouterResult};
pub use health::HealthStatus;
pub use routing::{AgentStats, Router, RoutingDecision, RoutingRequest, Strategy};
pub use shadow::{ShadowExecutor, ShadowSummary, ShadowTestRecord, ShadowTestStatus};
