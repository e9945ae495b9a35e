//! Backend agent descriptors and the capability registry

pub mod descriptor;
pub mod registry;

pub use descriptor::{
    validate_agent_id, AgentDescriptor, PricingTier, DEFAULT_MAX_REQUESTS_PER_MIN,
    DEFAULT_MAX_TOKENS_PER_MIN,
};
pub use registry::{AgentRegistry, RegisteredAgent, RegistryView};
