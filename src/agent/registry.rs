//! Agent Registry
//!
//! Arena of agent descriptors keyed by id, with capability and pricing indices
//! maintained incrementally on every registration and removal. All access goes
//! through a single read-mostly lock.

use super::descriptor::{AgentDescriptor, PricingTier};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// A descriptor together with its registration time
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredAgent {
    pub descriptor: AgentDescriptor,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct RegistryState {
    agents: HashMap<String, RegisteredAgent>,
    /// Lowercased capability -> agent ids, in registration order
    capability_index: HashMap<String, Vec<String>>,
    pricing_index: HashMap<PricingTier, Vec<String>>,
}

impl RegistryState {
    fn unindex(&mut self, agent_id: &str) {
        self.capability_index.retain(|_, ids| {
            ids.retain(|id| id != agent_id);
            !ids.is_empty()
        });
        self.pricing_index.retain(|_, ids| {
            ids.retain(|id| id != agent_id);
            !ids.is_empty()
        });
    }

    fn index(&mut self, descriptor: &AgentDescriptor) {
        for capability in &descriptor.capabilities {
            let ids = self
                .capability_index
                .entry(capability.to_lowercase())
                .or_default();
            // Guard against the same capability listed twice on one descriptor
            if !ids.iter().any(|id| id == &descriptor.agent_id) {
                ids.push(descriptor.agent_id.clone());
            }
        }
        self.pricing_index
            .entry(descriptor.pricing_tier)
            .or_default()
            .push(descriptor.agent_id.clone());
    }
}

/// Thread-safe registry of backend agents
#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    state: Arc<RwLock<RegistryState>>,
}

impl AgentRegistry {
    /// Create a new empty agent registry
    pub fn new() -> Self {
        Self::default()
    }

    fn read_state(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register or overwrite an agent.
    ///
    /// Existing index entries for the id are cleared before re-inserting, so a
    /// re-registration that drops a capability or changes tier takes effect
    /// immediately and never leaves duplicates behind. Returns `true` if the
    /// agent was new.
    pub fn register(&self, descriptor: AgentDescriptor) -> bool {
        let agent_id = descriptor.agent_id.clone();
        let mut state = self.write_state();

        let is_new = !state.agents.contains_key(&agent_id);
        if !is_new {
            state.unindex(&agent_id);
        }
        state.index(&descriptor);
        state.agents.insert(
            agent_id.clone(),
            RegisteredAgent {
                descriptor,
                registered_at: Utc::now(),
            },
        );

        if is_new {
            info!(agent_id = %agent_id, "Registered new agent");
        } else {
            debug!(agent_id = %agent_id, "Re-registered agent");
        }

        is_new
    }

    /// Remove an agent and all of its index entries
    pub fn deregister(&self, agent_id: &str) -> Option<AgentDescriptor> {
        let mut state = self.write_state();
        let removed = state.agents.remove(agent_id)?;
        state.unindex(agent_id);

        info!(agent_id = %agent_id, "Deregistered agent");
        Some(removed.descriptor)
    }

    /// Get agent descriptor by ID
    pub fn get(&self, agent_id: &str) -> Option<AgentDescriptor> {
        self.read_state()
            .agents
            .get(agent_id)
            .map(|a| a.descriptor.clone())
    }

    /// Get agent together with its registration timestamp
    pub fn get_registered(&self, agent_id: &str) -> Option<RegisteredAgent> {
        self.read_state().agents.get(agent_id).cloned()
    }

    pub fn contains(&self, agent_id: &str) -> bool {
        self.read_state().agents.contains_key(agent_id)
    }

    /// Get count of registered agents
    pub fn agent_count(&self) -> usize {
        self.read_state().agents.len()
    }

    /// All registered agent ids, sorted
    pub fn agent_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read_state().agents.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Production candidates for a capability.
    ///
    /// Ids listed under `capability`, intersected with the pricing index when a
    /// preference is given, minus shadow agents and any agent `is_healthy`
    /// rejects. Order follows the capability index.
    pub fn candidates_for<F>(
        &self,
        capability: &str,
        pricing_preference: Option<PricingTier>,
        is_healthy: F,
    ) -> Vec<String>
    where
        F: Fn(&str) -> bool,
    {
        self.read().candidates_for(capability, pricing_preference, is_healthy)
    }

    /// Shadow agents registered under a capability, in index order
    pub fn shadow_agents_for(&self, capability: &str) -> Vec<String> {
        self.read().shadow_agents_for(capability)
    }

    /// Hold the registry read lock for a multi-step decision
    pub fn read(&self) -> RegistryView<'_> {
        RegistryView {
            state: self.read_state(),
        }
    }

    /// Remove all agents (for testing)
    #[cfg(test)]
    pub fn clear(&self) {
        let mut state = self.write_state();
        state.agents.clear();
        state.capability_index.clear();
        state.pricing_index.clear();
    }

    /// Number of index entries for a capability (for verifying index hygiene)
    #[doc(hidden)]
    pub fn capability_index_len(&self, capability: &str) -> usize {
        self.read_state()
            .capability_index
            .get(&capability.to_lowercase())
            .map_or(0, Vec::len)
    }

    /// Number of index entries for a pricing tier (for verifying index hygiene)
    #[doc(hidden)]
    pub fn pricing_index_len(&self, tier: PricingTier) -> usize {
        self.read_state()
            .pricing_index
            .get(&tier)
            .map_or(0, Vec::len)
    }
}

/// Read-locked view of the registry
pub struct RegistryView<'a> {
    state: RwLockReadGuard<'a, RegistryState>,
}

impl RegistryView<'_> {
    pub fn get(&self, agent_id: &str) -> Option<&AgentDescriptor> {
        self.state.agents.get(agent_id).map(|a| &a.descriptor)
    }

    pub fn agent_ids(&self) -> impl Iterator<Item = &String> {
        self.state.agents.keys()
    }

    /// Ids indexed under a capability, in registration order
    pub fn with_capability(&self, capability: &str) -> &[String] {
        self.state
            .capability_index
            .get(&capability.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn with_pricing_tier(&self, tier: PricingTier) -> &[String] {
        self.state
            .pricing_index
            .get(&tier)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn candidates_for<F>(
        &self,
        capability: &str,
        pricing_preference: Option<PricingTier>,
        is_healthy: F,
    ) -> Vec<String>
    where
        F: Fn(&str) -> bool,
    {
        let tier_members = pricing_preference.map(|tier| self.with_pricing_tier(tier));

        self.with_capability(capability)
            .iter()
            .filter(|id| tier_members.map_or(true, |members| members.contains(*id)))
            .filter(|id| is_healthy(id.as_str()))
            .filter(|id| self.get(id.as_str()).is_some_and(|agent| !agent.is_shadow))
            .cloned()
            .collect()
    }

    pub fn shadow_agents_for(&self, capability: &str) -> Vec<String> {
        self.with_capability(capability)
            .iter()
            .filter(|id| self.get(id.as_str()).is_some_and(|agent| agent.is_shadow))
            .cloned()
            .collect()
    }
}
