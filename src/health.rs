//! Backend health tracking
//!
//! Callers report the outcome of each backend call; the router reads the
//! resulting status on every routing decision. Health is allowed to lag
//! slightly behind reality, so records sit behind a read-mostly lock.

use crate::error::sanitize_error_message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

/// Health status of a backend agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    #[default]
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HealthStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "healthy" => Ok(HealthStatus::Healthy),
            "degraded" => Ok(HealthStatus::Degraded),
            "unhealthy" => Ok(HealthStatus::Unhealthy),
            other => Err(format!("unknown health status '{other}'")),
        }
    }
}

/// Latest health observation for one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub status: HealthStatus,
    pub last_check: DateTime<Utc>,
    pub latency_ms: u64,
    pub error_count: u64,
    pub last_error: Option<String>,
}

impl HealthRecord {
    /// Record for a freshly registered agent: healthy, no latency observed yet
    pub fn initial() -> Self {
        Self {
            status: HealthStatus::Healthy,
            last_check: Utc::now(),
            latency_ms: 0,
            error_count: 0,
            last_error: None,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }

    /// Apply one health report
    fn apply(&mut self, status: HealthStatus, latency_ms: u64, error: Option<&str>) {
        self.status = status;
        self.latency_ms = latency_ms;
        self.last_check = Utc::now();

        match error {
            None => self.error_count = 0,
            Some(message) => {
                self.error_count += 1;
                self.last_error = Some(sanitize_error_message(message));
            }
        }
    }
}

/// Thread-safe table of health records keyed by agent id
#[derive(Debug, Clone, Default)]
pub struct HealthTracker {
    records: Arc<RwLock<HashMap<String, HealthRecord>>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_records(&self) -> RwLockReadGuard<'_, HashMap<String, HealthRecord>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_records(&self) -> RwLockWriteGuard<'_, HashMap<String, HealthRecord>> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start tracking an agent. An existing record is kept so that
    /// re-registration does not erase observed health.
    pub fn track(&self, agent_id: &str) {
        self.write_records()
            .entry(agent_id.to_string())
            .or_insert_with(HealthRecord::initial);
    }

    /// Stop tracking an agent
    pub fn forget(&self, agent_id: &str) -> Option<HealthRecord> {
        self.write_records().remove(agent_id)
    }

    /// Apply a health report. Returns `false` if the agent is not tracked, in
    /// which case the report is dropped.
    pub fn update(
        &self,
        agent_id: &str,
        status: HealthStatus,
        latency_ms: u64,
        error: Option<&str>,
    ) -> bool {
        let mut records = self.write_records();
        let Some(record) = records.get_mut(agent_id) else {
            warn!(agent_id = %agent_id, status = %status, "Health report for unknown agent ignored");
            return false;
        };

        record.apply(status, latency_ms, error);

        if error.is_some() {
            debug!(
                agent_id = %agent_id,
                status = %status,
                error_count = record.error_count,
                "Health report with error"
            );
        } else {
            debug!(agent_id = %agent_id, status = %status, latency_ms, "Health report");
        }

        true
    }

    pub fn get(&self, agent_id: &str) -> Option<HealthRecord> {
        self.read_records().get(agent_id).cloned()
    }

    /// Whether the agent is tracked and currently healthy
    pub fn is_healthy(&self, agent_id: &str) -> bool {
        self.read_records()
            .get(agent_id)
            .is_some_and(HealthRecord::is_healthy)
    }

    /// Hold the read lock across a routing decision
    pub fn read(&self) -> HealthView<'_> {
        HealthView {
            records: self.read_records(),
        }
    }

    pub fn healthy_count(&self) -> usize {
        self.read_records().values().filter(|r| r.is_healthy()).count()
    }
}

/// Read-locked view of health records
pub struct HealthView<'a> {
    records: RwLockReadGuard<'a, HashMap<String, HealthRecord>>,
}

impl HealthView<'_> {
    pub fn is_healthy(&self, agent_id: &str) -> bool {
        self.records
            .get(agent_id)
            .is_some_and(HealthRecord::is_healthy)
    }

    /// Last observed latency; untracked agents report zero
    pub fn latency_ms(&self, agent_id: &str) -> u64 {
        self.records.get(agent_id).map_or(0, |r| r.latency_ms)
    }

    pub fn get(&self, agent_id: &str) -> Option<&HealthRecord> {
        self.records.get(agent_id)
    }
}
