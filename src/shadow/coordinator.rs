//! Shadow test bookkeeping
//!
//! Owns every [`ShadowTestRecord`] from the moment a production decision
//! opens a comparison until it is evicted. Results may arrive together
//! through [`ShadowCoordinator::record_shadow_result`] or one side at a time
//! from the dispatcher and the caller; whichever side lands second completes
//! the record.
//!
//! Retention is a ring buffer in creation order capped at `max_records`.
//! Pending records older than the timeout are marked expired, lazily on every
//! new test and periodically by the dispatcher's sweeper.

use crate::canonical::result_hash;
use crate::config::ShadowSection;
use crate::observability::metrics::RouterMetrics;
use crate::shadow::record::{ShadowSummary, ShadowTestRecord, ShadowTestStatus};
use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Payload key marking a request as a shadow copy
pub const SHADOW_MARKER_KEY: &str = "_shadow_test";
/// Payload key carrying the production agent's id
pub const PRODUCTION_AGENT_KEY: &str = "_production_agent";
/// Payload key carrying the shadow test id
pub const SHADOW_TEST_ID_KEY: &str = "_shadow_test_id";

/// Clone a production payload and tag it for the shadow agent.
/// Non-object payloads are wrapped under `"payload"`.
pub fn tag_request(payload: &Value, production_agent_id: &str, test_id: &str) -> Value {
    let mut tagged = match payload {
        Value::Object(map) => map.clone(),
        other => {
            let mut map = Map::new();
            map.insert("payload".to_string(), other.clone());
            map
        }
    };

    tagged.insert(SHADOW_MARKER_KEY.to_string(), Value::Bool(true));
    tagged.insert(
        PRODUCTION_AGENT_KEY.to_string(),
        Value::String(production_agent_id.to_string()),
    );
    tagged.insert(
        SHADOW_TEST_ID_KEY.to_string(),
        Value::String(test_id.to_string()),
    );
    Value::Object(tagged)
}

#[derive(Debug, Default)]
struct ShadowState {
    records: HashMap<String, ShadowTestRecord>,
    /// Retention order, oldest first
    order: VecDeque<String>,
    /// Candidates for expiry, oldest first; entries that already left
    /// `pending` are skipped when reached
    pending_queue: VecDeque<(DateTime<Utc>, String)>,
}

/// Outcome of comparing both results of a test
struct Comparison {
    matched: bool,
    shadow_agent_id: String,
    production_agent_id: String,
}

impl ShadowState {
    fn expire_stale(&mut self, now: DateTime<Utc>, timeout: Duration) -> usize {
        // a timeout reaching past the earliest representable time never fires
        let Some(cutoff) = now.checked_sub_signed(timeout) else {
            return 0;
        };
        let mut expired = 0;

        while let Some((created_at, test_id)) = self.pending_queue.pop_front() {
            let Some(record) = self.records.get_mut(&test_id) else {
                continue;
            };
            if !record.is_pending() {
                continue;
            }
            if created_at > cutoff {
                self.pending_queue.push_front((created_at, test_id));
                break;
            }

            record.status = ShadowTestStatus::Expired;
            record.failure = Some(format!(
                "No result within {}s",
                timeout.num_seconds()
            ));
            expired += 1;

            warn!(
                test_id = %test_id,
                shadow_agent = %record.shadow_agent_id,
                production_agent = %record.production_agent_id,
                "Shadow test expired while pending"
            );
        }

        expired
    }

    fn evict_over(&mut self, max_records: usize) -> usize {
        let mut evicted = 0;
        while self.order.len() > max_records {
            let Some(test_id) = self.order.pop_front() else {
                break;
            };
            if let Some(record) = self.records.remove(&test_id) {
                if record.is_pending() {
                    warn!(test_id = %test_id, "Evicted shadow test before it completed");
                }
            }
            evicted += 1;
        }
        evicted
    }
}

/// Thread-safe shadow test table
#[derive(Debug, Clone)]
pub struct ShadowCoordinator {
    state: Arc<Mutex<ShadowState>>,
    max_records: usize,
    pending_timeout: Duration,
    metrics: Arc<RouterMetrics>,
}

impl ShadowCoordinator {
    pub fn new(
        max_records: usize,
        pending_timeout: std::time::Duration,
        metrics: Arc<RouterMetrics>,
    ) -> Self {
        let pending_timeout = Duration::from_std(pending_timeout)
            .unwrap_or_else(|_| Duration::seconds(i64::MAX / 1_000));

        Self {
            state: Arc::new(Mutex::new(ShadowState::default())),
            max_records: max_records.max(1),
            pending_timeout,
            metrics,
        }
    }

    pub fn from_config(config: &ShadowSection, metrics: Arc<RouterMetrics>) -> Self {
        Self::new(config.max_records, config.pending_timeout(), metrics)
    }

    fn lock(&self) -> MutexGuard<'_, ShadowState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn max_records(&self) -> usize {
        self.max_records
    }

    /// Create a pending record for a shadow comparison and return a copy
    pub fn open(
        &self,
        shadow_agent_id: &str,
        production_agent_id: &str,
        capability: &str,
        payload: &Value,
    ) -> ShadowTestRecord {
        self.open_at(
            shadow_agent_id,
            production_agent_id,
            capability,
            payload,
            Utc::now(),
        )
    }

    pub fn open_at(
        &self,
        shadow_agent_id: &str,
        production_agent_id: &str,
        capability: &str,
        payload: &Value,
        now: DateTime<Utc>,
    ) -> ShadowTestRecord {
        let test_id = Uuid::new_v4().to_string();
        let record = ShadowTestRecord {
            test_id: test_id.clone(),
            shadow_agent_id: shadow_agent_id.to_string(),
            production_agent_id: production_agent_id.to_string(),
            capability: capability.to_string(),
            request: tag_request(payload, production_agent_id, &test_id),
            status: ShadowTestStatus::Pending,
            shadow_result: None,
            production_result: None,
            shadow_hash: None,
            production_hash: None,
            matched: None,
            created_at: now,
            completed_at: None,
            failure: None,
        };

        let (expired, evicted) = {
            let mut state = self.lock();
            let expired = state.expire_stale(now, self.pending_timeout);

            state.records.insert(test_id.clone(), record.clone());
            state.order.push_back(test_id.clone());
            state.pending_queue.push_back((now, test_id.clone()));

            let evicted = state.evict_over(self.max_records);
            (expired, evicted)
        };

        if expired > 0 {
            self.metrics.shadow_expired(expired as u64);
        }
        if evicted > 0 {
            self.metrics.shadow_evicted(evicted as u64);
            debug!(evicted, "Evicted oldest shadow test records");
        }

        debug!(
            test_id = %test_id,
            shadow_agent = %shadow_agent_id,
            production_agent = %production_agent_id,
            capability = %capability,
            "Opened shadow test"
        );

        record
    }

    /// Complete a test with both results at once. Any known record is
    /// (re)compared, whatever its status. Returns the match outcome, or
    /// `None` for an unknown test id.
    pub fn record_shadow_result(
        &self,
        test_id: &str,
        shadow_result: Value,
        production_result: Value,
    ) -> Option<bool> {
        let comparison = {
            let mut state = self.lock();
            let Some(record) = state.records.get_mut(test_id) else {
                warn!(test_id = %test_id, "Shadow result for unknown test ignored");
                return None;
            };
            let was_pending = record.is_pending();
            record.shadow_result = Some(shadow_result);
            record.production_result = Some(production_result);
            complete(record, Utc::now()).map(|c| (c, was_pending))
        };

        // only the first settlement of a record is counted
        comparison.map(|(c, was_pending)| self.report(test_id, c, was_pending))
    }

    /// Attach the production side. Completes the record if the shadow side
    /// is already present.
    pub fn record_production_result(&self, test_id: &str, production_result: Value) -> Option<bool> {
        self.attach(test_id, Side::Production, production_result)
    }

    /// Attach the shadow side, as reported by the dispatcher
    pub fn attach_shadow_result(&self, test_id: &str, shadow_result: Value) -> Option<bool> {
        self.attach(test_id, Side::Shadow, shadow_result)
    }

    fn attach(&self, test_id: &str, side: Side, result: Value) -> Option<bool> {
        let comparison = {
            let mut state = self.lock();
            let Some(record) = state.records.get_mut(test_id) else {
                warn!(test_id = %test_id, side = side.as_str(), "Result for unknown shadow test ignored");
                return None;
            };
            if !record.is_pending() {
                debug!(
                    test_id = %test_id,
                    side = side.as_str(),
                    status = %record.status,
                    "Late result for settled shadow test ignored"
                );
                return None;
            }

            match side {
                Side::Shadow => record.shadow_result = Some(result),
                Side::Production => record.production_result = Some(result),
            }
            complete(record, Utc::now())
        };

        comparison.map(|c| self.report(test_id, c, true))
    }

    /// Mark a pending test failed. Returns `false` if it is unknown or
    /// already settled.
    pub fn mark_failed(&self, test_id: &str, reason: &str) -> bool {
        {
            let mut state = self.lock();
            let Some(record) = state.records.get_mut(test_id) else {
                return false;
            };
            if !record.is_pending() {
                return false;
            }
            record.status = ShadowTestStatus::Failed;
            record.failure = Some(crate::error::sanitize_error_message(reason));
            record.completed_at = Some(Utc::now());
        }

        self.metrics.shadow_failed();
        warn!(test_id = %test_id, reason = %reason, "Shadow test failed");
        true
    }

    /// Expire pending records older than the timeout
    pub fn expire_stale(&self) -> usize {
        self.expire_stale_at(Utc::now())
    }

    pub fn expire_stale_at(&self, now: DateTime<Utc>) -> usize {
        let expired = self.lock().expire_stale(now, self.pending_timeout);
        if expired > 0 {
            self.metrics.shadow_expired(expired as u64);
        }
        expired
    }

    pub fn get(&self, test_id: &str) -> Option<ShadowTestRecord> {
        self.lock().records.get(test_id).cloned()
    }

    /// All retained records, oldest first
    pub fn records(&self) -> Vec<ShadowTestRecord> {
        let state = self.lock();
        state
            .order
            .iter()
            .filter_map(|id| state.records.get(id))
            .cloned()
            .collect()
    }

    /// Pending records, oldest first
    pub fn pending(&self) -> Vec<ShadowTestRecord> {
        let state = self.lock();
        state
            .order
            .iter()
            .filter_map(|id| state.records.get(id))
            .filter(|r| r.is_pending())
            .cloned()
            .collect()
    }

    pub fn summary(&self) -> ShadowSummary {
        ShadowSummary::from_records(self.lock().records.values())
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn report(&self, test_id: &str, comparison: Comparison, count: bool) -> bool {
        if count {
            self.metrics.shadow_completed(comparison.matched);
        }

        if comparison.matched {
            info!(
                test_id = %test_id,
                shadow_agent = %comparison.shadow_agent_id,
                production_agent = %comparison.production_agent_id,
                "Shadow test matched production"
            );
        } else {
            warn!(
                test_id = %test_id,
                shadow_agent = %comparison.shadow_agent_id,
                production_agent = %comparison.production_agent_id,
                "Shadow test result differs from production"
            );
        }
        comparison.matched
    }
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Shadow,
    Production,
}

impl Side {
    fn as_str(self) -> &'static str {
        match self {
            Side::Shadow => "shadow",
            Side::Production => "production",
        }
    }
}

/// Hash both results and settle the record, if both are present
fn complete(record: &mut ShadowTestRecord, now: DateTime<Utc>) -> Option<Comparison> {
    let (Some(shadow), Some(production)) = (&record.shadow_result, &record.production_result)
    else {
        return None;
    };

    let shadow_hash = result_hash(shadow);
    let production_hash = result_hash(production);
    let matched = shadow_hash == production_hash;

    record.shadow_hash = Some(shadow_hash);
    record.production_hash = Some(production_hash);
    record.matched = Some(matched);
    record.status = ShadowTestStatus::Completed;
    record.completed_at = Some(now);
    record.failure = None;

    Some(Comparison {
        matched,
        shadow_agent_id: record.shadow_agent_id.clone(),
        production_agent_id: record.production_agent_id.clone(),
    })
}
