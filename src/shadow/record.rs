//! Shadow test records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Lifecycle of a shadow test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShadowTestStatus {
    /// Waiting for one or both results
    Pending,
    /// Both results compared
    Completed,
    /// Shadow execution failed or was never dispatched
    Failed,
    /// Still pending when the timeout elapsed
    Expired,
}

impl ShadowTestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShadowTestStatus::Pending => "pending",
            ShadowTestStatus::Completed => "completed",
            ShadowTestStatus::Failed => "failed",
            ShadowTestStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for ShadowTestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One shadow comparison between a production agent and a shadow agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowTestRecord {
    pub test_id: String,
    pub shadow_agent_id: String,
    pub production_agent_id: String,
    pub capability: String,
    /// Tagged clone of the production payload sent to the shadow agent
    pub request: Value,
    pub status: ShadowTestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shadow_result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub production_result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shadow_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub production_hash: Option<String>,
    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    pub matched: Option<bool>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl ShadowTestRecord {
    pub fn is_pending(&self) -> bool {
        self.status == ShadowTestStatus::Pending
    }
}

/// Aggregate view over the retained records
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ShadowSummary {
    pub total: usize,
    pub pending: usize,
    pub completed: usize,
    pub failed: usize,
    pub expired: usize,
    pub matched: usize,
    pub mismatched: usize,
    /// matched / completed, absent until something completes
    pub match_rate: Option<f64>,
}

impl ShadowSummary {
    pub(crate) fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a ShadowTestRecord>,
    {
        let mut summary = ShadowSummary::default();
        for record in records {
            summary.total += 1;
            match record.status {
                ShadowTestStatus::Pending => summary.pending += 1,
                ShadowTestStatus::Completed => summary.completed += 1,
                ShadowTestStatus::Failed => summary.failed += 1,
                ShadowTestStatus::Expired => summary.expired += 1,
            }
            match record.matched {
                Some(true) => summary.matched += 1,
                Some(false) => summary.mismatched += 1,
                None => {}
            }
        }

        if summary.completed > 0 {
            summary.match_rate = Some(summary.matched as f64 / summary.completed as f64);
        }
        summary
    }
}
