//! Per-agent rate budgets
//!
//! Each agent owns a usage window that starts with the first request after the
//! previous window expired (sliding-start reset), rather than on fixed
//! wall-clock minute boundaries. Resets happen lazily on the routing path; no
//! background task ticks the windows.
//!
//! The whole limiter sits behind one mutex. Routing holds it from the budget
//! check through consumption, so two concurrent decisions can never both
//! claim the last unit of an agent's capacity.

use crate::canonical::{estimate_tokens, DEFAULT_CHARS_PER_TOKEN};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// Default rate window length in seconds
pub const DEFAULT_WINDOW_SECS: u64 = 60;

/// Hard per-window caps for one agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateBudget {
    pub max_tokens_per_min: u64,
    pub max_requests_per_min: u64,
}

/// Live counters for one agent's current window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageWindow {
    pub current_tokens_per_min: u64,
    pub current_requests_per_min: u64,
    pub window_start: DateTime<Utc>,
    pub budget: RateBudget,
}

impl UsageWindow {
    fn new(budget: RateBudget, now: DateTime<Utc>) -> Self {
        Self {
            current_tokens_per_min: 0,
            current_requests_per_min: 0,
            window_start: now,
            budget,
        }
    }

    pub fn within_budget(&self) -> bool {
        self.current_tokens_per_min < self.budget.max_tokens_per_min
            && self.current_requests_per_min < self.budget.max_requests_per_min
    }

    /// Request load in [0, 1+]; an agent with no request capacity reports zero
    pub fn load(&self) -> f64 {
        if self.budget.max_requests_per_min == 0 {
            0.0
        } else {
            self.current_requests_per_min as f64 / self.budget.max_requests_per_min as f64
        }
    }

    fn is_expired(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now.signed_duration_since(self.window_start) > window
    }

    fn reset(&mut self, now: DateTime<Utc>) {
        self.current_tokens_per_min = 0;
        self.current_requests_per_min = 0;
        self.window_start = now;
    }
}

#[derive(Debug)]
struct LimiterState {
    windows: HashMap<String, UsageWindow>,
}

/// Thread-safe per-agent rate limiter
#[derive(Debug, Clone)]
pub struct RateLimiter {
    state: Arc<Mutex<LimiterState>>,
    window: Duration,
    chars_per_token: u64,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SECS, DEFAULT_CHARS_PER_TOKEN)
    }
}

impl RateLimiter {
    pub fn new(window_secs: u64, chars_per_token: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(LimiterState {
                windows: HashMap::new(),
            })),
            window: Duration::seconds(
                i64::try_from(window_secs)
                    .unwrap_or(i64::MAX)
                    .min(i64::MAX / 1_000),
            ),
            chars_per_token: chars_per_token.max(1),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Start (or restart) tracking an agent with a fresh window
    pub fn track(&self, agent_id: &str, budget: RateBudget) {
        self.lock()
            .state
            .windows
            .insert(agent_id.to_string(), UsageWindow::new(budget, Utc::now()));
    }

    pub fn forget(&self, agent_id: &str) {
        self.lock().state.windows.remove(agent_id);
    }

    /// Take the limiter lock for a check-then-consume critical section
    pub fn lock(&self) -> RateLimiterGuard<'_> {
        RateLimiterGuard {
            state: self.state.lock().unwrap_or_else(PoisonError::into_inner),
            window: self.window,
            chars_per_token: self.chars_per_token,
        }
    }

    /// Current usage for an agent, with an expired window reset first
    pub fn usage(&self, agent_id: &str) -> Option<UsageWindow> {
        self.usage_at(agent_id, Utc::now())
    }

    pub fn usage_at(&self, agent_id: &str, now: DateTime<Utc>) -> Option<UsageWindow> {
        let mut guard = self.lock();
        guard.reset_if_expired(agent_id, now);
        guard.usage(agent_id).cloned()
    }

    /// Atomically check one agent's budget and consume it for `payload`.
    /// Returns the estimated tokens charged, or `None` if over budget.
    pub fn try_acquire(&self, agent_id: &str, payload: &Value) -> Option<u64> {
        self.try_acquire_at(agent_id, payload, Utc::now())
    }

    pub fn try_acquire_at(
        &self,
        agent_id: &str,
        payload: &Value,
        now: DateTime<Utc>,
    ) -> Option<u64> {
        let mut guard = self.lock();
        guard.reset_if_expired(agent_id, now);
        if !guard.within_budget(agent_id) {
            return None;
        }
        guard.consume(agent_id, payload)
    }
}

/// Exclusive access to every agent's usage window
pub struct RateLimiterGuard<'a> {
    state: MutexGuard<'a, LimiterState>,
    window: Duration,
    chars_per_token: u64,
}

impl RateLimiterGuard<'_> {
    /// Zero an agent's counters if its window has run out
    pub fn reset_if_expired(&mut self, agent_id: &str, now: DateTime<Utc>) -> bool {
        let window = self.window;
        match self.state.windows.get_mut(agent_id) {
            Some(usage) if usage.is_expired(now, window) => {
                trace!(agent_id = %agent_id, "Rate window expired, resetting");
                usage.reset(now);
                true
            }
            _ => false,
        }
    }

    /// Lazily reset every expired window; returns how many were reset
    pub fn reset_all_expired(&mut self, now: DateTime<Utc>) -> usize {
        let window = self.window;
        let mut reset = 0;
        for usage in self.state.windows.values_mut() {
            if usage.is_expired(now, window) {
                usage.reset(now);
                reset += 1;
            }
        }
        if reset > 0 {
            debug!(reset, "Reset expired rate windows");
        }
        reset
    }

    /// Untracked agents have no budget
    pub fn within_budget(&self, agent_id: &str) -> bool {
        self.state
            .windows
            .get(agent_id)
            .is_some_and(UsageWindow::within_budget)
    }

    pub fn load(&self, agent_id: &str) -> f64 {
        self.state.windows.get(agent_id).map_or(0.0, UsageWindow::load)
    }

    pub fn usage(&self, agent_id: &str) -> Option<&UsageWindow> {
        self.state.windows.get(agent_id)
    }

    /// Charge one request and its estimated tokens. Returns the token estimate,
    /// or `None` for an untracked agent.
    pub fn consume(&mut self, agent_id: &str, payload: &Value) -> Option<u64> {
        let tokens = estimate_tokens(payload, self.chars_per_token);
        let usage = self.state.windows.get_mut(agent_id)?;
        usage.current_tokens_per_min = usage.current_tokens_per_min.saturating_add(tokens);
        usage.current_requests_per_min = usage.current_requests_per_min.saturating_add(1);

        trace!(
            agent_id = %agent_id,
            tokens,
            requests = usage.current_requests_per_min,
            "Consumed rate budget"
        );
        Some(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;

    fn budget(tokens: u64, requests: u64) -> RateBudget {
        RateBudget {
            max_tokens_per_min: tokens,
            max_requests_per_min: requests,
        }
    }

    #[test]
    fn test_consume_counts_requests_and_tokens() {
        let limiter = RateLimiter::default();
        limiter.track("coder", budget(1_000, 10));

        // {"prompt":"abcdefgh"} is 21 characters -> 5 tokens
        let tokens = limiter.try_acquire("coder", &json!({"prompt": "abcdefgh"}));
        assert_eq!(tokens, Some(5));

        let usage = limiter.usage("coder").unwrap();
        assert_eq!(usage.current_requests_per_min, 1);
        assert_eq!(usage.current_tokens_per_min, 5);
    }

    #[test]
    fn test_request_budget_is_a_hard_cap() {
        let limiter = RateLimiter::default();
        limiter.track("coder", budget(1_000_000, 2));

        assert!(limiter.try_acquire("coder", &json!({})).is_some());
        assert!(limiter.try_acquire("coder", &json!({})).is_some());
        assert!(limiter.try_acquire("coder", &json!({})).is_none());
        assert_eq!(limiter.usage("coder").unwrap().current_requests_per_min, 2);
    }

    #[test]
    fn test_token_budget_blocks_once_reached() {
        let limiter = RateLimiter::default();
        limiter.track("coder", budget(5, 100));

        // A single large request may overshoot; the next one is refused
        assert!(limiter
            .try_acquire("coder", &json!({"prompt": "x".repeat(40)}))
            .is_some());
        assert!(limiter.try_acquire("coder", &json!({})).is_none());
    }

    #[test]
    fn test_untracked_agent_has_no_budget() {
        let limiter = RateLimiter::default();
        assert!(limiter.try_acquire("ghost", &json!({})).is_none());
        assert!(!limiter.lock().within_budget("ghost"));
        assert!(limiter.usage("ghost").is_none());
    }

    #[test]
    fn test_window_resets_lazily_after_expiry() {
        let limiter = RateLimiter::new(60, 4);
        limiter.track("coder", budget(1_000, 1));
        let start = limiter.usage("coder").unwrap().window_start;

        assert!(limiter.try_acquire_at("coder", &json!({}), start).is_some());
        assert!(limiter
            .try_acquire_at("coder", &json!({}), start + Duration::seconds(60))
            .is_none());

        // Strictly more than the window must elapse
        let later = start + Duration::seconds(61);
        assert!(limiter.try_acquire_at("coder", &json!({}), later).is_some());

        let usage = limiter.usage_at("coder", later).unwrap();
        assert_eq!(usage.window_start, later);
        assert_eq!(usage.current_requests_per_min, 1);
    }

    #[test]
    fn test_window_start_aligns_to_first_request_after_expiry() {
        let limiter = RateLimiter::new(60, 4);
        limiter.track("coder", budget(1_000, 10));
        let start = limiter.usage("coder").unwrap().window_start;

        // Idle for five minutes; the new window starts at the next request
        let resumed = start + Duration::seconds(300);
        limiter.try_acquire_at("coder", &json!({}), resumed);

        let usage = limiter.usage_at("coder", resumed).unwrap();
        assert_eq!(usage.window_start, resumed);
    }

    #[test]
    fn test_reset_all_expired() {
        let limiter = RateLimiter::new(60, 4);
        limiter.track("a", budget(1_000, 10));
        limiter.track("b", budget(1_000, 10));

        let mut guard = limiter.lock();
        guard.consume("a", &json!({}));
        guard.consume("b", &json!({}));
        assert_eq!(guard.reset_all_expired(Utc::now()), 0);
        assert_eq!(
            guard.reset_all_expired(Utc::now() + Duration::seconds(120)),
            2
        );
        assert_eq!(guard.usage("a").unwrap().current_requests_per_min, 0);
    }

    #[test]
    fn test_load_handles_zero_capacity() {
        let limiter = RateLimiter::default();
        limiter.track("zero", budget(100, 0));
        limiter.track("half", budget(100, 4));

        let mut guard = limiter.lock();
        guard.consume("half", &json!({}));
        guard.consume("half", &json!({}));

        assert_eq!(guard.load("zero"), 0.0);
        assert!(!guard.within_budget("zero"));
        assert_eq!(guard.load("half"), 0.5);
    }

    #[test]
    fn test_track_resets_counters() {
        let limiter = RateLimiter::default();
        limiter.track("coder", budget(1_000, 1));
        limiter.try_acquire("coder", &json!({}));

        limiter.track("coder", budget(1_000, 1));
        assert_eq!(limiter.usage("coder").unwrap().current_requests_per_min, 0);

        limiter.forget("coder");
        assert!(limiter.usage("coder").is_none());
    }

    #[test]
    fn test_concurrent_acquire_never_exceeds_cap() {
        let limiter = RateLimiter::default();
        limiter.track("coder", budget(u64::MAX, 50));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                thread::spawn(move || {
                    (0..25)
                        .filter(|_| limiter.try_acquire("coder", &json!({"q": 1})).is_some())
                        .count()
                })
            })
            .collect();

        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(granted, 50);
        assert_eq!(limiter.usage("coder").unwrap().current_requests_per_min, 50);
    }
}
