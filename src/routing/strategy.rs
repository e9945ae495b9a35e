//! Selection strategies
//!
//! Each strategy reduces the eligible candidates to a best subset and picks
//! uniformly at random inside it. The random source is owned by the engine
//! and can be seeded so tests get reproducible choices.

use crate::error::RouterError;
use crate::routing::selector::Candidate;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

/// Named routing strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Least loaded relative to request capacity
    #[default]
    Balanced,
    /// Cheapest pricing tier present
    Cost,
    /// Lowest observed latency
    Performance,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [Strategy::Balanced, Strategy::Cost, Strategy::Performance];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Balanced => "balanced",
            Strategy::Cost => "cost",
            Strategy::Performance => "performance",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "balanced" => Ok(Strategy::Balanced),
            "cost" => Ok(Strategy::Cost),
            "performance" => Ok(Strategy::Performance),
            _ => Err(RouterError::unknown_strategy(s)),
        }
    }
}

/// Applies a strategy to a candidate list
#[derive(Debug)]
pub struct StrategyEngine {
    rng: Mutex<StdRng>,
}

impl Default for StrategyEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StrategyEngine {
    /// Engine backed by OS entropy
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Create an engine with a fixed seed (for reproducibility in tests)
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Pick one candidate, or `None` if the list is empty
    pub fn choose<'a>(
        &self,
        strategy: Strategy,
        candidates: &'a [Candidate],
    ) -> Option<&'a Candidate> {
        let best = best_subset(strategy, candidates);
        if best.len() <= 1 {
            return best.first().copied();
        }

        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        best.choose(&mut *rng).copied()
    }
}

/// Candidates tied for best under `strategy`, in input order
pub fn best_subset(strategy: Strategy, candidates: &[Candidate]) -> Vec<&Candidate> {
    match strategy {
        Strategy::Balanced => minimal_by(candidates, |c| c.load),
        Strategy::Performance => minimal_by(candidates, |c| c.latency_ms as f64),
        Strategy::Cost => {
            let Some(cheapest) = candidates.iter().map(|c| c.pricing_tier).min() else {
                return Vec::new();
            };
            candidates
                .iter()
                .filter(|c| c.pricing_tier == cheapest)
                .collect()
        }
    }
}

fn minimal_by<F>(candidates: &[Candidate], key: F) -> Vec<&Candidate>
where
    F: Fn(&Candidate) -> f64,
{
    let min = candidates.iter().map(&key).fold(f64::INFINITY, f64::min);
    candidates.iter().filter(|c| key(*c) == min).collect()
}
