use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Numeric risk bounds for one generation batch. Always supplied by the caller;
/// there is deliberately no `Default`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParlayConstraints {
    pub min_individual_odds: f64,
    pub max_individual_odds: f64,
    pub min_combined_odds: f64,
    pub max_combined_odds: f64,
    pub picks_per_parlay: usize,
    pub parlays_per_batch: usize,
}

impl ParlayConstraints {
    pub fn validate(&self) -> Result<(), EngineError> {
        let bad = |msg: String| Err(EngineError::InvalidConstraints(msg));
        let odds = [
            self.min_individual_odds,
            self.max_individual_odds,
            self.min_combined_odds,
            self.max_combined_odds,
        ];
        if odds.iter().any(|v| !v.is_finite() || *v <= 1.0) {
            return bad("all odds bounds must be finite and above 1".to_string());
        }
        if self.min_individual_odds > self.max_individual_odds {
            return bad(format!(
                "min_individual_odds {} > max_individual_odds {}",
                self.min_individual_odds, self.max_individual_odds
            ));
        }
        if self.min_combined_odds > self.max_combined_odds {
            return bad(format!(
                "min_combined_odds {} > max_combined_odds {}",
                self.min_combined_odds, self.max_combined_odds
            ));
        }
        if self.picks_per_parlay < 2 {
            return bad("picks_per_parlay must be at least 2".to_string());
        }
        if self.parlays_per_batch == 0 {
            return bad("parlays_per_batch must be at least 1".to_string());
        }
        Ok(())
    }

    pub fn leg_odds_ok(&self, odds: f64) -> bool {
        odds >= self.min_individual_odds && odds <= self.max_individual_odds
    }

    pub fn combined_odds_ok(&self, odds: f64) -> bool {
        odds >= self.min_combined_odds && odds <= self.max_combined_odds
    }
}
