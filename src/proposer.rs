use serde::{Deserialize, Serialize};

use crate::catalog::MarketCatalog;
use crate::market_engine::MarketProbability;
use crate::pick::CandidatePick;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProposerConfig {
    /// Bookmaker-style overround applied to fair odds.
    pub margin: f64,
    pub min_probability: f64,
    /// Records with a wider band are not proposed.
    pub max_uncertainty: f64,
}

impl Default for ProposerConfig {
    fn default() -> Self {
        Self {
            margin: 0.05,
            min_probability: 0.35,
            max_uncertainty: 0.25,
        }
    }
}

/// Deterministic stand-in for an external pick source: prices each model
/// probability and keeps the ones a book would plausibly offer.
pub struct HeuristicProposer<'a> {
    catalog: &'a MarketCatalog,
    config: ProposerConfig,
}

impl<'a> HeuristicProposer<'a> {
    pub fn new(catalog: &'a MarketCatalog, config: ProposerConfig) -> Self {
        Self { catalog, config }
    }

    pub fn propose(&self, records: &[MarketProbability]) -> Vec<CandidatePick> {
        records
            .iter()
            .filter(|r| r.p_model >= self.config.min_probability)
            .filter(|r| r.uncertainty <= self.config.max_uncertainty)
            .filter_map(|r| {
                let odds = quoted_odds(r.p_model, self.config.margin)?;
                let range = self.catalog.odds_range(&r.market)?;
                if !range.contains(odds) {
                    return None;
                }
                Some(CandidatePick {
                    fixture_id: r.fixture_id,
                    market: r.market,
                    selection: r.selection,
                    odds: Some(odds),
                    probability: Some(r.p_model),
                    reasoning: format!(
                        "{} p={:.3} ±{:.3} quoted at {odds:.2}",
                        r.label, r.p_model, r.uncertainty
                    ),
                })
            })
            .collect()
    }
}

/// Fair odds `1/p` shaded by `margin`, floored to two decimals. `None` when the
/// result would not pay out.
pub fn quoted_odds(probability: f64, margin: f64) -> Option<f64> {
    if !(probability > 0.0 && probability < 1.0) {
        return None;
    }
    let odds = 1.0 / (probability * (1.0 + margin.max(0.0)));
    let odds = (odds * 100.0).floor() / 100.0;
    (odds > 1.0).then_some(odds)
}
