use serde::{Deserialize, Serialize};

use crate::error::RejectReason;
use crate::market::{Market, Selection};

/// A proposed selection from an external source. Odds and probability may be
/// missing; a leg without either cannot enter a parlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidatePick {
    pub fixture_id: u64,
    pub market: Market,
    pub selection: Selection,
    #[serde(default)]
    pub odds: Option<f64>,
    #[serde(default)]
    pub probability: Option<f64>,
    #[serde(default)]
    pub reasoning: String,
}

/// One exposure unit: a market on a fixture, whatever the selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExposureKey {
    pub fixture_id: u64,
    pub market: Market,
}

/// A structurally valid leg: odds > 1 and probability in (0, 1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParlayLeg {
    pub fixture_id: u64,
    pub market: Market,
    pub selection: Selection,
    pub label: String,
    pub odds: f64,
    pub probability: f64,
    pub reasoning: String,
}

impl CandidatePick {
    pub fn new(
        fixture_id: u64,
        market: Market,
        selection: Selection,
        odds: f64,
        probability: f64,
    ) -> Self {
        Self {
            fixture_id,
            market,
            selection,
            odds: Some(odds),
            probability: Some(probability),
            reasoning: String::new(),
        }
    }

    pub fn exposure_key(&self) -> ExposureKey {
        ExposureKey {
            fixture_id: self.fixture_id,
            market: self.market,
        }
    }

    pub fn to_leg(&self) -> Result<ParlayLeg, RejectReason> {
        let label = self.market.label(self.selection);
        if !self.market.accepts(self.selection) {
            return Err(RejectReason::Structural(format!(
                "fixture {}: selection {:?} does not belong to {}",
                self.fixture_id, self.selection, self.market
            )));
        }
        let Some(odds) = self.odds else {
            return Err(RejectReason::Structural(format!(
                "fixture {} {label}: missing odds",
                self.fixture_id
            )));
        };
        let Some(probability) = self.probability else {
            return Err(RejectReason::Structural(format!(
                "fixture {} {label}: missing probability",
                self.fixture_id
            )));
        };
        if !odds.is_finite() || odds <= 1.0 {
            return Err(RejectReason::Structural(format!(
                "fixture {} {label}: odds {odds} not above 1",
                self.fixture_id
            )));
        }
        if !(probability > 0.0 && probability < 1.0) {
            return Err(RejectReason::Structural(format!(
                "fixture {} {label}: probability {probability} outside (0, 1)",
                self.fixture_id
            )));
        }
        Ok(ParlayLeg {
            fixture_id: self.fixture_id,
            market: self.market,
            selection: self.selection,
            label,
            odds,
            probability,
            reasoning: self.reasoning.clone(),
        })
    }
}

impl ParlayLeg {
    pub fn exposure_key(&self) -> ExposureKey {
        ExposureKey {
            fixture_id: self.fixture_id,
            market: self.market,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{Line, Period};

    fn over_25() -> Market {
        Market::TotalGoals {
            period: Period::FullTime,
            line: Line::try_from(2.5).unwrap(),
        }
    }

    #[test]
    fn missing_odds_is_structural() {
        let mut pick = CandidatePick::new(1, over_25(), Selection::Over, 1.9, 0.55);
        pick.odds = None;
        assert!(matches!(pick.to_leg(), Err(RejectReason::Structural(_))));
    }

    #[test]
    fn missing_probability_is_structural() {
        let mut pick = CandidatePick::new(1, over_25(), Selection::Over, 1.9, 0.55);
        pick.probability = None;
        let err = pick.to_leg().unwrap_err();
        assert!(err.to_string().contains("missing probability"));
    }

    #[test]
    fn mismatched_selection_is_structural() {
        let pick = CandidatePick::new(1, over_25(), Selection::Yes, 1.9, 0.55);
        assert!(pick.to_leg().is_err());
    }

    #[test]
    fn degenerate_numbers_are_structural() {
        assert!(CandidatePick::new(1, over_25(), Selection::Over, 1.0, 0.5).to_leg().is_err());
        assert!(CandidatePick::new(1, over_25(), Selection::Over, 1.8, 1.0).to_leg().is_err());
        assert!(CandidatePick::new(1, over_25(), Selection::Over, f64::NAN, 0.5).to_leg().is_err());
    }

    #[test]
    fn exposure_key_ignores_selection() {
        let over = CandidatePick::new(42, over_25(), Selection::Over, 1.9, 0.55);
        let under = CandidatePick::new(42, over_25(), Selection::Under, 2.0, 0.45);
        assert_eq!(over.exposure_key(), under.exposure_key());
        let leg = over.to_leg().unwrap();
        assert_eq!(leg.label, "over_2.5");
        assert_eq!(leg.exposure_key(), over.exposure_key());
    }
}
