use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pick::{CandidatePick, ParlayLeg};

const ULTRA_SAFE_PROBABILITY: f64 = 0.80;
const ULTRA_SAFE_MAX_ODDS: f64 = 3.0;
const SAFE_PROBABILITY: f64 = 0.70;
const BALANCED_PROBABILITY: f64 = 0.55;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParlayStatus {
    Pending,
    Won,
    Lost,
    Partial,
    Void,
}

impl ParlayStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    UltraSafe,
    Safe,
    Balanced,
    Aggressive,
}

impl ConfidenceTier {
    pub fn classify(combined_probability: f64, combined_odds: f64) -> Self {
        if combined_probability >= ULTRA_SAFE_PROBABILITY && combined_odds <= ULTRA_SAFE_MAX_ODDS {
            Self::UltraSafe
        } else if combined_probability >= SAFE_PROBABILITY {
            Self::Safe
        } else if combined_probability >= BALANCED_PROBABILITY {
            Self::Balanced
        } else {
            Self::Aggressive
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("parlay status cannot move from {from:?} to {to:?}")]
pub struct StatusTransitionError {
    pub from: ParlayStatus,
    pub to: ParlayStatus,
}

/// An accepted parlay. Only the engine constructs these, so every value has
/// passed structural, odds and exposure checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parlay {
    legs: Vec<ParlayLeg>,
    combined_odds: f64,
    /// Arithmetic mean of the leg probabilities. A ranking score, not the
    /// probability that every leg wins.
    combined_probability: f64,
    /// Product of the leg probabilities, the joint win chance if legs are
    /// independent.
    independent_probability: f64,
    confidence_tier: ConfidenceTier,
    status: ParlayStatus,
}

impl Parlay {
    pub(crate) fn from_legs(legs: Vec<ParlayLeg>) -> Self {
        let combined_odds = combined_odds(&legs);
        let combined_probability = mean_probability(&legs);
        let independent_probability = legs.iter().map(|l| l.probability).product();
        Self {
            confidence_tier: ConfidenceTier::classify(combined_probability, combined_odds),
            legs,
            combined_odds,
            combined_probability,
            independent_probability,
            status: ParlayStatus::Pending,
        }
    }

    pub fn legs(&self) -> &[ParlayLeg] {
        &self.legs
    }

    pub fn combined_odds(&self) -> f64 {
        self.combined_odds
    }

    pub fn combined_probability(&self) -> f64 {
        self.combined_probability
    }

    pub fn independent_probability(&self) -> f64 {
        self.independent_probability
    }

    pub fn confidence_tier(&self) -> ConfidenceTier {
        self.confidence_tier
    }

    pub fn status(&self) -> ParlayStatus {
        self.status
    }

    /// Settles the parlay. Only `Pending -> terminal` is allowed.
    pub fn transition(&mut self, next: ParlayStatus) -> Result<(), StatusTransitionError> {
        if self.status.is_terminal() || !next.is_terminal() {
            return Err(StatusTransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

/// An unvalidated parlay proposal. A supplied `combined_odds` is never trusted;
/// the engine recomputes it from the legs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftParlay {
    pub legs: Vec<CandidatePick>,
    #[serde(default)]
    pub combined_odds: Option<f64>,
    /// External priority, lower first. Only used with `DraftOrder::AsSupplied`.
    #[serde(default)]
    pub rank: Option<u32>,
}

impl DraftParlay {
    pub fn new(legs: Vec<CandidatePick>) -> Self {
        Self {
            legs,
            combined_odds: None,
            rank: None,
        }
    }
}

/// Priority used when walking validated drafts through exposure deduplication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftOrder {
    /// Highest mean leg probability first, then higher odds, then input order.
    #[default]
    ByCombinedProbability,
    /// Supplied rank, then input order.
    AsSupplied,
}

pub fn combined_odds(legs: &[ParlayLeg]) -> f64 {
    legs.iter().map(|l| l.odds).product()
}

pub fn mean_probability(legs: &[ParlayLeg]) -> f64 {
    if legs.is_empty() {
        return 0.0;
    }
    legs.iter().map(|l| l.probability).sum::<f64>() / legs.len() as f64
}
