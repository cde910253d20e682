//! Settlement contract. The engine only defines how a leg is resolved and how
//! leg results fold into a parlay status; the resolver itself is injected by the
//! settlement process.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::market::{Line, Market, Period, Selection, Side};
use crate::parlay::{Parlay, ParlayStatus, StatusTransitionError};

/// Realized result of one fixture. Optional counts are absent when the feed
/// did not report them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub fixture_id: u64,
    pub home_goals: u32,
    pub away_goals: u32,
    #[serde(default)]
    pub home_goals_first_half: Option<u32>,
    #[serde(default)]
    pub away_goals_first_half: Option<u32>,
    #[serde(default)]
    pub total_corners: Option<u32>,
    #[serde(default)]
    pub total_cards: Option<u32>,
    #[serde(default)]
    pub abandoned: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegResult {
    Won,
    Lost,
    Void,
}

/// One resolution method per market family. Implementors decide what happens
/// to missing data (usually `Void`).
pub trait OutcomeResolver {
    fn match_result(&self, outcome: &MatchOutcome, period: Period, selection: Selection) -> LegResult;

    fn double_chance(&self, outcome: &MatchOutcome, period: Period, selection: Selection) -> LegResult;

    fn total_goals(
        &self,
        outcome: &MatchOutcome,
        period: Period,
        line: Line,
        selection: Selection,
    ) -> LegResult;

    fn both_teams_to_score(&self, outcome: &MatchOutcome, selection: Selection) -> LegResult;

    fn team_goals(&self, outcome: &MatchOutcome, side: Side, line: Line, selection: Selection) -> LegResult;

    fn handicap(&self, outcome: &MatchOutcome, line: Line, selection: Selection) -> LegResult;

    fn corners(&self, outcome: &MatchOutcome, line: Line, selection: Selection) -> LegResult;

    fn cards(&self, outcome: &MatchOutcome, line: Line, selection: Selection) -> LegResult;

    fn resolve(&self, outcome: &MatchOutcome, market: &Market, selection: Selection) -> LegResult {
        if outcome.abandoned {
            return LegResult::Void;
        }
        match *market {
            Market::MatchResult { period } => self.match_result(outcome, period, selection),
            Market::DoubleChance { period } => self.double_chance(outcome, period, selection),
            Market::TotalGoals { period, line } => self.total_goals(outcome, period, line, selection),
            Market::BothTeamsToScore => self.both_teams_to_score(outcome, selection),
            Market::TeamGoals { side, line } => self.team_goals(outcome, side, line, selection),
            Market::Handicap { line } => self.handicap(outcome, line, selection),
            Market::Corners { line } => self.corners(outcome, line, selection),
            Market::Cards { line } => self.cards(outcome, line, selection),
        }
    }
}

/// Any lost leg loses the parlay; all void voids it; all won wins it; a mix of
/// won and void is partial.
pub fn fold_leg_results(results: &[LegResult]) -> ParlayStatus {
    if results.contains(&LegResult::Lost) {
        ParlayStatus::Lost
    } else if results.iter().all(|r| *r == LegResult::Void) {
        ParlayStatus::Void
    } else if results.iter().all(|r| *r == LegResult::Won) {
        ParlayStatus::Won
    } else {
        ParlayStatus::Partial
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SettlementError {
    #[error("no outcome for fixture {0}")]
    MissingOutcome(u64),

    #[error(transparent)]
    Transition(#[from] StatusTransitionError),
}

/// Resolves every leg and moves the parlay to its terminal status. Nothing is
/// changed unless all legs have an outcome.
pub fn settle_parlay(
    parlay: &mut Parlay,
    outcomes: &HashMap<u64, MatchOutcome>,
    resolver: &impl OutcomeResolver,
) -> Result<ParlayStatus, SettlementError> {
    let results = parlay
        .legs()
        .iter()
        .map(|leg| {
            outcomes
                .get(&leg.fixture_id)
                .map(|outcome| resolver.resolve(outcome, &leg.market, leg.selection))
                .ok_or(SettlementError::MissingOutcome(leg.fixture_id))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let status = fold_leg_results(&results);
    parlay.transition(status)?;
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use LegResult::*;

    #[test]
    fn folding_rules() {
        assert_eq!(fold_leg_results(&[Won, Won, Won]), ParlayStatus::Won);
        assert_eq!(fold_leg_results(&[Won, Lost, Void]), ParlayStatus::Lost);
        assert_eq!(fold_leg_results(&[Void, Void]), ParlayStatus::Void);
        assert_eq!(fold_leg_results(&[Won, Void, Won]), ParlayStatus::Partial);
    }
}
