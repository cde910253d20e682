use std::collections::HashMap;

use parlay_engine::constraints::ParlayConstraints;
use parlay_engine::market::{Line, Market, Period, Selection, Side};
use parlay_engine::parlay::{DraftOrder, DraftParlay, Parlay, ParlayStatus};
use parlay_engine::parlay_engine::ParlayEngine;
use parlay_engine::pick::CandidatePick;
use parlay_engine::settlement::{
    LegResult, MatchOutcome, OutcomeResolver, SettlementError, settle_parlay,
};

/// Minimal resolver over final scores. Half-time markets need the half-time
/// score; corners and cards need their counts; otherwise the leg is void.
struct ScoreResolver;

fn verdict(hit: bool) -> LegResult {
    if hit { LegResult::Won } else { LegResult::Lost }
}

fn goals(outcome: &MatchOutcome, period: Period) -> Option<(u32, u32)> {
    let ht = outcome.home_goals_first_half.zip(outcome.away_goals_first_half);
    match period {
        Period::FullTime => Some((outcome.home_goals, outcome.away_goals)),
        Period::FirstHalf => ht,
        Period::SecondHalf => ht.map(|(h, a)| {
            (outcome.home_goals.saturating_sub(h), outcome.away_goals.saturating_sub(a))
        }),
    }
}

fn over_under(count: f64, line: Line, selection: Selection) -> LegResult {
    match selection {
        Selection::Over => verdict(count > line.value()),
        Selection::Under => verdict(count < line.value()),
        _ => LegResult::Void,
    }
}

impl OutcomeResolver for ScoreResolver {
    fn match_result(&self, outcome: &MatchOutcome, period: Period, selection: Selection) -> LegResult {
        let Some((h, a)) = goals(outcome, period) else {
            return LegResult::Void;
        };
        match selection {
            Selection::Home => verdict(h > a),
            Selection::Draw => verdict(h == a),
            Selection::Away => verdict(h < a),
            _ => LegResult::Void,
        }
    }

    fn double_chance(&self, outcome: &MatchOutcome, period: Period, selection: Selection) -> LegResult {
        let Some((h, a)) = goals(outcome, period) else {
            return LegResult::Void;
        };
        match selection {
            Selection::HomeOrDraw => verdict(h >= a),
            Selection::DrawOrAway => verdict(h <= a),
            Selection::HomeOrAway => verdict(h != a),
            _ => LegResult::Void,
        }
    }

    fn total_goals(
        &self,
        outcome: &MatchOutcome,
        period: Period,
        line: Line,
        selection: Selection,
    ) -> LegResult {
        match goals(outcome, period) {
            Some((h, a)) => over_under(f64::from(h + a), line, selection),
            None => LegResult::Void,
        }
    }

    fn both_teams_to_score(&self, outcome: &MatchOutcome, selection: Selection) -> LegResult {
        let both = outcome.home_goals > 0 && outcome.away_goals > 0;
        match selection {
            Selection::Yes => verdict(both),
            Selection::No => verdict(!both),
            _ => LegResult::Void,
        }
    }

    fn team_goals(&self, outcome: &MatchOutcome, side: Side, line: Line, selection: Selection) -> LegResult {
        let scored = match side {
            Side::Home => outcome.home_goals,
            Side::Away => outcome.away_goals,
        };
        over_under(f64::from(scored), line, selection)
    }

    fn handicap(&self, outcome: &MatchOutcome, line: Line, selection: Selection) -> LegResult {
        let adjusted = f64::from(outcome.home_goals) + line.value() - f64::from(outcome.away_goals);
        match selection {
            Selection::Home => verdict(adjusted > 0.0),
            Selection::Away => verdict(adjusted < 0.0),
            _ => LegResult::Void,
        }
    }

    fn corners(&self, outcome: &MatchOutcome, line: Line, selection: Selection) -> LegResult {
        match outcome.total_corners {
            Some(n) => over_under(f64::from(n), line, selection),
            None => LegResult::Void,
        }
    }

    fn cards(&self, outcome: &MatchOutcome, line: Line, selection: Selection) -> LegResult {
        match outcome.total_cards {
            Some(n) => over_under(f64::from(n), line, selection),
            None => LegResult::Void,
        }
    }
}

fn outcome(fixture_id: u64, home_goals: u32, away_goals: u32) -> MatchOutcome {
    MatchOutcome {
        fixture_id,
        home_goals,
        away_goals,
        home_goals_first_half: None,
        away_goals_first_half: None,
        total_corners: None,
        total_cards: None,
        abandoned: false,
    }
}

fn line(v: f64) -> Line {
    Line::try_from(v).unwrap()
}

fn parlay() -> Parlay {
    let engine = ParlayEngine::new(ParlayConstraints {
        min_individual_odds: 1.1,
        max_individual_odds: 3.0,
        min_combined_odds: 1.5,
        max_combined_odds: 20.0,
        picks_per_parlay: 3,
        parlays_per_batch: 1,
    })
    .unwrap();
    let draft = DraftParlay::new(vec![
        CandidatePick::new(
            1,
            Market::TotalGoals {
                period: Period::FullTime,
                line: line(2.5),
            },
            Selection::Over,
            1.9,
            0.55,
        ),
        CandidatePick::new(2, Market::Handicap { line: line(-1.5) }, Selection::Home, 2.4, 0.4),
        CandidatePick::new(3, Market::Corners { line: line(9.5) }, Selection::Over, 1.8, 0.52),
    ]);
    let mut batch = engine
        .validate_drafts(&[draft], DraftOrder::AsSupplied)
        .unwrap();
    batch.parlays.remove(0)
}

#[test]
fn dispatcher_routes_each_family() {
    let resolver = ScoreResolver;
    let o = outcome(1, 3, 1);
    let over = Market::TotalGoals {
        period: Period::FullTime,
        line: line(2.5),
    };
    assert_eq!(resolver.resolve(&o, &over, Selection::Over), LegResult::Won);
    assert_eq!(
        resolver.resolve(&o, &Market::Handicap { line: line(-1.5) }, Selection::Home),
        LegResult::Won
    );
    assert_eq!(
        resolver.resolve(&o, &Market::Handicap { line: line(-1.5) }, Selection::Away),
        LegResult::Lost
    );
    assert_eq!(
        resolver.resolve(
            &o,
            &Market::TeamGoals {
                side: Side::Away,
                line: line(0.5)
            },
            Selection::Over
        ),
        LegResult::Won
    );
    let ht = Market::MatchResult {
        period: Period::FirstHalf,
    };
    assert_eq!(resolver.resolve(&o, &ht, Selection::Home), LegResult::Void);
}

#[test]
fn abandoned_fixtures_void_every_leg() {
    let mut o = outcome(1, 2, 0);
    o.abandoned = true;
    assert_eq!(
        ScoreResolver.resolve(&o, &Market::BothTeamsToScore, Selection::No),
        LegResult::Void
    );
}

#[test]
fn settling_a_parlay_sets_its_terminal_status() {
    let outcomes: HashMap<u64, MatchOutcome> = [outcome(1, 2, 1), outcome(2, 3, 0), outcome(3, 1, 1)]
        .into_iter()
        .map(|o| (o.fixture_id, o))
        .collect();

    // Corners were not reported, so that leg voids and the rest win.
    let mut p = parlay();
    let status = settle_parlay(&mut p, &outcomes, &ScoreResolver).unwrap();
    assert_eq!(status, ParlayStatus::Partial);
    assert_eq!(p.status(), ParlayStatus::Partial);

    // Settled parlays cannot be settled again.
    let err = settle_parlay(&mut p, &outcomes, &ScoreResolver).unwrap_err();
    assert!(matches!(err, SettlementError::Transition(_)));
}

#[test]
fn one_lost_leg_loses_the_parlay() {
    let mut outcomes: HashMap<u64, MatchOutcome> = HashMap::new();
    outcomes.insert(1, outcome(1, 0, 0));
    outcomes.insert(2, outcome(2, 3, 0));
    let mut corners = outcome(3, 1, 1);
    corners.total_corners = Some(12);
    outcomes.insert(3, corners);
    let mut p = parlay();
    assert_eq!(
        settle_parlay(&mut p, &outcomes, &ScoreResolver).unwrap(),
        ParlayStatus::Lost
    );
}

#[test]
fn missing_outcome_leaves_parlay_pending() {
    let mut outcomes = HashMap::new();
    outcomes.insert(1, outcome(1, 2, 1));
    let mut p = parlay();
    let err = settle_parlay(&mut p, &outcomes, &ScoreResolver).unwrap_err();
    assert_eq!(err, SettlementError::MissingOutcome(2));
    assert_eq!(p.status(), ParlayStatus::Pending);
}
