use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::constraints::ParlayConstraints;
use crate::error::{EngineError, RejectReason};
use crate::ledger::ExposureLedger;
use crate::parlay::{DraftOrder, DraftParlay, Parlay, combined_odds, mean_probability};
use crate::pick::{CandidatePick, ExposureKey, ParlayLeg};

pub const DEFAULT_MAX_DRAFTS: usize = 5000;
pub const DEFAULT_MAX_PICKS_PER_FIXTURE: usize = 4;

const SUPPLIED_ODDS_TOLERANCE: f64 = 1e-9;

/// Per-batch rejection counts. Filtering is never fatal, so this is the only
/// place a caller sees what was dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchDiagnostics {
    pub drafts_considered: usize,
    pub structural_rejects: usize,
    pub leg_odds_rejects: usize,
    /// Drafts outside the combined-odds bounds. For pool builds this also counts
    /// search branches cut because no completion could land inside the bounds.
    pub combined_odds_rejects: usize,
    pub duplicate_conflicts: usize,
    /// Valid drafts left over once `parlays_per_batch` was reached.
    pub skipped_batch_full: usize,
    /// Pool picks dropped before draft building.
    pub pool_picks_filtered: usize,
    pub supplied_odds_overwritten: usize,
    /// The pool search hit `max_drafts` before exhausting the combinations.
    pub search_truncated: bool,
}

impl BatchDiagnostics {
    fn record(&mut self, reason: &RejectReason) {
        match reason {
            RejectReason::Structural(_) => self.structural_rejects += 1,
            RejectReason::LegOdds { .. } => self.leg_odds_rejects += 1,
            RejectReason::CombinedOdds { .. } => self.combined_odds_rejects += 1,
            RejectReason::DuplicateConflict { .. } => self.duplicate_conflicts += 1,
        }
    }

    pub fn constraint_violations(&self) -> usize {
        self.leg_odds_rejects + self.combined_odds_rejects
    }
}

/// One committed generation batch. Every parlay is `pending`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParlayBatch {
    pub generated_at: String,
    pub parlays: Vec<Parlay>,
    pub diagnostics: BatchDiagnostics,
}

#[derive(Debug, Clone)]
struct ValidDraft {
    index: usize,
    rank: Option<u32>,
    legs: Vec<ParlayLeg>,
    combined_odds: f64,
    mean_probability: f64,
}

impl ValidDraft {
    fn new(index: usize, rank: Option<u32>, legs: Vec<ParlayLeg>, combined_odds: f64) -> Self {
        let mean_probability = mean_probability(&legs);
        Self {
            index,
            rank,
            legs,
            combined_odds,
            mean_probability,
        }
    }

    fn keys(&self) -> Vec<ExposureKey> {
        self.legs.iter().map(ParlayLeg::exposure_key).collect()
    }
}

struct Checked {
    draft: Result<ValidDraft, RejectReason>,
    overwrote_supplied: bool,
}

pub struct ParlayEngine {
    constraints: ParlayConstraints,
    max_drafts: usize,
    max_picks_per_fixture: usize,
}

impl ParlayEngine {
    pub fn new(constraints: ParlayConstraints) -> Result<Self, EngineError> {
        constraints.validate()?;
        Ok(Self {
            constraints,
            max_drafts: DEFAULT_MAX_DRAFTS,
            max_picks_per_fixture: DEFAULT_MAX_PICKS_PER_FIXTURE,
        })
    }

    /// Caps the draft search when building from a pick pool.
    pub fn with_limits(mut self, max_drafts: usize, max_picks_per_fixture: usize) -> Self {
        self.max_drafts = max_drafts.max(1);
        self.max_picks_per_fixture = max_picks_per_fixture.max(1);
        self
    }

    pub fn constraints(&self) -> &ParlayConstraints {
        &self.constraints
    }

    /// Builds drafts from a flat pick pool and admits them against a fresh
    /// per-batch exposure set.
    pub fn build_from_pool(&self, pool: &[CandidatePick]) -> Result<ParlayBatch, EngineError> {
        let mut ledger: HashSet<ExposureKey> = HashSet::new();
        self.build_from_pool_with(pool, &mut ledger, None)
    }

    pub fn build_from_pool_with(
        &self,
        pool: &[CandidatePick],
        ledger: &mut dyn ExposureLedger,
        cancel: Option<&AtomicBool>,
    ) -> Result<ParlayBatch, EngineError> {
        self.require_fixtures(pool.iter().map(|p| p.fixture_id))?;
        let mut diagnostics = BatchDiagnostics::default();

        let mut groups: BTreeMap<u64, Vec<ParlayLeg>> = BTreeMap::new();
        for pick in pool {
            match self.check_pool_pick(pick) {
                Ok(leg) => groups.entry(leg.fixture_id).or_default().push(leg),
                Err(reason) => {
                    debug!(fixture_id = pick.fixture_id, %reason, "pool pick filtered");
                    diagnostics.pool_picks_filtered += 1;
                }
            }
        }

        let mut groups: Vec<Vec<ParlayLeg>> = groups
            .into_values()
            .map(|mut legs| {
                legs.sort_by(|a, b| {
                    b.probability
                        .total_cmp(&a.probability)
                        .then_with(|| a.label.cmp(&b.label))
                });
                legs.truncate(self.max_picks_per_fixture);
                legs
            })
            .collect();
        // Strongest fixtures first so the capped search sees them before the cap.
        groups.sort_by(|a, b| best_probability(b).total_cmp(&best_probability(a)));

        let mut search = DraftSearch::new(&groups, &self.constraints, self.max_drafts);
        search.walk(0, 1.0, &mut Vec::new());
        diagnostics.drafts_considered = search.considered;
        diagnostics.combined_odds_rejects = search.below_min_combined + search.cut_branches;
        diagnostics.search_truncated = search.truncated;
        if search.truncated {
            warn!(
                max_drafts = self.max_drafts,
                considered = search.considered,
                cut = search.cut_branches,
                "draft search stopped at its cap"
            );
        }
        let drafts = search.drafts;
        debug!(
            fixtures = groups.len(),
            drafts = drafts.len(),
            "drafts built from pool"
        );

        check_cancel(cancel, &diagnostics)?;
        let parlays = self.admit(
            drafts,
            DraftOrder::ByCombinedProbability,
            ledger,
            cancel,
            &mut diagnostics,
        )?;
        Ok(finish(parlays, diagnostics))
    }

    /// Validates externally grouped drafts against a fresh per-batch exposure set.
    pub fn validate_drafts(
        &self,
        drafts: &[DraftParlay],
        order: DraftOrder,
    ) -> Result<ParlayBatch, EngineError> {
        let mut ledger: HashSet<ExposureKey> = HashSet::new();
        self.validate_drafts_with(drafts, order, &mut ledger, None)
    }

    pub fn validate_drafts_with(
        &self,
        drafts: &[DraftParlay],
        order: DraftOrder,
        ledger: &mut dyn ExposureLedger,
        cancel: Option<&AtomicBool>,
    ) -> Result<ParlayBatch, EngineError> {
        self.require_fixtures(
            drafts
                .iter()
                .flat_map(|d| d.legs.iter().map(|p| p.fixture_id)),
        )?;
        let mut diagnostics = BatchDiagnostics {
            drafts_considered: drafts.len(),
            ..BatchDiagnostics::default()
        };

        let checked: Vec<Checked> = drafts
            .par_iter()
            .enumerate()
            .map(|(index, draft)| self.check_draft(index, draft))
            .collect();
        check_cancel(cancel, &diagnostics)?;

        let mut valid = Vec::with_capacity(checked.len());
        for item in checked {
            if item.overwrote_supplied {
                diagnostics.supplied_odds_overwritten += 1;
            }
            match item.draft {
                Ok(draft) => valid.push(draft),
                Err(reason) => {
                    debug!(
                        %reason,
                        constraint = reason.is_constraint_violation(),
                        "draft rejected"
                    );
                    diagnostics.record(&reason);
                }
            }
        }

        let parlays = self.admit(valid, order, ledger, cancel, &mut diagnostics)?;
        Ok(finish(parlays, diagnostics))
    }

    fn require_fixtures(&self, fixture_ids: impl Iterator<Item = u64>) -> Result<(), EngineError> {
        let distinct: HashSet<u64> = fixture_ids.collect();
        let needed = self.constraints.picks_per_parlay;
        if distinct.len() < needed {
            return Err(EngineError::InsufficientData(format!(
                "{} distinct fixtures available, {needed} needed per parlay",
                distinct.len()
            )));
        }
        Ok(())
    }

    fn check_pool_pick(&self, pick: &CandidatePick) -> Result<ParlayLeg, RejectReason> {
        let leg = pick.to_leg()?;
        self.check_leg_odds(&leg)?;
        Ok(leg)
    }

    fn check_leg_odds(&self, leg: &ParlayLeg) -> Result<(), RejectReason> {
        if self.constraints.leg_odds_ok(leg.odds) {
            Ok(())
        } else {
            Err(RejectReason::LegOdds {
                odds: leg.odds,
                min: self.constraints.min_individual_odds,
                max: self.constraints.max_individual_odds,
            })
        }
    }

    fn check_draft(&self, index: usize, draft: &DraftParlay) -> Checked {
        let mut overwrote_supplied = false;
        let result = (|| {
            let needed = self.constraints.picks_per_parlay;
            if draft.legs.len() != needed {
                return Err(RejectReason::Structural(format!(
                    "draft {index} has {} legs, {needed} required",
                    draft.legs.len()
                )));
            }
            let legs = draft
                .legs
                .iter()
                .map(CandidatePick::to_leg)
                .collect::<Result<Vec<_>, _>>()?;
            let mut seen = HashSet::with_capacity(legs.len());
            if let Some(repeat) = legs.iter().find(|l| !seen.insert(l.fixture_id)) {
                return Err(RejectReason::Structural(format!(
                    "draft {index} uses fixture {} twice",
                    repeat.fixture_id
                )));
            }

            for leg in &legs {
                self.check_leg_odds(leg)?;
            }

            let combined = combined_odds(&legs);
            if let Some(supplied) = draft.combined_odds {
                if (supplied - combined).abs() > SUPPLIED_ODDS_TOLERANCE {
                    debug!(
                        draft = index,
                        supplied,
                        computed = combined,
                        "supplied combined odds overwritten"
                    );
                    overwrote_supplied = true;
                }
            }
            if !self.constraints.combined_odds_ok(combined) {
                return Err(RejectReason::CombinedOdds {
                    odds: combined,
                    min: self.constraints.min_combined_odds,
                    max: self.constraints.max_combined_odds,
                });
            }
            Ok(ValidDraft::new(index, draft.rank, legs, combined))
        })();
        Checked {
            draft: result,
            overwrote_supplied,
        }
    }

    /// Sequential exposure deduplication. Each admission depends on every earlier
    /// one, so this step never runs in parallel.
    fn admit(
        &self,
        mut drafts: Vec<ValidDraft>,
        order: DraftOrder,
        ledger: &mut dyn ExposureLedger,
        cancel: Option<&AtomicBool>,
        diagnostics: &mut BatchDiagnostics,
    ) -> Result<Vec<Parlay>, EngineError> {
        match order {
            DraftOrder::ByCombinedProbability => drafts.sort_by(|a, b| {
                b.mean_probability
                    .total_cmp(&a.mean_probability)
                    .then_with(|| b.combined_odds.total_cmp(&a.combined_odds))
                    .then_with(|| a.index.cmp(&b.index))
            }),
            DraftOrder::AsSupplied => drafts.sort_by_key(|d| (d.rank.unwrap_or(u32::MAX), d.index)),
        }

        let limit = self.constraints.parlays_per_batch;
        let mut claimed: Vec<ExposureKey> = Vec::new();
        let mut parlays = Vec::with_capacity(limit.min(drafts.len()));
        let total = drafts.len();

        for (position, draft) in drafts.into_iter().enumerate() {
            if is_cancelled(cancel) {
                ledger.release(&claimed);
                return Err(cancelled(diagnostics));
            }
            if parlays.len() == limit {
                diagnostics.skipped_batch_full = total - position;
                break;
            }
            let keys = draft.keys();
            match ledger.try_claim(&keys) {
                Ok(()) => {
                    claimed.extend_from_slice(&keys);
                    parlays.push(Parlay::from_legs(draft.legs));
                }
                Err(conflict) => {
                    let reason = RejectReason::DuplicateConflict {
                        fixture_id: conflict.fixture_id,
                        market: conflict.market.to_string(),
                    };
                    warn!(draft = draft.index, %reason, "draft rejected");
                    diagnostics.record(&reason);
                }
            }
        }

        if is_cancelled(cancel) {
            ledger.release(&claimed);
            return Err(cancelled(diagnostics));
        }
        Ok(parlays)
    }
}

struct DraftSearch<'a> {
    groups: &'a [Vec<ParlayLeg>],
    /// `best_odds_from[g]` is the highest leg odds in `groups[g..]`.
    best_odds_from: Vec<f64>,
    constraints: &'a ParlayConstraints,
    max_drafts: usize,
    drafts: Vec<ValidDraft>,
    considered: usize,
    below_min_combined: usize,
    cut_branches: usize,
    truncated: bool,
}

impl<'a> DraftSearch<'a> {
    fn new(groups: &'a [Vec<ParlayLeg>], constraints: &'a ParlayConstraints, max_drafts: usize) -> Self {
        let mut best_odds_from = vec![1.0; groups.len() + 1];
        for g in (0..groups.len()).rev() {
            let best = groups[g].iter().map(|l| l.odds).fold(1.0, f64::max);
            best_odds_from[g] = best.max(best_odds_from[g + 1]);
        }
        Self {
            groups,
            best_odds_from,
            constraints,
            max_drafts,
            drafts: Vec::new(),
            considered: 0,
            below_min_combined: 0,
            cut_branches: 0,
            truncated: false,
        }
    }

    /// Completed drafts and cut branches both spend the budget, so the walk is
    /// bounded even when nothing reaches the combined minimum.
    fn budget_spent(&self) -> bool {
        self.considered + self.cut_branches >= self.max_drafts
    }

    /// Depth-first over fixtures in order, one leg per fixture. A branch is cut
    /// when even the cheapest allowed remaining legs overshoot the combined
    /// maximum, or the dearest remaining legs cannot reach the combined minimum.
    fn walk(&mut self, start: usize, odds: f64, chosen: &mut Vec<(usize, usize)>) {
        let needed = self.constraints.picks_per_parlay;
        if chosen.len() == needed {
            self.considered += 1;
            if odds < self.constraints.min_combined_odds {
                self.below_min_combined += 1;
                return;
            }
            let legs = chosen
                .iter()
                .map(|&(g, l)| self.groups[g][l].clone())
                .collect();
            let index = self.drafts.len();
            self.drafts.push(ValidDraft::new(index, None, legs, odds));
            return;
        }

        let after = needed - chosen.len() - 1;
        let floor = self.constraints.min_individual_odds.powi(after as i32);
        for g in start..self.groups.len() {
            if self.groups.len() - g <= after {
                break;
            }
            let ceiling = self.best_odds_from[g + 1].powi(after as i32);
            for l in 0..self.groups[g].len() {
                if self.budget_spent() {
                    self.truncated = true;
                    return;
                }
                let next = odds * self.groups[g][l].odds;
                if next * floor > self.constraints.max_combined_odds
                    || next * ceiling < self.constraints.min_combined_odds
                {
                    self.cut_branches += 1;
                    continue;
                }
                chosen.push((g, l));
                self.walk(g + 1, next, chosen);
                chosen.pop();
                if self.truncated {
                    return;
                }
            }
        }
    }
}

fn best_probability(legs: &[ParlayLeg]) -> f64 {
    legs.first().map_or(0.0, |l| l.probability)
}

fn is_cancelled(cancel: Option<&AtomicBool>) -> bool {
    cancel.is_some_and(|flag| flag.load(Ordering::Relaxed))
}

fn cancelled(diagnostics: &BatchDiagnostics) -> EngineError {
    warn!(
        considered = diagnostics.drafts_considered,
        "parlay batch cancelled"
    );
    EngineError::Cancelled {
        considered: diagnostics.drafts_considered,
    }
}

fn check_cancel(
    cancel: Option<&AtomicBool>,
    diagnostics: &BatchDiagnostics,
) -> Result<(), EngineError> {
    if is_cancelled(cancel) {
        Err(cancelled(diagnostics))
    } else {
        Ok(())
    }
}

fn finish(parlays: Vec<Parlay>, diagnostics: BatchDiagnostics) -> ParlayBatch {
    info!(
        parlays = parlays.len(),
        considered = diagnostics.drafts_considered,
        structural = diagnostics.structural_rejects,
        constraint = diagnostics.constraint_violations(),
        duplicates = diagnostics.duplicate_conflicts,
        "parlay batch committed"
    );
    ParlayBatch {
        generated_at: Utc::now().to_rfc3339(),
        parlays,
        diagnostics,
    }
}
