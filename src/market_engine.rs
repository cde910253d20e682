use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::catalog::{CatalogEntry, MarketCatalog, default_catalog};
use crate::error::{EngineError, ModelComputationError};
use crate::market::{Line, Market, MarketFamily, Period, Selection, Side};
use crate::metrics::{GoalRates, MatchMetrics};
use crate::numeric::normal_tail;
use crate::scoregrid::{Prob3, ScoreGrid};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelName {
    /// Full-time independent Poisson score grid.
    PoissonGrid,
    /// Score grid on per-half rates (split or explicit).
    PoissonGridHalf,
    /// One side's own Poisson marginal.
    PoissonMarginal,
    /// Normal approximation to a count process.
    NormalApprox,
}

/// One priced selection. Append-only: the engine never revisits a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketProbability {
    pub fixture_id: u64,
    pub market: Market,
    pub selection: Selection,
    pub label: String,
    pub p_model: f64,
    /// Half-width of the band around `p_model`.
    pub uncertainty: f64,
    pub model_name: ModelName,
    pub model_inputs: BTreeMap<String, f64>,
    pub rationale: String,
    pub engine_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureFailure {
    pub fixture_id: u64,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketBatch {
    pub records: Vec<MarketProbability>,
    pub failures: Vec<FixtureFailure>,
}

/// Rates and derived grid for one period of one fixture.
struct PeriodModel {
    rates: GoalRates,
    grid: ScoreGrid,
    probs: Prob3,
    source: RateSource,
}

#[derive(Clone, Copy)]
enum RateSource {
    FullTime,
    Split(f64),
    Explicit,
}

impl PeriodModel {
    fn build(rates: GoalRates, source: RateSource, max_goals: u32) -> Self {
        let grid = ScoreGrid::from_rates(rates.home, rates.away, max_goals);
        let probs = grid.outcome_probs();
        Self {
            rates,
            grid,
            probs,
            source,
        }
    }

    fn model_name(&self) -> ModelName {
        match self.source {
            RateSource::FullTime => ModelName::PoissonGrid,
            RateSource::Split(_) | RateSource::Explicit => ModelName::PoissonGridHalf,
        }
    }

    fn inputs(&self, max_goals: u32) -> BTreeMap<String, f64> {
        let mut out = BTreeMap::new();
        out.insert("lambda_home".to_string(), self.rates.home);
        out.insert("lambda_away".to_string(), self.rates.away);
        out.insert("max_goals".to_string(), max_goals as f64);
        if let RateSource::Split(fraction) = self.source {
            out.insert("half_fraction".to_string(), fraction);
        }
        out
    }

    fn describe(&self) -> String {
        let rates = format!("λh={:.3} λa={:.3}", self.rates.home, self.rates.away);
        match self.source {
            RateSource::FullTime => format!("independent Poisson grid, {rates}"),
            RateSource::Split(f) => format!(
                "independent Poisson grid on {:.0}% of full-time rates ({rates}), fixed-split approximation",
                f * 100.0
            ),
            RateSource::Explicit => format!("independent Poisson grid on observed half rates ({rates})"),
        }
    }
}

/// Collects records for one fixture.
struct Emitter<'e> {
    fixture_id: u64,
    version: &'e str,
    ceiling: f64,
    out: Vec<MarketProbability>,
}

/// Band, model and inputs shared by every selection priced from one model.
struct Basis<'i> {
    band: f64,
    model_name: ModelName,
    inputs: &'i BTreeMap<String, f64>,
}

impl Emitter<'_> {
    fn push(
        &mut self,
        market: Market,
        selection: Selection,
        p: f64,
        basis: &Basis<'_>,
        rationale: String,
    ) {
        self.out.push(MarketProbability {
            fixture_id: self.fixture_id,
            market,
            selection,
            label: market.label(selection),
            p_model: p.clamp(0.0, 1.0),
            uncertainty: basis.band.clamp(0.0, self.ceiling),
            model_name: basis.model_name,
            model_inputs: basis.inputs.clone(),
            rationale,
            engine_version: self.version.to_string(),
        });
    }

    /// Emit a two-way over/under style pair from P(first).
    fn push_pair(
        &mut self,
        market: Market,
        (first, second): (Selection, Selection),
        p_first: f64,
        basis: &Basis<'_>,
        rationale: &str,
    ) {
        let p_first = p_first.clamp(0.0, 1.0);
        let label = market.label(first);
        self.push(
            market,
            first,
            p_first,
            basis,
            format!("P({label}) from {rationale}"),
        );
        let label = market.label(second);
        self.push(
            market,
            second,
            1.0 - p_first,
            basis,
            format!("P({label}) = 1 - P({}) from {rationale}", market.label(first)),
        );
    }
}

/// Market Probability Engine: snapshot in, priced selections out. Pure and
/// deterministic for a given catalog.
pub struct MarketEngine<'a> {
    catalog: &'a MarketCatalog,
    version: String,
}

impl MarketEngine<'static> {
    pub fn with_default_catalog() -> Result<Self, EngineError> {
        Ok(Self::new(default_catalog()?))
    }
}

impl<'a> MarketEngine<'a> {
    pub fn new(catalog: &'a MarketCatalog) -> Self {
        let version = format!("{}+catalog.{}", env!("CARGO_PKG_VERSION"), catalog.version);
        Self { catalog, version }
    }

    pub fn engine_version(&self) -> &str {
        &self.version
    }

    pub fn catalog(&self) -> &MarketCatalog {
        self.catalog
    }

    /// Price every catalog market for one fixture.
    pub fn compute(&self, metrics: &MatchMetrics) -> Result<Vec<MarketProbability>, EngineError> {
        let missing = metrics.missing_required();
        if !missing.is_empty() {
            return Err(EngineError::InsufficientData(format!(
                "fixture {} missing {}",
                metrics.fixture_id,
                missing.join(", ")
            )));
        }
        Ok(self.compute_fixture(metrics)?)
    }

    /// Price a set of fixtures in parallel. A snapshot missing a required rate
    /// aborts the whole batch; invalid numbers only drop their own fixture.
    pub fn compute_batch(&self, batch: &[MatchMetrics]) -> Result<MarketBatch, EngineError> {
        if batch.is_empty() {
            return Err(EngineError::InsufficientData("no fixtures supplied".to_string()));
        }
        for metrics in batch {
            let missing = metrics.missing_required();
            if !missing.is_empty() {
                return Err(EngineError::InsufficientData(format!(
                    "fixture {} missing {}",
                    metrics.fixture_id,
                    missing.join(", ")
                )));
            }
        }

        let results: Vec<(u64, Result<Vec<MarketProbability>, ModelComputationError>)> = batch
            .par_iter()
            .map(|m| (m.fixture_id, self.compute_fixture(m)))
            .collect();

        let mut out = MarketBatch::default();
        for (fixture_id, result) in results {
            match result {
                Ok(records) => {
                    debug!(fixture_id, records = records.len(), "markets computed");
                    out.records.extend(records);
                }
                Err(err) => {
                    warn!(fixture_id, error = %err, "market computation failed");
                    out.failures.push(FixtureFailure {
                        fixture_id,
                        error: err.to_string(),
                    });
                }
            }
        }

        if out.records.is_empty() {
            return Err(EngineError::InsufficientData(format!(
                "no analyzable fixtures ({} failed)",
                out.failures.len()
            )));
        }
        info!(
            fixtures = batch.len(),
            failed = out.failures.len(),
            records = out.records.len(),
            "market batch complete"
        );
        Ok(out)
    }

    /// Same as [`compute_batch`](Self::compute_batch), run inside `pool` when given.
    pub fn compute_batch_in(
        &self,
        pool: Option<&rayon::ThreadPool>,
        batch: &[MatchMetrics],
    ) -> Result<MarketBatch, EngineError> {
        match pool {
            Some(pool) => pool.install(|| self.compute_batch(batch)),
            None => self.compute_batch(batch),
        }
    }

    fn compute_fixture(
        &self,
        metrics: &MatchMetrics,
    ) -> Result<Vec<MarketProbability>, ModelComputationError> {
        metrics.validate()?;
        let max_goals = self.catalog.max_goals;
        let split = self.catalog.half_time_split;

        let full = PeriodModel::build(metrics.goal_rates()?, RateSource::FullTime, max_goals);
        let first = half_model(metrics, true, split.first_half, max_goals)?;
        let second = half_model(metrics, false, split.second_half, max_goals)?;

        let mut emit = Emitter {
            fixture_id: metrics.fixture_id,
            version: &self.version,
            ceiling: self.catalog.uncertainty.ceiling,
            out: Vec::new(),
        };

        for entry in &self.catalog.entries {
            for period in &entry.periods {
                let model = match period {
                    Period::FullTime => &full,
                    Period::FirstHalf => &first,
                    Period::SecondHalf => &second,
                };
                let band = self.band(entry, metrics, *period);
                match entry.family {
                    MarketFamily::MatchResult => {
                        emit_match_result(&mut emit, model, *period, band, max_goals)
                    }
                    MarketFamily::DoubleChance => {
                        emit_double_chance(&mut emit, model, *period, band, max_goals)
                    }
                    MarketFamily::TotalGoals => {
                        emit_total_goals(&mut emit, entry, model, *period, band, max_goals)
                    }
                    MarketFamily::BothTeamsToScore => {
                        let band = band + self.btts_divergence(metrics, model);
                        emit_btts(&mut emit, metrics, model, band, max_goals)
                    }
                    MarketFamily::TeamGoals => {
                        emit_team_goals(&mut emit, entry, model, band, max_goals)
                    }
                    MarketFamily::Handicap => emit_handicap(&mut emit, entry, model, band, max_goals),
                    MarketFamily::Corners => emit_corners(&mut emit, entry, metrics, band)?,
                    MarketFamily::Cards => emit_cards(&mut emit, entry, metrics, band)?,
                }
            }
        }
        Ok(emit.out)
    }

    fn band(&self, entry: &CatalogEntry, metrics: &MatchMetrics, period: Period) -> f64 {
        let policy = self.catalog.uncertainty;
        let mut u = entry.base_uncertainty;
        if metrics.quality_flags.small_sample {
            u += policy.small_sample_widen;
        }
        if period != Period::FullTime {
            u *= policy.half_time_multiplier;
        }
        u
    }

    /// BTTS is always priced from the joint grid; historical rates only widen it.
    fn btts_divergence(&self, metrics: &MatchMetrics, model: &PeriodModel) -> f64 {
        match (metrics.btts_home_rate, metrics.btts_away_rate) {
            (Some(h), Some(a)) => {
                let empirical = h * a;
                self.catalog.uncertainty.btts_divergence_weight
                    * (model.grid.btts_yes() - empirical).abs()
            }
            _ => 0.0,
        }
    }
}

fn half_model(
    metrics: &MatchMetrics,
    first_half: bool,
    fraction: f64,
    max_goals: u32,
) -> Result<PeriodModel, ModelComputationError> {
    let (rates, explicit) = metrics.half_rates(first_half, fraction)?;
    let source = if explicit {
        RateSource::Explicit
    } else {
        RateSource::Split(fraction)
    };
    Ok(PeriodModel::build(rates, source, max_goals))
}

fn emit_match_result(
    emit: &mut Emitter<'_>,
    model: &PeriodModel,
    period: Period,
    band: f64,
    max_goals: u32,
) {
    let market = Market::MatchResult { period };
    let inputs = model.inputs(max_goals);
    let basis = Basis {
        band,
        model_name: model.model_name(),
        inputs: &inputs,
    };
    let desc = model.describe();
    for (selection, p) in [
        (Selection::Home, model.probs.home),
        (Selection::Draw, model.probs.draw),
        (Selection::Away, model.probs.away),
    ] {
        let label = market.label(selection);
        emit.push(
            market,
            selection,
            p,
            &basis,
            format!("P({label}) from {desc}"),
        );
    }
}

fn emit_double_chance(
    emit: &mut Emitter<'_>,
    model: &PeriodModel,
    period: Period,
    band: f64,
    max_goals: u32,
) {
    let market = Market::DoubleChance { period };
    let inputs = model.inputs(max_goals);
    let basis = Basis {
        band,
        model_name: model.model_name(),
        inputs: &inputs,
    };
    let p = model.probs;
    for (selection, value, parts) in [
        (Selection::HomeOrDraw, p.home + p.draw, "home + draw"),
        (Selection::DrawOrAway, p.draw + p.away, "draw + away"),
        (Selection::HomeOrAway, p.home + p.away, "home + away"),
    ] {
        emit.push(
            market,
            selection,
            value,
            &basis,
            format!("P({}) = P({parts}) from the 1X2 partition", market.label(selection)),
        );
    }
}

fn emit_total_goals(
    emit: &mut Emitter<'_>,
    entry: &CatalogEntry,
    model: &PeriodModel,
    period: Period,
    band: f64,
    max_goals: u32,
) {
    let desc = model.describe();
    for (line, always) in lines(entry) {
        let p_over = model.grid.total_at_least(line.next_integer_above());
        if !always && !entry.is_relevant(p_over) {
            continue;
        }
        let mut inputs = model.inputs(max_goals);
        inputs.insert("line".to_string(), line.value());
        let basis = Basis {
            band,
            model_name: model.model_name(),
            inputs: &inputs,
        };
        emit.push_pair(
            Market::TotalGoals { period, line },
            (Selection::Over, Selection::Under),
            p_over,
            &basis,
            &desc,
        );
    }
}

fn emit_btts(
    emit: &mut Emitter<'_>,
    metrics: &MatchMetrics,
    model: &PeriodModel,
    band: f64,
    max_goals: u32,
) {
    let mut inputs = model.inputs(max_goals);
    if let Some(v) = metrics.btts_home_rate {
        inputs.insert("btts_home_rate".to_string(), v);
    }
    if let Some(v) = metrics.btts_away_rate {
        inputs.insert("btts_away_rate".to_string(), v);
    }
    let desc = format!(
        "1 - P(h=0) - P(a=0) + P(0,0) on the {}",
        model.describe()
    );
    let basis = Basis {
        band,
        model_name: model.model_name(),
        inputs: &inputs,
    };
    emit.push_pair(
        Market::BothTeamsToScore,
        (Selection::Yes, Selection::No),
        model.grid.btts_yes(),
        &basis,
        &desc,
    );
}

fn emit_team_goals(
    emit: &mut Emitter<'_>,
    entry: &CatalogEntry,
    model: &PeriodModel,
    band: f64,
    max_goals: u32,
) {
    for side in [Side::Home, Side::Away] {
        let lambda = match side {
            Side::Home => model.rates.home,
            Side::Away => model.rates.away,
        };
        for (line, always) in lines(entry) {
            let p_over = model
                .grid
                .team_at_least(side == Side::Home, line.next_integer_above());
            if !always && !entry.is_relevant(p_over) {
                continue;
            }
            let mut inputs = BTreeMap::new();
            inputs.insert("lambda".to_string(), lambda);
            inputs.insert("line".to_string(), line.value());
            inputs.insert("max_goals".to_string(), max_goals as f64);
            let basis = Basis {
                band,
                model_name: ModelName::PoissonMarginal,
                inputs: &inputs,
            };
            emit.push_pair(
                Market::TeamGoals { side, line },
                (Selection::Over, Selection::Under),
                p_over,
                &basis,
                &format!("the side's own Poisson marginal, λ={lambda:.3}"),
            );
        }
    }
}

fn emit_handicap(
    emit: &mut Emitter<'_>,
    entry: &CatalogEntry,
    model: &PeriodModel,
    band: f64,
    max_goals: u32,
) {
    let desc = model.describe();
    for (line, _) in lines(entry) {
        // Home covers when h + line > a, i.e. h - a is above -line.
        let p_home = model.grid.margin_at_least(line.negated().next_integer_above());
        let mut inputs = model.inputs(max_goals);
        inputs.insert("line".to_string(), line.value());
        let basis = Basis {
            band,
            model_name: model.model_name(),
            inputs: &inputs,
        };
        emit.push_pair(
            Market::Handicap { line },
            (Selection::Home, Selection::Away),
            p_home,
            &basis,
            &desc,
        );
    }
}

fn emit_corners(
    emit: &mut Emitter<'_>,
    entry: &CatalogEntry,
    metrics: &MatchMetrics,
    band: f64,
) -> Result<(), ModelComputationError> {
    let Some(mean) = metrics.corners_expected_total else {
        return Ok(());
    };
    if metrics.quality_flags.low_coverage_corners || mean <= entry.min_expected {
        return Ok(());
    }
    let (std, std_defaulted) = match metrics.corners_std {
        Some(v) => (metrics.check_std("corners_std", v)?, false),
        None => (mean.sqrt(), true),
    };
    let count = CountModel {
        what: "corners",
        mean,
        std,
        std_defaulted,
    };
    emit_normal_lines(emit, entry, band, &count, |line| Market::Corners { line });
    Ok(())
}

fn emit_cards(
    emit: &mut Emitter<'_>,
    entry: &CatalogEntry,
    metrics: &MatchMetrics,
    band: f64,
) -> Result<(), ModelComputationError> {
    let Some(raw) = metrics.cards_expected_total else {
        return Ok(());
    };
    let mean = raw * metrics.referee_factor;
    if metrics.quality_flags.low_coverage_cards || mean <= entry.min_expected {
        return Ok(());
    }
    let (std, std_defaulted) = match metrics.cards_std {
        Some(v) => (metrics.check_std("cards_std", v)?, false),
        None => (mean.sqrt(), true),
    };
    let count = CountModel {
        what: "cards",
        mean,
        std,
        std_defaulted,
    };
    emit_normal_lines(emit, entry, band, &count, |line| Market::Cards { line });
    Ok(())
}

/// Normal approximation of a match count (corners, cards).
struct CountModel {
    what: &'static str,
    mean: f64,
    std: f64,
    /// No observed std, so `sqrt(mean)` stands in.
    std_defaulted: bool,
}

fn emit_normal_lines(
    emit: &mut Emitter<'_>,
    entry: &CatalogEntry,
    band: f64,
    count: &CountModel,
    market_for: impl Fn(Line) -> Market,
) {
    let CountModel {
        what,
        mean,
        std,
        std_defaulted,
    } = *count;
    let std_note = if std_defaulted { " (std = sqrt(mean))" } else { "" };
    for (line, always) in lines(entry) {
        let p_over = normal_tail(line.value(), mean, std);
        if !always && !entry.is_relevant(p_over) {
            continue;
        }
        let mut inputs = BTreeMap::new();
        inputs.insert("mean".to_string(), mean);
        inputs.insert("std".to_string(), std);
        inputs.insert("line".to_string(), line.value());
        inputs.insert("z".to_string(), (line.value() - mean) / std);
        let basis = Basis {
            band,
            model_name: ModelName::NormalApprox,
            inputs: &inputs,
        };
        emit.push_pair(
            market_for(line),
            (Selection::Over, Selection::Under),
            p_over,
            &basis,
            &format!("normal approximation of {what}, mean={mean:.2} std={std:.2}{std_note}"),
        );
    }
}

fn lines(entry: &CatalogEntry) -> impl Iterator<Item = (Line, bool)> + '_ {
    entry
        .always_lines
        .iter()
        .map(|l| (*l, true))
        .chain(entry.optional_lines.iter().map(|l| (*l, false)))
}

/// SHA-256 of the serialized records, base64-encoded. Equal fingerprints mean
/// byte-identical output.
pub fn fingerprint(records: &[MarketProbability]) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(records)?;
    Ok(BASE64.encode(Sha256::digest(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::QualityFlags;

    fn engine() -> MarketEngine<'static> {
        MarketEngine::with_default_catalog().unwrap()
    }

    fn find<'r>(
        records: &'r [MarketProbability],
        market: Market,
        selection: Selection,
    ) -> &'r MarketProbability {
        records
            .iter()
            .find(|r| r.market == market && r.selection == selection)
            .unwrap_or_else(|| panic!("missing {}", market.label(selection)))
    }

    fn line(v: f64) -> Line {
        Line::try_from(v).unwrap()
    }

    #[test]
    fn half_time_band_is_wider_than_full_time() {
        let records = engine().compute(&MatchMetrics::new(1, 1.4, 1.1)).unwrap();
        let ft = find(&records, Market::MatchResult { period: Period::FullTime }, Selection::Home);
        let ht = find(&records, Market::MatchResult { period: Period::FirstHalf }, Selection::Home);
        assert!(ht.uncertainty > ft.uncertainty);
        assert_eq!(ht.model_name, ModelName::PoissonGridHalf);
        assert_eq!(ht.model_inputs.get("half_fraction"), Some(&0.45));
    }

    #[test]
    fn explicit_half_rates_replace_the_split() {
        let mut m = MatchMetrics::new(1, 1.4, 1.1);
        m.half_time = Some(crate::metrics::HalfTimeRates {
            home_first_half: 0.2,
            away_first_half: 0.2,
            home_second_half: 1.2,
            away_second_half: 0.9,
        });
        let records = engine().compute(&m).unwrap();
        let ht = find(&records, Market::MatchResult { period: Period::FirstHalf }, Selection::Draw);
        assert!(!ht.model_inputs.contains_key("half_fraction"));
        assert_eq!(ht.model_inputs.get("lambda_home"), Some(&0.2));
        assert!(ht.rationale.contains("observed half rates"));
    }

    #[test]
    fn small_sample_widens_bands() {
        let plain = engine().compute(&MatchMetrics::new(1, 1.4, 1.1)).unwrap();
        let mut m = MatchMetrics::new(1, 1.4, 1.1);
        m.quality_flags = QualityFlags {
            small_sample: true,
            ..QualityFlags::default()
        };
        let flagged = engine().compute(&m).unwrap();
        let market = Market::BothTeamsToScore;
        assert!(
            find(&flagged, market, Selection::Yes).uncertainty
                > find(&plain, market, Selection::Yes).uncertainty
        );
        assert_eq!(plain.len(), flagged.len());
    }

    #[test]
    fn corners_need_coverage_and_volume() {
        let mut m = MatchMetrics::new(1, 1.4, 1.1);
        m.corners_expected_total = Some(10.0);
        m.corners_std = Some(3.0);
        let with = engine().compute(&m).unwrap();
        assert!(with.iter().any(|r| r.market.family() == MarketFamily::Corners));

        m.quality_flags.low_coverage_corners = true;
        let without = engine().compute(&m).unwrap();
        assert!(!without.iter().any(|r| r.market.family() == MarketFamily::Corners));

        m.quality_flags.low_coverage_corners = false;
        m.corners_expected_total = Some(4.0);
        let low = engine().compute(&m).unwrap();
        assert!(!low.iter().any(|r| r.market.family() == MarketFamily::Corners));
    }

    #[test]
    fn corner_bands_are_wider_than_goal_bands() {
        let mut m = MatchMetrics::new(1, 1.4, 1.1);
        m.corners_expected_total = Some(10.0);
        m.corners_std = Some(3.0);
        let records = engine().compute(&m).unwrap();
        let corners = find(&records, Market::Corners { line: line(9.5) }, Selection::Over);
        let goals = find(
            &records,
            Market::TotalGoals {
                period: Period::FullTime,
                line: line(2.5),
            },
            Selection::Over,
        );
        assert!(corners.uncertainty > goals.uncertainty);
        assert_eq!(corners.model_name, ModelName::NormalApprox);
        assert!((corners.p_model - normal_tail(9.5, 10.0, 3.0)).abs() < 1e-12);
    }

    #[test]
    fn zero_corner_std_is_fatal_for_the_fixture() {
        let mut m = MatchMetrics::new(9, 1.4, 1.1);
        m.corners_expected_total = Some(10.0);
        m.corners_std = Some(0.0);
        let err = engine().compute(&m).unwrap_err();
        assert!(matches!(err, EngineError::ModelComputation(e) if e.field == "corners_std"));
    }

    #[test]
    fn referee_factor_scales_cards() {
        let mut m = MatchMetrics::new(1, 1.4, 1.1);
        m.cards_expected_total = Some(4.0);
        m.referee_factor = 1.25;
        let records = engine().compute(&m).unwrap();
        let over = find(&records, Market::Cards { line: line(4.5) }, Selection::Over);
        assert_eq!(over.model_inputs.get("mean"), Some(&5.0));
        assert!(over.rationale.contains("sqrt(mean)"));
    }

    #[test]
    fn paired_selections_share_band_model_and_inputs() {
        let mut m = MatchMetrics::new(1, 1.4, 1.1);
        m.corners_expected_total = Some(10.0);
        m.corners_std = Some(3.0);
        m.cards_expected_total = Some(4.2);
        let records = engine().compute(&m).unwrap();
        let mut seen = std::collections::HashSet::new();
        for r in &records {
            assert!(seen.insert((r.market, r.selection)), "{} emitted twice", r.label);
        }
        for (market, over, under) in [
            (Market::Corners { line: line(9.5) }, Selection::Over, Selection::Under),
            (Market::Cards { line: line(3.5) }, Selection::Over, Selection::Under),
            (Market::BothTeamsToScore, Selection::Yes, Selection::No),
            (Market::Handicap { line: line(-0.5) }, Selection::Home, Selection::Away),
        ] {
            let a = find(&records, market, over);
            let b = find(&records, market, under);
            assert_eq!(a.uncertainty, b.uncertainty);
            assert_eq!(a.model_name, b.model_name);
            assert_eq!(a.model_inputs, b.model_inputs);
            assert!((a.p_model + b.p_model - 1.0).abs() < 1e-12);
        }
        let corners = find(&records, Market::Corners { line: line(9.5) }, Selection::Over);
        assert_eq!(corners.model_inputs.get("std"), Some(&3.0));
        assert!(!corners.rationale.contains("sqrt(mean)"));
    }

    #[test]
    fn handicap_minus_one_and_a_half_is_two_goal_margin() {
        let m = MatchMetrics::new(1, 1.8, 0.7);
        let records = engine().compute(&m).unwrap();
        let h = find(&records, Market::Handicap { line: line(-1.5) }, Selection::Home);
        let grid = ScoreGrid::from_rates(1.8, 0.7, 10);
        assert!((h.p_model - grid.margin_at_least(2)).abs() < 1e-12);

        let plus_half = find(&records, Market::Handicap { line: line(0.5) }, Selection::Home);
        let dc = find(&records, Market::DoubleChance { period: Period::FullTime }, Selection::HomeOrDraw);
        assert!((plus_half.p_model - dc.p_model).abs() < 1e-9);
    }

    #[test]
    fn optional_total_lines_are_dropped_when_irrelevant() {
        let records = engine().compute(&MatchMetrics::new(1, 0.6, 0.4)).unwrap();
        let has = |v: f64| {
            records.iter().any(|r| {
                r.market
                    == Market::TotalGoals {
                        period: Period::FullTime,
                        line: line(v),
                    }
            })
        };
        assert!(has(0.5) && has(1.5) && has(2.5));
        assert!(!has(4.5));
    }

    #[test]
    fn missing_rate_is_insufficient_data() {
        let mut m = MatchMetrics::new(1, 1.0, 1.0);
        m.lambda_home = None;
        assert!(matches!(engine().compute(&m), Err(EngineError::InsufficientData(_))));
    }

    #[test]
    fn fingerprint_is_stable() {
        let m = MatchMetrics::new(5, 1.3, 1.0);
        let a = engine().compute(&m).unwrap();
        let b = engine().compute(&m).unwrap();
        assert_eq!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
        assert!(a.iter().all(|r| r.engine_version == engine().engine_version()));
    }
}
