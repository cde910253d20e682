use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::market::{Line, Market, MarketFamily, Period};

static DEFAULT_CATALOG_JSON: &str = include_str!("../data/market_catalog.json");

static DEFAULT_CATALOG: OnceCell<MarketCatalog> = OnceCell::new();

/// Which markets the engine emits and how wide their bands are. Adding a line or a
/// period is an edit to `data/market_catalog.json`, not to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketCatalog {
    pub version: u32,
    /// Highest per-team goal count held in the score grid; tail mass folds into it.
    pub max_goals: u32,
    pub half_time_split: HalfTimeSplit,
    pub uncertainty: UncertaintyPolicy,
    pub entries: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HalfTimeSplit {
    pub first_half: f64,
    pub second_half: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UncertaintyPolicy {
    /// Added to goal-market bands when the snapshot flags a small sample.
    pub small_sample_widen: f64,
    /// Multiplies the band of every half-time market.
    pub half_time_multiplier: f64,
    /// Share of |joint BTTS - historical BTTS| added to the BTTS band.
    pub btts_divergence_weight: f64,
    pub ceiling: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OddsRange {
    pub min: f64,
    pub max: f64,
}

impl OddsRange {
    pub fn contains(&self, odds: f64) -> bool {
        odds >= self.min && odds <= self.max
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub family: MarketFamily,
    #[serde(default = "default_periods")]
    pub periods: Vec<Period>,
    /// Lines emitted whatever their probability.
    #[serde(default)]
    pub always_lines: Vec<Line>,
    /// Lines emitted only while `relevance_floor <= P(over) <= 1 - relevance_floor`.
    #[serde(default)]
    pub optional_lines: Vec<Line>,
    #[serde(default = "default_relevance_floor")]
    pub relevance_floor: f64,
    /// Corners/cards gate: the expected total must exceed this.
    #[serde(default)]
    pub min_expected: f64,
    pub base_uncertainty: f64,
    pub odds_range: OddsRange,
}

fn default_periods() -> Vec<Period> {
    vec![Period::FullTime]
}

fn default_relevance_floor() -> f64 {
    0.10
}

impl CatalogEntry {
    pub fn is_relevant(&self, p_over: f64) -> bool {
        p_over >= self.relevance_floor && p_over <= 1.0 - self.relevance_floor
    }

    fn has_lines(&self) -> bool {
        !self.always_lines.is_empty() || !self.optional_lines.is_empty()
    }
}

impl MarketCatalog {
    pub fn from_json_str(raw: &str) -> Result<Self, EngineError> {
        let catalog: MarketCatalog = serde_json::from_str(raw)
            .map_err(|err| EngineError::Catalog(format!("invalid catalog json: {err}")))?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read market catalog {}", path.display()))?;
        let catalog = Self::from_json_str(&raw).context("parse market catalog")?;
        Ok(catalog)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let bad = |msg: String| Err(EngineError::Catalog(msg));
        if self.version == 0 {
            return bad("version must be positive".to_string());
        }
        if !(4..=30).contains(&self.max_goals) {
            return bad(format!("max_goals {} outside 4..=30", self.max_goals));
        }
        let split = self.half_time_split;
        if !(split.first_half > 0.0 && split.second_half > 0.0)
            || (split.first_half + split.second_half - 1.0).abs() > 1e-9
        {
            return bad("half_time_split must be positive and sum to 1".to_string());
        }
        let u = self.uncertainty;
        if !(0.0..=1.0).contains(&u.ceiling)
            || u.small_sample_widen < 0.0
            || u.half_time_multiplier < 1.0
            || u.btts_divergence_weight < 0.0
        {
            return bad("uncertainty policy out of range".to_string());
        }

        let mut covered: HashSet<(MarketFamily, Period)> = HashSet::new();
        for entry in &self.entries {
            let name = format!("{:?}", entry.family);
            if entry.periods.is_empty() {
                return bad(format!("{name}: no periods"));
            }
            // Each (family, period) belongs to one entry, or partitions double up.
            if let Some(period) = entry
                .periods
                .iter()
                .find(|p| !covered.insert((entry.family, **p)))
            {
                return bad(format!("{name}: period {period:?} listed twice"));
            }
            let mut lines = HashSet::new();
            if let Some(line) = entry
                .always_lines
                .iter()
                .chain(&entry.optional_lines)
                .find(|l| !lines.insert(**l))
            {
                return bad(format!("{name}: line {line} listed twice"));
            }
            if !(0.0..=1.0).contains(&entry.base_uncertainty) {
                return bad(format!("{name}: base_uncertainty outside [0,1]"));
            }
            if !(0.0..0.5).contains(&entry.relevance_floor) {
                return bad(format!("{name}: relevance_floor outside [0,0.5)"));
            }
            if !(entry.odds_range.min > 1.0 && entry.odds_range.min < entry.odds_range.max) {
                return bad(format!("{name}: odds_range must satisfy 1 < min < max"));
            }
            let needs_lines = matches!(
                entry.family,
                MarketFamily::TotalGoals
                    | MarketFamily::TeamGoals
                    | MarketFamily::Handicap
                    | MarketFamily::Corners
                    | MarketFamily::Cards
            );
            if needs_lines != entry.has_lines() {
                return bad(format!("{name}: lines given where not applicable, or missing"));
            }
            let full_time_only = !matches!(
                entry.family,
                MarketFamily::MatchResult | MarketFamily::DoubleChance | MarketFamily::TotalGoals
            );
            if full_time_only && entry.periods.iter().any(|p| *p != Period::FullTime) {
                return bad(format!("{name}: only full_time is supported"));
            }
        }
        Ok(())
    }

    /// The entry governing a market, if the catalog prices it.
    pub fn entry_for(&self, market: &Market) -> Option<&CatalogEntry> {
        let family = market.family();
        let period = market.period();
        self.entries
            .iter()
            .find(|e| e.family == family && e.periods.contains(&period))
    }

    pub fn odds_range(&self, market: &Market) -> Option<OddsRange> {
        self.entry_for(market).map(|e| e.odds_range)
    }
}

/// The catalog shipped with the crate, parsed once.
pub fn default_catalog() -> Result<&'static MarketCatalog, EngineError> {
    DEFAULT_CATALOG.get_or_try_init(|| MarketCatalog::from_json_str(DEFAULT_CATALOG_JSON))
}
