use serde::{Deserialize, Serialize};

use crate::error::ModelComputationError;

/// Per-fixture statistical snapshot, aggregated upstream from recent form.
/// Immutable once built; the engine only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchMetrics {
    pub fixture_id: u64,
    /// Expected goals scored by each side. Absent means the upstream aggregation
    /// could not produce the rate at all.
    pub lambda_home: Option<f64>,
    pub lambda_away: Option<f64>,
    /// Historical share of matches in which each side scored. Used only to widen
    /// the BTTS band, never to price it.
    #[serde(default)]
    pub btts_home_rate: Option<f64>,
    #[serde(default)]
    pub btts_away_rate: Option<f64>,
    #[serde(default)]
    pub corners_expected_total: Option<f64>,
    #[serde(default)]
    pub corners_std: Option<f64>,
    #[serde(default)]
    pub cards_expected_total: Option<f64>,
    /// Defaults to sqrt of the adjusted mean (Poisson variance) when absent.
    #[serde(default)]
    pub cards_std: Option<f64>,
    #[serde(default = "default_referee_factor")]
    pub referee_factor: f64,
    /// Observed half-time scoring rates; when present they replace the fixed split.
    #[serde(default)]
    pub half_time: Option<HalfTimeRates>,
    #[serde(default)]
    pub quality_flags: QualityFlags,
}

fn default_referee_factor() -> f64 {
    1.0
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityFlags {
    #[serde(default)]
    pub small_sample: bool,
    #[serde(default)]
    pub low_coverage_corners: bool,
    #[serde(default)]
    pub low_coverage_cards: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HalfTimeRates {
    pub home_first_half: f64,
    pub away_first_half: f64,
    pub home_second_half: f64,
    pub away_second_half: f64,
}

/// Goal rates after presence and range checks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GoalRates {
    pub home: f64,
    pub away: f64,
}

impl MatchMetrics {
    pub fn new(fixture_id: u64, lambda_home: f64, lambda_away: f64) -> Self {
        Self {
            fixture_id,
            lambda_home: Some(lambda_home),
            lambda_away: Some(lambda_away),
            btts_home_rate: None,
            btts_away_rate: None,
            corners_expected_total: None,
            corners_std: None,
            cards_expected_total: None,
            cards_std: None,
            referee_factor: 1.0,
            half_time: None,
            quality_flags: QualityFlags::default(),
        }
    }

    /// Names of required rate fields that are absent.
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.lambda_home.is_none() {
            out.push("lambda_home");
        }
        if self.lambda_away.is_none() {
            out.push("lambda_away");
        }
        out
    }

    /// Full-time goal rates, rejecting NaN, infinite and negative values.
    /// Absent rates are reported as NaN here; callers check presence first.
    pub fn goal_rates(&self) -> Result<GoalRates, ModelComputationError> {
        let home = self.check_rate("lambda_home", self.lambda_home.unwrap_or(f64::NAN))?;
        let away = self.check_rate("lambda_away", self.lambda_away.unwrap_or(f64::NAN))?;
        Ok(GoalRates { home, away })
    }

    /// Per-half rates: explicit when supplied, else the full-time rates scaled by
    /// `fraction`. The flag says which source was used.
    pub fn half_rates(
        &self,
        first_half: bool,
        fraction: f64,
    ) -> Result<(GoalRates, bool), ModelComputationError> {
        if let Some(ht) = self.half_time {
            let (home, away, home_field, away_field) = if first_half {
                (ht.home_first_half, ht.away_first_half, "half_time.home_first_half", "half_time.away_first_half")
            } else {
                (ht.home_second_half, ht.away_second_half, "half_time.home_second_half", "half_time.away_second_half")
            };
            let rates = GoalRates {
                home: self.check_rate(home_field, home)?,
                away: self.check_rate(away_field, away)?,
            };
            return Ok((rates, true));
        }
        let full = self.goal_rates()?;
        Ok((
            GoalRates {
                home: full.home * fraction,
                away: full.away * fraction,
            },
            false,
        ))
    }

    pub fn check_rate(&self, field: &'static str, value: f64) -> Result<f64, ModelComputationError> {
        if value.is_nan() {
            return Err(ModelComputationError::new(self.fixture_id, field, value, "not a number"));
        }
        if !value.is_finite() {
            return Err(ModelComputationError::new(self.fixture_id, field, value, "not finite"));
        }
        if value < 0.0 {
            return Err(ModelComputationError::new(self.fixture_id, field, value, "negative"));
        }
        Ok(value)
    }

    pub fn check_probability(
        &self,
        field: &'static str,
        value: f64,
    ) -> Result<f64, ModelComputationError> {
        let v = self.check_rate(field, value)?;
        if v > 1.0 {
            return Err(ModelComputationError::new(self.fixture_id, field, value, "above 1"));
        }
        Ok(v)
    }

    pub fn check_std(&self, field: &'static str, value: f64) -> Result<f64, ModelComputationError> {
        let v = self.check_rate(field, value)?;
        if v == 0.0 {
            return Err(ModelComputationError::new(self.fixture_id, field, value, "zero standard deviation"));
        }
        Ok(v)
    }

    /// Range-check every optional numeric input that is present.
    pub fn validate(&self) -> Result<(), ModelComputationError> {
        self.goal_rates()?;
        if let Some(v) = self.btts_home_rate {
            self.check_probability("btts_home_rate", v)?;
        }
        if let Some(v) = self.btts_away_rate {
            self.check_probability("btts_away_rate", v)?;
        }
        if let Some(v) = self.corners_expected_total {
            self.check_rate("corners_expected_total", v)?;
        }
        if let Some(v) = self.cards_expected_total {
            self.check_rate("cards_expected_total", v)?;
        }
        let referee = self.check_rate("referee_factor", self.referee_factor)?;
        if referee == 0.0 {
            return Err(ModelComputationError::new(self.fixture_id, "referee_factor", referee, "zero"));
        }
        if self.half_time.is_some() {
            self.half_rates(true, 0.0)?;
            self.half_rates(false, 0.0)?;
        }
        Ok(())
    }
}
