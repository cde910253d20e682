use thiserror::Error;

/// Fatal outcomes of an engine call. A caller receiving one of these must treat the
/// whole call as failed; there is never partial output alongside it.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    /// Too few analyzable fixtures, or a snapshot missing a required rate field.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("{0}")]
    ModelComputation(#[from] ModelComputationError),

    /// The batch was cancelled before it committed.
    #[error("batch cancelled after {considered} drafts")]
    Cancelled { considered: usize },

    #[error("market catalog error: {0}")]
    Catalog(String),

    #[error("invalid constraints: {0}")]
    InvalidConstraints(String),
}

/// Invalid numeric input for one fixture. Aborts that fixture only.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("fixture {fixture_id}: invalid {field} ({value}): {reason}")]
pub struct ModelComputationError {
    pub fixture_id: u64,
    pub field: &'static str,
    pub value: f64,
    pub reason: &'static str,
}

impl ModelComputationError {
    pub fn new(fixture_id: u64, field: &'static str, value: f64, reason: &'static str) -> Self {
        Self {
            fixture_id,
            field,
            value,
            reason,
        }
    }
}

/// Why a single candidate leg or draft parlay was filtered. Never fatal; counted in
/// the batch diagnostics.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RejectReason {
    #[error("structural: {0}")]
    Structural(String),

    #[error("leg odds {odds:.3} outside [{min:.3}, {max:.3}]")]
    LegOdds { odds: f64, min: f64, max: f64 },

    #[error("combined odds {odds:.3} outside [{min:.3}, {max:.3}]")]
    CombinedOdds { odds: f64, min: f64, max: f64 },

    #[error("duplicate exposure on fixture {fixture_id} market {market}")]
    DuplicateConflict { fixture_id: u64, market: String },
}

impl RejectReason {
    /// Leg and combined odds failures are both constraint violations.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::LegOdds { .. } | Self::CombinedOdds { .. })
    }
}
