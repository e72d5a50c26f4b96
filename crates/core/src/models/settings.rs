use serde::{Deserialize, Serialize};

use super::price::Interval;
use crate::errors::CoreError;

/// Tunable limits and numeric constants of the analytics engine.
///
/// Every field has a default, so a partial JSON document only needs to
/// name the values it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsSettings {
    /// Fewest symbols accepted in one request.
    pub min_symbols: usize,

    /// Most symbols accepted in one request.
    pub max_symbols: usize,

    /// Rows kept per symbol (most recent first) before alignment.
    pub max_rows_per_symbol: usize,

    /// Minimum aligned price rows for weekly data.
    pub min_rows_weekly: usize,

    /// Minimum aligned price rows for monthly data.
    pub min_rows_monthly: usize,

    /// Highest annual risk-free rate accepted.
    pub max_risk_free_rate: f64,

    pub min_frontier_points: usize,
    pub max_frontier_points: usize,
    pub default_frontier_points: usize,

    /// Range the per-call weight floor is drawn from.
    pub weight_floor_range: (f64, f64),

    /// Diagonal shift applied to a covariance matrix that is not positive-definite,
    /// as a multiple of max(mean diagonal, 1).
    pub regularization_factor: f64,

    /// How many times the shift is escalated (×10 each time) before giving up.
    pub max_regularization_attempts: u32,

    pub solver_tolerance: f64,
    pub max_solver_iterations: usize,
}

impl Default for AnalyticsSettings {
    fn default() -> Self {
        Self {
            min_symbols: 2,
            max_symbols: 10,
            max_rows_per_symbol: 1000,
            min_rows_weekly: 52,
            min_rows_monthly: 24,
            max_risk_free_rate: 0.20,
            min_frontier_points: 5,
            max_frontier_points: 100,
            default_frontier_points: 20,
            weight_floor_range: (0.05, 0.15),
            regularization_factor: 1e-8,
            max_regularization_attempts: 6,
            solver_tolerance: 1e-10,
            max_solver_iterations: 500,
        }
    }
}

impl AnalyticsSettings {
    /// Parse settings from JSON; absent fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Minimum aligned price rows required for an interval.
    pub fn min_rows(&self, interval: Interval) -> usize {
        match interval {
            Interval::Weekly => self.min_rows_weekly,
            Interval::Monthly => self.min_rows_monthly,
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.min_symbols == 0 || self.min_symbols > self.max_symbols {
            return Err(CoreError::InvalidRequest(format!(
                "symbol bounds [{}, {}] are inconsistent",
                self.min_symbols, self.max_symbols
            )));
        }
        if self.min_rows_weekly < 2 || self.min_rows_monthly < 2 {
            return Err(CoreError::InvalidRequest(
                "minimum row counts must be at least 2".into(),
            ));
        }
        let (lo, hi) = self.weight_floor_range;
        if !(lo.is_finite() && hi.is_finite() && 0.0 < lo && lo <= hi && hi < 1.0) {
            return Err(CoreError::InvalidRequest(format!(
                "weight floor range [{lo}, {hi}] must satisfy 0 < lo <= hi < 1"
            )));
        }
        if self.min_frontier_points == 0
            || self.min_frontier_points > self.max_frontier_points
            || !(self.min_frontier_points..=self.max_frontier_points)
                .contains(&self.default_frontier_points)
        {
            return Err(CoreError::InvalidRequest(
                "frontier point bounds are inconsistent".into(),
            ));
        }
        if !(self.regularization_factor > 0.0 && self.solver_tolerance > 0.0) {
            return Err(CoreError::InvalidRequest(
                "regularization factor and solver tolerance must be positive".into(),
            ));
        }
        Ok(())
    }
}
