use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::matrix::{CorrelationMatrix, SymmetricMatrix};
use super::price::Interval;

pub(crate) fn default_risk_free_rate() -> f64 {
    0.02
}

/// Input of the Stats contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsRequest {
    /// 2–10 unique tickers (case-insensitive).
    pub symbols: Vec<String>,

    #[serde(default)]
    pub interval: Interval,

    /// Annual risk-free rate in `[0, 0.20]`.
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,

    #[serde(default)]
    pub from_date: Option<NaiveDate>,

    #[serde(default)]
    pub to_date: Option<NaiveDate>,
}

impl StatsRequest {
    pub fn new(symbols: Vec<String>, interval: Interval) -> Self {
        Self {
            symbols,
            interval,
            risk_free_rate: default_risk_free_rate(),
            from_date: None,
            to_date: None,
        }
    }
}

/// Range and tail of a return sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnsSummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Most recent 30 returns, oldest first.
    pub last_30: Vec<f64>,
}

/// Scalar statistics of one asset's return sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetStatistics {
    /// Number of returns the figures were computed from.
    pub observations: usize,

    /// Arithmetic mean return per period.
    pub avg_return: f64,

    /// Population variance per period.
    pub variance: f64,

    pub std_deviation: f64,

    /// Π(1 + r) − 1 over the window.
    pub cumulative_return: f64,

    pub annualized_volatility: f64,

    /// `None` when annualized volatility is zero.
    pub sharpe_score: Option<f64>,

    /// Worst peak-to-trough decline, always ≤ 0.
    pub max_drawdown: f64,

    pub skewness: f64,

    /// Excess kurtosis.
    pub kurtosis: f64,

    /// 5th percentile of returns (linear interpolation).
    pub var_95: f64,

    /// Mean of returns at or below `var_95`.
    pub cvar_95: f64,

    pub returns_summary: ReturnsSummary,
}

/// Cross-asset figures over the shared aligned window.
#[derive(Debug, Clone, Serialize)]
pub struct AdvancedStatistics {
    pub covariance_matrix: SymmetricMatrix,
    pub correlation_matrix: CorrelationMatrix,

    /// `None` for every symbol when the equal-weighted series has no variance.
    pub beta_vs_equal_weighted: BTreeMap<String, Option<f64>>,
}

/// Output of the Stats contract.
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub interval: Interval,
    pub risk_free_rate: f64,
    pub data_points_used: BTreeMap<String, usize>,
    pub shared_data_points: usize,
    /// `None` for a symbol with fewer than two rows in the window.
    pub individual: BTreeMap<String, Option<AssetStatistics>>,
    pub advanced: AdvancedStatistics,

    /// Symbols reported individually but left out of `advanced`.
    pub excluded_symbols: Vec<String>,
}

impl StatsResponse {
    /// Single-asset statistics of `symbol`, if it had any return to measure.
    pub fn asset(&self, symbol: &str) -> Option<&AssetStatistics> {
        self.individual.get(symbol)?.as_ref()
    }
}
