use std::collections::BTreeMap;

use crate::errors::CoreError;
use crate::models::dataset::AlignedDataset;
use crate::models::optimization::{Performance, RiskMetrics};
use crate::models::price::Interval;
use crate::services::metrics;

/// Aggregates realized portfolio risk from aligned asset returns.
pub struct RiskService;

impl RiskService {
    pub fn new() -> Self {
        Self
    }

    /// Per-period portfolio returns: r_p,t = Σ_i w_i · r_i,t.
    ///
    /// `weights` follows the dataset's symbol order.
    pub fn portfolio_returns(&self, weights: &[f64], dataset: &AlignedDataset) -> Vec<f64> {
        debug_assert_eq!(weights.len(), dataset.n_assets());
        (0..dataset.len())
            .map(|t| {
                weights
                    .iter()
                    .zip(&dataset.returns)
                    .map(|(w, r)| w * r[t])
                    .sum()
            })
            .collect()
    }

    pub fn risk_metrics(&self, portfolio_returns: &[f64]) -> RiskMetrics {
        RiskMetrics {
            var_95: metrics::value_at_risk_95(portfolio_returns),
            cvar_95: metrics::conditional_value_at_risk_95(portfolio_returns),
            max_drawdown: metrics::max_drawdown(portfolio_returns),
        }
    }

    /// Annualized mean, volatility and Sharpe ratio of a return series.
    pub fn performance(
        &self,
        portfolio_returns: &[f64],
        interval: Interval,
        risk_free_rate: f64,
    ) -> Performance {
        let periods = interval.periods_per_year();
        let expected_annual_return = metrics::mean(portfolio_returns) * periods;
        let annual_volatility = metrics::variance(portfolio_returns).sqrt() * periods.sqrt();
        Performance {
            expected_annual_return,
            annual_volatility,
            sharpe_ratio: metrics::sharpe(expected_annual_return, annual_volatility, risk_free_rate),
        }
    }

    /// Evaluate an arbitrary symbol → weight map against `dataset`.
    ///
    /// Every aligned symbol needs a weight and no unknown symbol may appear.
    pub fn evaluate_weights(
        &self,
        weights: &BTreeMap<String, f64>,
        dataset: &AlignedDataset,
        risk_free_rate: f64,
    ) -> Result<(Performance, RiskMetrics), CoreError> {
        if let Some(unknown) = weights.keys().find(|s| !dataset.symbols.contains(s)) {
            return Err(CoreError::SymbolNotFound(unknown.clone()));
        }
        let ordered = dataset
            .symbols
            .iter()
            .map(|s| {
                weights
                    .get(s)
                    .copied()
                    .ok_or_else(|| CoreError::InvalidRequest(format!("no weight given for {s}")))
            })
            .collect::<Result<Vec<f64>, CoreError>>()?;

        let returns = self.portfolio_returns(&ordered, dataset);
        Ok((
            self.performance(&returns, dataset.interval, risk_free_rate),
            self.risk_metrics(&returns),
        ))
    }
}

impl Default for RiskService {
    fn default() -> Self {
        Self::new()
    }
}
