use std::collections::BTreeMap;

use crate::models::dataset::{AlignedDataset, Alignment};
use crate::models::matrix::{CorrelationMatrix, SymmetricMatrix};
use crate::models::price::Interval;
use crate::models::statistics::{
    AdvancedStatistics, AssetStatistics, ReturnsSummary, StatsResponse,
};
use crate::services::metrics;

/// Number of most recent returns echoed in a returns summary.
const SUMMARY_TAIL: usize = 30;

/// Computes per-asset and cross-asset risk/return statistics from aligned returns.
///
/// Pure business logic — no I/O. Every figure for an aligned symbol comes
/// from the same shared window.
pub struct StatisticsService;

impl StatisticsService {
    pub fn new() -> Self {
        Self
    }

    /// Assemble the full Stats contract output from an alignment.
    pub fn compute(&self, alignment: &Alignment, risk_free_rate: f64) -> StatsResponse {
        let dataset = &alignment.dataset;
        let interval = dataset.interval;

        let mut individual = BTreeMap::new();
        let histories = dataset
            .symbols
            .iter()
            .zip(&dataset.returns)
            .chain(&alignment.excluded);
        for (symbol, returns) in histories {
            individual.insert(
                symbol.clone(),
                self.asset_statistics(returns, interval, risk_free_rate),
            );
        }

        let covariance_matrix = self.covariance_matrix(dataset);
        let correlation_matrix = CorrelationMatrix::from_covariance(&covariance_matrix);
        let beta_vs_equal_weighted = self.beta_vs_equal_weighted(dataset);

        StatsResponse {
            interval,
            risk_free_rate,
            data_points_used: alignment.data_points_used.clone(),
            shared_data_points: alignment.shared_data_points(),
            individual,
            advanced: AdvancedStatistics {
                covariance_matrix,
                correlation_matrix,
                beta_vs_equal_weighted,
            },
            excluded_symbols: alignment.excluded.keys().cloned().collect(),
        }
    }

    /// Scalar statistics of one return sequence; `None` when it holds no return.
    pub fn asset_statistics(
        &self,
        returns: &[f64],
        interval: Interval,
        risk_free_rate: f64,
    ) -> Option<AssetStatistics> {
        if returns.is_empty() {
            return None;
        }
        let periods = interval.periods_per_year();
        let avg_return = metrics::mean(returns);
        let variance = metrics::variance(returns);
        let std_deviation = variance.sqrt();
        let annualized_volatility = std_deviation * periods.sqrt();

        Some(AssetStatistics {
            observations: returns.len(),
            avg_return,
            variance,
            std_deviation,
            cumulative_return: metrics::cumulative_return(returns),
            annualized_volatility,
            sharpe_score: metrics::sharpe(avg_return * periods, annualized_volatility, risk_free_rate),
            max_drawdown: metrics::max_drawdown(returns),
            skewness: metrics::skewness(returns),
            kurtosis: metrics::excess_kurtosis(returns),
            var_95: metrics::value_at_risk_95(returns),
            cvar_95: metrics::conditional_value_at_risk_95(returns),
            returns_summary: Self::summarize(returns),
        })
    }

    /// Population covariance of every pair of aligned return sequences.
    pub fn covariance_matrix(&self, dataset: &AlignedDataset) -> SymmetricMatrix {
        SymmetricMatrix::from_upper_fn(dataset.symbols.clone(), |i, j| {
            metrics::covariance(&dataset.returns[i], &dataset.returns[j])
        })
    }

    /// Annualized mean return per aligned asset (μ), in dataset order.
    pub fn expected_returns(&self, dataset: &AlignedDataset) -> Vec<f64> {
        let periods = dataset.interval.periods_per_year();
        dataset
            .returns
            .iter()
            .map(|r| metrics::mean(r) * periods)
            .collect()
    }

    /// cov(r_i, r_ew) / var(r_ew) where r_ew is the equal-weighted mean return.
    pub fn beta_vs_equal_weighted(&self, dataset: &AlignedDataset) -> BTreeMap<String, Option<f64>> {
        let n = dataset.n_assets() as f64;
        let equal_weighted: Vec<f64> = (0..dataset.len())
            .map(|t| dataset.returns.iter().map(|r| r[t]).sum::<f64>() / n)
            .collect();
        let market_variance = metrics::variance(&equal_weighted);

        dataset
            .symbols
            .iter()
            .zip(&dataset.returns)
            .map(|(symbol, returns)| {
                let beta = (!metrics::is_flat(market_variance))
                    .then(|| metrics::covariance(returns, &equal_weighted) / market_variance);
                (symbol.clone(), beta)
            })
            .collect()
    }

    fn summarize(returns: &[f64]) -> ReturnsSummary {
        let skip = returns.len().saturating_sub(SUMMARY_TAIL);
        ReturnsSummary {
            min: returns.iter().copied().fold(f64::INFINITY, f64::min),
            max: returns.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            mean: metrics::mean(returns),
            last_30: returns[skip..].to_vec(),
        }
    }
}

impl Default for StatisticsService {
    fn default() -> Self {
        Self::new()
    }
}
