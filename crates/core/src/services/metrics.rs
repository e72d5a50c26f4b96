//! Return-series formulas shared by the statistics and risk services.
//!
//! All functions take a return sequence in chronological order. Empty input
//! yields `0.0` rather than `NaN`; callers guarantee at least one return.

/// Variance at or below which a series is treated as flat.
///
/// Prices compounding at a constant rate still produce returns with rounding
/// noise around 1e-16, so an exact zero test is not enough.
pub const FLAT_VARIANCE: f64 = 1e-24;

pub fn is_flat(variance: f64) -> bool {
    variance <= FLAT_VARIANCE
}

pub fn mean(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    returns.iter().sum::<f64>() / returns.len() as f64
}

/// Population variance (divides by N).
pub fn variance(returns: &[f64]) -> f64 {
    covariance(returns, returns)
}

/// Population covariance (divides by N). Both slices must have equal length.
pub fn covariance(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    if a.is_empty() {
        return 0.0;
    }
    let (mean_a, mean_b) = (mean(a), mean(b));
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - mean_a) * (y - mean_b))
        .sum::<f64>()
        / a.len() as f64
}

/// Π(1 + r) − 1.
pub fn cumulative_return(returns: &[f64]) -> f64 {
    returns.iter().fold(1.0, |acc, r| acc * (1.0 + r)) - 1.0
}

/// Worst drop of the compounded path below its running peak, as a fraction.
///
/// The path starts at the first compounded value, so a loss in the very first
/// period is not a drawdown. Returns `0.0` for a non-decreasing path, otherwise
/// a negative number.
pub fn max_drawdown(returns: &[f64]) -> f64 {
    let mut wealth = 1.0;
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for r in returns {
        wealth *= 1.0 + r;
        peak = peak.max(wealth);
        worst = worst.min(wealth / peak - 1.0);
    }
    worst
}

/// Percentile `q` in `[0, 1]` with linear interpolation between order statistics.
pub fn percentile(returns: &[f64], q: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let mut sorted = returns.to_vec();
    sorted.sort_by(f64::total_cmp);
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (pos - lo as f64) * (sorted[hi] - sorted[lo])
}

/// Historical 95% value at risk: the 5th percentile return.
pub fn value_at_risk_95(returns: &[f64]) -> f64 {
    percentile(returns, 0.05)
}

/// Mean of all returns at or below the 95% value at risk.
pub fn conditional_value_at_risk_95(returns: &[f64]) -> f64 {
    let var = value_at_risk_95(returns);
    let tail: Vec<f64> = returns.iter().copied().filter(|r| *r <= var).collect();
    if tail.is_empty() {
        // Unreachable for finite input: the minimum is always ≤ the percentile.
        return var;
    }
    mean(&tail)
}

/// Third standardized moment m3 / m2^1.5. `0.0` when the series is flat.
pub fn skewness(returns: &[f64]) -> f64 {
    let m2 = variance(returns);
    if is_flat(m2) {
        return 0.0;
    }
    central_moment(returns, 3) / m2.powf(1.5)
}

/// Fourth standardized moment minus 3. `0.0` when the series is flat.
pub fn excess_kurtosis(returns: &[f64]) -> f64 {
    let m2 = variance(returns);
    if is_flat(m2) {
        return 0.0;
    }
    central_moment(returns, 4) / (m2 * m2) - 3.0
}

fn central_moment(returns: &[f64], order: i32) -> f64 {
    let mu = mean(returns);
    returns.iter().map(|r| (r - mu).powi(order)).sum::<f64>() / returns.len() as f64
}

/// `(annual_return − risk_free_rate) / annual_volatility`, `None` for a flat series.
pub fn sharpe(annual_return: f64, annual_volatility: f64, risk_free_rate: f64) -> Option<f64> {
    (!is_flat(annual_volatility * annual_volatility))
        .then(|| (annual_return - risk_free_rate) / annual_volatility)
}
