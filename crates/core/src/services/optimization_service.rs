use argmin::core::{CostFunction, Executor, State};
use argmin::solver::brent::BrentRoot;
use argmin::solver::goldensectionsearch::GoldenSectionSearch;
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use std::collections::HashSet;

use crate::errors::CoreError;
use crate::models::dataset::Alignment;
use crate::models::matrix::SymmetricMatrix;
use crate::models::optimization::{
    FrontierPoint, Objective, OptimizeRequest, OptimizeResponse, WeightFloor,
};
use crate::models::price::{DateWindow, PriceSeries};
use crate::models::settings::AnalyticsSettings;
use crate::services::alignment_service::{AlignmentService, ShortHistoryPolicy};
use crate::services::metrics;
use crate::services::risk_service::RiskService;
use crate::services::solver::{ActiveSetSolver, BoxedQuadraticProgram};
use crate::services::statistics_service::StatisticsService;

/// Iteration cap for the one-dimensional searches along the frontier.
const MAX_LINE_SEARCH_STEPS: usize = 200;

/// Stages of one optimize call, in execution order. No stage is re-entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OptimizationStage {
    ValidateInput,
    AlignData,
    CheckMinimumRows,
    ComputeStats,
    SolveObjective,
    BuildFrontier,
    AggregateRisk,
    Done,
}

/// Forward-only cursor over [`OptimizationStage`].
struct StageTracker {
    current: OptimizationStage,
}

impl StageTracker {
    fn start() -> Self {
        tracing::debug!(stage = ?OptimizationStage::ValidateInput, "optimization stage");
        Self {
            current: OptimizationStage::ValidateInput,
        }
    }

    fn advance(&mut self, next: OptimizationStage) {
        debug_assert!(next > self.current, "stage {next:?} re-entered after {:?}", self.current);
        self.current = next;
        tracing::debug!(stage = ?next, "optimization stage");
    }

    /// Log the failing stage and hand the error back unchanged.
    fn fail(&self, error: CoreError) -> CoreError {
        tracing::warn!(stage = ?self.current, kind = %error.kind(), %error, "optimization failed");
        error
    }
}

/// A request that passed validation: normalised symbols and typed objective.
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    pub symbols: Vec<String>,
    pub objective: Objective,
    pub window: DateWindow,
    pub frontier_points: usize,
}

/// Solves constrained mean-variance allocation problems and sweeps the
/// efficient frontier.
///
/// Stateless per call; the weight floor is always supplied by the caller.
pub struct OptimizationService {
    settings: AnalyticsSettings,
    alignment: AlignmentService,
    statistics: StatisticsService,
    risk: RiskService,
    solver: ActiveSetSolver,
}

impl OptimizationService {
    pub fn new(settings: AnalyticsSettings) -> Self {
        Self {
            alignment: AlignmentService::new(settings.clone()),
            statistics: StatisticsService::new(),
            risk: RiskService::new(),
            solver: ActiveSetSolver::new(settings.solver_tolerance, settings.max_solver_iterations),
            settings,
        }
    }

    /// Check everything that can be checked before any price data is loaded.
    pub fn validate_request(&self, request: &OptimizeRequest) -> Result<ValidatedRequest, CoreError> {
        let symbols = normalize_symbols(
            &request.symbols,
            self.settings.min_symbols,
            self.settings.max_symbols,
        )?;
        validate_risk_free_rate(request.risk_free_rate, self.settings.max_risk_free_rate)?;

        let points = request
            .n_frontier_points
            .unwrap_or(self.settings.default_frontier_points);
        if points < self.settings.min_frontier_points || points > self.settings.max_frontier_points {
            return Err(CoreError::InvalidRequest(format!(
                "n_frontier_points must be between {} and {}, got {points}",
                self.settings.min_frontier_points, self.settings.max_frontier_points
            )));
        }

        let objective = request.objective()?;
        let window = DateWindow::new(request.from_date, request.to_date)?;
        Ok(ValidatedRequest {
            symbols,
            objective,
            window,
            frontier_points: points,
        })
    }

    /// Run one optimization over already-fetched price histories.
    ///
    /// `series` must hold one history per requested symbol (any order).
    pub fn optimize(
        &self,
        series: &[PriceSeries],
        request: &OptimizeRequest,
        floor: WeightFloor,
    ) -> Result<OptimizeResponse, CoreError> {
        let mut stages = StageTracker::start();
        self.run(&mut stages, series, request, floor)
            .map_err(|e| stages.fail(e))
    }

    fn run(
        &self,
        stages: &mut StageTracker,
        series: &[PriceSeries],
        request: &OptimizeRequest,
        floor: WeightFloor,
    ) -> Result<OptimizeResponse, CoreError> {
        // VALIDATE_INPUT
        let validated = self.validate_request(request)?;
        let lower_bound = floor.value();
        let n_assets = validated.symbols.len();
        if n_assets as f64 * lower_bound > 1.0 + 1e-12 {
            return Err(CoreError::InfeasibleWeightBound {
                n_assets,
                lower_bound,
            });
        }
        let ordered = order_series(series, &validated.symbols)?;

        stages.advance(OptimizationStage::AlignData);
        let alignment = self.alignment.align(
            &ordered,
            request.interval,
            &validated.window,
            ShortHistoryPolicy::Reject,
        )?;

        stages.advance(OptimizationStage::CheckMinimumRows);
        self.check_minimum_rows(&alignment, &validated.symbols)?;

        stages.advance(OptimizationStage::ComputeStats);
        let dataset = &alignment.dataset;
        let periods = dataset.interval.periods_per_year();
        let expected = self.statistics.expected_returns(dataset);
        let annual_covariance = self.statistics.covariance_matrix(dataset).scaled(periods);

        stages.advance(OptimizationStage::SolveObjective);
        let model = MeanVarianceModel::new(
            &expected,
            &annual_covariance,
            lower_bound,
            request.risk_free_rate,
            &self.solver,
            &self.settings,
        )?;
        let raw = model.solve(validated.objective)?;
        let weights = model.finalize(&raw)?;

        stages.advance(OptimizationStage::BuildFrontier);
        let efficient_frontier = model.frontier(validated.frontier_points);

        stages.advance(OptimizationStage::AggregateRisk);
        let portfolio_returns = self.risk.portfolio_returns(&weights, dataset);
        let performance =
            self.risk
                .performance(&portfolio_returns, dataset.interval, request.risk_free_rate);
        let risk_metrics = self.risk.risk_metrics(&portfolio_returns);

        stages.advance(OptimizationStage::Done);
        tracing::info!(
            objective = %validated.objective.kind(),
            assets = n_assets,
            weight_floor = lower_bound,
            frontier_points = efficient_frontier.len(),
            "optimization complete"
        );

        Ok(OptimizeResponse {
            objective: validated.objective.kind(),
            interval: dataset.interval,
            weights: dataset.symbols.iter().cloned().zip(weights).collect(),
            weight_floor: lower_bound,
            performance,
            efficient_frontier,
            risk_metrics,
            data_points_used: alignment.data_points_used.clone(),
            shared_data_points: alignment.shared_data_points(),
            regularization: model.regularization,
        })
    }

    fn check_minimum_rows(&self, alignment: &Alignment, symbols: &[String]) -> Result<(), CoreError> {
        let dataset = &alignment.dataset;
        let required = self.settings.min_rows(dataset.interval);
        let missing = symbols.iter().find(|s| !dataset.symbols.contains(s));
        if let Some(symbol) = missing.or_else(|| alignment.excluded.keys().next()) {
            return Err(CoreError::InsufficientData {
                symbol: symbol.clone(),
                interval: dataset.interval,
                required,
                available: alignment.data_points_used.get(symbol).copied().unwrap_or(0),
            });
        }
        if dataset.len() + 1 < required {
            return Err(CoreError::InsufficientData {
                symbol: symbols.first().cloned().unwrap_or_default(),
                interval: dataset.interval,
                required,
                available: dataset.len() + 1,
            });
        }
        Ok(())
    }
}

/// Trim, uppercase, bound-check and de-duplicate requested symbols.
pub(crate) fn normalize_symbols(
    symbols: &[String],
    min: usize,
    max: usize,
) -> Result<Vec<String>, CoreError> {
    if symbols.len() < min || symbols.len() > max {
        return Err(CoreError::InvalidRequest(format!(
            "between {min} and {max} symbols are required, got {}",
            symbols.len()
        )));
    }
    let mut seen = HashSet::new();
    let mut normalized = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let s = symbol.trim().to_uppercase();
        if s.is_empty() {
            return Err(CoreError::InvalidRequest("symbol must not be empty".into()));
        }
        if !seen.insert(s.clone()) {
            return Err(CoreError::InvalidRequest(format!("duplicate symbol {s}")));
        }
        normalized.push(s);
    }
    Ok(normalized)
}

pub(crate) fn validate_risk_free_rate(rate: f64, max: f64) -> Result<(), CoreError> {
    if !(rate.is_finite() && (0.0..=max).contains(&rate)) {
        return Err(CoreError::InvalidRequest(format!(
            "risk_free_rate must be between 0 and {max}, got {rate}"
        )));
    }
    Ok(())
}

/// Put `series` in the order of `symbols`; a symbol with no series is not found.
pub(crate) fn order_series(
    series: &[PriceSeries],
    symbols: &[String],
) -> Result<Vec<PriceSeries>, CoreError> {
    symbols
        .iter()
        .map(|symbol| {
            series
                .iter()
                .find(|s| s.symbol() == symbol)
                .cloned()
                .ok_or_else(|| CoreError::SymbolNotFound(symbol.clone()))
        })
        .collect()
}

/// Long-only mean-variance model with a uniform weight floor.
///
/// Solves against the (possibly regularized) covariance; reports
/// volatility from the unregularized one.
struct MeanVarianceModel<'a> {
    expected: DVector<f64>,
    covariance: DMatrix<f64>,
    reporting_covariance: &'a SymmetricMatrix,
    floor: f64,
    risk_free_rate: f64,
    solver: &'a ActiveSetSolver,
    regularization: f64,
    tolerance: f64,
}

impl<'a> MeanVarianceModel<'a> {
    fn new(
        expected: &[f64],
        covariance: &'a SymmetricMatrix,
        floor: f64,
        risk_free_rate: f64,
        solver: &'a ActiveSetSolver,
        settings: &AnalyticsSettings,
    ) -> Result<Self, CoreError> {
        if expected.iter().any(|m| !m.is_finite()) {
            return Err(CoreError::NumericSolver("expected returns are not finite".into()));
        }
        let (regularized, shift) = regularize(covariance, settings)?;
        Ok(Self {
            expected: DVector::from_column_slice(expected),
            covariance: regularized,
            reporting_covariance: covariance,
            floor,
            risk_free_rate,
            solver,
            regularization: shift,
            tolerance: 1e-9,
        })
    }

    fn n(&self) -> usize {
        self.expected.len()
    }

    fn solve(&self, objective: Objective) -> Result<DVector<f64>, CoreError> {
        match objective {
            Objective::MaxSharpe => self.max_sharpe(),
            Objective::MinVolatility => self.min_volatility(),
            Objective::EfficientReturn { target_return } => self.efficient_return_checked(target_return),
            Objective::EfficientRisk { target_volatility } => self.efficient_risk(target_volatility),
        }
    }

    fn expected_return(&self, w: &DVector<f64>) -> f64 {
        self.expected.dot(w)
    }

    /// Volatility under the solving covariance.
    fn volatility(&self, w: &DVector<f64>) -> f64 {
        w.dot(&(&self.covariance * w)).max(0.0).sqrt()
    }

    /// Floor on every asset, the remainder on `idx`.
    fn vertex(&self, idx: usize) -> DVector<f64> {
        let n = self.n();
        let mut w = DVector::from_element(n, self.floor);
        w[idx] = 1.0 - (n - 1) as f64 * self.floor;
        w
    }

    /// Lowest and highest expected return the floor allows, with the asset
    /// that carries the remainder in each case.
    fn attainable(&self) -> ((f64, usize), (f64, usize)) {
        let worst = self.expected.imin();
        let best = self.expected.imax();
        (
            (self.expected_return(&self.vertex(worst)), worst),
            (self.expected_return(&self.vertex(best)), best),
        )
    }

    fn program(&self, with_return: Option<f64>) -> BoxedQuadraticProgram<'_> {
        let n = self.n();
        let (equality, equality_rhs) = match with_return {
            Some(target) => (
                DMatrix::from_fn(2, n, |r, c| if r == 0 { 1.0 } else { self.expected[c] }),
                DVector::from_vec(vec![1.0, target]),
            ),
            None => (DMatrix::from_element(1, n, 1.0), DVector::from_element(1, 1.0)),
        };
        BoxedQuadraticProgram {
            hessian: &self.covariance,
            linear: DVector::zeros(n),
            equality,
            equality_rhs,
            lower: self.floor,
            upper: 1.0,
        }
    }

    /// Global minimum-variance portfolio.
    fn min_volatility(&self) -> Result<DVector<f64>, CoreError> {
        let n = self.n();
        let start = DVector::from_element(n, 1.0 / n as f64);
        self.solver.solve(&self.program(None), start)
    }

    /// Validate a caller-supplied return target, then solve for it.
    fn efficient_return_checked(&self, target: f64) -> Result<DVector<f64>, CoreError> {
        let lowest = self.expected.min();
        let highest = self.expected.max();
        let slack = self.tolerance * (1.0 + highest.abs().max(lowest.abs()));
        if target < lowest - slack || target > highest + slack {
            return Err(CoreError::InvalidTarget(format!(
                "target_return {target:.6} is outside the achievable range [{lowest:.6}, {highest:.6}]"
            )));
        }
        let ((att_min, _), (att_max, _)) = self.attainable();
        let effective = target.clamp(att_min, att_max);
        if effective != target {
            tracing::debug!(target, effective, "target return moved inside the floor-attainable range");
        }
        self.efficient_return(effective)
    }

    /// Minimum-variance portfolio with expected return `target`.
    /// `target` must lie in the attainable range.
    fn efficient_return(&self, target: f64) -> Result<DVector<f64>, CoreError> {
        let ((att_min, worst), (att_max, best)) = self.attainable();
        let span = att_max - att_min;
        if span <= self.tolerance * (1.0 + att_max.abs()) {
            // Every asset has the same expected return: the target is implied.
            return self.min_volatility();
        }
        if target < att_min - self.tolerance || target > att_max + self.tolerance {
            return Err(CoreError::InvalidTarget(format!(
                "target_return {target:.6} is not attainable with a {:.4} weight floor",
                self.floor
            )));
        }
        let t = ((target - att_min) / span).clamp(0.0, 1.0);
        let start = self.vertex(best) * t + self.vertex(worst) * (1.0 - t);
        let target = self.expected_return(&start);
        self.solver.solve(&self.program(Some(target)), start)
    }

    /// Highest-return portfolio whose volatility does not exceed `target`.
    fn efficient_risk(&self, target: f64) -> Result<DVector<f64>, CoreError> {
        let gmv = self.min_volatility()?;
        let gmv_vol = self.volatility(&gmv);
        if target < gmv_vol - self.tolerance {
            return Err(CoreError::InvalidTarget(format!(
                "target_volatility {target:.6} is below the minimum attainable volatility {gmv_vol:.6}"
            )));
        }
        if target <= gmv_vol + self.tolerance {
            return Ok(gmv);
        }

        let (_, (att_max, _)) = self.attainable();
        let top = self.efficient_return(att_max)?;
        if self.volatility(&top) <= target {
            return Ok(top);
        }

        // Volatility rises monotonically with return along the upper frontier.
        let lo = self.expected_return(&gmv);
        let tolerance = 1e-12 * (1.0 + att_max.abs());
        let solver = BrentRoot::new(lo, att_max, tolerance);
        let result = Executor::new(VolatilityGap { model: self, target }, solver)
            .configure(|state| state.param(lo).max_iters(MAX_LINE_SEARCH_STEPS as u64))
            .run()
            .map_err(into_core_error)?;
        let root = result.state().get_param().copied().unwrap_or(lo);
        self.efficient_return(root.clamp(lo, att_max))
    }

    /// Tangency portfolio: golden-section search of the Sharpe ratio along the
    /// upper frontier, where it is unimodal.
    fn max_sharpe(&self) -> Result<DVector<f64>, CoreError> {
        let rf = self.risk_free_rate;
        let (_, (att_max, _)) = self.attainable();
        if att_max <= rf + self.tolerance {
            return Err(CoreError::InvalidTarget(format!(
                "max_sharpe needs an attainable expected return above the risk-free rate {rf}"
            )));
        }

        let gmv = self.min_volatility()?;
        let (a, b) = (self.expected_return(&gmv).max(rf), att_max);
        let mut best = (self.sharpe_of(&gmv), gmv);
        if b - a <= self.tolerance {
            return Ok(best.1);
        }

        let mut keep_better = |w: DVector<f64>| {
            let sharpe = self.sharpe_of(&w);
            if sharpe > best.0 {
                best = (sharpe, w);
            }
        };
        keep_better(self.efficient_return(b)?);

        let solver = GoldenSectionSearch::new(a, b)
            .and_then(|s| s.with_tolerance(1e-10))
            .map_err(into_core_error)?;
        let result = Executor::new(NegativeSharpe { model: self }, solver)
            .configure(|state| state.param(0.5 * (a + b)).max_iters(MAX_LINE_SEARCH_STEPS as u64))
            .run()
            .map_err(into_core_error)?;
        if let Some(r) = result.state().get_best_param().copied() {
            keep_better(self.efficient_return(r.clamp(a, b))?);
        }
        Ok(best.1)
    }

    fn sharpe_of(&self, w: &DVector<f64>) -> f64 {
        let vol = self.volatility(w);
        if vol > 0.0 {
            (self.expected_return(w) - self.risk_free_rate) / vol
        } else {
            f64::NEG_INFINITY
        }
    }

    /// Clamp rounding noise onto the bounds and verify the budget constraint.
    fn finalize(&self, w: &DVector<f64>) -> Result<Vec<f64>, CoreError> {
        let weights: Vec<f64> = w.iter().map(|x| x.clamp(self.floor, 1.0)).collect();
        let total: f64 = weights.iter().sum();
        if !total.is_finite() || (total - 1.0).abs() > 1e-6 {
            return Err(CoreError::NumericSolver(format!(
                "weights sum to {total}, expected 1.0"
            )));
        }
        Ok(weights)
    }

    /// Sweep `points` return targets across the attainable range.
    /// Samples the solver cannot resolve are dropped.
    fn frontier(&self, points: usize) -> Vec<FrontierPoint> {
        let ((att_min, _), (att_max, _)) = self.attainable();
        let targets: Vec<f64> = (0..points)
            .map(|k| {
                if points <= 1 {
                    att_min
                } else {
                    att_min + (att_max - att_min) * k as f64 / (points - 1) as f64
                }
            })
            .collect();

        let mut frontier: Vec<FrontierPoint> = targets
            .into_par_iter()
            .filter_map(|target| match self.efficient_return(target) {
                Ok(w) => {
                    let weights: Vec<f64> = w.iter().copied().collect();
                    let expected_return = self.expected_return(&w);
                    let volatility = self.reporting_covariance.quadratic_form(&weights).max(0.0).sqrt();
                    Some(FrontierPoint {
                        volatility,
                        expected_return,
                        sharpe: metrics::sharpe(expected_return, volatility, self.risk_free_rate),
                    })
                }
                Err(e) => {
                    tracing::debug!(target, error = %e, "frontier sample discarded");
                    None
                }
            })
            .collect();

        frontier.sort_by(|a, b| a.volatility.total_cmp(&b.volatility));
        frontier
    }
}

/// Volatility of the efficient portfolio at return `r`, minus the target.
struct VolatilityGap<'m, 'a> {
    model: &'m MeanVarianceModel<'a>,
    target: f64,
}

impl CostFunction for VolatilityGap<'_, '_> {
    type Param = f64;
    type Output = f64;

    fn cost(&self, r: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        let w = self.model.efficient_return(*r)?;
        Ok(self.model.volatility(&w) - self.target)
    }
}

/// Sharpe ratio of the efficient portfolio at return `r`, negated for minimization.
struct NegativeSharpe<'m, 'a> {
    model: &'m MeanVarianceModel<'a>,
}

impl CostFunction for NegativeSharpe<'_, '_> {
    type Param = f64;
    type Output = f64;

    fn cost(&self, r: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        let w = self.model.efficient_return(*r)?;
        let sharpe = self.model.sharpe_of(&w);
        Ok(if sharpe.is_finite() { -sharpe } else { f64::MAX })
    }
}

/// Recover a [`CoreError`] raised inside a cost function; anything else is a solver failure.
fn into_core_error(error: argmin::core::Error) -> CoreError {
    error
        .downcast::<CoreError>()
        .unwrap_or_else(|e| CoreError::NumericSolver(e.to_string()))
}

/// Return a positive-definite copy of `covariance`, shifting its diagonal by
/// `factor × max(mean diagonal, 1)` (escalating ×10) when Cholesky fails.
fn regularize(
    covariance: &SymmetricMatrix,
    settings: &AnalyticsSettings,
) -> Result<(DMatrix<f64>, f64), CoreError> {
    if !covariance.is_finite() {
        return Err(CoreError::NumericSolver("covariance matrix is not finite".into()));
    }
    let sigma = covariance.to_dmatrix();
    if sigma.clone().cholesky().is_some() {
        return Ok((sigma, 0.0));
    }

    let n = sigma.nrows();
    let mut shift = settings.regularization_factor * (sigma.trace() / n as f64).max(1.0);
    for _ in 0..settings.max_regularization_attempts {
        let candidate = &sigma + DMatrix::<f64>::identity(n, n) * shift;
        if candidate.clone().cholesky().is_some() {
            tracing::warn!(shift, "covariance matrix not positive-definite; diagonal regularized");
            return Ok((candidate, shift));
        }
        shift *= 10.0;
    }
    Err(CoreError::NumericSolver(
        "covariance matrix is not positive-definite even after regularization".into(),
    ))
}
