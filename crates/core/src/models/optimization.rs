use chrono::NaiveDate;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use super::price::Interval;
use super::statistics::default_risk_free_rate;
use crate::errors::CoreError;

/// The four supported allocation goals, without their parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveKind {
    MaxSharpe,
    MinVolatility,
    EfficientReturn,
    EfficientRisk,
}

impl ObjectiveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectiveKind::MaxSharpe => "max_sharpe",
            ObjectiveKind::MinVolatility => "min_volatility",
            ObjectiveKind::EfficientReturn => "efficient_return",
            ObjectiveKind::EfficientRisk => "efficient_risk",
        }
    }
}

impl std::fmt::Display for ObjectiveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectiveKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "max_sharpe" => Ok(ObjectiveKind::MaxSharpe),
            "min_volatility" => Ok(ObjectiveKind::MinVolatility),
            "efficient_return" => Ok(ObjectiveKind::EfficientReturn),
            "efficient_risk" => Ok(ObjectiveKind::EfficientRisk),
            other => Err(CoreError::InvalidTarget(format!("unknown objective '{other}'"))),
        }
    }
}

/// A fully-specified objective: the variant carries its own target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Objective {
    MaxSharpe,
    MinVolatility,
    EfficientReturn { target_return: f64 },
    EfficientRisk { target_volatility: f64 },
}

impl Objective {
    pub fn kind(&self) -> ObjectiveKind {
        match self {
            Objective::MaxSharpe => ObjectiveKind::MaxSharpe,
            Objective::MinVolatility => ObjectiveKind::MinVolatility,
            Objective::EfficientReturn { .. } => ObjectiveKind::EfficientReturn,
            Objective::EfficientRisk { .. } => ObjectiveKind::EfficientRisk,
        }
    }
}

fn default_objective() -> String {
    ObjectiveKind::MaxSharpe.as_str().to_string()
}

/// Input of the Optimize contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizeRequest {
    pub symbols: Vec<String>,

    #[serde(default)]
    pub interval: Interval,

    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,

    #[serde(default)]
    pub from_date: Option<NaiveDate>,

    #[serde(default)]
    pub to_date: Option<NaiveDate>,

    /// Objective name, parsed by [`OptimizeRequest::objective`].
    #[serde(default = "default_objective")]
    pub target: String,

    #[serde(default)]
    pub target_return: Option<f64>,

    #[serde(default)]
    pub target_volatility: Option<f64>,

    /// Frontier samples; `AnalyticsSettings::default_frontier_points` when absent.
    #[serde(default)]
    pub n_frontier_points: Option<usize>,
}

impl OptimizeRequest {
    pub fn new(symbols: Vec<String>, interval: Interval, objective: Objective) -> Self {
        let (target_return, target_volatility) = match objective {
            Objective::EfficientReturn { target_return } => (Some(target_return), None),
            Objective::EfficientRisk { target_volatility } => (None, Some(target_volatility)),
            _ => (None, None),
        };
        Self {
            symbols,
            interval,
            risk_free_rate: default_risk_free_rate(),
            from_date: None,
            to_date: None,
            target: objective.kind().as_str().to_string(),
            target_return,
            target_volatility,
            n_frontier_points: None,
        }
    }

    /// Resolve the objective name and its target into a typed [`Objective`].
    ///
    /// `target_return` is required iff the objective is `efficient_return`,
    /// `target_volatility` iff it is `efficient_risk`.
    pub fn objective(&self) -> Result<Objective, CoreError> {
        let kind: ObjectiveKind = self.target.parse()?;

        let require = |value: Option<f64>, name: &str| -> Result<f64, CoreError> {
            match value {
                Some(v) if v.is_finite() => Ok(v),
                Some(v) => Err(CoreError::InvalidTarget(format!("{name} must be finite, got {v}"))),
                None => Err(CoreError::InvalidTarget(format!("{name} is required for {kind}"))),
            }
        };
        let forbid = |value: Option<f64>, name: &str| -> Result<(), CoreError> {
            match value {
                Some(_) => Err(CoreError::InvalidTarget(format!("{name} is not accepted by {kind}"))),
                None => Ok(()),
            }
        };

        match kind {
            ObjectiveKind::MaxSharpe | ObjectiveKind::MinVolatility => {
                forbid(self.target_return, "target_return")?;
                forbid(self.target_volatility, "target_volatility")?;
                Ok(if kind == ObjectiveKind::MaxSharpe {
                    Objective::MaxSharpe
                } else {
                    Objective::MinVolatility
                })
            }
            ObjectiveKind::EfficientReturn => {
                forbid(self.target_volatility, "target_volatility")?;
                let target_return = require(self.target_return, "target_return")?;
                Ok(Objective::EfficientReturn { target_return })
            }
            ObjectiveKind::EfficientRisk => {
                forbid(self.target_return, "target_return")?;
                let target_volatility = require(self.target_volatility, "target_volatility")?;
                if target_volatility <= 0.0 {
                    return Err(CoreError::InvalidTarget(format!(
                        "target_volatility must be positive, got {target_volatility}"
                    )));
                }
                Ok(Objective::EfficientRisk { target_volatility })
            }
        }
    }
}

/// Minimum weight every asset receives in one optimize call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightFloor(f64);

impl WeightFloor {
    /// A fixed floor, for callers (and tests) that want reproducible results.
    pub fn fixed(value: f64) -> Result<Self, CoreError> {
        if !(value.is_finite() && value > 0.0 && value < 1.0) {
            return Err(CoreError::InvalidRequest(format!(
                "weight floor must lie in (0, 1), got {value}"
            )));
        }
        Ok(Self(value))
    }

    /// Draw a floor uniformly from `range` using the caller's randomness source.
    pub fn draw<R: Rng + ?Sized>(rng: &mut R, range: (f64, f64)) -> Result<Self, CoreError> {
        let (lo, hi) = range;
        if !(lo <= hi) {
            return Err(CoreError::InvalidRequest(format!(
                "weight floor range [{lo}, {hi}] is empty"
            )));
        }
        Self::fixed(rng.gen_range(lo..=hi))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

/// Annualized return/risk triple of a weight vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    pub expected_annual_return: f64,
    pub annual_volatility: f64,
    /// `None` when volatility is zero.
    pub sharpe_ratio: Option<f64>,
}

/// One sample of the efficient frontier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontierPoint {
    pub volatility: f64,
    pub expected_return: f64,
    pub sharpe: Option<f64>,
}

/// Tail-risk figures of the realized portfolio return series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub var_95: f64,
    pub cvar_95: f64,
    pub max_drawdown: f64,
}

/// Output of the Optimize contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizeResponse {
    pub objective: ObjectiveKind,
    pub interval: Interval,

    /// Σ = 1.0 ± 1e-6, each ≥ `weight_floor`.
    pub weights: BTreeMap<String, f64>,

    /// The lower bound applied to every asset in this call.
    pub weight_floor: f64,

    pub performance: Performance,

    /// Sorted by ascending volatility.
    pub efficient_frontier: Vec<FrontierPoint>,

    pub risk_metrics: RiskMetrics,
    pub data_points_used: BTreeMap<String, usize>,
    pub shared_data_points: usize,

    /// Diagonal shift added to the annualized covariance (0 when none was needed).
    pub regularization: f64,
}
