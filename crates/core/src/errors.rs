use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::price::Interval;

/// Unified error type for the entire portfolio-analytics-core library.
/// Every public function returns `Result<T, CoreError>`.
///
/// Any error aborts the whole request: no partial weights or statistics
/// are ever returned alongside one.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Data sufficiency ────────────────────────────────────────────
    #[error("Insufficient data for {symbol}: {available} {interval} rows, need at least {required}")]
    InsufficientData {
        symbol: String,
        interval: Interval,
        required: usize,
        available: usize,
    },

    #[error("Invalid price series for {symbol}: {message}")]
    InvalidSeries { symbol: String, message: String },

    // ── Request validation ──────────────────────────────────────────
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Infeasible weight bound: {n_assets} assets × {lower_bound:.4} floor exceeds 1.0")]
    InfeasibleWeightBound { n_assets: usize, lower_bound: f64 },

    // ── Numerics ────────────────────────────────────────────────────
    #[error("Numeric solver failure: {0}")]
    NumericSolver(String),

    // ── Price Store ─────────────────────────────────────────────────
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("API error ({provider}): {message}")]
    Api { provider: String, message: String },

    #[error("No price store registered")]
    NoProvider,

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

/// Stable, machine-readable error category.
///
/// Unlike the `Display` message, the string returned by [`ErrorKind::as_str`]
/// never changes between releases and is safe for callers to match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InsufficientData,
    InvalidSeries,
    InvalidRequest,
    InvalidTarget,
    InfeasibleWeightBound,
    NumericSolver,
    SymbolNotFound,
    Provider,
    NoProvider,
    Deserialization,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InsufficientData => "insufficient_data",
            ErrorKind::InvalidSeries => "invalid_series",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::InvalidTarget => "invalid_target",
            ErrorKind::InfeasibleWeightBound => "infeasible_weight_bound",
            ErrorKind::NumericSolver => "numeric_solver",
            ErrorKind::SymbolNotFound => "symbol_not_found",
            ErrorKind::Provider => "provider",
            ErrorKind::NoProvider => "no_provider",
            ErrorKind::Deserialization => "deserialization",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CoreError {
    /// The stable category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::InsufficientData { .. } => ErrorKind::InsufficientData,
            CoreError::InvalidSeries { .. } => ErrorKind::InvalidSeries,
            CoreError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            CoreError::InvalidTarget(_) => ErrorKind::InvalidTarget,
            CoreError::InfeasibleWeightBound { .. } => ErrorKind::InfeasibleWeightBound,
            CoreError::NumericSolver(_) => ErrorKind::NumericSolver,
            CoreError::SymbolNotFound(_) => ErrorKind::SymbolNotFound,
            CoreError::Api { .. } => ErrorKind::Provider,
            CoreError::NoProvider => ErrorKind::NoProvider,
            CoreError::Deserialization(_) => ErrorKind::Deserialization,
        }
    }
}

// ── Conversion helpers (From impls) ─────────────────────────────────

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Deserialization(e.to_string())
    }
}
