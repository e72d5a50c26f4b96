use nalgebra::DMatrix;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::services::metrics::is_flat;

/// Square symmetric matrix keyed by an ordered symbol list.
///
/// Writes go through [`SymmetricMatrix::set`], which updates both `(i, j)`
/// and `(j, i)`, so `get(i, j) == get(j, i)` always holds.
/// Serializes as a nested `symbol → symbol → value` map.
#[derive(Debug, Clone, PartialEq)]
pub struct SymmetricMatrix {
    symbols: Vec<String>,
    values: Vec<f64>,
}

impl SymmetricMatrix {
    pub(crate) fn zeros(symbols: Vec<String>) -> Self {
        let n = symbols.len();
        Self {
            symbols,
            values: vec![0.0; n * n],
        }
    }

    /// Build from a function evaluated on the upper triangle only (`i <= j`).
    pub fn from_upper_fn(symbols: Vec<String>, mut f: impl FnMut(usize, usize) -> f64) -> Self {
        let mut matrix = Self::zeros(symbols);
        let n = matrix.dim();
        for i in 0..n {
            for j in i..n {
                matrix.set(i, j, f(i, j));
            }
        }
        matrix
    }

    pub fn dim(&self) -> usize {
        self.symbols.len()
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn index_of(&self, symbol: &str) -> Option<usize> {
        self.symbols.iter().position(|s| s == symbol)
    }

    /// Entry `(i, j)`, `None` when either index is out of range.
    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        let n = self.dim();
        (i < n && j < n).then(|| self.values[i * n + j])
    }

    pub fn get_by_symbol(&self, a: &str, b: &str) -> Option<f64> {
        self.get(self.index_of(a)?, self.index_of(b)?)
    }

    /// Unchecked read for indices already bounded by `dim()`.
    fn at(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.dim() + j]
    }

    pub(crate) fn set(&mut self, i: usize, j: usize, value: f64) {
        let n = self.dim();
        debug_assert!(i < n && j < n, "index ({i}, {j}) out of range for {n}x{n} matrix");
        self.values[i * n + j] = value;
        self.values[j * n + i] = value;
    }

    pub fn diagonal(&self) -> Vec<f64> {
        (0..self.dim()).map(|i| self.at(i, i)).collect()
    }

    /// Every entry multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            symbols: self.symbols.clone(),
            values: self.values.iter().map(|v| v * factor).collect(),
        }
    }

    /// `wᵗ M w`.
    pub fn quadratic_form(&self, w: &[f64]) -> f64 {
        let n = self.dim();
        debug_assert_eq!(w.len(), n);
        let mut total = 0.0;
        for i in 0..n {
            for j in 0..n {
                total += w[i] * self.values[i * n + j] * w[j];
            }
        }
        total
    }

    pub fn to_dmatrix(&self) -> DMatrix<f64> {
        let n = self.dim();
        DMatrix::from_row_slice(n, n, &self.values)
    }

    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }
}

/// Correlation matrix: symmetric, unit diagonal, entries in `[-1, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix(SymmetricMatrix);

impl CorrelationMatrix {
    /// Normalize a covariance matrix. Off-diagonal entries are clamped to
    /// `[-1, 1]`; a pair involving a zero-variance asset correlates at 0.
    pub fn from_covariance(cov: &SymmetricMatrix) -> Self {
        let variances = cov.diagonal();
        let matrix = SymmetricMatrix::from_upper_fn(cov.symbols().to_vec(), |i, j| {
            if i == j {
                return 1.0;
            }
            if is_flat(variances[i]) || is_flat(variances[j]) {
                return 0.0;
            }
            let denom = variances[i].sqrt() * variances[j].sqrt();
            (cov.at(i, j) / denom).clamp(-1.0, 1.0)
        });
        Self(matrix)
    }

    pub fn dim(&self) -> usize {
        self.0.dim()
    }

    pub fn symbols(&self) -> &[String] {
        self.0.symbols()
    }

    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        self.0.get(i, j)
    }

    pub fn get_by_symbol(&self, a: &str, b: &str) -> Option<f64> {
        self.0.get_by_symbol(a, b)
    }

    pub fn as_matrix(&self) -> &SymmetricMatrix {
        &self.0
    }
}

struct MatrixRow<'a> {
    matrix: &'a SymmetricMatrix,
    row: usize,
}

impl Serialize for MatrixRow<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.matrix.dim()))?;
        for (j, symbol) in self.matrix.symbols().iter().enumerate() {
            map.serialize_entry(symbol, &self.matrix.at(self.row, j))?;
        }
        map.end()
    }
}

impl Serialize for SymmetricMatrix {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.dim()))?;
        for (row, symbol) in self.symbols.iter().enumerate() {
            map.serialize_entry(symbol, &MatrixRow { matrix: self, row })?;
        }
        map.end()
    }
}

impl Serialize for CorrelationMatrix {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}
