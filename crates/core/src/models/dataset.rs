use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

use super::price::Interval;

/// Period returns of several symbols on one shared timestamp grid.
///
/// Every `returns[i]` has the same length as `timestamps`; index `t` of each
/// is the return from the previous aligned close to the close on `timestamps[t]`.
#[derive(Debug, Clone, Serialize)]
pub struct AlignedDataset {
    pub interval: Interval,
    pub symbols: Vec<String>,
    pub timestamps: Vec<NaiveDate>,
    pub returns: Vec<Vec<f64>>,
}

impl AlignedDataset {
    /// Number of aligned returns per symbol (N).
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn n_assets(&self) -> usize {
        self.symbols.len()
    }

    pub fn returns_of(&self, symbol: &str) -> Option<&[f64]> {
        let idx = self.symbols.iter().position(|s| s == symbol)?;
        Some(&self.returns[idx])
    }
}

/// Outcome of aligning a group of price histories.
#[derive(Debug, Clone)]
pub struct Alignment {
    /// Symbols that made it onto the shared grid.
    pub dataset: AlignedDataset,

    /// Rows each symbol had inside the window, before alignment.
    pub data_points_used: BTreeMap<String, usize>,

    /// Symbols left off the shared grid for being too short, with the
    /// returns of their own full history.
    pub excluded: BTreeMap<String, Vec<f64>>,
}

impl Alignment {
    /// Size of the shared window (N).
    pub fn shared_data_points(&self) -> usize {
        self.dataset.len()
    }
}
