use chrono::NaiveDate;
use std::collections::{BTreeMap, HashSet};

use crate::errors::CoreError;
use crate::models::dataset::{AlignedDataset, Alignment};
use crate::models::price::{DateWindow, Interval, PricePoint, PriceSeries};
use crate::models::settings::AnalyticsSettings;

/// What to do with a symbol whose own history is below the interval minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortHistoryPolicy {
    /// Fail the whole request (optimization needs every asset on the grid).
    Reject,
    /// Leave it off the shared grid but keep its own returns for reporting.
    Exclude,
}

/// Intersects per-symbol price histories onto one timestamp grid and
/// derives simple period returns.
///
/// Pure computation — no I/O.
pub struct AlignmentService {
    settings: AnalyticsSettings,
}

impl AlignmentService {
    pub fn new(settings: AnalyticsSettings) -> Self {
        Self { settings }
    }

    /// Align `series` (inner join on timestamps) inside `window`.
    ///
    /// The minimum-row policy is checked on the aligned price rows; the
    /// returned dataset holds one fewer return than aligned prices.
    pub fn align(
        &self,
        series: &[PriceSeries],
        interval: Interval,
        window: &DateWindow,
        policy: ShortHistoryPolicy,
    ) -> Result<Alignment, CoreError> {
        if series.is_empty() {
            return Err(CoreError::InvalidRequest("no price series to align".into()));
        }

        let min_rows = self.settings.min_rows(interval);
        let mut data_points_used = BTreeMap::new();
        let mut included: Vec<(String, Vec<PricePoint>)> = Vec::new();
        let mut short: Vec<(String, Vec<PricePoint>)> = Vec::new();

        for s in series {
            let rows = s.windowed(window, self.settings.max_rows_per_symbol);
            data_points_used.insert(s.symbol().to_string(), rows.len());

            if rows.len() >= min_rows {
                included.push((s.symbol().to_string(), rows));
            } else if policy == ShortHistoryPolicy::Exclude {
                short.push((s.symbol().to_string(), rows));
            } else {
                return Err(CoreError::InsufficientData {
                    symbol: s.symbol().to_string(),
                    interval,
                    required: min_rows,
                    available: rows.len(),
                });
            }
        }

        if included.is_empty() {
            // Every symbol is short: name the shortest one.
            let (symbol, rows) = short
                .iter()
                .min_by_key(|(_, rows)| rows.len())
                .ok_or_else(|| CoreError::InvalidRequest("no price series to align".into()))?;
            return Err(CoreError::InsufficientData {
                symbol: symbol.clone(),
                interval,
                required: min_rows,
                available: rows.len(),
            });
        }

        let common = Self::common_dates(&included);
        if common.len() < min_rows {
            // The symbol with the fewest rows is the one limiting the overlap.
            let limiting = included
                .iter()
                .min_by_key(|(_, rows)| rows.len())
                .map(|(symbol, _)| symbol.clone())
                .unwrap_or_default();
            return Err(CoreError::InsufficientData {
                symbol: limiting,
                interval,
                required: min_rows,
                available: common.len(),
            });
        }

        let common_set: HashSet<NaiveDate> = common.iter().copied().collect();
        let mut symbols = Vec::with_capacity(included.len());
        let mut returns = Vec::with_capacity(included.len());
        for (symbol, rows) in &included {
            let prices: Vec<f64> = rows
                .iter()
                .filter(|p| common_set.contains(&p.date))
                .map(|p| p.price)
                .collect();
            symbols.push(symbol.clone());
            returns.push(Self::simple_returns(&prices));
        }

        let mut excluded = BTreeMap::new();
        for (symbol, rows) in short {
            // Fewer than two rows leaves an empty return sequence.
            let prices: Vec<f64> = rows.iter().map(|p| p.price).collect();
            tracing::warn!(
                %symbol,
                rows = rows.len(),
                required = min_rows,
                "history too short for the shared window; reporting it on its own"
            );
            excluded.insert(symbol, Self::simple_returns(&prices));
        }

        let dataset = AlignedDataset {
            interval,
            symbols,
            timestamps: common.get(1..).map(<[_]>::to_vec).unwrap_or_default(),
            returns,
        };

        tracing::info!(
            assets = dataset.n_assets(),
            shared_data_points = dataset.len(),
            excluded = excluded.len(),
            %interval,
            "price histories aligned"
        );

        Ok(Alignment {
            dataset,
            data_points_used,
            excluded,
        })
    }

    /// Dates present in every history, ascending.
    fn common_dates(histories: &[(String, Vec<PricePoint>)]) -> Vec<NaiveDate> {
        let Some(((_, first), rest)) = histories.split_first() else {
            return Vec::new();
        };
        let mut common: Vec<NaiveDate> = first.iter().map(|p| p.date).collect();
        for (_, rows) in rest {
            let dates: HashSet<NaiveDate> = rows.iter().map(|p| p.date).collect();
            common.retain(|d| dates.contains(d));
        }
        common
    }

    /// r_t = (p_t − p_{t−1}) / p_{t−1}; one fewer element than `prices`.
    pub fn simple_returns(prices: &[f64]) -> Vec<f64> {
        prices.windows(2).map(|w| (w[1] - w[0]) / w[0]).collect()
    }
}
