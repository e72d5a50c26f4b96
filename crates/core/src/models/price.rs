use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::CoreError;

/// Bar interval of a price history.
/// Drives annualization, minimum-row validation and the provider query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Interval {
    #[default]
    #[serde(rename = "weekly", alias = "1wk")]
    Weekly,
    #[serde(rename = "monthly", alias = "1mo")]
    Monthly,
}

impl Interval {
    /// Number of bars in one year (52 weekly, 12 monthly).
    pub fn periods_per_year(&self) -> f64 {
        match self {
            Interval::Weekly => 52.0,
            Interval::Monthly => 12.0,
        }
    }

    /// Interval code understood by Yahoo Finance.
    pub fn provider_code(&self) -> &'static str {
        match self {
            Interval::Weekly => "1wk",
            Interval::Monthly => "1mo",
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Interval::Weekly => write!(f, "weekly"),
            Interval::Monthly => write!(f, "monthly"),
        }
    }
}

/// A single closing price (timestamp → close).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: f64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, price: f64) -> Self {
        Self { date, price }
    }
}

/// Optional inclusive `[from, to]` restriction of a history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DateWindow {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateWindow {
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<Self, CoreError> {
        if let (Some(f), Some(t)) = (from, to) {
            if f > t {
                return Err(CoreError::InvalidRequest(format!(
                    "from_date {f} is after to_date {t}"
                )));
            }
        }
        Ok(Self { from, to })
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.map_or(true, |f| date >= f) && self.to.map_or(true, |t| date <= t)
    }
}

/// Ordered close-price history of one symbol, as returned by a Price Store.
///
/// Invariants (checked on construction): timestamps strictly increasing,
/// every price finite and strictly positive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSeries {
    symbol: String,
    points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(symbol: impl Into<String>, points: Vec<PricePoint>) -> Result<Self, CoreError> {
        let symbol = symbol.into().trim().to_uppercase();
        for pair in points.windows(2) {
            if pair[1].date <= pair[0].date {
                return Err(CoreError::InvalidSeries {
                    symbol,
                    message: format!(
                        "timestamps must be strictly increasing ({} then {})",
                        pair[0].date, pair[1].date
                    ),
                });
            }
        }
        if let Some(bad) = points.iter().find(|p| !p.price.is_finite() || p.price <= 0.0) {
            return Err(CoreError::InvalidSeries {
                symbol,
                message: format!("invalid close {} on {}", bad.price, bad.date),
            });
        }
        Ok(Self { symbol, points })
    }

    /// Build from points in any order. Duplicate dates keep the last value seen.
    pub fn from_unsorted(
        symbol: impl Into<String>,
        mut points: Vec<PricePoint>,
    ) -> Result<Self, CoreError> {
        points.reverse();
        points.sort_by_key(|p| p.date);
        points.dedup_by_key(|p| p.date);
        Self::new(symbol, points)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points inside `window`, most recent `max_rows` only.
    pub fn windowed(&self, window: &DateWindow, max_rows: usize) -> Vec<PricePoint> {
        let start = window.from.map_or(0, |from| {
            self.points
                .binary_search_by_key(&from, |p| p.date)
                .unwrap_or_else(|pos| pos)
        });
        let end = window.to.map_or(self.points.len(), |to| {
            self.points
                .binary_search_by_key(&to, |p| p.date)
                .map(|pos| pos + 1)
                .unwrap_or_else(|pos| pos)
        });
        if start >= end {
            return Vec::new();
        }
        let slice = &self.points[start..end];
        let skip = slice.len().saturating_sub(max_rows);
        slice[skip..].to_vec()
    }
}

/// Cache key: (symbol, interval) e.g., ("AAPL", Weekly)
pub type PriceCacheKey = (String, Interval);

/// Local store of already-resolved price histories.
///
/// Entries are kept sorted by date so range queries are two binary searches.
#[derive(Debug, Clone, Default)]
pub struct PriceCache {
    pub entries: HashMap<PriceCacheKey, Vec<PricePoint>>,
}

impl PriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update a price point in the cache.
    /// Maintains sorted order by date using binary search (O(log n) insertion).
    pub fn set_price(&mut self, symbol: &str, interval: Interval, date: NaiveDate, price: f64) {
        let key = (symbol.to_uppercase(), interval);
        let entries = self.entries.entry(key).or_default();

        match entries.binary_search_by_key(&date, |p| p.date) {
            Ok(idx) => entries[idx].price = price,
            Err(idx) => entries.insert(idx, PricePoint { date, price }),
        }
    }

    /// Insert multiple price points at once.
    pub fn set_prices(&mut self, symbol: &str, interval: Interval, points: &[PricePoint]) {
        for point in points {
            self.set_price(symbol, interval, point.date, point.price);
        }
    }

    pub fn contains(&self, symbol: &str, interval: Interval) -> bool {
        self.entries.contains_key(&(symbol.to_uppercase(), interval))
    }

    /// Get the total number of cached price points across all symbols.
    pub fn total_entries(&self) -> usize {
        self.entries.values().map(|v| v.len()).sum()
    }

    /// Cached points for a (symbol, interval) pair inside an optional date range.
    /// `None` when the pair has never been cached.
    pub fn get_price_range(
        &self,
        symbol: &str,
        interval: Interval,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Option<Vec<PricePoint>> {
        let key = (symbol.to_uppercase(), interval);
        self.entries.get(&key).map(|entries| {
            let start = from.map_or(0, |from| {
                entries
                    .binary_search_by_key(&from, |p| p.date)
                    .unwrap_or_else(|pos| pos)
            });
            let end = to.map_or(entries.len(), |to| {
                entries
                    .binary_search_by_key(&to, |p| p.date)
                    .map(|pos| pos + 1) // include the exact match
                    .unwrap_or_else(|pos| pos)
            });
            if start >= end {
                Vec::new()
            } else {
                entries[start..end].to_vec()
            }
        })
    }
}
