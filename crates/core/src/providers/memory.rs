use async_trait::async_trait;
use chrono::NaiveDate;

use super::traits::PriceStore;
use crate::errors::CoreError;
use crate::models::price::{Interval, PriceCache, PricePoint, PriceSeries};

/// Price Store over histories that are already in memory.
///
/// Used for offline analysis of previously fetched data and in tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPriceStore {
    cache: PriceCache,
}

impl InMemoryPriceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_cache(cache: PriceCache) -> Self {
        Self { cache }
    }

    /// Add (or overwrite) points for a symbol at an interval.
    pub fn insert(&mut self, symbol: &str, interval: Interval, points: &[PricePoint]) {
        self.cache.set_prices(symbol, interval, points);
    }

    /// Builder-style [`InMemoryPriceStore::insert`].
    pub fn with_series(mut self, symbol: &str, interval: Interval, points: &[PricePoint]) -> Self {
        self.insert(symbol, interval, points);
        self
    }

    pub fn cache(&self) -> &PriceCache {
        &self.cache
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl PriceStore for InMemoryPriceStore {
    fn name(&self) -> &str {
        "In-memory"
    }

    async fn get_history(
        &self,
        symbol: &str,
        interval: Interval,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<PriceSeries, CoreError> {
        let points = self
            .cache
            .get_price_range(symbol, interval, from, to)
            .ok_or_else(|| CoreError::SymbolNotFound(symbol.to_uppercase()))?;
        PriceSeries::new(symbol, points)
    }
}
