use async_trait::async_trait;
use chrono::NaiveDate;

use crate::errors::CoreError;
use crate::models::price::{Interval, PriceSeries};

/// Source of resolved close-price histories (the "Price Store").
///
/// Caching, staleness and sync against the upstream data vendor are the
/// implementation's business; callers only see a complete ordered series.
/// An unknown symbol must be reported as [`CoreError::SymbolNotFound`].
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait PriceStore: Send + Sync {
    /// Human-readable name of this store (for logs/errors).
    fn name(&self) -> &str;

    /// Close history of `symbol` at `interval`, restricted to the inclusive
    /// `[from, to]` window when given. Sorted oldest first.
    async fn get_history(
        &self,
        symbol: &str,
        interval: Interval,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<PriceSeries, CoreError>;
}
