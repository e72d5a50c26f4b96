use crate::errors::CoreError;
use crate::models::price::{DateWindow, Interval, PriceSeries};
use crate::providers::registry::PriceStoreRegistry;

/// Loads price histories for a request from the registered Price Stores.
///
/// The stores have already resolved caching/staleness; this service only
/// normalises symbols and falls back to the next store when one fails.
pub struct PriceService {
    registry: PriceStoreRegistry,
}

impl PriceService {
    pub fn new(registry: PriceStoreRegistry) -> Self {
        Self { registry }
    }

    /// Get the names of all registered stores, in priority order.
    pub fn store_names(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Fetch the history of every symbol. Any failure aborts the whole batch.
    pub async fn fetch_all(
        &self,
        symbols: &[String],
        interval: Interval,
        window: &DateWindow,
    ) -> Result<Vec<PriceSeries>, CoreError> {
        let mut series = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            series.push(self.fetch(symbol, interval, window).await?);
        }
        Ok(series)
    }

    /// Fetch one symbol with automatic fallback.
    ///
    /// Tries stores in registration order. If every store fails, the last
    /// error is returned, so a symbol unknown everywhere surfaces as
    /// `SymbolNotFound` unchanged.
    pub async fn fetch(
        &self,
        symbol: &str,
        interval: Interval,
        window: &DateWindow,
    ) -> Result<PriceSeries, CoreError> {
        let stores = self.registry.stores();
        if stores.is_empty() {
            return Err(CoreError::NoProvider);
        }

        let symbol = symbol.trim().to_uppercase();
        let mut last_error = None;

        for store in &stores {
            match store
                .get_history(&symbol, interval, window.from, window.to)
                .await
            {
                Ok(series) if series.symbol() != symbol => {
                    last_error = Some(CoreError::Api {
                        provider: store.name().to_string(),
                        message: format!(
                            "asked for {symbol}, got history for {}",
                            series.symbol()
                        ),
                    });
                }
                Ok(series) => {
                    tracing::debug!(
                        %symbol,
                        store = store.name(),
                        rows = series.len(),
                        "price history loaded"
                    );
                    return Ok(series);
                }
                Err(e) => {
                    tracing::debug!(%symbol, store = store.name(), error = %e, "price store failed");
                    last_error = Some(e);
                    // Try next store
                }
            }
        }

        Err(last_error.unwrap_or(CoreError::NoProvider))
    }
}
