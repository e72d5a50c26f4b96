use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use time::OffsetDateTime;

use super::traits::PriceStore;
use crate::errors::CoreError;
use crate::models::price::{DateWindow, Interval, PricePoint, PriceSeries};

const PROVIDER: &str = "Yahoo Finance";

/// Yahoo Finance Price Store for weekly and monthly close histories.
///
/// - **Free**: No API key required.
/// - **Coverage**: Global equities, ETFs, indices, crypto pairs (e.g. `BTC-USD`).
///
/// Uses the `yahoo_finance_api` crate. With no `from` date the full
/// available history is requested.
///
/// **Note**: Not WASM-compatible (uses native reqwest/tokio).
pub struct YahooPriceStore {
    connector: yahoo_finance_api::YahooConnector,
}

impl YahooPriceStore {
    pub fn new() -> Result<Self, CoreError> {
        let connector = yahoo_finance_api::YahooConnector::new().map_err(|e| CoreError::Api {
            provider: PROVIDER.into(),
            message: format!("Failed to create connector: {e}"),
        })?;
        Ok(Self { connector })
    }

    /// Convert a `chrono::NaiveDate` to `time::OffsetDateTime` (midnight UTC).
    fn to_offset_datetime(date: NaiveDate) -> Result<OffsetDateTime, CoreError> {
        let invalid = |e: String| CoreError::Api {
            provider: PROVIDER.into(),
            message: format!("Invalid date {date}: {e}"),
        };
        let month = time::Month::try_from(date.month() as u8).map_err(|e| invalid(e.to_string()))?;
        let odt = time::Date::from_calendar_date(date.year(), month, date.day() as u8)
            .map_err(|e| invalid(e.to_string()))?
            .midnight()
            .assume_utc();
        Ok(odt)
    }

    /// Convert a unix timestamp (seconds) to `chrono::NaiveDate`.
    fn timestamp_to_naive_date(ts: i64) -> Option<NaiveDate> {
        chrono::DateTime::from_timestamp(ts, 0).map(|dt| dt.date_naive())
    }
}

#[async_trait]
impl PriceStore for YahooPriceStore {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn get_history(
        &self,
        symbol: &str,
        interval: Interval,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<PriceSeries, CoreError> {
        let symbol = symbol.trim().to_uppercase();
        let code = interval.provider_code();

        let resp = match from {
            Some(from) => {
                let end_date = to.unwrap_or_else(|| chrono::Utc::now().date_naive());
                let start = Self::to_offset_datetime(from)?;
                let end = Self::to_offset_datetime(end_date + chrono::Duration::days(1))?; // inclusive end
                self.connector
                    .get_quote_history_interval(&symbol, start, end, code)
                    .await
            }
            None => self.connector.get_quote_range(&symbol, code, "max").await,
        }
        .map_err(|e| CoreError::Api {
            provider: PROVIDER.into(),
            message: format!("Failed to fetch {code} history for {symbol}: {e}"),
        })?;

        // Yahoo answers an unknown ticker with an empty or quote-less chart.
        let quotes = resp
            .quotes()
            .map_err(|_| CoreError::SymbolNotFound(symbol.clone()))?;
        if quotes.is_empty() {
            return Err(CoreError::SymbolNotFound(symbol));
        }

        let window = DateWindow { from, to };
        let points: Vec<PricePoint> = quotes
            .iter()
            .filter_map(|q| {
                let date = Self::timestamp_to_naive_date(q.timestamp as i64)?;
                // Yahoo occasionally emits an in-progress bar with a null close.
                (window.contains(date) && q.close.is_finite() && q.close > 0.0)
                    .then(|| PricePoint::new(date, q.close))
            })
            .collect();

        tracing::debug!(%symbol, rows = points.len(), interval = %interval, "Yahoo history fetched");
        PriceSeries::from_unsorted(symbol, points)
    }
}
