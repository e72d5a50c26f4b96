// ═══════════════════════════════════════════════════════════════════
// Provider Tests — InMemoryPriceStore, PriceStoreRegistry, PriceService
// fallback behaviour
// ═══════════════════════════════════════════════════════════════════

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use portfolio_analytics_core::errors::CoreError;
use portfolio_analytics_core::models::price::{DateWindow, Interval, PricePoint, PriceSeries};
use portfolio_analytics_core::providers::memory::InMemoryPriceStore;
use portfolio_analytics_core::providers::registry::PriceStoreRegistry;
use portfolio_analytics_core::providers::traits::PriceStore;
use portfolio_analytics_core::services::price_service::PriceService;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn weekly_points(n: usize, start_price: f64) -> Vec<PricePoint> {
    let start = d(2022, 1, 3);
    (0..n)
        .map(|k| {
            PricePoint::new(
                start + chrono::Duration::weeks(k as i64),
                start_price + k as f64,
            )
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════
// Test Helpers — Mock Stores
// ═══════════════════════════════════════════════════════════════════

/// A store that always fails with a fixed error and counts its calls.
struct FailingStore {
    name: String,
    error: fn(&str) -> CoreError,
    calls: Arc<AtomicUsize>,
}

impl FailingStore {
    fn new(name: &str, error: fn(&str) -> CoreError) -> Self {
        Self {
            name: name.to_string(),
            error,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl PriceStore for FailingStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_history(
        &self,
        symbol: &str,
        _interval: Interval,
        _from: Option<NaiveDate>,
        _to: Option<NaiveDate>,
    ) -> Result<PriceSeries, CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err((self.error)(symbol))
    }
}

/// A store that answers every request with another symbol's history.
struct WrongSymbolStore;

#[async_trait]
impl PriceStore for WrongSymbolStore {
    fn name(&self) -> &str {
        "WrongSymbol"
    }

    async fn get_history(
        &self,
        _symbol: &str,
        _interval: Interval,
        _from: Option<NaiveDate>,
        _to: Option<NaiveDate>,
    ) -> Result<PriceSeries, CoreError> {
        PriceSeries::new("OTHER", weekly_points(3, 10.0))
    }
}

fn api_error(_: &str) -> CoreError {
    CoreError::Api {
        provider: "Flaky".into(),
        message: "HTTP 503".into(),
    }
}

fn not_found(symbol: &str) -> CoreError {
    CoreError::SymbolNotFound(symbol.to_string())
}

// ═══════════════════════════════════════════════════════════════════
// InMemoryPriceStore
// ═══════════════════════════════════════════════════════════════════

mod in_memory {
    use super::*;

    #[tokio::test]
    async fn returns_cached_history() {
        let store =
            InMemoryPriceStore::new().with_series("aapl", Interval::Weekly, &weekly_points(5, 100.0));
        let series = store
            .get_history("AAPL", Interval::Weekly, None, None)
            .await
            .unwrap();
        assert_eq!(series.symbol(), "AAPL");
        assert_eq!(series.len(), 5);
    }

    #[tokio::test]
    async fn respects_date_window() {
        let store =
            InMemoryPriceStore::new().with_series("AAPL", Interval::Weekly, &weekly_points(10, 100.0));
        let series = store
            .get_history("AAPL", Interval::Weekly, Some(d(2022, 1, 10)), Some(d(2022, 1, 24)))
            .await
            .unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series.points()[0].date, d(2022, 1, 10));
    }

    #[tokio::test]
    async fn unknown_symbol_is_not_found() {
        let store = InMemoryPriceStore::new();
        let err = store
            .get_history("nope", Interval::Weekly, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::SymbolNotFound(s) if s == "NOPE"));
    }

    #[tokio::test]
    async fn interval_must_match() {
        let store =
            InMemoryPriceStore::new().with_series("AAPL", Interval::Weekly, &weekly_points(5, 100.0));
        let err = store
            .get_history("AAPL", Interval::Monthly, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::SymbolNotFound(_)));
    }

    #[test]
    fn insert_counts_entries() {
        let mut store = InMemoryPriceStore::new();
        store.insert("A", Interval::Weekly, &weekly_points(4, 1.0));
        store.insert("B", Interval::Monthly, &weekly_points(2, 1.0));
        assert_eq!(store.cache().total_entries(), 6);
        assert_eq!(store.name(), "In-memory");
    }
}

// ═══════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════

mod registry {
    use super::*;

    #[test]
    fn empty_registry() {
        let registry = PriceStoreRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.names().is_empty());
    }

    #[test]
    fn keeps_registration_order() {
        let mut registry = PriceStoreRegistry::default();
        registry.register(Box::new(FailingStore::new("first", api_error)));
        registry.register(Box::new(InMemoryPriceStore::new()));
        assert_eq!(registry.names(), vec!["first".to_string(), "In-memory".to_string()]);
        assert_eq!(registry.stores().len(), 2);
    }

    #[test]
    fn defaults_include_yahoo() {
        let registry = PriceStoreRegistry::new_with_defaults();
        assert_eq!(registry.names(), vec!["Yahoo Finance".to_string()]);
    }
}

// ═══════════════════════════════════════════════════════════════════
// PriceService
// ═══════════════════════════════════════════════════════════════════

mod price_service {
    use super::*;

    fn window() -> DateWindow {
        DateWindow::unbounded()
    }

    #[tokio::test]
    async fn no_store_is_no_provider() {
        let service = PriceService::new(PriceStoreRegistry::new());
        let err = service
            .fetch("AAPL", Interval::Weekly, &window())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NoProvider));
    }

    #[tokio::test]
    async fn falls_back_to_next_store() {
        let mut registry = PriceStoreRegistry::new();
        registry.register(Box::new(FailingStore::new("Flaky", api_error)));
        registry.register(Box::new(
            InMemoryPriceStore::new().with_series("AAPL", Interval::Weekly, &weekly_points(5, 1.0)),
        ));
        let service = PriceService::new(registry);

        let series = service
            .fetch(" aapl", Interval::Weekly, &window())
            .await
            .unwrap();
        assert_eq!(series.symbol(), "AAPL");
        assert_eq!(series.len(), 5);
    }

    #[tokio::test]
    async fn primary_success_skips_fallback() {
        let fallback = FailingStore::new("Fallback", api_error);
        let calls = fallback.calls.clone();

        let mut registry = PriceStoreRegistry::new();
        registry.register(Box::new(
            InMemoryPriceStore::new().with_series("AAPL", Interval::Weekly, &weekly_points(5, 1.0)),
        ));
        registry.register(Box::new(fallback));
        let service = PriceService::new(registry);

        service.fetch("AAPL", Interval::Weekly, &window()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_everywhere_surfaces_symbol_not_found() {
        let mut registry = PriceStoreRegistry::new();
        registry.register(Box::new(FailingStore::new("Flaky", api_error)));
        registry.register(Box::new(FailingStore::new("Strict", not_found)));
        let service = PriceService::new(registry);

        let err = service
            .fetch("ghost", Interval::Weekly, &window())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::SymbolNotFound(s) if s == "GHOST"));
    }

    #[tokio::test]
    async fn mismatched_symbol_is_rejected() {
        let mut registry = PriceStoreRegistry::new();
        registry.register(Box::new(WrongSymbolStore));
        let service = PriceService::new(registry);

        let err = service
            .fetch("AAPL", Interval::Weekly, &window())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Api { ref provider, .. } if provider == "WrongSymbol"));
    }

    #[tokio::test]
    async fn fetch_all_aborts_on_first_failure() {
        let mut registry = PriceStoreRegistry::new();
        registry.register(Box::new(
            InMemoryPriceStore::new().with_series("AAPL", Interval::Weekly, &weekly_points(5, 1.0)),
        ));
        let service = PriceService::new(registry);

        let symbols = vec!["AAPL".to_string(), "MSFT".to_string()];
        let err = service
            .fetch_all(&symbols, Interval::Weekly, &window())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::SymbolNotFound(s) if s == "MSFT"));
    }

    #[tokio::test]
    async fn store_names_in_order() {
        let mut registry = PriceStoreRegistry::new();
        registry.register(Box::new(InMemoryPriceStore::new()));
        registry.register(Box::new(WrongSymbolStore));
        let service = PriceService::new(registry);
        assert_eq!(service.store_names(), vec!["In-memory", "WrongSymbol"]);
    }
}
