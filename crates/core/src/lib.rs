pub mod errors;
pub mod models;
pub mod providers;
pub mod services;

use models::{
    optimization::{OptimizeRequest, OptimizeResponse, WeightFloor},
    price::DateWindow,
    settings::AnalyticsSettings,
    statistics::{StatsRequest, StatsResponse},
};
use providers::registry::PriceStoreRegistry;
use rand::Rng;
use services::{
    alignment_service::{AlignmentService, ShortHistoryPolicy},
    optimization_service::{normalize_symbols, validate_risk_free_rate, OptimizationService},
    price_service::PriceService,
    statistics_service::StatisticsService,
};

use errors::CoreError;

/// Main entry point for the portfolio analytics engine.
/// Owns the price stores and the services that turn price history into
/// statistics and optimized allocations.
#[must_use]
pub struct PortfolioAnalytics {
    settings: AnalyticsSettings,
    price_service: PriceService,
    alignment_service: AlignmentService,
    statistics_service: StatisticsService,
    optimization_service: OptimizationService,
}

impl std::fmt::Debug for PortfolioAnalytics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortfolioAnalytics")
            .field("settings", &self.settings)
            .field("stores", &self.price_service.store_names())
            .finish()
    }
}

impl PortfolioAnalytics {
    /// Create an engine over the given stores with default settings.
    pub fn new(registry: PriceStoreRegistry) -> Self {
        Self::build(registry, AnalyticsSettings::default())
    }

    /// Create an engine with custom settings. Settings are validated first.
    pub fn with_settings(
        registry: PriceStoreRegistry,
        settings: AnalyticsSettings,
    ) -> Result<Self, CoreError> {
        settings.validate()?;
        Ok(Self::build(registry, settings))
    }

    /// Create an engine backed by the default remote stores.
    pub fn create_default() -> Self {
        Self::new(PriceStoreRegistry::new_with_defaults())
    }

    // ── Stats ───────────────────────────────────────────────────────

    /// Per-asset and cross-asset statistics over the shared window.
    ///
    /// A symbol whose own history is too short is reported on its own
    /// returns and listed in `excluded_symbols`.
    pub async fn compute_stats(&self, request: &StatsRequest) -> Result<StatsResponse, CoreError> {
        let symbols = normalize_symbols(
            &request.symbols,
            self.settings.min_symbols,
            self.settings.max_symbols,
        )?;
        validate_risk_free_rate(request.risk_free_rate, self.settings.max_risk_free_rate)?;
        let window = DateWindow::new(request.from_date, request.to_date)?;

        let series = self
            .price_service
            .fetch_all(&symbols, request.interval, &window)
            .await?;
        let alignment = self.alignment_service.align(
            &series,
            request.interval,
            &window,
            ShortHistoryPolicy::Exclude,
        )?;
        Ok(self
            .statistics_service
            .compute(&alignment, request.risk_free_rate))
    }

    // ── Optimize ────────────────────────────────────────────────────

    /// Optimize with a weight floor drawn from the thread-local RNG.
    pub async fn optimize(&self, request: &OptimizeRequest) -> Result<OptimizeResponse, CoreError> {
        // Drawn before the first await so the returned future stays `Send`.
        let floor = WeightFloor::draw(&mut rand::thread_rng(), self.settings.weight_floor_range)?;
        self.optimize_with_floor(request, floor).await
    }

    /// Optimize with a weight floor drawn from `rng` (seed it for reproducible runs).
    pub async fn optimize_with_rng<R: Rng + ?Sized>(
        &self,
        request: &OptimizeRequest,
        rng: &mut R,
    ) -> Result<OptimizeResponse, CoreError> {
        let floor = WeightFloor::draw(rng, self.settings.weight_floor_range)?;
        self.optimize_with_floor(request, floor).await
    }

    /// Optimize with an explicit weight floor.
    pub async fn optimize_with_floor(
        &self,
        request: &OptimizeRequest,
        floor: WeightFloor,
    ) -> Result<OptimizeResponse, CoreError> {
        // Reject malformed requests before touching any store.
        let validated = self.optimization_service.validate_request(request)?;
        let series = self
            .price_service
            .fetch_all(&validated.symbols, request.interval, &validated.window)
            .await?;
        self.optimization_service.optimize(&series, request, floor)
    }

    // ── Settings & Stores ───────────────────────────────────────────

    #[must_use]
    pub fn settings(&self) -> &AnalyticsSettings {
        &self.settings
    }

    /// Names of the registered price stores, in fallback order.
    #[must_use]
    pub fn store_names(&self) -> Vec<String> {
        self.price_service.store_names()
    }

    // ── Internal ────────────────────────────────────────────────────

    fn build(registry: PriceStoreRegistry, settings: AnalyticsSettings) -> Self {
        Self {
            price_service: PriceService::new(registry),
            alignment_service: AlignmentService::new(settings.clone()),
            statistics_service: StatisticsService::new(),
            optimization_service: OptimizationService::new(settings.clone()),
            settings,
        }
    }
}
