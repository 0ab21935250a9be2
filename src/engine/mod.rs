//! Sizing engine
//!
//! Performance tracking, dynamic risk limits, Kelly sizing, EV scenarios and
//! the portfolio manager that ties them together.

pub mod expected_value;
pub mod kelly_sizer;
pub mod performance_tracker;
pub mod portfolio_manager;
pub mod risk_limiter;
pub mod stats;
pub mod trade_history;

pub use expected_value::{EvAnalysis, ExpectedValueCalculator, OpportunityTier, RankedOpportunity, Scenario, ScenarioKind};
pub use kelly_sizer::{KellyAnalysis, KellyEstimate, KellySizer, PortfolioAllocation, PositionSizeResult};
pub use performance_tracker::{PerformanceMetrics, PerformanceTracker};
pub use portfolio_manager::{
    EnhancedPortfolioManager, PortfolioHealthReport, PortfolioRequest, PositionRecommendation,
};
pub use risk_limiter::{
    DynamicRiskLimiter, EntryDecision, EntryRejection, PerformanceCategory, RiskAdjustment, RiskLimits,
};
pub use trade_history::TradeHistory;

use crate::audit::AuditSink;
use crate::config::AppConfig;
use crate::market_data::PriceHistorySource;
use crate::metrics::MetricsState;
use crate::predictions::PredictionService;
use std::sync::Arc;

/// Sizing services, constructed once at startup and shared by reference
pub struct SizingEngine {
    pub tracker: Arc<PerformanceTracker>,
    pub limiter: Arc<DynamicRiskLimiter>,
    pub kelly: Arc<KellySizer>,
    pub ev: Arc<ExpectedValueCalculator>,
    pub manager: EnhancedPortfolioManager,
}

impl SizingEngine {
    /// Wire every component from configuration and collaborators
    pub fn new(
        config: &AppConfig,
        prices: Arc<dyn PriceHistorySource>,
        predictions: Arc<dyn PredictionService>,
        audit: Arc<dyn AuditSink>,
        metrics: Option<Arc<MetricsState>>,
    ) -> Self {
        let portfolio = &config.portfolio;

        let tracker = Arc::new(PerformanceTracker::new(config.performance.clone()));
        let limiter = Arc::new(DynamicRiskLimiter::new(
            config.risk_limits.clone(),
            tracker.clone(),
        ));
        let kelly = Arc::new(
            KellySizer::new(
                config.kelly.clone(),
                &config.cache,
                prices.clone(),
                predictions.clone(),
            )
            .with_limits(portfolio.fetch_timeout_secs, portfolio.max_concurrency),
        );
        let ev = Arc::new(
            ExpectedValueCalculator::new(
                config.expected_value.clone(),
                &config.cache,
                prices.clone(),
                predictions,
            )
            .with_limits(portfolio.fetch_timeout_secs, portfolio.max_concurrency),
        );

        let mut manager = EnhancedPortfolioManager::new(
            portfolio.clone(),
            limiter.clone(),
            kelly.clone(),
            ev.clone(),
            prices,
            audit,
        );
        if let Some(metrics) = metrics {
            manager = manager.with_metrics(metrics);
        }

        Self {
            tracker,
            limiter,
            kelly,
            ev,
            manager,
        }
    }
}
