//! Sizing Operator Library
//!
//! Portfolio risk management and position sizing: dynamic risk limits from
//! realized performance, Kelly Criterion sizing and scenario-based expected
//! value, combined into per-symbol recommendations and a portfolio report.

pub mod audit;
pub mod cache;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod market_data;
pub mod metrics;
pub mod models;
pub mod predictions;

// Re-export commonly used types for tests
pub use audit::{AuditEvent, AuditSink, Severity, SqliteAuditLog, TracingAuditSink};
pub use config::AppConfig;
pub use db::DbPool;
pub use engine::{
    DynamicRiskLimiter, EnhancedPortfolioManager, ExpectedValueCalculator, KellySizer,
    PerformanceTracker, PortfolioHealthReport, PortfolioRequest, SizingEngine,
};
pub use error::{AnalysisError, AppError, AppResult, DataError};
pub use market_data::{InMemoryPriceSource, JsonFilePriceSource, PriceBar, PriceHistorySource};
pub use models::{Recommendation, RiskLevel, TradeDirection, TradeRecord};
pub use predictions::{HttpPredictionService, MlPrediction, NoPredictions, PredictionService};
