//! End-to-end portfolio analysis over in-memory price history

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use sizing_operator::audit::{AuditEvent, AuditSink};
use sizing_operator::config::AppConfig;
use sizing_operator::engine::{PortfolioRequest, SizingEngine};
use sizing_operator::error::{AppError, DataError};
use sizing_operator::market_data::{InMemoryPriceSource, PriceBar, PriceHistorySource};
use sizing_operator::metrics::MetricsState;
use sizing_operator::models::{Recommendation, RiskLevel, TradeDirection};
use sizing_operator::predictions::NoPredictions;
use std::sync::Arc;

#[derive(Default)]
struct RecordingAudit {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAudit {
    fn types(&self) -> Vec<String> {
        self.events.lock().iter().map(|e| e.event_type.clone()).collect()
    }

    fn count(&self, event_type: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }
}

impl AuditSink for RecordingAudit {
    fn emit(&self, event: AuditEvent) {
        self.events.lock().push(event);
    }
}

/// Delays every fetch for one symbol
struct SlowSource {
    inner: InMemoryPriceSource,
    slow_symbol: String,
    delay: std::time::Duration,
}

#[async_trait]
impl PriceHistorySource for SlowSource {
    async fn daily_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, DataError> {
        if symbol == self.slow_symbol {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.daily_bars(symbol, start, end).await
    }
}

/// Weekly cycle of small gains and losses with an upward drift
fn wavy_closes(days: usize) -> Vec<f64> {
    let cycle = [0.012, -0.008, 0.010, -0.006, 0.004, 0.009, -0.011];
    let mut price = 100.0;
    let mut out = vec![price];
    for i in 0..days {
        price *= 1.0 + cycle[i % cycle.len()];
        out.push(price);
    }
    out
}

fn prices() -> InMemoryPriceSource {
    let source = InMemoryPriceSource::new();
    source.insert_closes("AAPL", &wavy_closes(600));
    source
}

fn engine(
    config: &AppConfig,
    source: Arc<dyn PriceHistorySource>,
    audit: Arc<RecordingAudit>,
) -> SizingEngine {
    SizingEngine::new(config, source, Arc::new(NoPredictions), audit, None)
}

/// 200 closed trades ending yesterday, 70% winners
fn seed_history(engine: &SizingEngine, symbol: &str) {
    let start = Utc::now() - Duration::days(1);
    for i in 0..200 {
        let exit_time = start - Duration::hours(2 * i);
        let exit_price = if i % 10 < 7 { 104.0 } else { 98.0 };
        engine.tracker.record_trade(
            symbol,
            100.0,
            exit_price,
            10.0,
            exit_time - Duration::hours(1),
            exit_time,
            TradeDirection::Long,
        );
    }
}

#[tokio::test]
async fn test_seeded_symbol_gets_capped_buy() {
    let audit = Arc::new(RecordingAudit::default());
    let engine = engine(&AppConfig::default(), Arc::new(prices()), audit.clone());
    seed_history(&engine, "AAPL");

    let request = PortfolioRequest::new(vec!["AAPL".to_string()], Decimal::from(100_000));
    let report = engine
        .manager
        .analyze_portfolio_with_risk_management(&request)
        .await;

    assert_eq!(report.recommendations.len(), 1);
    let rec = &report.recommendations[0];
    assert_eq!(rec.symbol, "AAPL");
    assert_eq!(rec.action, Recommendation::Buy, "rationale: {}", rec.rationale);
    assert_eq!(rec.risk_limit_cap, Decimal::from(14_250));
    assert!(rec.position_size > Decimal::from(3_000));
    assert!(rec.position_size < Decimal::from(5_000));
    assert!(rec.position_size <= rec.risk_limit_cap);
    assert_eq!(rec.kelly_risk_level, Some(RiskLevel::Low));
    assert!(rec.expected_value > 0.03);
    assert_eq!(rec.probability_of_loss, 0.0);
    assert!(rec.stop_loss_price.is_some());
    assert!(rec.risk_warnings.is_empty(), "warnings: {:?}", rec.risk_warnings);

    assert_eq!(report.exposure_scale, 1.0);
    assert_eq!(report.opportunities.len(), 1);
    assert!(report.portfolio_score > 0.0 && report.portfolio_score <= 100.0);

    let types = audit.types();
    assert_eq!(types.first().map(String::as_str), Some("RISK_LIMITS_ADJUSTED"));
    assert_eq!(types.last().map(String::as_str), Some("PORTFOLIO_ANALYZED"));
    let run_ids: Vec<String> = audit
        .events
        .lock()
        .iter()
        .filter_map(|e| e.details.get("run_id").and_then(|v| v.as_str()).map(str::to_string))
        .collect();
    assert_eq!(run_ids, vec![report.run_id.clone(), report.run_id.clone()]);
}

#[tokio::test]
async fn test_failed_symbol_holds_and_batch_completes() {
    let audit = Arc::new(RecordingAudit::default());
    let engine = engine(&AppConfig::default(), Arc::new(prices()), audit.clone());
    seed_history(&engine, "AAPL");

    let request = PortfolioRequest::new(
        vec!["GONE".to_string(), "AAPL".to_string()],
        Decimal::from(100_000),
    );
    let report = engine
        .manager
        .analyze_portfolio_with_risk_management(&request)
        .await;

    let symbols: Vec<&str> = report.recommendations.iter().map(|r| r.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["GONE", "AAPL"]);

    let gone = &report.recommendations[0];
    assert_eq!(gone.action, Recommendation::Hold);
    assert_eq!(gone.position_size, Decimal::ZERO);
    assert!(gone.rationale.starts_with("analysis failed"));
    assert_eq!(report.recommendations[1].action, Recommendation::Buy);

    // Kelly and EV both fail for GONE
    assert_eq!(audit.count("ANALYSIS_FAILED"), 2);
    assert_eq!(report.opportunities.len(), 1);
}

#[tokio::test]
async fn test_correlated_holding_vetoes_entry() {
    let source = prices();
    source.insert_closes("MSFT", &wavy_closes(600));
    let audit = Arc::new(RecordingAudit::default());
    let engine = engine(&AppConfig::default(), Arc::new(source), audit.clone());
    seed_history(&engine, "AAPL");

    let request = PortfolioRequest::new(vec!["AAPL".to_string()], Decimal::from(100_000))
        .with_holding("MSFT", Decimal::from(20_000));
    let report = engine
        .manager
        .analyze_portfolio_with_risk_management(&request)
        .await;

    let rec = &report.recommendations[0];
    assert_eq!(rec.action, Recommendation::Avoid);
    assert_eq!(rec.position_size, Decimal::ZERO);
    assert!(rec.correlation > 0.99);
    assert!(rec.rationale.starts_with("entry blocked"));
    assert_eq!(audit.count("ENTRY_VETOED"), 1);
    assert!(report.opportunities.is_empty());
}

#[tokio::test]
async fn test_stale_holding_still_vetoes_entry() {
    let closes = wavy_closes(600);
    let today = Utc::now().date_naive();
    let n = closes.len() as i64;
    // Same closes on the same dates as AAPL, minus the last three sessions
    let stale: Vec<PriceBar> = closes
        .iter()
        .enumerate()
        .map(|(i, c)| PriceBar::from_close(today - Duration::days(n - 1 - i as i64), *c))
        .take(closes.len() - 3)
        .collect();
    let source = prices();
    source.insert("MSFT", stale);
    let audit = Arc::new(RecordingAudit::default());
    let engine = engine(&AppConfig::default(), Arc::new(source), audit.clone());
    seed_history(&engine, "AAPL");

    let request = PortfolioRequest::new(vec!["AAPL".to_string()], Decimal::from(100_000))
        .with_holding("MSFT", Decimal::from(20_000));
    let report = engine
        .manager
        .analyze_portfolio_with_risk_management(&request)
        .await;

    let rec = &report.recommendations[0];
    assert!(rec.correlation > 0.99, "correlation {}", rec.correlation);
    assert_eq!(rec.action, Recommendation::Avoid);
    assert_eq!(rec.position_size, Decimal::ZERO);
    assert_eq!(audit.count("ENTRY_VETOED"), 1);
}

#[test]
fn test_request_validation() {
    let request = PortfolioRequest::new(vec!["AAPL".to_string()], Decimal::from(100_000));
    assert!(request.validate().is_ok());

    let empty = PortfolioRequest::new(Vec::new(), Decimal::from(100_000));
    assert!(matches!(empty.validate(), Err(AppError::Validation(_))));

    let broke = PortfolioRequest::new(vec!["AAPL".to_string()], Decimal::ZERO);
    assert!(matches!(broke.validate(), Err(AppError::Validation(_))));

    let short = request.with_holding("MSFT", Decimal::from(-1));
    assert!(matches!(short.validate(), Err(AppError::Validation(_))));
}

#[tokio::test]
async fn test_cold_start_sizes_to_zero() {
    let audit = Arc::new(RecordingAudit::default());
    let engine = engine(&AppConfig::default(), Arc::new(prices()), audit);

    let request = PortfolioRequest::new(vec!["AAPL".to_string()], Decimal::from(100_000));
    let report = engine
        .manager
        .analyze_portfolio_with_risk_management(&request)
        .await;

    let rec = &report.recommendations[0];
    assert_eq!(rec.risk_limit_cap, Decimal::ZERO);
    assert_eq!(rec.position_size, Decimal::ZERO);
    assert!(rec
        .risk_warnings
        .iter()
        .any(|w| w.starts_with("Low confidence")));
    assert_eq!(report.global_adjustment.confidence, 0.0);
    assert_eq!(report.total_recommended_exposure, 0.0);
}

#[tokio::test]
async fn test_slow_symbol_times_out() {
    let mut config = AppConfig::default();
    config.portfolio.symbol_timeout_secs = 1;
    let source = SlowSource {
        inner: prices(),
        slow_symbol: "SLOW".to_string(),
        delay: std::time::Duration::from_secs(5),
    };
    let audit = Arc::new(RecordingAudit::default());
    let engine = engine(&config, Arc::new(source), audit.clone());
    seed_history(&engine, "AAPL");

    let request = PortfolioRequest::new(
        vec!["AAPL".to_string(), "SLOW".to_string()],
        Decimal::from(100_000),
    );
    let report = engine
        .manager
        .analyze_portfolio_with_risk_management(&request)
        .await;

    assert_eq!(report.recommendations.len(), 2);
    let slow = &report.recommendations[1];
    assert_eq!(slow.symbol, "SLOW");
    assert_eq!(slow.action, Recommendation::Hold);
    assert_eq!(slow.rationale, "analysis failed: timed out after 1s");
    assert_eq!(report.recommendations[0].action, Recommendation::Buy);
    assert_eq!(audit.count("ANALYSIS_FAILED"), 1);
}

#[tokio::test]
async fn test_run_metrics_recorded() {
    let metrics = Arc::new(MetricsState::new().unwrap());
    let engine = SizingEngine::new(
        &AppConfig::default(),
        Arc::new(prices()),
        Arc::new(NoPredictions),
        Arc::new(RecordingAudit::default()),
        Some(metrics.clone()),
    );
    seed_history(&engine, "AAPL");

    let request = PortfolioRequest::new(
        vec!["AAPL".to_string(), "GONE".to_string()],
        Decimal::from(100_000),
    );
    let report = engine
        .manager
        .analyze_portfolio_with_risk_management(&request)
        .await;

    assert_eq!(metrics.recommendations_total.with_label_values(&["buy"]).get(), 1);
    assert_eq!(metrics.recommendations_total.with_label_values(&["hold"]).get(), 1);
    assert_eq!(metrics.analysis_failures_total.with_label_values(&["kelly"]).get(), 1);
    assert!((metrics.portfolio_score.get() - report.portfolio_score).abs() < 1e-12);

    let rendered = metrics.render().unwrap();
    assert!(rendered.contains("recommendations_total"));
}
