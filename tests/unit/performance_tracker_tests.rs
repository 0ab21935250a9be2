//! Unit tests for closed-trade performance tracking

use chrono::{Duration, Utc};
use sizing_operator::config::PerformanceConfig;
use sizing_operator::engine::PerformanceTracker;
use sizing_operator::models::TradeDirection;

/// 140 wins of +4% and 60 losses of -2%, most recent first is a win
fn seeded_tracker(symbol: &str) -> PerformanceTracker {
    let tracker = PerformanceTracker::new(PerformanceConfig::default());
    let start = Utc::now() - Duration::days(1);
    for i in 0..200 {
        let exit_time = start - Duration::hours(2 * i);
        let exit_price = if i % 10 < 7 { 104.0 } else { 98.0 };
        tracker.record_trade(
            symbol,
            100.0,
            exit_price,
            10.0,
            exit_time - Duration::hours(1),
            exit_time,
            TradeDirection::Long,
        );
    }
    tracker
}

#[test]
fn test_empty_window_returns_neutral_defaults() {
    let tracker = PerformanceTracker::new(PerformanceConfig::default());
    let metrics = tracker.calculate_performance_metrics(Some("AAPL"));
    assert_eq!(metrics.total_trades, 0);
    assert_eq!(metrics.win_rate, 0.5);
    assert_eq!(metrics.sharpe_ratio, 0.0);
    assert_eq!(metrics.profit_factor, 1.0);
    assert_eq!(metrics.max_drawdown, 0.0);
}

#[test]
fn test_seeded_history_metrics() {
    let tracker = seeded_tracker("AAPL");
    let metrics = tracker.calculate_performance_metrics(Some("AAPL"));

    assert_eq!(metrics.total_trades, 200);
    assert!((metrics.win_rate - 0.70).abs() < 1e-12);
    assert!((metrics.avg_return - 0.022).abs() < 1e-12);
    assert!((metrics.avg_win - 0.04).abs() < 1e-12);
    assert!((metrics.avg_loss - 0.02).abs() < 1e-12);
    // mean 0.022 over sample stdev ~0.0276
    assert!(metrics.sharpe_ratio > 0.79 && metrics.sharpe_ratio < 0.81);
    // gross 140 * 40 / 60 * 20
    assert!((metrics.profit_factor - 5600.0 / 1200.0).abs() < 1e-9);
    assert!(metrics.consecutive_wins >= 1);
    assert_eq!(metrics.consecutive_losses, 0);
}

#[test]
fn test_symbol_filter() {
    let tracker = seeded_tracker("AAPL");
    let now = Utc::now();
    tracker.record_trade(
        "MSFT",
        100.0,
        90.0,
        1.0,
        now - Duration::hours(3),
        now - Duration::hours(2),
        TradeDirection::Long,
    );

    assert_eq!(tracker.calculate_performance_metrics(Some("MSFT")).total_trades, 1);
    assert_eq!(tracker.calculate_performance_metrics(None).total_trades, 201);
    assert_eq!(tracker.last_trade("MSFT").map(|t| t.is_loss()), Some(true));
}

#[test]
fn test_short_trade_profits_from_falling_price() {
    let tracker = PerformanceTracker::new(PerformanceConfig::default());
    let now = Utc::now();
    tracker.record_trade(
        "TSLA",
        200.0,
        180.0,
        5.0,
        now - Duration::hours(5),
        now - Duration::hours(1),
        TradeDirection::Short,
    );
    let metrics = tracker.calculate_performance_metrics(Some("TSLA"));
    assert_eq!(metrics.win_rate, 1.0);
    assert!((metrics.avg_return - 0.10).abs() < 1e-12);
    assert!((metrics.avg_holding_hours - 4.0).abs() < 1e-9);
}

#[test]
fn test_capacity_evicts_oldest() {
    let tracker = PerformanceTracker::new(PerformanceConfig {
        history_capacity: 50,
        ..PerformanceConfig::default()
    });
    let now = Utc::now();
    for i in 0..80 {
        let exit = now - Duration::minutes(80 - i);
        tracker.record_trade("AAPL", 100.0, 101.0, 1.0, exit - Duration::minutes(1), exit, TradeDirection::Long);
    }
    assert_eq!(tracker.history_len(), 50);
    assert_eq!(tracker.calculate_performance_metrics(None).total_trades, 50);
}
