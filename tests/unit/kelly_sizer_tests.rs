//! Unit tests for Kelly sizing and multi-symbol allocation

use rust_decimal::Decimal;
use sizing_operator::config::{CacheConfig, KellyConfig};
use sizing_operator::engine::kelly_sizer::calculate_kelly_fraction;
use sizing_operator::engine::{KellyAnalysis, KellySizer};
use sizing_operator::market_data::InMemoryPriceSource;
use sizing_operator::models::{Recommendation, RiskLevel};
use sizing_operator::predictions::NoPredictions;
use std::sync::Arc;

/// Closes following a repeating cycle of daily returns
fn closes(cycle: &[f64], days: usize) -> Vec<f64> {
    let mut price = 100.0;
    let mut out = vec![price];
    for i in 0..days {
        price *= 1.0 + cycle[i % cycle.len()];
        out.push(price);
    }
    out
}

fn trending_cycle() -> Vec<f64> {
    let mut cycle = vec![0.015; 6];
    cycle.extend([-0.01; 4]);
    cycle
}

fn losing_cycle() -> Vec<f64> {
    let mut cycle = vec![0.01; 4];
    cycle.extend([-0.01; 6]);
    cycle
}

fn sizer_with(prices: InMemoryPriceSource) -> KellySizer {
    KellySizer::new(
        KellyConfig::default(),
        &CacheConfig::default(),
        Arc::new(prices),
        Arc::new(NoPredictions),
    )
}

fn analysis(symbol: &str, fraction: f64, risk_level: RiskLevel) -> KellyAnalysis {
    let mut a = KellyAnalysis::fallback(symbol, "fixture");
    a.error = None;
    a.expected_value = 0.01;
    a.adjusted_fraction = fraction;
    a.kelly_fraction = fraction * 2.0;
    a.confidence_interval = (0.55, 0.65);
    a.risk_level = risk_level;
    a.recommendation = Recommendation::Buy;
    a
}

#[test]
fn test_breakeven_inputs_have_no_edge() {
    for (p, w, l) in [(0.5, 0.02, 0.02), (0.25, 0.03, 0.01), (0.6, 0.01, 0.015)] {
        let estimate = calculate_kelly_fraction(p, w, l);
        assert!(estimate.kelly_fraction.abs() < 1e-12, "p={} w={} l={}", p, w, l);
        assert!(estimate.edge.abs() < 1e-12);
    }
}

#[test]
fn test_adjusted_fraction_bounds() {
    let sizer = sizer_with(InMemoryPriceSource::new());
    for p in [0.51, 0.6, 0.75, 0.9, 0.99] {
        for (w, l) in [(0.01, 0.01), (0.05, 0.01), (0.5, 0.02)] {
            let estimate = calculate_kelly_fraction(p, w, l);
            for vol in [0.005, 0.05, 0.2, 1.0] {
                let fraction = sizer.risk_adjust(&estimate, vol);
                assert!(fraction >= 0.0);
                // cap 0.25 then the 0.5 fractional multiplier
                assert!(fraction <= 0.125 + 1e-12);
            }
        }
    }
    let losing = calculate_kelly_fraction(0.3, 0.01, 0.01);
    assert_eq!(sizer.risk_adjust(&losing, 0.01), 0.0);
}

#[test]
fn test_allocation_normalizes_and_caps() {
    let sizer = sizer_with(InMemoryPriceSource::new());
    let analyses = vec![
        analysis("AAA", 0.30, RiskLevel::Low),
        analysis("BBB", 0.30, RiskLevel::Low),
        analysis("CCC", 0.30, RiskLevel::High),
        analysis("DDD", 0.005, RiskLevel::Low),
    ];
    let allocation = sizer.allocate(&analyses, Decimal::from(100_000));

    assert!((allocation.normalization_factor - 0.8 / 0.9).abs() < 1e-12);
    assert_eq!(allocation.positions.len(), 3);
    assert_eq!(allocation.excluded.len(), 1);
    assert_eq!(allocation.excluded[0].0, "DDD");

    let aaa = &allocation.positions[0];
    assert!((aaa.final_fraction - 0.15).abs() < 1e-12);
    assert_eq!(aaa.position_size_usd, Decimal::from(15_000));

    let ccc = &allocation.positions[2];
    assert!((ccc.final_fraction - 0.105).abs() < 1e-12);
    assert!(ccc.adjustments.iter().any(|a| a.contains("high risk")));

    assert!((allocation.total_allocated_fraction - 0.405).abs() < 1e-12);
    assert!((allocation.cash_fraction - 0.595).abs() < 1e-12);
}

#[test]
fn test_allocation_penalizes_wide_interval() {
    let sizer = sizer_with(InMemoryPriceSource::new());
    let mut wide = analysis("AAA", 0.10, RiskLevel::Low);
    wide.confidence_interval = (0.2, 0.9);
    let allocation = sizer.allocate(&[wide], Decimal::from(10_000));
    assert!((allocation.positions[0].final_fraction - 0.08).abs() < 1e-12);
    assert_eq!(allocation.normalization_factor, 1.0);
}

#[tokio::test]
async fn test_optimize_portfolio_kelly() {
    let prices = InMemoryPriceSource::new();
    prices.insert_closes("AAPL", &closes(&trending_cycle(), 400));
    prices.insert_closes("FLAT", &closes(&losing_cycle(), 400));
    let sizer = sizer_with(prices);

    let symbols = vec!["AAPL".to_string(), "FLAT".to_string(), "GONE".to_string()];
    let allocation = sizer
        .optimize_portfolio_kelly(&symbols, Decimal::from(100_000))
        .await;

    assert_eq!(allocation.positions.len(), 1);
    let aapl = &allocation.positions[0];
    assert_eq!(aapl.symbol, "AAPL");
    assert!((aapl.adjusted_fraction - 0.0625).abs() < 1e-9);
    assert_eq!(aapl.risk_level, RiskLevel::Low);

    let excluded: Vec<&str> = allocation.excluded.iter().map(|(s, _)| s.as_str()).collect();
    assert!(excluded.contains(&"FLAT"));
    assert!(excluded.contains(&"GONE"));
    let gone = allocation.excluded.iter().find(|(s, _)| s == "GONE").unwrap();
    assert!(gone.1.starts_with("analysis failed"));
}

#[tokio::test]
async fn test_analysis_is_cached() {
    let prices = Arc::new(InMemoryPriceSource::new());
    prices.insert_closes("AAPL", &closes(&trending_cycle(), 400));
    let sizer = KellySizer::new(
        KellyConfig::default(),
        &CacheConfig::default(),
        prices.clone(),
        Arc::new(NoPredictions),
    );

    let first = sizer.analyze_symbol_kelly("AAPL", false).await.unwrap();
    // Replacing the series does not change the cached result
    prices.insert_closes("AAPL", &closes(&losing_cycle(), 400));
    let second = sizer.analyze_symbol_kelly("AAPL", false).await.unwrap();
    assert_eq!(first.analyzed_at, second.analyzed_at);
    assert_eq!(first.adjusted_fraction, second.adjusted_fraction);
}
