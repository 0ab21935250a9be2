//! Unit tests for the scenario engine and opportunity ranking

use sizing_operator::config::{CacheConfig, ExpectedValueConfig};
use sizing_operator::engine::expected_value::{rank_analyses, tier_boundaries};
use sizing_operator::engine::stats;
use sizing_operator::engine::{EvAnalysis, ExpectedValueCalculator, OpportunityTier, ScenarioKind};
use sizing_operator::error::AnalysisError;
use sizing_operator::market_data::{self, InMemoryPriceSource, PriceBar};
use sizing_operator::models::{Recommendation, RiskLevel};
use sizing_operator::predictions::NoPredictions;
use chrono::{Duration, Utc};
use std::sync::Arc;

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

fn calculator(prices: InMemoryPriceSource) -> ExpectedValueCalculator {
    ExpectedValueCalculator::new(
        ExpectedValueConfig::default(),
        &CacheConfig::default(),
        Arc::new(prices),
        Arc::new(NoPredictions),
    )
}

fn ranked_fixture(symbol: &str, score: f64) -> EvAnalysis {
    let mut a = EvAnalysis::neutral(symbol, 30, "fixture");
    a.error = None;
    a.expected_value = 0.02;
    a.opportunity_score = score;
    a.risk_level = RiskLevel::Low;
    a.recommendation = Recommendation::Buy;
    a
}

#[tokio::test]
async fn test_sideways_scenario_is_median_horizon_return() {
    let prices = InMemoryPriceSource::new();
    let closes = wavy_closes(600);
    prices.insert_closes("AAPL", &closes);
    let calc = calculator(prices);

    let analysis = calc.calculate_expected_value("AAPL", 30, false).await.unwrap();

    // Rebuild the series the calculator sees: the last 730 calendar days
    let today = Utc::now().date_naive();
    let n = closes.len() as i64;
    let bars: Vec<PriceBar> = closes
        .iter()
        .enumerate()
        .map(|(i, c)| PriceBar::from_close(today - Duration::days(n - 1 - i as i64), *c))
        .collect();
    let horizon = market_data::horizon_returns(&bars, 30);
    let median = stats::median(&horizon).unwrap();

    let sideways = analysis.scenario(ScenarioKind::Sideways).unwrap();
    assert!((sideways.return_outcome - median).abs() < 1e-12);
    assert_eq!(analysis.sample_size, horizon.len());

    let total: f64 = analysis.scenarios.iter().map(|s| s.probability).sum();
    assert!((total - 1.0).abs() < 1e-12);
    let weighted: f64 = analysis
        .scenarios
        .iter()
        .map(|s| s.probability * s.return_outcome)
        .sum();
    assert!((analysis.expected_value - weighted).abs() < 1e-12);
    assert!(analysis.expected_value > 0.0);
    assert!(analysis.var_95 <= analysis.scenarios[0].return_outcome + 1e-12);
    assert!(analysis.confidence >= 0.05 && analysis.confidence <= 0.95);
}

#[tokio::test]
async fn test_horizon_longer_than_history_fails() {
    let prices = InMemoryPriceSource::new();
    prices.insert_closes("AAPL", &wavy_closes(150));
    let calc = calculator(prices);

    let err = calc.calculate_expected_value("AAPL", 200, false).await.unwrap_err();
    assert!(matches!(err, AnalysisError::InsufficientData { .. }));

    let neutral = calc.analyze("AAPL", 200, false).await;
    assert!(neutral.is_fallback());
    assert_eq!(neutral.recommendation, Recommendation::Hold);
    assert_eq!(neutral.expected_value, 0.0);
    assert_eq!(neutral.scenarios.len(), ScenarioKind::ALL.len());
    let prior_sum: f64 = neutral.scenarios.iter().map(|s| s.probability).sum();
    assert!((prior_sum - 1.0).abs() < 1e-12);
    assert!(neutral.scenarios.iter().all(|s| s.return_outcome == 0.0));
    let sideways = neutral.scenario(ScenarioKind::Sideways).unwrap();
    assert_eq!(sideways.percentile, 50.0);

    let err = calc.calculate_expected_value("AAPL", 0, false).await.unwrap_err();
    assert!(matches!(err, AnalysisError::InvalidInput(_)));
}

#[test]
fn test_rank_tiers_by_list_size() {
    let expected: [(usize, &[OpportunityTier]); 4] = [
        (1, &[OpportunityTier::Premium]),
        (
            4,
            &[
                OpportunityTier::Premium,
                OpportunityTier::Good,
                OpportunityTier::Average,
                OpportunityTier::Average,
            ],
        ),
        (
            5,
            &[
                OpportunityTier::Premium,
                OpportunityTier::Good,
                OpportunityTier::Good,
                OpportunityTier::Average,
                OpportunityTier::Poor,
            ],
        ),
        (
            10,
            &[
                OpportunityTier::Premium,
                OpportunityTier::Premium,
                OpportunityTier::Good,
                OpportunityTier::Good,
                OpportunityTier::Good,
                OpportunityTier::Average,
                OpportunityTier::Average,
                OpportunityTier::Average,
                OpportunityTier::Poor,
                OpportunityTier::Poor,
            ],
        ),
    ];

    for (n, tiers) in expected {
        let analyses: Vec<EvAnalysis> = (0..n)
            .map(|i| ranked_fixture(&format!("S{:02}", i), 90.0 - i as f64))
            .collect();
        let ranked = rank_analyses(&analyses, RiskLevel::Extreme, 0.0);
        let got: Vec<OpportunityTier> = ranked.iter().map(|r| r.tier).collect();
        assert_eq!(got, tiers.to_vec(), "n = {}", n);
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[0].symbol, "S00");
    }
    assert_eq!(tier_boundaries(0), (0, 0, 0));
}

#[test]
fn test_rank_filters_before_tiering() {
    let mut risky = ranked_fixture("RISKY", 99.0);
    risky.risk_level = RiskLevel::Extreme;
    let mut weak = ranked_fixture("WEAK", 98.0);
    weak.expected_value = -0.01;
    let failed = EvAnalysis::neutral("GONE", 30, "no data");
    let analyses = vec![risky, weak, failed, ranked_fixture("B", 50.0), ranked_fixture("A", 50.0)];

    let ranked = rank_analyses(&analyses, RiskLevel::High, 0.0);
    let symbols: Vec<&str> = ranked.iter().map(|r| r.symbol.as_str()).collect();
    // Ties break by symbol
    assert_eq!(symbols, vec!["A", "B"]);
    assert_eq!(ranked[1].tier, OpportunityTier::Average);
}

#[tokio::test]
async fn test_rank_opportunities_skips_unknown_symbols() {
    let prices = InMemoryPriceSource::new();
    prices.insert_closes("AAPL", &wavy_closes(600));
    let calc = calculator(prices);

    let symbols = vec!["AAPL".to_string(), "GONE".to_string()];
    let ranked = calc.rank_opportunities(&symbols, RiskLevel::Extreme, -1.0).await;
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].symbol, "AAPL");
    assert_eq!(ranked[0].tier, OpportunityTier::Premium);
}
