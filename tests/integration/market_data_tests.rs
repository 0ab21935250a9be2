//! File-backed price history tests

use chrono::{Duration, Utc};
use sizing_operator::error::DataError;
use sizing_operator::market_data::{self, JsonFilePriceSource, PriceBar};
use tempfile::TempDir;

fn write_bars(dir: &TempDir, symbol: &str, bars: &[PriceBar]) {
    let path = dir.path().join(format!("{}.json", symbol));
    std::fs::write(path, serde_json::to_vec(bars).unwrap()).unwrap();
}

#[tokio::test]
async fn test_json_file_source_filters_and_sorts() {
    let dir = TempDir::new().unwrap();
    let today = Utc::now().date_naive();
    let bars = vec![
        PriceBar::from_close(today, 103.0),
        PriceBar::from_close(today - Duration::days(2), 101.0),
        PriceBar::from_close(today - Duration::days(1), 0.0),
        PriceBar::from_close(today - Duration::days(400), 90.0),
        PriceBar::from_close(today - Duration::days(3), 100.0),
    ];
    write_bars(&dir, "AAPL", &bars);

    let source = JsonFilePriceSource::new(dir.path());
    // Lowercase symbols map to the uppercase file
    let fetched = market_data::fetch_bars(&source, "aapl", 30, 5).await.unwrap();

    let closes: Vec<f64> = fetched.iter().map(|b| b.close).collect();
    assert_eq!(closes, vec![100.0, 101.0, 103.0]);
    let returns = market_data::daily_returns(&fetched);
    assert!((returns[0] - 0.01).abs() < 1e-12);
}

#[tokio::test]
async fn test_json_file_source_errors() {
    let dir = TempDir::new().unwrap();
    let source = JsonFilePriceSource::new(dir.path());

    let err = market_data::fetch_bars(&source, "MSFT", 30, 5).await.unwrap_err();
    assert_eq!(err, DataError::NotFound("MSFT".to_string()));

    std::fs::write(dir.path().join("BAD.json"), b"{not json").unwrap();
    let err = market_data::fetch_bars(&source, "BAD", 30, 5).await.unwrap_err();
    assert!(matches!(err, DataError::Parse(_)));
}

#[test]
fn test_bar_volume_defaults_to_zero() {
    let raw = r#"[{"date":"2024-03-01","open":1.0,"high":2.0,"low":0.5,"close":1.5}]"#;
    let bars: Vec<PriceBar> = serde_json::from_str(raw).unwrap();
    assert_eq!(bars[0].volume, 0.0);
}
