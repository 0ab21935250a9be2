//! Historical daily bars
//!
//! The analytic components only see [`PriceHistorySource`]. Fetches go
//! through [`fetch_bars`], which applies the per-call timeout and cleans the
//! series (sorted by date, non-positive closes dropped).

use crate::error::DataError;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// One daily OHLCV bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

impl PriceBar {
    /// Bar with all prices equal to `close`
    pub fn from_close(date: NaiveDate, close: f64) -> Self {
        Self {
            date,
            open: close,
            high: close,
            low: close,
            close,
            volume: 0.0,
        }
    }
}

/// Source of historical daily bars
#[async_trait]
pub trait PriceHistorySource: Send + Sync {
    /// Bars for `symbol` with `start <= date <= end`, in any order
    async fn daily_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, DataError>;
}

/// Fetch the last `days` calendar days of bars with a timeout
pub async fn fetch_bars(
    source: &dyn PriceHistorySource,
    symbol: &str,
    days: i64,
    timeout_secs: u64,
) -> Result<Vec<PriceBar>, DataError> {
    let end = Utc::now().date_naive();
    let start = end - Duration::days(days);

    let fetch = source.daily_bars(symbol, start, end);
    let mut bars = tokio::time::timeout(std::time::Duration::from_secs(timeout_secs), fetch)
        .await
        .map_err(|_| DataError::Timeout(timeout_secs))??;

    bars.retain(|b| b.close.is_finite() && b.close > 0.0);
    bars.sort_by_key(|b| b.date);
    bars.dedup_by_key(|b| b.date);

    tracing::trace!(symbol, bars = bars.len(), "Fetched price history");
    Ok(bars)
}

/// Close-to-close daily returns
pub fn daily_returns(bars: &[PriceBar]) -> Vec<f64> {
    bars.windows(2)
        .map(|w| w[1].close / w[0].close - 1.0)
        .collect()
}

/// Daily returns of two date-sorted series over the dates both contain
///
/// Bars on dates missing from either side are skipped, so each pair of
/// returns covers the same two dates.
pub fn aligned_returns(a: &[PriceBar], b: &[PriceBar]) -> (Vec<f64>, Vec<f64>) {
    let mut common_a = Vec::new();
    let mut common_b = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].date.cmp(&b[j].date) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                common_a.push(a[i].clone());
                common_b.push(b[j].clone());
                i += 1;
                j += 1;
            }
        }
    }
    (daily_returns(&common_a), daily_returns(&common_b))
}

/// Forward returns over `horizon` bars: `close[i + h] / close[i] - 1`
pub fn horizon_returns(bars: &[PriceBar], horizon: usize) -> Vec<f64> {
    if horizon == 0 || bars.len() <= horizon {
        return Vec::new();
    }
    (0..bars.len() - horizon)
        .map(|i| bars[i + horizon].close / bars[i].close - 1.0)
        .collect()
}

/// In-memory bar store
#[derive(Default)]
pub struct InMemoryPriceSource {
    series: RwLock<HashMap<String, Vec<PriceBar>>>,
}

impl InMemoryPriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, symbol: &str, bars: Vec<PriceBar>) {
        self.series.write().insert(symbol.to_string(), bars);
    }

    /// Store consecutive daily closes ending today
    pub fn insert_closes(&self, symbol: &str, closes: &[f64]) {
        let today = Utc::now().date_naive();
        let n = closes.len() as i64;
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, close)| PriceBar::from_close(today - Duration::days(n - 1 - i as i64), *close))
            .collect();
        self.insert(symbol, bars);
    }
}

#[async_trait]
impl PriceHistorySource for InMemoryPriceSource {
    async fn daily_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, DataError> {
        let series = self.series.read();
        let bars = series
            .get(symbol)
            .ok_or_else(|| DataError::NotFound(symbol.to_string()))?;
        Ok(bars
            .iter()
            .filter(|b| b.date >= start && b.date <= end)
            .cloned()
            .collect())
    }
}

/// Reads `<dir>/<SYMBOL>.json`, a JSON array of bars
pub struct JsonFilePriceSource {
    dir: PathBuf,
}

impl JsonFilePriceSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{}.json", symbol.to_uppercase()))
    }
}

#[async_trait]
impl PriceHistorySource for JsonFilePriceSource {
    async fn daily_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, DataError> {
        let path = self.path_for(symbol);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DataError::NotFound(symbol.to_string()))
            }
            Err(e) => return Err(DataError::Transport(format!("{}: {}", path.display(), e))),
        };
        let bars: Vec<PriceBar> = serde_json::from_slice(&raw)
            .map_err(|e| DataError::Parse(format!("{}: {}", path.display(), e)))?;
        Ok(bars
            .into_iter()
            .filter(|b| b.date >= start && b.date <= end)
            .collect())
    }
}
