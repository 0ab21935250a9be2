//! Kelly Criterion Position Sizing
//!
//! Implements the classic Kelly Criterion for optimal position sizing:
//! f* = (b * p - q) / b, with b = avg_win / avg_loss and q = 1 - p
//!
//! Win probability and average win/loss come from a year of daily returns,
//! optionally nudged by an ML direction prediction. The raw fraction is then
//! discounted in order:
//! 1. hard cap at `max_kelly_fraction`
//! 2. fractional Kelly (`conservative_multiplier`)
//! 3. halved again when the edge is below `min_edge_threshold`
//! 4. scaled by `volatility_ceiling / volatility` when daily volatility exceeds it
//!
//! Volatility and the risk-adjusted return are per-day and un-annualized.

use super::stats;
use crate::cache::AnalysisCache;
use crate::config::{CacheConfig, KellyConfig};
use crate::error::AnalysisError;
use crate::market_data::{self, PriceHistorySource};
use crate::models::{to_f64, usd, Recommendation, RiskLevel};
use crate::predictions::{self, MlPrediction, PredictionService};
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// z-score of the 95% win-probability confidence interval
const CI_Z: f64 = 1.96;
/// Win probability bounds after an ML nudge
const MIN_WIN_PROBABILITY: f64 = 0.05;
const MAX_WIN_PROBABILITY: f64 = 0.95;
/// Horizon passed to the prediction service
const PREDICTION_HORIZON_DAYS: usize = 1;
/// Confidence-interval width above which portfolio sizing is penalized
const WIDE_INTERVAL: f64 = 0.3;

/// Output of the raw Kelly formula
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KellyEstimate {
    /// Raw Kelly fraction (may be negative when there is no edge)
    pub kelly_fraction: f64,
    pub win_probability: f64,
    /// avg_win / avg_loss
    pub win_loss_ratio: f64,
    /// p * avg_win - q * avg_loss
    pub edge: f64,
    pub variance: f64,
    /// edge / sqrt(variance)
    pub risk_adjusted_return: f64,
    /// Set when the inputs were invalid; the fraction is then 0.0
    pub error: Option<String>,
}

impl KellyEstimate {
    fn invalid(reason: String) -> Self {
        Self {
            kelly_fraction: 0.0,
            win_probability: 0.0,
            win_loss_ratio: 0.0,
            edge: 0.0,
            variance: 0.0,
            risk_adjusted_return: 0.0,
            error: Some(reason),
        }
    }
}

/// Classic Kelly fraction
///
/// Invalid inputs (p outside (0, 1), non-positive magnitudes) yield a zero
/// fraction with `error` set; callers treat that as no edge.
pub fn calculate_kelly_fraction(win_probability: f64, avg_win: f64, avg_loss: f64) -> KellyEstimate {
    if !(win_probability > 0.0 && win_probability < 1.0) {
        return KellyEstimate::invalid(format!(
            "win probability {} outside (0, 1)",
            win_probability
        ));
    }
    if !(avg_win > 0.0) || !(avg_loss > 0.0) {
        return KellyEstimate::invalid(format!(
            "average win {} and loss {} must be positive",
            avg_win, avg_loss
        ));
    }

    let p = win_probability;
    let q = 1.0 - p;
    let b = avg_win / avg_loss;
    let kelly_fraction = (b * p - q) / b;

    let edge = p * avg_win - q * avg_loss;
    let variance = (p * avg_win.powi(2) + q * avg_loss.powi(2) - edge.powi(2)).max(0.0);
    let risk_adjusted_return = if variance > 0.0 {
        edge / variance.sqrt()
    } else {
        0.0
    };

    KellyEstimate {
        kelly_fraction,
        win_probability: p,
        win_loss_ratio: b,
        edge,
        variance,
        risk_adjusted_return,
        error: None,
    }
}

/// Per-symbol Kelly analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KellyAnalysis {
    pub symbol: String,
    pub win_probability: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    /// Expected daily return (the Kelly edge)
    pub expected_value: f64,
    /// Raw Kelly fraction
    pub kelly_fraction: f64,
    /// Fraction after cap, fractional Kelly, edge and volatility discounts
    pub adjusted_fraction: f64,
    /// 95% interval on the win probability
    pub confidence_interval: (f64, f64),
    pub recommendation: Recommendation,
    pub risk_level: RiskLevel,
    /// Daily return standard deviation
    pub volatility: f64,
    pub risk_adjusted_return: f64,
    pub sample_size: usize,
    pub ml_adjusted: bool,
    pub last_price: Option<f64>,
    pub analyzed_at: DateTime<Utc>,
    /// Reason the analysis fell back to neutral values
    pub error: Option<String>,
}

impl KellyAnalysis {
    /// Neutral analysis used when a symbol could not be analyzed
    pub fn fallback(symbol: &str, reason: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            win_probability: 0.5,
            avg_win: 0.0,
            avg_loss: 0.0,
            expected_value: 0.0,
            kelly_fraction: 0.0,
            adjusted_fraction: 0.0,
            confidence_interval: (0.0, 1.0),
            recommendation: Recommendation::Hold,
            risk_level: RiskLevel::Medium,
            volatility: 0.0,
            risk_adjusted_return: 0.0,
            sample_size: 0,
            ml_adjusted: false,
            last_price: None,
            analyzed_at: Utc::now(),
            error: Some(reason.to_string()),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.error.is_some()
    }

    pub fn interval_width(&self) -> f64 {
        self.confidence_interval.1 - self.confidence_interval.0
    }
}

/// Sizing for one symbol within a multi-symbol allocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSizeResult {
    pub symbol: String,
    pub kelly_fraction: f64,
    pub adjusted_fraction: f64,
    /// Fraction of capital after normalization, caps and penalties
    pub final_fraction: f64,
    pub position_size_usd: Decimal,
    pub risk_level: RiskLevel,
    pub recommendation: Recommendation,
    /// Discounts applied, in order
    pub adjustments: Vec<String>,
}

/// Multi-symbol Kelly allocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioAllocation {
    pub total_capital: Decimal,
    pub positions: Vec<PositionSizeResult>,
    /// Symbols left out, with the reason
    pub excluded: Vec<(String, String)>,
    /// `min(1, exposure_ceiling / sum of surviving fractions)`
    pub normalization_factor: f64,
    pub total_allocated_fraction: f64,
    pub cash_fraction: f64,
}

/// Kelly position sizer
pub struct KellySizer {
    config: KellyConfig,
    prices: Arc<dyn PriceHistorySource>,
    predictions: Arc<dyn PredictionService>,
    cache: AnalysisCache<KellyAnalysis>,
    fetch_timeout_secs: u64,
    max_concurrency: usize,
}

impl KellySizer {
    pub fn new(
        config: KellyConfig,
        cache_config: &CacheConfig,
        prices: Arc<dyn PriceHistorySource>,
        predictions: Arc<dyn PredictionService>,
    ) -> Self {
        Self {
            config,
            prices,
            predictions,
            cache: AnalysisCache::new(cache_config.capacity, cache_config.ttl_seconds),
            fetch_timeout_secs: 30,
            max_concurrency: 5,
        }
    }

    /// Override fetch timeout and batch concurrency
    pub fn with_limits(mut self, fetch_timeout_secs: u64, max_concurrency: usize) -> Self {
        self.fetch_timeout_secs = fetch_timeout_secs;
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn config(&self) -> &KellyConfig {
        &self.config
    }

    /// Kelly analysis from a year of daily returns
    pub async fn analyze_symbol_kelly(
        &self,
        symbol: &str,
        use_ml: bool,
    ) -> Result<KellyAnalysis, AnalysisError> {
        let cache_key = format!("{}:{}", symbol, if use_ml { "ml" } else { "plain" });
        if let Some(cached) = self.cache.get(&cache_key) {
            return Ok(cached);
        }

        let bars = market_data::fetch_bars(
            self.prices.as_ref(),
            symbol,
            self.config.history_days,
            self.fetch_timeout_secs,
        )
        .await
        .map_err(|source| AnalysisError::DataUnavailable {
            symbol: symbol.to_string(),
            source,
        })?;

        let returns = market_data::daily_returns(&bars);
        let last_price = bars.last().map(|b| b.close);

        let prediction = if use_ml {
            predictions::best_effort(self.predictions.as_ref(), symbol, PREDICTION_HORIZON_DAYS).await
        } else {
            None
        };

        let analysis = self.analyze_returns(symbol, &returns, last_price, prediction.as_ref())?;

        tracing::info!(
            symbol,
            win_probability = analysis.win_probability,
            kelly_fraction = analysis.kelly_fraction,
            adjusted_fraction = analysis.adjusted_fraction,
            recommendation = %analysis.recommendation,
            "Kelly analysis complete"
        );

        self.cache.insert(cache_key, analysis.clone());
        Ok(analysis)
    }

    /// Kelly analysis of a daily return series
    pub fn analyze_returns(
        &self,
        symbol: &str,
        returns: &[f64],
        last_price: Option<f64>,
        prediction: Option<&MlPrediction>,
    ) -> Result<KellyAnalysis, AnalysisError> {
        let wins: Vec<f64> = returns.iter().copied().filter(|r| *r > 0.0).collect();
        let losses: Vec<f64> = returns
            .iter()
            .copied()
            .filter(|r| *r < 0.0)
            .map(f64::abs)
            .collect();

        // Report the side that falls short
        if wins.len() < self.config.min_winning_days {
            return Err(AnalysisError::insufficient(
                symbol,
                self.config.min_winning_days,
                wins.len(),
            ));
        }
        if losses.len() < self.config.min_losing_days {
            return Err(AnalysisError::insufficient(
                symbol,
                self.config.min_losing_days,
                losses.len(),
            ));
        }

        let mut win_probability = wins.len() as f64 / returns.len() as f64;
        let avg_win = stats::mean(&wins);
        let avg_loss = stats::mean(&losses);

        let mut ml_adjusted = false;
        if let Some(direction) =
            prediction.and_then(|p| p.confident_direction(self.config.ml_confidence_threshold))
        {
            let nudge = ((direction.confidence - 0.5) * 0.2).min(self.config.max_ml_adjustment);
            let signed = if direction.value >= 0.5 { nudge } else { -nudge };
            win_probability = (win_probability + signed).clamp(MIN_WIN_PROBABILITY, MAX_WIN_PROBABILITY);
            ml_adjusted = true;
            tracing::debug!(symbol, nudge = signed, win_probability, "Win probability nudged by ML");
        }

        let estimate = calculate_kelly_fraction(win_probability, avg_win, avg_loss);
        let volatility = stats::std_dev(returns);
        let adjusted_fraction = self.risk_adjust(&estimate, volatility);

        let half_width = CI_Z * (win_probability * (1.0 - win_probability) / returns.len() as f64).sqrt();
        let confidence_interval = (
            (win_probability - half_width).max(0.0),
            (win_probability + half_width).min(1.0),
        );

        Ok(KellyAnalysis {
            symbol: symbol.to_string(),
            win_probability,
            avg_win,
            avg_loss,
            expected_value: estimate.edge,
            kelly_fraction: estimate.kelly_fraction,
            adjusted_fraction,
            confidence_interval,
            recommendation: recommend(adjusted_fraction, win_probability, estimate.risk_adjusted_return),
            risk_level: risk_level(volatility, win_probability, estimate.edge),
            volatility,
            risk_adjusted_return: estimate.risk_adjusted_return,
            sample_size: returns.len(),
            ml_adjusted,
            last_price,
            analyzed_at: Utc::now(),
            error: None,
        })
    }

    /// Apply the four sequential discounts; never negative
    pub fn risk_adjust(&self, estimate: &KellyEstimate, volatility: f64) -> f64 {
        let mut fraction = estimate.kelly_fraction.min(self.config.max_kelly_fraction);
        fraction *= self.config.conservative_multiplier;
        if estimate.edge < self.config.min_edge_threshold {
            fraction *= 0.5;
        }
        if volatility > self.config.volatility_ceiling {
            fraction *= self.config.volatility_ceiling / volatility;
        }
        fraction.max(0.0)
    }

    /// Dollar position size for one analysis
    pub fn position_size(&self, analysis: &KellyAnalysis, capital: Decimal) -> Decimal {
        usd(to_f64(capital) * analysis.adjusted_fraction)
    }

    /// Kelly allocation across several symbols
    ///
    /// Failed analyses are listed under `excluded`.
    pub async fn optimize_portfolio_kelly(
        &self,
        symbols: &[String],
        total_capital: Decimal,
    ) -> PortfolioAllocation {
        let results: Vec<(String, Result<KellyAnalysis, AnalysisError>)> = stream::iter(symbols.iter().cloned())
            .map(|symbol| async move {
                let result = self.analyze_symbol_kelly(&symbol, true).await;
                (symbol, result)
            })
            .buffered(self.max_concurrency)
            .collect()
            .await;

        let mut analyses = Vec::with_capacity(results.len());
        let mut failed = Vec::new();
        for (symbol, result) in results {
            match result {
                Ok(analysis) => analyses.push(analysis),
                Err(e) => {
                    tracing::warn!(symbol = %symbol, error = %e, "Kelly analysis failed, excluding symbol");
                    failed.push((symbol, format!("analysis failed: {}", e)));
                }
            }
        }

        let mut allocation = self.allocate(&analyses, total_capital);
        allocation.excluded.extend(failed);
        allocation
    }

    /// Normalize, cap and discount a set of analyses into an allocation
    pub fn allocate(&self, analyses: &[KellyAnalysis], total_capital: Decimal) -> PortfolioAllocation {
        let mut excluded = Vec::new();
        let survivors: Vec<&KellyAnalysis> = analyses
            .iter()
            .filter(|a| {
                if a.expected_value > 0.0 && a.adjusted_fraction > 0.01 {
                    true
                } else {
                    excluded.push((
                        a.symbol.clone(),
                        format!(
                            "no edge: expected value {:.4}, fraction {:.4}",
                            a.expected_value, a.adjusted_fraction
                        ),
                    ));
                    false
                }
            })
            .collect();

        let total_kelly: f64 = survivors.iter().map(|a| a.adjusted_fraction).sum();
        let normalization_factor = if total_kelly > 0.0 {
            (self.config.portfolio_exposure_ceiling / total_kelly).min(1.0)
        } else {
            1.0
        };

        let capital = to_f64(total_capital);
        let positions: Vec<PositionSizeResult> = survivors
            .into_iter()
            .map(|a| {
                let mut adjustments = Vec::new();
                let mut fraction = a.adjusted_fraction * normalization_factor;
                if normalization_factor < 1.0 {
                    adjustments.push(format!("normalized x{:.3}", normalization_factor));
                }
                if fraction > self.config.max_single_position {
                    fraction = self.config.max_single_position;
                    adjustments.push(format!(
                        "capped at {:.0}% of capital",
                        self.config.max_single_position * 100.0
                    ));
                }
                match a.risk_level {
                    RiskLevel::High => {
                        fraction *= 0.7;
                        adjustments.push("high risk x0.7".to_string());
                    }
                    RiskLevel::Extreme => {
                        fraction *= 0.3;
                        adjustments.push("extreme risk x0.3".to_string());
                    }
                    RiskLevel::Low | RiskLevel::Medium => {}
                }
                if a.interval_width() > WIDE_INTERVAL {
                    fraction *= 0.8;
                    adjustments.push("wide confidence interval x0.8".to_string());
                }

                PositionSizeResult {
                    symbol: a.symbol.clone(),
                    kelly_fraction: a.kelly_fraction,
                    adjusted_fraction: a.adjusted_fraction,
                    final_fraction: fraction,
                    position_size_usd: usd(capital * fraction),
                    risk_level: a.risk_level,
                    recommendation: a.recommendation,
                    adjustments,
                }
            })
            .collect();

        let total_allocated_fraction: f64 = positions.iter().map(|p| p.final_fraction).sum();

        PortfolioAllocation {
            total_capital,
            positions,
            excluded,
            normalization_factor,
            total_allocated_fraction,
            cash_fraction: (1.0 - total_allocated_fraction).max(0.0),
        }
    }
}

/// Recommendation from the risk-adjusted fraction
pub fn recommend(adjusted_fraction: f64, win_probability: f64, risk_adjusted_return: f64) -> Recommendation {
    if adjusted_fraction <= 0.0 {
        Recommendation::Avoid
    } else if adjusted_fraction < 0.02 {
        Recommendation::Hold
    } else if adjusted_fraction < 0.05 {
        if win_probability > 0.55 {
            Recommendation::Buy
        } else {
            Recommendation::Hold
        }
    } else if adjusted_fraction < 0.15 {
        Recommendation::Buy
    } else if risk_adjusted_return > 0.5 {
        Recommendation::StrongBuy
    } else {
        Recommendation::Buy
    }
}

/// Risk tier from daily volatility, win probability and expected return
///
/// Tested worst tier first.
pub fn risk_level(volatility: f64, win_probability: f64, expected_return: f64) -> RiskLevel {
    if volatility > 0.06 || win_probability < 0.40 {
        RiskLevel::Extreme
    } else if volatility > 0.04 || win_probability < 0.45 || expected_return < 0.0 {
        RiskLevel::High
    } else if volatility > 0.025 || win_probability < 0.50 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}
