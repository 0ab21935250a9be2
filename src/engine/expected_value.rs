//! Expected-value scenario engine
//!
//! Five market scenarios are drawn from the empirical distribution of
//! `time_horizon_days`-period forward returns over two years of closes:
//!
//! | Scenario    | Prior | Percentile |
//! |-------------|-------|------------|
//! | bear_market | 0.05  | 5th        |
//! | normal_down | 0.15  | 25th       |
//! | sideways    | 0.60  | 50th       |
//! | normal_up   | 0.15  | 75th       |
//! | bull_market | 0.05  | 95th       |
//!
//! Priors and percentiles are configuration defaults. All ratios are
//! per-horizon and un-annualized; the risk-free rate is the annual rate scaled
//! by `horizon / trading_days_per_year`. VaR and CVaR come from the scenario
//! distribution, not the raw return history.

use super::stats;
use crate::cache::AnalysisCache;
use crate::config::{CacheConfig, ExpectedValueConfig};
use crate::error::AnalysisError;
use crate::market_data::{self, PriceHistorySource};
use crate::models::{Recommendation, RiskLevel};
use crate::predictions::{self, MlPrediction, PredictionService};
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Direction probability above which a prediction counts as strongly up
const STRONG_UP: f64 = 0.6;
/// Direction probability below which a prediction counts as strongly down
const STRONG_DOWN: f64 = 0.4;
/// VaR confidence tail
const VAR_TAIL: f64 = 0.05;
const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    BearMarket,
    NormalDown,
    Sideways,
    NormalUp,
    BullMarket,
}

impl ScenarioKind {
    /// Worst to best, matching the configured prior and percentile order
    pub const ALL: [ScenarioKind; 5] = [
        ScenarioKind::BearMarket,
        ScenarioKind::NormalDown,
        ScenarioKind::Sideways,
        ScenarioKind::NormalUp,
        ScenarioKind::BullMarket,
    ];
}

impl std::fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScenarioKind::BearMarket => write!(f, "bear_market"),
            ScenarioKind::NormalDown => write!(f, "normal_down"),
            ScenarioKind::Sideways => write!(f, "sideways"),
            ScenarioKind::NormalUp => write!(f, "normal_up"),
            ScenarioKind::BullMarket => write!(f, "bull_market"),
        }
    }
}

/// One market scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub kind: ScenarioKind,
    pub probability: f64,
    /// Return over the horizon, as a fraction
    pub return_outcome: f64,
    pub percentile: f64,
}

/// Scenario-based expected value analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvAnalysis {
    pub symbol: String,
    pub time_horizon_days: usize,
    pub scenarios: Vec<Scenario>,
    pub expected_value: f64,
    pub variance: f64,
    pub volatility: f64,
    /// `EV - risk_aversion * variance`
    pub risk_adjusted_ev: f64,
    /// Probability-weighted RMS of negative outcomes
    pub downside_risk: f64,
    pub probability_of_loss: f64,
    pub max_loss: f64,
    pub max_gain: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub var_95: f64,
    pub cvar_95: f64,
    /// Dispersion of outcomes relative to EV magnitude, in [0.05, 0.95]
    pub confidence: f64,
    pub recommendation: Recommendation,
    /// 0-100
    pub ev_score: f64,
    /// 0-100
    pub risk_score: f64,
    /// `ev_score * (100 - risk_score) / 100`
    pub opportunity_score: f64,
    pub risk_level: RiskLevel,
    pub ml_adjusted: bool,
    /// Number of horizon returns the scenarios were drawn from
    pub sample_size: usize,
    pub analyzed_at: DateTime<Utc>,
    /// Reason the analysis fell back to neutral values
    pub error: Option<String>,
}

impl EvAnalysis {
    /// Neutral analysis: zero outcomes in every scenario under the default
    /// priors, hold
    pub fn neutral(symbol: &str, time_horizon_days: usize, reason: &str) -> Self {
        Self::neutral_with(&ExpectedValueConfig::default(), symbol, time_horizon_days, reason)
    }

    /// Neutral analysis with the configured priors and percentiles
    pub fn neutral_with(
        config: &ExpectedValueConfig,
        symbol: &str,
        time_horizon_days: usize,
        reason: &str,
    ) -> Self {
        let scenarios = ScenarioKind::ALL
            .iter()
            .enumerate()
            .map(|(i, kind)| Scenario {
                kind: *kind,
                probability: config.scenario_probabilities[i],
                return_outcome: 0.0,
                percentile: config.scenario_percentiles[i],
            })
            .collect();

        Self {
            symbol: symbol.to_string(),
            time_horizon_days,
            scenarios,
            expected_value: 0.0,
            variance: 0.0,
            volatility: 0.0,
            risk_adjusted_ev: 0.0,
            downside_risk: 0.0,
            probability_of_loss: 0.0,
            max_loss: 0.0,
            max_gain: 0.0,
            sharpe_ratio: 0.0,
            sortino_ratio: 0.0,
            var_95: 0.0,
            cvar_95: 0.0,
            confidence: 0.0,
            recommendation: Recommendation::Hold,
            ev_score: 0.0,
            risk_score: 50.0,
            opportunity_score: 0.0,
            risk_level: RiskLevel::Medium,
            ml_adjusted: false,
            sample_size: 0,
            analyzed_at: Utc::now(),
            error: Some(reason.to_string()),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.error.is_some()
    }

    pub fn scenario(&self, kind: ScenarioKind) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.kind == kind)
    }
}

/// Position-based tier in a ranked opportunity list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpportunityTier {
    Premium,
    Good,
    Average,
    Poor,
}

impl std::fmt::Display for OpportunityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpportunityTier::Premium => write!(f, "premium"),
            OpportunityTier::Good => write!(f, "good"),
            OpportunityTier::Average => write!(f, "average"),
            OpportunityTier::Poor => write!(f, "poor"),
        }
    }
}

/// Cumulative tier boundaries for `n` ranked entries:
/// `(ceil(0.2n), ceil(0.5n), ceil(0.8n))`
pub fn tier_boundaries(n: usize) -> (usize, usize, usize) {
    ((2 * n + 9) / 10, (5 * n + 9) / 10, (8 * n + 9) / 10)
}

/// Tier for the zero-based `index` in a list of `n`
pub fn tier_for(index: usize, n: usize) -> OpportunityTier {
    let (premium, good, average) = tier_boundaries(n);
    if index < premium {
        OpportunityTier::Premium
    } else if index < good {
        OpportunityTier::Good
    } else if index < average {
        OpportunityTier::Average
    } else {
        OpportunityTier::Poor
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedOpportunity {
    /// 1-based
    pub rank: usize,
    pub tier: OpportunityTier,
    pub symbol: String,
    pub opportunity_score: f64,
    pub ev_score: f64,
    pub risk_score: f64,
    pub expected_value: f64,
    pub confidence: f64,
    pub risk_level: RiskLevel,
    pub recommendation: Recommendation,
}

/// Scenario-based expected value calculator
pub struct ExpectedValueCalculator {
    config: ExpectedValueConfig,
    prices: Arc<dyn PriceHistorySource>,
    predictions: Arc<dyn PredictionService>,
    cache: AnalysisCache<EvAnalysis>,
    fetch_timeout_secs: u64,
    max_concurrency: usize,
}

impl ExpectedValueCalculator {
    pub fn new(
        config: ExpectedValueConfig,
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

    pub fn config(&self) -> &ExpectedValueConfig {
        &self.config
    }

    /// Scenario analysis over two years of daily closes
    pub async fn calculate_expected_value(
        &self,
        symbol: &str,
        time_horizon_days: usize,
        use_ml: bool,
    ) -> Result<EvAnalysis, AnalysisError> {
        if time_horizon_days == 0 {
            return Err(AnalysisError::InvalidInput(
                "time horizon must be at least one day".to_string(),
            ));
        }

        let cache_key = format!(
            "{}:{}d:{}",
            symbol,
            time_horizon_days,
            if use_ml { "ml" } else { "plain" }
        );
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

        if bars.len() < self.config.min_history_bars || bars.len() <= time_horizon_days {
            return Err(AnalysisError::insufficient(
                symbol,
                self.config.min_history_bars.max(time_horizon_days + 1),
                bars.len(),
            ));
        }

        let returns = market_data::horizon_returns(&bars, time_horizon_days);
        let prediction = if use_ml {
            predictions::best_effort(self.predictions.as_ref(), symbol, time_horizon_days).await
        } else {
            None
        };

        let analysis =
            self.analyze_horizon_returns(symbol, &returns, time_horizon_days, prediction.as_ref())?;

        tracing::info!(
            symbol,
            horizon = time_horizon_days,
            expected_value = analysis.expected_value,
            probability_of_loss = analysis.probability_of_loss,
            recommendation = %analysis.recommendation,
            "EV analysis complete"
        );

        self.cache.insert(cache_key, analysis.clone());
        Ok(analysis)
    }

    /// Like [`Self::calculate_expected_value`] but never fails; failures yield
    /// [`Self::neutral`]
    pub async fn analyze(&self, symbol: &str, time_horizon_days: usize, use_ml: bool) -> EvAnalysis {
        match self.calculate_expected_value(symbol, time_horizon_days, use_ml).await {
            Ok(analysis) => analysis,
            Err(e) => {
                tracing::warn!(symbol, error = %e, "EV analysis failed, using neutral analysis");
                self.neutral(symbol, time_horizon_days, &e.to_string())
            }
        }
    }

    /// Neutral fallback carrying this calculator's priors
    pub fn neutral(&self, symbol: &str, time_horizon_days: usize, reason: &str) -> EvAnalysis {
        EvAnalysis::neutral_with(&self.config, symbol, time_horizon_days, reason)
    }

    /// Scenario analysis of an already computed horizon-return series
    pub fn analyze_horizon_returns(
        &self,
        symbol: &str,
        returns: &[f64],
        time_horizon_days: usize,
        prediction: Option<&MlPrediction>,
    ) -> Result<EvAnalysis, AnalysisError> {
        let mut scenarios = Vec::with_capacity(ScenarioKind::ALL.len());
        for (i, kind) in ScenarioKind::ALL.iter().enumerate() {
            let pct = self.config.scenario_percentiles[i];
            let outcome = stats::percentile(returns, pct)
                .ok_or_else(|| AnalysisError::insufficient(symbol, 1, 0))?;
            scenarios.push(Scenario {
                kind: *kind,
                probability: self.config.scenario_probabilities[i],
                return_outcome: outcome,
                percentile: pct,
            });
        }

        let ml_adjusted = match prediction {
            Some(p) => self.apply_ml_adjustment(symbol, &mut scenarios, p),
            None => false,
        };

        Ok(self.evaluate_scenarios(symbol, time_horizon_days, scenarios, ml_adjusted, returns.len()))
    }

    /// Scale outcomes by a confident price+direction prediction
    ///
    /// Returns whether an adjustment was applied.
    fn apply_ml_adjustment(&self, symbol: &str, scenarios: &mut [Scenario], prediction: &MlPrediction) -> bool {
        let threshold = self.config.ml_confidence_threshold;
        let confident_price = prediction.price.is_some_and(|p| p.confidence > threshold);
        let direction = match prediction.confident_direction(threshold) {
            Some(d) if confident_price => d,
            _ => return false,
        };

        let (up_factor, down_factor) = if direction.value > STRONG_UP {
            (self.config.ml_amplification, self.config.ml_dampening)
        } else if direction.value < STRONG_DOWN {
            (self.config.ml_dampening, self.config.ml_amplification)
        } else {
            return false;
        };

        for scenario in scenarios.iter_mut() {
            if scenario.return_outcome > 0.0 {
                scenario.return_outcome *= up_factor;
            } else if scenario.return_outcome < 0.0 {
                scenario.return_outcome *= down_factor;
            }
        }
        tracing::debug!(symbol, direction = direction.value, "Scenario outcomes adjusted by ML");
        true
    }

    /// Aggregate metrics, recommendation and scores for a scenario set
    pub fn evaluate_scenarios(
        &self,
        symbol: &str,
        time_horizon_days: usize,
        scenarios: Vec<Scenario>,
        ml_adjusted: bool,
        sample_size: usize,
    ) -> EvAnalysis {
        let expected_value: f64 = scenarios.iter().map(|s| s.probability * s.return_outcome).sum();
        let variance: f64 = scenarios
            .iter()
            .map(|s| s.probability * (s.return_outcome - expected_value).powi(2))
            .sum();
        let volatility = variance.sqrt();
        let risk_adjusted_ev = expected_value - self.config.risk_aversion * variance;

        let negative = || scenarios.iter().filter(|s| s.return_outcome < 0.0);
        let downside_risk = negative()
            .map(|s| s.probability * s.return_outcome.powi(2))
            .sum::<f64>()
            .sqrt();
        let probability_of_loss: f64 = negative().map(|s| s.probability).sum();

        let max_loss = scenarios
            .iter()
            .map(|s| s.return_outcome)
            .fold(f64::INFINITY, f64::min);
        let max_gain = scenarios
            .iter()
            .map(|s| s.return_outcome)
            .fold(f64::NEG_INFINITY, f64::max);

        let risk_free = self.config.annual_risk_free_rate * time_horizon_days as f64
            / self.config.trading_days_per_year;
        let sharpe_ratio = if volatility > 0.0 {
            (expected_value - risk_free) / volatility
        } else {
            0.0
        };
        let sortino_ratio = if downside_risk > 0.0 {
            (expected_value - risk_free) / downside_risk
        } else {
            0.0
        };

        let (var_95, cvar_95) = value_at_risk(&scenarios);
        let confidence = (1.0 / (1.0 + volatility / expected_value.abs().max(EPSILON))).clamp(0.05, 0.95);

        let recommendation = self.recommend(expected_value, sharpe_ratio, probability_of_loss, confidence);
        let ev_score = ev_score(expected_value, confidence, sharpe_ratio);
        let risk_score = risk_score(probability_of_loss, max_loss, downside_risk);

        EvAnalysis {
            symbol: symbol.to_string(),
            time_horizon_days,
            scenarios,
            expected_value,
            variance,
            volatility,
            risk_adjusted_ev,
            downside_risk,
            probability_of_loss,
            max_loss,
            max_gain,
            sharpe_ratio,
            sortino_ratio,
            var_95,
            cvar_95,
            confidence,
            recommendation,
            ev_score,
            risk_score,
            opportunity_score: ev_score * (100.0 - risk_score) / 100.0,
            risk_level: risk_level_from_score(risk_score),
            ml_adjusted,
            sample_size,
            analyzed_at: Utc::now(),
            error: None,
        }
    }

    /// Nested threshold tests, strongest tier first
    pub fn recommend(
        &self,
        expected_value: f64,
        sharpe_ratio: f64,
        probability_of_loss: f64,
        confidence: f64,
    ) -> Recommendation {
        let meets = |t: &crate::config::EvTierThreshold| {
            expected_value > t.min_expected_value
                && sharpe_ratio > t.min_sharpe
                && probability_of_loss < t.max_loss_probability
                && confidence > t.min_confidence
        };

        if meets(&self.config.strong_buy) {
            Recommendation::StrongBuy
        } else if meets(&self.config.buy) {
            Recommendation::Buy
        } else if expected_value > self.config.hold_floor {
            Recommendation::Hold
        } else if expected_value > self.config.avoid_floor {
            Recommendation::Avoid
        } else {
            Recommendation::Sell
        }
    }

    /// Rank symbols by opportunity score
    ///
    /// Symbols whose analysis failed, whose risk level exceeds
    /// `max_risk_level` or whose EV is below `min_expected_return` are left
    /// out. Tiers are assigned by position in the filtered list.
    pub async fn rank_opportunities(
        &self,
        symbols: &[String],
        max_risk_level: RiskLevel,
        min_expected_return: f64,
    ) -> Vec<RankedOpportunity> {
        let horizon = self.config.time_horizon_days;
        let analyses: Vec<EvAnalysis> = stream::iter(symbols.iter())
            .map(|symbol| self.analyze(symbol, horizon, true))
            .buffered(self.max_concurrency)
            .collect()
            .await;

        rank_analyses(&analyses, max_risk_level, min_expected_return)
    }
}

/// Rank precomputed analyses; see [`ExpectedValueCalculator::rank_opportunities`]
pub fn rank_analyses(
    analyses: &[EvAnalysis],
    max_risk_level: RiskLevel,
    min_expected_return: f64,
) -> Vec<RankedOpportunity> {
    let mut eligible: Vec<&EvAnalysis> = analyses
        .iter()
        .filter(|a| !a.is_fallback())
        .filter(|a| a.risk_level <= max_risk_level)
        .filter(|a| a.expected_value >= min_expected_return)
        .collect();

    eligible.sort_by(|a, b| {
        b.opportunity_score
            .total_cmp(&a.opportunity_score)
            .then_with(|| a.symbol.cmp(&b.symbol))
    });

    let n = eligible.len();
    eligible
        .into_iter()
        .enumerate()
        .map(|(i, a)| RankedOpportunity {
            rank: i + 1,
            tier: tier_for(i, n),
            symbol: a.symbol.clone(),
            opportunity_score: a.opportunity_score,
            ev_score: a.ev_score,
            risk_score: a.risk_score,
            expected_value: a.expected_value,
            confidence: a.confidence,
            risk_level: a.risk_level,
            recommendation: a.recommendation,
        })
        .collect()
}

/// VaR-95 and CVaR-95 of a discrete scenario distribution
///
/// VaR is the smallest outcome whose cumulative probability reaches 5%.
/// CVaR is the probability-weighted mean of outcomes at or below VaR.
pub fn value_at_risk(scenarios: &[Scenario]) -> (f64, f64) {
    if scenarios.is_empty() {
        return (0.0, 0.0);
    }
    let mut sorted: Vec<&Scenario> = scenarios.iter().collect();
    sorted.sort_by(|a, b| a.return_outcome.total_cmp(&b.return_outcome));

    let mut cumulative = 0.0;
    let mut var = sorted[sorted.len() - 1].return_outcome;
    for s in &sorted {
        cumulative += s.probability;
        if cumulative >= VAR_TAIL - EPSILON {
            var = s.return_outcome;
            break;
        }
    }

    let (weighted, mass) = sorted
        .iter()
        .filter(|s| s.return_outcome <= var)
        .fold((0.0, 0.0), |(w, m), s| (w + s.probability * s.return_outcome, m + s.probability));
    let cvar = if mass > 0.0 { weighted / mass } else { var };

    (var, cvar)
}

/// EV sub-score: EV linear (10% EV = 100), scaled by confidence and a Sharpe bonus
pub fn ev_score(expected_value: f64, confidence: f64, sharpe_ratio: f64) -> f64 {
    let base = (expected_value * 1000.0).clamp(0.0, 100.0);
    let sharpe_bonus = 1.0 + 0.1 * sharpe_ratio.clamp(0.0, 5.0);
    (base * confidence * sharpe_bonus).min(100.0)
}

/// Risk sub-score: loss probability (up to 40), max loss (up to 30) and
/// downside risk (up to 30)
pub fn risk_score(probability_of_loss: f64, max_loss: f64, downside_risk: f64) -> f64 {
    let loss_part = probability_of_loss.clamp(0.0, 1.0) * 40.0;
    let max_loss_part = (max_loss.min(0.0).abs() * 100.0).min(30.0);
    let downside_part = (downside_risk * 300.0).min(30.0);
    (loss_part + max_loss_part + downside_part).min(100.0)
}

pub fn risk_level_from_score(risk_score: f64) -> RiskLevel {
    if risk_score < 25.0 {
        RiskLevel::Low
    } else if risk_score < 50.0 {
        RiskLevel::Medium
    } else if risk_score < 75.0 {
        RiskLevel::High
    } else {
        RiskLevel::Extreme
    }
}
