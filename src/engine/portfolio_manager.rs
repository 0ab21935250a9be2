//! Enhanced portfolio manager
//!
//! Combines the dynamic risk limiter, the Kelly sizer and the EV scenario
//! engine into one recommendation per symbol, then scores the portfolio as a
//! whole.
//!
//! Per symbol:
//! 1. Recommended limits for the symbol and the entry gate. The correlation
//!    fed to the gate is the largest absolute correlation of date-aligned
//!    daily returns with any current holding. A veto short-circuits to `avoid`.
//! 2. Kelly and EV analyses run concurrently. Failures become fallback
//!    analyses and a `hold` with an "analysis failed" rationale.
//! 3. Action and size from both signals; size never exceeds the limiter cap.
//!
//! Symbols run on a bounded pool with a per-symbol timeout. A batch always
//! returns one recommendation per requested symbol.

use super::expected_value::{rank_analyses, EvAnalysis, ExpectedValueCalculator, OpportunityTier, RankedOpportunity};
use super::kelly_sizer::{KellyAnalysis, KellySizer};
use super::performance_tracker::PerformanceMetrics;
use super::risk_limiter::{DynamicRiskLimiter, EntryDecision, RiskAdjustment, RiskLimits};
use super::stats;
use crate::audit::{AuditEvent, AuditSink, Severity};
use crate::config::{PortfolioConfig, STRONG_BUY_LOSS_PROBABILITY_LIMIT};
use crate::error::{AnalysisError, AppError, AppResult};
use crate::market_data::{self, PriceBar, PriceHistorySource};
use crate::metrics::MetricsState;
use crate::models::{to_f64, usd, Recommendation, RiskLevel};
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Calendar days of history used for holding correlations
const CORRELATION_LOOKBACK_DAYS: i64 = 90;
/// Risk-limit confidence below which a warning is attached
const LOW_CONFIDENCE: f64 = 0.5;
/// EV probability of loss above which a warning is attached
const HIGH_LOSS_PROBABILITY: f64 = 0.4;

/// Input of one portfolio analysis run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioRequest {
    pub symbols: Vec<String>,
    pub portfolio_value: Decimal,
    /// Current dollar value held per symbol
    #[serde(default)]
    pub holdings: HashMap<String, Decimal>,
}

impl PortfolioRequest {
    pub fn new(symbols: Vec<String>, portfolio_value: Decimal) -> Self {
        Self {
            symbols,
            portfolio_value,
            holdings: HashMap::new(),
        }
    }

    pub fn with_holding(mut self, symbol: &str, value: Decimal) -> Self {
        self.holdings.insert(symbol.to_string(), value);
        self
    }

    /// Reject requests that cannot be sized
    pub fn validate(&self) -> AppResult<()> {
        if self.portfolio_value <= Decimal::ZERO {
            return Err(AppError::Validation(format!(
                "portfolio value must be positive (got {})",
                self.portfolio_value
            )));
        }
        if self.symbols.is_empty() {
            return Err(AppError::Validation(
                "at least one symbol is required".to_string(),
            ));
        }
        if let Some((symbol, value)) = self.holdings.iter().find(|(_, v)| **v < Decimal::ZERO) {
            return Err(AppError::Validation(format!(
                "holding {} must not be negative (got {})",
                symbol, value
            )));
        }
        Ok(())
    }
}

/// Per-symbol output of the integration layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionRecommendation {
    pub symbol: String,
    pub action: Recommendation,
    /// Recommended dollar position
    pub position_size: Decimal,
    /// `position_size / portfolio_value`
    pub position_pct: f64,
    /// `min(kelly size, limiter cap)` before half sizing and exposure scaling
    pub risk_adjusted_size: Decimal,
    /// Limiter dollar cap for the symbol
    pub risk_limit_cap: Decimal,
    pub kelly_fraction: f64,
    pub kelly_risk_level: Option<RiskLevel>,
    pub expected_value: f64,
    pub ev_confidence: f64,
    pub probability_of_loss: f64,
    pub risk_limits: RiskLimits,
    pub stop_loss_price: Option<f64>,
    pub take_profit_price: Option<f64>,
    pub current_position: Decimal,
    /// Largest absolute correlation with a current holding
    pub correlation: f64,
    pub rationale: String,
    pub risk_warnings: Vec<String>,
}

impl PositionRecommendation {
    /// `hold` for a symbol whose analysis could not complete
    pub fn failed(symbol: &str, reason: &str, limits: RiskLimits, current_position: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            action: Recommendation::Hold,
            position_size: Decimal::ZERO,
            position_pct: 0.0,
            risk_adjusted_size: Decimal::ZERO,
            risk_limit_cap: Decimal::ZERO,
            kelly_fraction: 0.0,
            kelly_risk_level: None,
            expected_value: 0.0,
            ev_confidence: 0.0,
            probability_of_loss: 0.0,
            risk_limits: limits,
            stop_loss_price: None,
            take_profit_price: None,
            current_position,
            correlation: 0.0,
            rationale: format!("analysis failed: {}", reason),
            risk_warnings: Vec::new(),
        }
    }
}

/// Action, size and rationale for one symbol
#[derive(Debug, Clone, PartialEq)]
pub struct ActionDecision {
    pub action: Recommendation,
    pub size: Decimal,
    pub rationale: String,
}

/// Top-level artifact of a portfolio analysis run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioHealthReport {
    /// Identifies the run in audit events
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub portfolio_value: Decimal,
    /// 0-100
    pub portfolio_score: f64,
    pub risk_level: RiskLevel,
    pub rebalance_needed: bool,
    pub recommendations: Vec<PositionRecommendation>,
    pub global_metrics: PerformanceMetrics,
    pub global_adjustment: RiskAdjustment,
    pub opportunities: Vec<RankedOpportunity>,
    /// Sum of recommended positions as a fraction of portfolio value
    pub total_recommended_exposure: f64,
    /// Factor applied to fit the global exposure limit (1.0 when it fit)
    pub exposure_scale: f64,
}

/// Enhanced portfolio manager
pub struct EnhancedPortfolioManager {
    config: PortfolioConfig,
    limiter: Arc<DynamicRiskLimiter>,
    kelly: Arc<KellySizer>,
    ev: Arc<ExpectedValueCalculator>,
    prices: Arc<dyn PriceHistorySource>,
    audit: Arc<dyn AuditSink>,
    metrics: Option<Arc<MetricsState>>,
}

impl EnhancedPortfolioManager {
    pub fn new(
        config: PortfolioConfig,
        limiter: Arc<DynamicRiskLimiter>,
        kelly: Arc<KellySizer>,
        ev: Arc<ExpectedValueCalculator>,
        prices: Arc<dyn PriceHistorySource>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            config,
            limiter,
            kelly,
            ev,
            prices,
            audit,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsState>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Analyze every requested symbol and score the portfolio
    pub async fn analyze_portfolio_with_risk_management(
        &self,
        request: &PortfolioRequest,
    ) -> PortfolioHealthReport {
        let run_id = uuid::Uuid::new_v4().to_string();
        let portfolio_value = request.portfolio_value;
        let global_adjustment = self.limiter.adjust_risk_limits(None);

        self.audit.emit(AuditEvent::new(
            "RISK_LIMITS_ADJUSTED",
            if global_adjustment.multiplier < 1.0 {
                Severity::Warning
            } else {
                Severity::Info
            },
            "portfolio",
            serde_json::json!({
                "run_id": run_id,
                "category": global_adjustment.category,
                "multiplier": global_adjustment.multiplier,
                "confidence": global_adjustment.confidence,
                "reason": global_adjustment.reason,
            }),
        ));

        let holding_bars = self.holding_bars(&request.holdings).await;

        let mut evaluated: Vec<(usize, PositionRecommendation, Option<EvAnalysis>)> =
            stream::iter(request.symbols.iter().enumerate())
                .map(|(index, symbol)| {
                    let holding_bars = &holding_bars;
                    async move {
                        let current = request.holdings.get(symbol).copied().unwrap_or(Decimal::ZERO);
                        let (rec, ev) = self
                            .evaluate_with_timeout(symbol, portfolio_value, current, holding_bars)
                            .await;
                        (index, rec, ev)
                    }
                })
                .buffer_unordered(self.config.max_concurrency.max(1))
                .collect()
                .await;
        evaluated.sort_by_key(|(index, _, _)| *index);

        let mut recommendations = Vec::with_capacity(evaluated.len());
        let mut ev_analyses = Vec::new();
        for (_, rec, ev) in evaluated {
            recommendations.push(rec);
            if let Some(ev) = ev {
                ev_analyses.push(ev);
            }
        }

        let exposure_scale = self.fit_exposure(
            &mut recommendations,
            portfolio_value,
            global_adjustment.recommended_limits.max_portfolio_exposure,
        );
        let value = to_f64(portfolio_value);
        let total_recommended_exposure = if value > 0.0 {
            recommendations
                .iter()
                .map(|r| to_f64(r.position_size))
                .sum::<f64>()
                / value
        } else {
            0.0
        };

        let opportunities = rank_analyses(&ev_analyses, RiskLevel::High, 0.0);
        let global_metrics = global_adjustment.metrics.clone();
        let portfolio_score = portfolio_score(&global_metrics, &recommendations, &opportunities, &ev_analyses);
        let risk_level = self.portfolio_risk_level(&global_metrics, &recommendations, portfolio_value);
        let rebalance_needed = self.rebalance_needed(&recommendations, portfolio_value);

        if let Some(metrics) = &self.metrics {
            metrics.portfolio_score.set(portfolio_score);
            metrics.recommended_exposure.set(total_recommended_exposure);
            for rec in &recommendations {
                let action = rec.action.to_string();
                metrics
                    .recommendations_total
                    .with_label_values(&[action.as_str()])
                    .inc();
            }
        }

        tracing::info!(
            run_id = %run_id,
            symbols = recommendations.len(),
            portfolio_score,
            risk_level = %risk_level,
            rebalance_needed,
            total_recommended_exposure,
            "Portfolio analysis complete"
        );

        self.audit.emit(AuditEvent::new(
            "PORTFOLIO_ANALYZED",
            if risk_level == RiskLevel::Extreme {
                Severity::Critical
            } else {
                Severity::Info
            },
            "portfolio",
            serde_json::json!({
                "run_id": run_id,
                "symbols": recommendations.len(),
                "portfolio_score": portfolio_score,
                "risk_level": risk_level,
                "rebalance_needed": rebalance_needed,
                "total_recommended_exposure": total_recommended_exposure,
            }),
        ));

        PortfolioHealthReport {
            run_id,
            generated_at: Utc::now(),
            portfolio_value,
            portfolio_score,
            risk_level,
            rebalance_needed,
            recommendations,
            global_metrics,
            global_adjustment,
            opportunities,
            total_recommended_exposure,
            exposure_scale,
        }
    }

    async fn evaluate_with_timeout(
        &self,
        symbol: &str,
        portfolio_value: Decimal,
        current_position: Decimal,
        holding_bars: &HashMap<String, Vec<PriceBar>>,
    ) -> (PositionRecommendation, Option<EvAnalysis>) {
        let started = Instant::now();
        let secs = self.config.symbol_timeout_secs;
        let result = tokio::time::timeout(
            Duration::from_secs(secs),
            self.evaluate_symbol(symbol, portfolio_value, current_position, holding_bars),
        )
        .await;

        if let Some(metrics) = &self.metrics {
            metrics
                .analysis_latency
                .observe(started.elapsed().as_secs_f64() * 1000.0);
            metrics.analyses_total.with_label_values(&["symbol"]).inc();
        }

        match result {
            Ok(evaluated) => evaluated,
            Err(_) => {
                let reason = AnalysisError::Timeout {
                    symbol: symbol.to_string(),
                    secs,
                }
                .to_string();
                tracing::warn!(symbol, timeout_secs = secs, "Symbol analysis timed out");
                self.record_failure("symbol", symbol, &reason);
                let limits = self.limiter.base_limits().clone();
                (
                    PositionRecommendation::failed(symbol, &reason, limits, current_position),
                    None,
                )
            }
        }
    }

    async fn evaluate_symbol(
        &self,
        symbol: &str,
        portfolio_value: Decimal,
        current_position: Decimal,
        holding_bars: &HashMap<String, Vec<PriceBar>>,
    ) -> (PositionRecommendation, Option<EvAnalysis>) {
        let adjustment = self.limiter.adjust_risk_limits(Some(symbol));
        let correlation = self.correlation_with_holdings(symbol, holding_bars).await;
        let entry = self
            .limiter
            .entry_decision_with(&adjustment, symbol, correlation, Utc::now());
        let risk_cap = self.limiter.position_size_limit_for(&adjustment, portfolio_value);

        let mut rec = PositionRecommendation::failed(
            symbol,
            "not analyzed",
            adjustment.recommended_limits.clone(),
            current_position,
        );
        rec.correlation = correlation;
        rec.risk_limit_cap = risk_cap;

        if let EntryDecision::Rejected(reason) = &entry {
            tracing::info!(symbol, reason = %reason, "Entry blocked by risk limiter");
            if let Some(metrics) = &self.metrics {
                metrics.entry_vetoes_total.inc();
            }
            self.audit.emit(AuditEvent::new(
                "ENTRY_VETOED",
                Severity::Warning,
                symbol,
                serde_json::json!({ "reason": reason, "correlation": correlation }),
            ));
            rec.action = Recommendation::Avoid;
            rec.rationale = format!("entry blocked: {}", reason);
            return (rec, None);
        }

        let horizon = self.ev.config().time_horizon_days;
        let (kelly, ev) = tokio::join!(
            self.kelly.analyze_symbol_kelly(symbol, true),
            self.ev.calculate_expected_value(symbol, horizon, true),
        );

        let kelly = match kelly {
            Ok(analysis) => {
                self.record_success("kelly");
                analysis
            }
            Err(e) => {
                tracing::warn!(symbol, error = %e, "Kelly analysis failed, using fallback");
                self.record_failure("kelly", symbol, &e.to_string());
                KellyAnalysis::fallback(symbol, &e.to_string())
            }
        };
        let ev = match ev {
            Ok(analysis) => {
                self.record_success("ev");
                analysis
            }
            Err(e) => {
                tracing::warn!(symbol, error = %e, "EV analysis failed, using neutral analysis");
                self.record_failure("ev", symbol, &e.to_string());
                self.ev.neutral(symbol, horizon, &e.to_string())
            }
        };

        let kelly_size = self.kelly.position_size(&kelly, portfolio_value);
        let decision = self.determine_position_action(&entry, &kelly, &ev, kelly_size, risk_cap);

        rec.action = decision.action;
        rec.position_size = decision.size;
        rec.position_pct = fraction_of(decision.size, portfolio_value);
        rec.risk_adjusted_size = kelly_size.min(risk_cap);
        rec.kelly_fraction = kelly.adjusted_fraction;
        rec.expected_value = ev.expected_value;
        rec.ev_confidence = ev.confidence;
        rec.probability_of_loss = ev.probability_of_loss;
        rec.rationale = decision.rationale;

        if !kelly.is_fallback() {
            rec.kelly_risk_level = Some(kelly.risk_level);
            if let Some(price) = kelly.last_price {
                rec.stop_loss_price = Some(price * (1.0 - rec.risk_limits.stop_loss_pct));
                rec.take_profit_price = Some(price * (1.0 + rec.risk_limits.take_profit_pct));
            }
        }
        rec.risk_warnings = risk_warnings(&adjustment, &kelly, &ev);

        let ev = (!ev.is_fallback()).then_some(ev);
        (rec, ev)
    }

    /// Combine the entry gate, Kelly and EV into an action and dollar size
    pub fn determine_position_action(
        &self,
        entry: &EntryDecision,
        kelly: &KellyAnalysis,
        ev: &EvAnalysis,
        kelly_size: Decimal,
        risk_cap: Decimal,
    ) -> ActionDecision {
        if let EntryDecision::Rejected(reason) = entry {
            return ActionDecision {
                action: Recommendation::Avoid,
                size: Decimal::ZERO,
                rationale: format!("entry blocked: {}", reason),
            };
        }

        if let Some(reason) = kelly.error.as_ref().or(ev.error.as_ref()) {
            return ActionDecision {
                action: Recommendation::Hold,
                size: Decimal::ZERO,
                rationale: format!("analysis failed: {}", reason),
            };
        }

        let expected_value = ev.expected_value;
        let capped = kelly_size.min(risk_cap);

        if kelly.recommendation.is_buy_tier()
            && ev.recommendation.is_buy_tier()
            && expected_value > self.config.strong_ev_threshold
        {
            let max_loss_probability = self
                .config
                .strong_buy_max_loss_probability
                .min(STRONG_BUY_LOSS_PROBABILITY_LIMIT);
            let strong = kelly.recommendation == Recommendation::StrongBuy
                && ev.recommendation == Recommendation::StrongBuy
                && ev.probability_of_loss <= max_loss_probability;
            return ActionDecision {
                action: if strong {
                    Recommendation::StrongBuy
                } else {
                    Recommendation::Buy
                },
                size: capped,
                rationale: format!(
                    "Kelly {} and EV {} agree: EV {:.2}% over {}d, Kelly fraction {:.2}%",
                    kelly.recommendation,
                    ev.recommendation,
                    expected_value * 100.0,
                    ev.time_horizon_days,
                    kelly.adjusted_fraction * 100.0
                ),
            };
        }

        if kelly.recommendation.is_hold_or_better()
            && ev.recommendation.is_hold_or_better()
            && expected_value >= self.config.moderate_ev_threshold
        {
            return ActionDecision {
                action: Recommendation::Buy,
                size: usd(to_f64(capped) / 2.0),
                rationale: format!(
                    "Moderate EV {:.2}% with Kelly {} and EV {}: half-sized position",
                    expected_value * 100.0,
                    kelly.recommendation,
                    ev.recommendation
                ),
            };
        }

        if ev.recommendation == Recommendation::Sell && kelly.recommendation == Recommendation::Avoid {
            return ActionDecision {
                action: Recommendation::Sell,
                size: Decimal::ZERO,
                rationale: format!(
                    "EV {:.2}% with no Kelly edge",
                    expected_value * 100.0
                ),
            };
        }

        if expected_value < self.config.avoid_ev_threshold
            || kelly.expected_value < self.config.avoid_ev_threshold
        {
            return ActionDecision {
                action: Recommendation::Avoid,
                size: Decimal::ZERO,
                rationale: format!(
                    "Negative expectation: EV {:.2}%, Kelly edge {:.2}%",
                    expected_value * 100.0,
                    kelly.expected_value * 100.0
                ),
            };
        }

        ActionDecision {
            action: Recommendation::Hold,
            size: Decimal::ZERO,
            rationale: format!(
                "No clear edge: Kelly {}, EV {} ({:.2}%)",
                kelly.recommendation,
                ev.recommendation,
                expected_value * 100.0
            ),
        }
    }

    /// Scale positions down to the global exposure limit; returns the factor
    fn fit_exposure(
        &self,
        recommendations: &mut [PositionRecommendation],
        portfolio_value: Decimal,
        max_exposure: f64,
    ) -> f64 {
        let value = to_f64(portfolio_value);
        let total: f64 = recommendations.iter().map(|r| to_f64(r.position_size)).sum();
        let limit = value * max_exposure;
        if total <= limit || total <= 0.0 {
            return 1.0;
        }

        let scale = limit / total;
        tracing::info!(
            total_exposure = total / value,
            max_exposure,
            scale,
            "Scaling positions to global exposure limit"
        );
        for rec in recommendations.iter_mut() {
            rec.position_size = usd(to_f64(rec.position_size) * scale);
            rec.position_pct = fraction_of(rec.position_size, portfolio_value);
        }
        scale
    }

    /// Risk tier from a count of portfolio risk factors
    pub fn portfolio_risk_level(
        &self,
        metrics: &PerformanceMetrics,
        recommendations: &[PositionRecommendation],
        portfolio_value: Decimal,
    ) -> RiskLevel {
        let mut factors = 0u32;

        if metrics.win_rate < 0.4 {
            factors += 2;
        } else if metrics.win_rate < 0.5 {
            factors += 1;
        }

        if metrics.max_drawdown > 0.2 {
            factors += 2;
        } else if metrics.max_drawdown > 0.1 {
            factors += 1;
        }

        if metrics.sharpe_ratio < 0.0 {
            factors += 1;
        }

        if !recommendations.is_empty() {
            let elevated = recommendations
                .iter()
                .filter(|r| r.kelly_risk_level.is_some_and(|l| l.is_elevated()))
                .count();
            let share = elevated as f64 / recommendations.len() as f64;
            if share > 0.5 {
                factors += 2;
            } else if share > 0.25 {
                factors += 1;
            }
        }

        let oversized = recommendations
            .iter()
            .filter(|r| {
                let held = fraction_of(r.current_position, portfolio_value);
                r.position_pct.max(held) > self.config.oversized_position
            })
            .count()
            .min(2);
        factors += oversized as u32;

        match factors {
            f if f >= 6 => RiskLevel::Extreme,
            f if f >= 4 => RiskLevel::High,
            f if f >= 2 => RiskLevel::Medium,
            _ => RiskLevel::Low,
        }
    }

    /// Whether the recommendations call for a rebalance
    pub fn rebalance_needed(&self, recommendations: &[PositionRecommendation], portfolio_value: Decimal) -> bool {
        if recommendations
            .iter()
            .any(|r| matches!(r.action, Recommendation::StrongBuy | Recommendation::Sell))
        {
            return true;
        }
        if recommendations.is_empty() {
            return false;
        }

        let value = to_f64(portfolio_value);
        if value <= 0.0 {
            return false;
        }
        let large_changes = recommendations
            .iter()
            .filter(|r| {
                let target = match r.action {
                    Recommendation::StrongBuy | Recommendation::Buy => to_f64(r.position_size),
                    Recommendation::Hold | Recommendation::Avoid => to_f64(r.current_position),
                    Recommendation::Sell => 0.0,
                };
                (target - to_f64(r.current_position)).abs() / value > self.config.large_change_fraction
            })
            .count();

        large_changes as f64 / recommendations.len() as f64 >= self.config.rebalance_share
    }

    async fn holding_bars(&self, holdings: &HashMap<String, Decimal>) -> HashMap<String, Vec<PriceBar>> {
        let held: Vec<&String> = holdings
            .iter()
            .filter(|(_, value)| **value > Decimal::ZERO)
            .map(|(symbol, _)| symbol)
            .collect();

        stream::iter(held)
            .map(|symbol| async move { (symbol.clone(), self.recent_bars(symbol).await) })
            .buffer_unordered(self.config.max_concurrency.max(1))
            .filter_map(|(symbol, bars)| async move { bars.map(|b| (symbol, b)) })
            .collect()
            .await
    }

    async fn recent_bars(&self, symbol: &str) -> Option<Vec<PriceBar>> {
        match market_data::fetch_bars(
            self.prices.as_ref(),
            symbol,
            CORRELATION_LOOKBACK_DAYS,
            self.config.fetch_timeout_secs,
        )
        .await
        {
            Ok(bars) => Some(bars),
            Err(e) => {
                tracing::warn!(symbol, error = %e, "No returns for correlation check");
                None
            }
        }
    }

    /// Largest absolute correlation with any other holding, 0.0 without data
    ///
    /// Returns are paired by date, so a holding with gaps or a stale tail is
    /// only compared over the days both series cover.
    async fn correlation_with_holdings(&self, symbol: &str, holding_bars: &HashMap<String, Vec<PriceBar>>) -> f64 {
        if holding_bars.keys().all(|held| held == symbol) {
            return 0.0;
        }
        let Some(bars) = self.recent_bars(symbol).await else {
            return 0.0;
        };
        holding_bars
            .iter()
            .filter(|(held, _)| held.as_str() != symbol)
            .map(|(_, other)| {
                let (ours, theirs) = market_data::aligned_returns(&bars, other);
                stats::correlation(&ours, &theirs).abs()
            })
            .fold(0.0, f64::max)
    }

    fn record_success(&self, component: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.analyses_total.with_label_values(&[component]).inc();
        }
    }

    fn record_failure(&self, component: &str, symbol: &str, reason: &str) {
        if let Some(metrics) = &self.metrics {
            metrics
                .analysis_failures_total
                .with_label_values(&[component])
                .inc();
        }
        self.audit.emit(AuditEvent::new(
            "ANALYSIS_FAILED",
            Severity::Warning,
            symbol,
            serde_json::json!({ "component": component, "reason": reason }),
        ));
    }
}

fn fraction_of(amount: Decimal, portfolio_value: Decimal) -> f64 {
    let value = to_f64(portfolio_value);
    if value > 0.0 {
        to_f64(amount) / value
    } else {
        0.0
    }
}

fn risk_warnings(adjustment: &RiskAdjustment, kelly: &KellyAnalysis, ev: &EvAnalysis) -> Vec<String> {
    let mut warnings = Vec::new();
    if adjustment.confidence < LOW_CONFIDENCE {
        warnings.push(format!(
            "Low confidence in risk limits ({:.0}% from {} trades)",
            adjustment.confidence * 100.0,
            adjustment.metrics.total_trades
        ));
    }
    if !kelly.is_fallback() && kelly.risk_level.is_elevated() {
        warnings.push(format!("Kelly risk level {}", kelly.risk_level));
    }
    if !ev.is_fallback() && ev.probability_of_loss > HIGH_LOSS_PROBABILITY {
        warnings.push(format!(
            "Probability of loss {:.0}%",
            ev.probability_of_loss * 100.0
        ));
    }
    warnings
}

/// Portfolio score, 0-100, starting from 50
pub fn portfolio_score(
    metrics: &PerformanceMetrics,
    recommendations: &[PositionRecommendation],
    opportunities: &[RankedOpportunity],
    ev_analyses: &[EvAnalysis],
) -> f64 {
    let mut score: f64 = 50.0;

    if metrics.win_rate >= 0.6 {
        score += 15.0;
    } else if metrics.win_rate < 0.4 {
        score -= 15.0;
    }

    if metrics.sharpe_ratio > 0.5 {
        score += 15.0;
    } else if metrics.sharpe_ratio < 0.0 {
        score -= 15.0;
    }

    let sized: Vec<f64> = recommendations
        .iter()
        .filter(|r| r.kelly_risk_level.is_some())
        .map(|r| r.kelly_fraction)
        .collect();
    if !sized.is_empty() {
        let avg_fraction = stats::mean(&sized);
        if (0.05..=0.15).contains(&avg_fraction) {
            score += 12.0;
        } else {
            score -= 5.0;
        }
    }

    if !recommendations.is_empty() {
        let premium = opportunities
            .iter()
            .filter(|o| o.tier == OpportunityTier::Premium)
            .count();
        score += 15.0 * premium as f64 / recommendations.len() as f64;
    }

    if !ev_analyses.is_empty() {
        let avg_ev_score = ev_analyses.iter().map(|a| a.ev_score).sum::<f64>() / ev_analyses.len() as f64;
        if avg_ev_score >= 50.0 {
            score += 10.0;
        } else if avg_ev_score < 20.0 {
            score -= 10.0;
        }
    }

    let buys = recommendations.iter().filter(|r| r.action.is_buy_tier()).count();
    score += (2.0 * buys as f64).min(10.0);

    if !recommendations.is_empty() {
        let avoids = recommendations
            .iter()
            .filter(|r| r.action == Recommendation::Avoid)
            .count();
        if avoids as f64 / recommendations.len() as f64 > 0.3 {
            score -= 10.0;
        }
    }

    score.clamp(0.0, 100.0)
}
