//! Dynamic risk limits driven by realized performance
//!
//! Classifies rolling performance into a category, scales the base limits by
//! the category multiplier and clamps every field to absolute ceilings. Also
//! gates new entries on correlation, daily trade count and post-loss
//! cooling-off.

use super::performance_tracker::{PerformanceMetrics, PerformanceTracker};
use crate::config::{BaseLimitsConfig, LimitCeilingsConfig, RiskLimitsConfig};
use crate::models::{to_f64, usd};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Ordered performance category, best first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceCategory {
    Excellent,
    Good,
    Average,
    Poor,
    Bad,
}

impl std::fmt::Display for PerformanceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Excellent => write!(f, "excellent"),
            Self::Good => write!(f, "good"),
            Self::Average => write!(f, "average"),
            Self::Poor => write!(f, "poor"),
            Self::Bad => write!(f, "bad"),
        }
    }
}

/// Seven-field risk limit bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Fraction of portfolio per position
    pub max_position_size: f64,
    /// Fraction of portfolio across all positions
    pub max_portfolio_exposure: f64,
    pub max_daily_trades: u32,
    /// Highest allowed correlation with held positions
    pub max_correlation: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    /// Hours to wait after a losing trade on the symbol
    pub cooling_period_hours: f64,
}

impl From<&BaseLimitsConfig> for RiskLimits {
    fn from(base: &BaseLimitsConfig) -> Self {
        Self {
            max_position_size: base.max_position_size,
            max_portfolio_exposure: base.max_portfolio_exposure,
            max_daily_trades: base.max_daily_trades,
            max_correlation: base.max_correlation,
            stop_loss_pct: base.stop_loss_pct,
            take_profit_pct: base.take_profit_pct,
            cooling_period_hours: base.cooling_period_hours,
        }
    }
}

/// Result of a risk limit adjustment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAdjustment {
    pub symbol: Option<String>,
    pub current_limits: RiskLimits,
    pub recommended_limits: RiskLimits,
    pub category: PerformanceCategory,
    pub multiplier: f64,
    pub reason: String,
    /// Linear in trade count, saturating at `max_confidence`
    pub confidence: f64,
    pub metrics: PerformanceMetrics,
    pub timestamp: DateTime<Utc>,
}

/// Reason an entry was refused
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryRejection {
    CorrelationTooHigh { correlation: f64, limit: f64 },
    DailyTradeLimit { trades_today: usize, limit: u32 },
    CoolingOff { remaining_hours: f64, cooling_hours: f64 },
}

impl std::fmt::Display for EntryRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CorrelationTooHigh { correlation, limit } => {
                write!(f, "Correlation {:.2} exceeds limit {:.2}", correlation, limit)
            }
            Self::DailyTradeLimit { trades_today, limit } => {
                write!(f, "{} trades today reached daily limit {}", trades_today, limit)
            }
            Self::CoolingOff {
                remaining_hours,
                cooling_hours,
            } => write!(
                f,
                "Cooling off after loss: {:.1}h of {:.1}h remaining",
                remaining_hours, cooling_hours
            ),
        }
    }
}

/// Entry gate outcome
#[derive(Debug, Clone, PartialEq)]
pub enum EntryDecision {
    Allowed,
    Rejected(EntryRejection),
}

impl EntryDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, EntryDecision::Allowed)
    }
}

/// Scale base limits by a performance multiplier and clamp to ceilings
///
/// Position size and take-profit scale linearly, exposure by the dampened
/// `0.8 + 0.2 * m`, correlation by `0.9 + 0.1 * m`. Stop loss scales by
/// `1 / (0.5 + 0.5 * m)` and cooling-off by `1 / m`.
pub fn scale_limits(base: &RiskLimits, multiplier: f64, ceilings: &LimitCeilingsConfig) -> RiskLimits {
    let m = multiplier.max(f64::EPSILON);

    let daily_trades = (base.max_daily_trades as f64 * m).round().max(1.0) as u32;

    RiskLimits {
        max_position_size: (base.max_position_size * m).clamp(0.0, ceilings.max_position_size),
        max_portfolio_exposure: (base.max_portfolio_exposure * (0.8 + 0.2 * m))
            .clamp(0.0, ceilings.max_portfolio_exposure),
        max_daily_trades: daily_trades.min(ceilings.max_daily_trades),
        max_correlation: (base.max_correlation * (0.9 + 0.1 * m)).clamp(0.0, ceilings.max_correlation),
        stop_loss_pct: (base.stop_loss_pct / (0.5 + 0.5 * m))
            .clamp(ceilings.min_stop_loss_pct, ceilings.max_stop_loss_pct),
        take_profit_pct: (base.take_profit_pct * m).clamp(0.0, ceilings.max_take_profit_pct),
        cooling_period_hours: (base.cooling_period_hours / m)
            .clamp(ceilings.min_cooling_hours, ceilings.max_cooling_hours),
    }
}

/// Dynamic risk limiter
pub struct DynamicRiskLimiter {
    config: RiskLimitsConfig,
    base: RiskLimits,
    tracker: Arc<PerformanceTracker>,
}

impl DynamicRiskLimiter {
    pub fn new(config: RiskLimitsConfig, tracker: Arc<PerformanceTracker>) -> Self {
        let base = RiskLimits::from(&config.base);
        Self {
            config,
            base,
            tracker,
        }
    }

    pub fn base_limits(&self) -> &RiskLimits {
        &self.base
    }

    /// Classify metrics, best category first; `Bad` when nothing matches
    pub fn classify(&self, metrics: &PerformanceMetrics) -> (PerformanceCategory, f64) {
        let tiers = [
            (PerformanceCategory::Excellent, &self.config.excellent),
            (PerformanceCategory::Good, &self.config.good),
            (PerformanceCategory::Average, &self.config.average),
            (PerformanceCategory::Poor, &self.config.poor),
        ];
        for (category, threshold) in tiers {
            if metrics.win_rate >= threshold.min_win_rate && metrics.sharpe_ratio >= threshold.min_sharpe {
                return (category, threshold.multiplier);
            }
        }
        (PerformanceCategory::Bad, self.config.bad_multiplier)
    }

    /// Recommended limits for a symbol, or globally with `None`
    pub fn adjust_risk_limits(&self, symbol: Option<&str>) -> RiskAdjustment {
        let metrics = self.tracker.calculate_performance_metrics(symbol);
        let (category, multiplier) = self.classify(&metrics);
        let recommended = scale_limits(&self.base, multiplier, &self.config.ceilings);

        let confidence = (metrics.total_trades as f64 / self.config.confidence_full_trades)
            .min(self.config.max_confidence);

        let reason = format!(
            "{} performance: win rate {:.1}%, Sharpe {:.2} over {} trades -> {:.1}x limits",
            category,
            metrics.win_rate * 100.0,
            metrics.sharpe_ratio,
            metrics.total_trades,
            multiplier
        );

        tracing::debug!(
            symbol = symbol.unwrap_or("*"),
            category = %category,
            multiplier,
            confidence,
            "Risk limits adjusted"
        );

        RiskAdjustment {
            symbol: symbol.map(str::to_string),
            current_limits: self.base.clone(),
            recommended_limits: recommended,
            category,
            multiplier,
            reason,
            confidence,
            metrics,
            timestamp: Utc::now(),
        }
    }

    /// Dollar cap for a new position in `symbol`
    ///
    /// `portfolio_value * recommended_max_position_size * confidence`, capped
    /// again at the absolute position ceiling.
    pub fn get_position_size_limit(&self, symbol: &str, portfolio_value: Decimal) -> Decimal {
        let adjustment = self.adjust_risk_limits(Some(symbol));
        self.position_size_limit_for(&adjustment, portfolio_value)
    }

    /// Dollar cap from an adjustment already computed
    pub fn position_size_limit_for(&self, adjustment: &RiskAdjustment, portfolio_value: Decimal) -> Decimal {
        let value = to_f64(portfolio_value).max(0.0);
        let cap = value
            * adjustment.recommended_limits.max_position_size
            * adjustment.confidence;
        usd(cap.min(value * self.config.ceilings.max_position_size))
    }

    /// Entry gate; checks correlation, daily trade count, then cooling-off
    pub fn entry_decision(&self, symbol: &str, current_correlation: f64) -> EntryDecision {
        let adjustment = self.adjust_risk_limits(Some(symbol));
        self.entry_decision_with(&adjustment, symbol, current_correlation, Utc::now())
    }

    /// Entry gate against precomputed limits at a given instant
    pub fn entry_decision_with(
        &self,
        adjustment: &RiskAdjustment,
        symbol: &str,
        current_correlation: f64,
        now: DateTime<Utc>,
    ) -> EntryDecision {
        let limits = &adjustment.recommended_limits;

        if current_correlation > limits.max_correlation {
            return EntryDecision::Rejected(EntryRejection::CorrelationTooHigh {
                correlation: current_correlation,
                limit: limits.max_correlation,
            });
        }

        let trades_today = self.tracker.trades_on(now.date_naive(), Some(symbol));
        if trades_today >= limits.max_daily_trades as usize {
            return EntryDecision::Rejected(EntryRejection::DailyTradeLimit {
                trades_today,
                limit: limits.max_daily_trades,
            });
        }

        if let Some(last) = self.tracker.last_trade(symbol) {
            if last.is_loss() {
                let elapsed_hours =
                    now.signed_duration_since(last.exit_time).num_seconds() as f64 / 3600.0;
                if elapsed_hours < limits.cooling_period_hours {
                    return EntryDecision::Rejected(EntryRejection::CoolingOff {
                        remaining_hours: limits.cooling_period_hours - elapsed_hours,
                        cooling_hours: limits.cooling_period_hours,
                    });
                }
            }
        }

        EntryDecision::Allowed
    }

    /// Whether a new position in `symbol` may be opened
    pub fn should_enter_position(&self, symbol: &str, current_correlation: f64) -> bool {
        match self.entry_decision(symbol, current_correlation) {
            EntryDecision::Allowed => true,
            EntryDecision::Rejected(reason) => {
                tracing::info!(symbol, reason = %reason, "Entry blocked by risk limiter");
                false
            }
        }
    }
}
