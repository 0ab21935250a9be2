//! Closed-trade performance tracking
//!
//! Records closed trades into a bounded history plus a per-day bucket keyed by
//! exit date, and computes rolling metrics over the lookback window:
//! - Win rate and average return
//! - Sharpe-like ratio (mean / sample stdev of per-trade returns, un-annualized)
//! - Trade-level max drawdown on the compounded return sequence. This is not
//!   a calendar drawdown: gaps between trades carry no price path.
//! - Current consecutive win/loss streak
//! - Profit factor (gross profit / gross loss)

use super::stats;
use super::trade_history::TradeHistory;
use crate::config::PerformanceConfig;
use crate::models::{TradeDirection, TradeRecord};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Profit factor reported when there are wins but no losses
pub const PROFIT_FACTOR_CAP: f64 = 100.0;

/// Rolling performance metrics
///
/// With no trades in the window every field holds the neutral value from
/// [`PerformanceMetrics::neutral`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub symbol: Option<String>,
    pub total_trades: usize,
    pub win_rate: f64,
    pub avg_return: f64,
    /// Mean positive return
    pub avg_win: f64,
    /// Mean absolute negative return
    pub avg_loss: f64,
    /// Sample stdev of per-trade returns
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub consecutive_wins: u32,
    pub consecutive_losses: u32,
    pub profit_factor: f64,
    pub best_trade: f64,
    pub worst_trade: f64,
    pub avg_holding_hours: f64,
    pub lookback_days: i64,
}

impl PerformanceMetrics {
    /// Neutral defaults: win rate 0.5, Sharpe 0, profit factor 1, no trades
    pub fn neutral(symbol: Option<&str>, lookback_days: i64) -> Self {
        Self {
            symbol: symbol.map(str::to_string),
            total_trades: 0,
            win_rate: 0.5,
            avg_return: 0.0,
            avg_win: 0.0,
            avg_loss: 0.0,
            volatility: 0.0,
            sharpe_ratio: 0.0,
            max_drawdown: 0.0,
            consecutive_wins: 0,
            consecutive_losses: 0,
            profit_factor: 1.0,
            best_trade: 0.0,
            worst_trade: 0.0,
            avg_holding_hours: 0.0,
            lookback_days,
        }
    }
}

struct TrackerState {
    history: TradeHistory,
    daily: BTreeMap<NaiveDate, Vec<TradeRecord>>,
}

/// Performance tracker
pub struct PerformanceTracker {
    config: PerformanceConfig,
    state: RwLock<TrackerState>,
}

impl PerformanceTracker {
    pub fn new(config: PerformanceConfig) -> Self {
        let history = TradeHistory::with_capacity(config.history_capacity);
        Self {
            config,
            state: RwLock::new(TrackerState {
                history,
                daily: BTreeMap::new(),
            }),
        }
    }

    pub fn lookback_days(&self) -> i64 {
        self.config.lookback_days
    }

    /// Record a closed trade
    #[allow(clippy::too_many_arguments)]
    pub fn record_trade(
        &self,
        symbol: &str,
        entry_price: f64,
        exit_price: f64,
        size: f64,
        entry_time: DateTime<Utc>,
        exit_time: DateTime<Utc>,
        direction: TradeDirection,
    ) {
        let trade = TradeRecord::new(
            symbol,
            entry_price,
            exit_price,
            size,
            entry_time,
            exit_time,
            direction,
        );
        self.insert(trade);
    }

    /// Record an already built trade
    pub fn insert(&self, trade: TradeRecord) {
        tracing::debug!(
            symbol = %trade.symbol,
            return_pct = trade.return_pct,
            direction = %trade.direction,
            "Trade recorded"
        );

        let exit_date = trade.exit_time.date_naive();
        let cutoff = (Utc::now() - Duration::days(self.config.daily_retention_days)).date_naive();

        let mut state = self.state.write();
        state.daily.entry(exit_date).or_default().push(trade.clone());
        // Drop day buckets past retention
        state.daily = state.daily.split_off(&cutoff);

        if let Some(evicted) = state.history.push(trade) {
            tracing::trace!(
                symbol = %evicted.symbol,
                exit_time = %evicted.exit_time,
                "Oldest trade evicted from history"
            );
        }
    }

    /// Metrics over the lookback window, optionally for one symbol
    pub fn calculate_performance_metrics(&self, symbol: Option<&str>) -> PerformanceMetrics {
        let lookback = self.config.lookback_days;
        let cutoff = Utc::now() - Duration::days(lookback);

        let mut trades: Vec<TradeRecord> = {
            let state = self.state.read();
            state
                .history
                .iter()
                .filter(|t| symbol.map_or(true, |s| t.symbol == s))
                .filter(|t| t.exit_time >= cutoff)
                .cloned()
                .collect()
        };

        if trades.is_empty() {
            return PerformanceMetrics::neutral(symbol, lookback);
        }

        trades.sort_by_key(|t| t.exit_time);
        compute_metrics(symbol, &trades, lookback)
    }

    /// Trades whose exit falls on `date`, optionally for one symbol
    pub fn trades_on(&self, date: NaiveDate, symbol: Option<&str>) -> usize {
        let state = self.state.read();
        state.daily.get(&date).map_or(0, |bucket| {
            bucket
                .iter()
                .filter(|t| symbol.map_or(true, |s| t.symbol == s))
                .count()
        })
    }

    /// Most recently closed trade for a symbol
    pub fn last_trade(&self, symbol: &str) -> Option<TradeRecord> {
        let state = self.state.read();
        state
            .history
            .iter()
            .filter(|t| t.symbol == symbol)
            .max_by_key(|t| t.exit_time)
            .cloned()
    }

    pub fn history_len(&self) -> usize {
        self.state.read().history.len()
    }
}

fn compute_metrics(symbol: Option<&str>, trades: &[TradeRecord], lookback: i64) -> PerformanceMetrics {
    let returns: Vec<f64> = trades.iter().map(|t| t.return_pct).collect();
    let wins: Vec<f64> = returns.iter().copied().filter(|r| *r > 0.0).collect();
    let losses: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).map(f64::abs).collect();

    let total = returns.len();
    let avg_return = stats::mean(&returns);
    let volatility = stats::std_dev(&returns);
    let sharpe_ratio = if volatility > 0.0 {
        avg_return / volatility
    } else {
        0.0
    };

    let gross_profit: f64 = trades.iter().filter(|t| t.profit > 0.0).map(|t| t.profit).sum();
    let gross_loss: f64 = trades
        .iter()
        .filter(|t| t.profit < 0.0)
        .map(|t| t.profit.abs())
        .sum();
    let profit_factor = if gross_loss > 0.0 {
        (gross_profit / gross_loss).min(PROFIT_FACTOR_CAP)
    } else if gross_profit > 0.0 {
        PROFIT_FACTOR_CAP
    } else {
        1.0
    };

    let (consecutive_wins, consecutive_losses) = current_streak(&returns);

    PerformanceMetrics {
        symbol: symbol.map(str::to_string),
        total_trades: total,
        win_rate: wins.len() as f64 / total as f64,
        avg_return,
        avg_win: stats::mean(&wins),
        avg_loss: stats::mean(&losses),
        volatility,
        sharpe_ratio,
        max_drawdown: stats::max_drawdown(&returns),
        consecutive_wins,
        consecutive_losses,
        profit_factor,
        best_trade: returns.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        worst_trade: returns.iter().copied().fold(f64::INFINITY, f64::min),
        avg_holding_hours: trades.iter().map(|t| t.holding_hours).sum::<f64>() / total as f64,
        lookback_days: lookback,
    }
}

/// Streak ending at the most recent trade: (wins, losses)
///
/// Scans backwards and stops at the first sign change or flat trade.
fn current_streak(returns: &[f64]) -> (u32, u32) {
    let Some(last) = returns.last() else {
        return (0, 0);
    };
    if *last == 0.0 {
        return (0, 0);
    }
    let winning = *last > 0.0;
    let count = returns
        .iter()
        .rev()
        .take_while(|r| if winning { **r > 0.0 } else { **r < 0.0 })
        .count() as u32;

    if winning {
        (count, 0)
    } else {
        (0, count)
    }
}
