//! Configuration management for the sizing operator
//!
//! Loads configuration from YAML files and environment variables.
//! Environment variables override YAML values.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Trade history and performance window
    #[serde(default)]
    pub performance: PerformanceConfig,
    /// Base risk limits, ceilings and performance categories
    #[serde(default)]
    pub risk_limits: RiskLimitsConfig,
    /// Kelly sizing parameters
    #[serde(default)]
    pub kelly: KellyConfig,
    /// Scenario engine parameters
    #[serde(default)]
    pub expected_value: ExpectedValueConfig,
    /// Integration layer parameters
    #[serde(default)]
    pub portfolio: PortfolioConfig,
    /// Analysis cache
    #[serde(default)]
    pub cache: CacheConfig,
    /// Historical price source
    #[serde(default)]
    pub market_data: MarketDataConfig,
    /// ML prediction service
    #[serde(default)]
    pub predictions: PredictionsConfig,
    /// Audit event log
    #[serde(default)]
    pub audit: AuditConfig,
}

/// Performance tracker configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PerformanceConfig {
    /// Days of closed trades included in metrics
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
    /// Maximum trades retained in the rolling history
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Days a per-day trade bucket is retained
    #[serde(default = "default_daily_retention_days")]
    pub daily_retention_days: i64,
}

fn default_lookback_days() -> i64 {
    30
}

fn default_history_capacity() -> usize {
    1000
}

fn default_daily_retention_days() -> i64 {
    90
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            lookback_days: default_lookback_days(),
            history_capacity: default_history_capacity(),
            daily_retention_days: default_daily_retention_days(),
        }
    }
}

/// Seven-field risk limit bundle as configured
#[derive(Debug, Clone, Deserialize)]
pub struct BaseLimitsConfig {
    #[serde(default = "default_max_position_size")]
    pub max_position_size: f64,
    #[serde(default = "default_max_portfolio_exposure")]
    pub max_portfolio_exposure: f64,
    #[serde(default = "default_max_daily_trades")]
    pub max_daily_trades: u32,
    #[serde(default = "default_max_correlation")]
    pub max_correlation: f64,
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: f64,
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: f64,
    #[serde(default = "default_cooling_period_hours")]
    pub cooling_period_hours: f64,
}

fn default_max_position_size() -> f64 {
    0.10
}

fn default_max_portfolio_exposure() -> f64 {
    0.80
}

fn default_max_daily_trades() -> u32 {
    10
}

fn default_max_correlation() -> f64 {
    0.70
}

fn default_stop_loss_pct() -> f64 {
    0.05
}

fn default_take_profit_pct() -> f64 {
    0.15
}

fn default_cooling_period_hours() -> f64 {
    24.0
}

impl Default for BaseLimitsConfig {
    fn default() -> Self {
        Self {
            max_position_size: default_max_position_size(),
            max_portfolio_exposure: default_max_portfolio_exposure(),
            max_daily_trades: default_max_daily_trades(),
            max_correlation: default_max_correlation(),
            stop_loss_pct: default_stop_loss_pct(),
            take_profit_pct: default_take_profit_pct(),
            cooling_period_hours: default_cooling_period_hours(),
        }
    }
}

/// Absolute safety ceilings applied after scaling
#[derive(Debug, Clone, Deserialize)]
pub struct LimitCeilingsConfig {
    #[serde(default = "default_ceiling_position_size")]
    pub max_position_size: f64,
    #[serde(default = "default_ceiling_exposure")]
    pub max_portfolio_exposure: f64,
    #[serde(default = "default_ceiling_daily_trades")]
    pub max_daily_trades: u32,
    #[serde(default = "default_ceiling_correlation")]
    pub max_correlation: f64,
    /// Stop loss is clamped to [min_stop_loss_pct, max_stop_loss_pct]
    #[serde(default = "default_min_stop_loss")]
    pub min_stop_loss_pct: f64,
    #[serde(default = "default_max_stop_loss")]
    pub max_stop_loss_pct: f64,
    #[serde(default = "default_ceiling_take_profit")]
    pub max_take_profit_pct: f64,
    /// Cooling period is clamped to [min_cooling_hours, max_cooling_hours]
    #[serde(default = "default_min_cooling_hours")]
    pub min_cooling_hours: f64,
    #[serde(default = "default_max_cooling_hours")]
    pub max_cooling_hours: f64,
}

fn default_ceiling_position_size() -> f64 {
    0.25
}

fn default_ceiling_exposure() -> f64 {
    0.95
}

fn default_ceiling_daily_trades() -> u32 {
    50
}

fn default_ceiling_correlation() -> f64 {
    0.90
}

fn default_min_stop_loss() -> f64 {
    0.01
}

fn default_max_stop_loss() -> f64 {
    0.20
}

fn default_ceiling_take_profit() -> f64 {
    0.50
}

fn default_min_cooling_hours() -> f64 {
    1.0
}

fn default_max_cooling_hours() -> f64 {
    168.0
}

impl Default for LimitCeilingsConfig {
    fn default() -> Self {
        Self {
            max_position_size: default_ceiling_position_size(),
            max_portfolio_exposure: default_ceiling_exposure(),
            max_daily_trades: default_ceiling_daily_trades(),
            max_correlation: default_ceiling_correlation(),
            min_stop_loss_pct: default_min_stop_loss(),
            max_stop_loss_pct: default_max_stop_loss(),
            max_take_profit_pct: default_ceiling_take_profit(),
            min_cooling_hours: default_min_cooling_hours(),
            max_cooling_hours: default_max_cooling_hours(),
        }
    }
}

/// Thresholds and multiplier for one performance category
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CategoryThreshold {
    pub min_win_rate: f64,
    pub min_sharpe: f64,
    pub multiplier: f64,
}

/// Dynamic risk limiter configuration
///
/// Category thresholds are tested best-first; `bad` is the fall-through
/// category and only carries a multiplier.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskLimitsConfig {
    #[serde(default)]
    pub base: BaseLimitsConfig,
    #[serde(default)]
    pub ceilings: LimitCeilingsConfig,
    #[serde(default = "default_excellent")]
    pub excellent: CategoryThreshold,
    #[serde(default = "default_good")]
    pub good: CategoryThreshold,
    #[serde(default = "default_average")]
    pub average: CategoryThreshold,
    #[serde(default = "default_poor")]
    pub poor: CategoryThreshold,
    #[serde(default = "default_bad_multiplier")]
    pub bad_multiplier: f64,
    /// Trades at which adjustment confidence saturates
    #[serde(default = "default_confidence_trades")]
    pub confidence_full_trades: f64,
    #[serde(default = "default_max_confidence")]
    pub max_confidence: f64,
}

fn default_excellent() -> CategoryThreshold {
    CategoryThreshold {
        min_win_rate: 0.75,
        min_sharpe: 1.0,
        multiplier: 2.0,
    }
}

fn default_good() -> CategoryThreshold {
    CategoryThreshold {
        min_win_rate: 0.65,
        min_sharpe: 0.5,
        multiplier: 1.5,
    }
}

fn default_average() -> CategoryThreshold {
    CategoryThreshold {
        min_win_rate: 0.55,
        min_sharpe: 0.2,
        multiplier: 1.0,
    }
}

fn default_poor() -> CategoryThreshold {
    CategoryThreshold {
        min_win_rate: 0.45,
        min_sharpe: 0.0,
        multiplier: 0.7,
    }
}

fn default_bad_multiplier() -> f64 {
    0.4
}

fn default_confidence_trades() -> f64 {
    50.0
}

fn default_max_confidence() -> f64 {
    0.95
}

impl Default for RiskLimitsConfig {
    fn default() -> Self {
        Self {
            base: BaseLimitsConfig::default(),
            ceilings: LimitCeilingsConfig::default(),
            excellent: default_excellent(),
            good: default_good(),
            average: default_average(),
            poor: default_poor(),
            bad_multiplier: default_bad_multiplier(),
            confidence_full_trades: default_confidence_trades(),
            max_confidence: default_max_confidence(),
        }
    }
}

/// Kelly sizing configuration
#[derive(Debug, Clone, Deserialize)]
pub struct KellyConfig {
    /// Hard cap on the raw Kelly fraction
    #[serde(default = "default_max_kelly_fraction")]
    pub max_kelly_fraction: f64,
    /// Fractional Kelly multiplier
    #[serde(default = "default_conservative_multiplier")]
    pub conservative_multiplier: f64,
    /// Edge below which the fraction is halved again
    #[serde(default = "default_min_edge_threshold")]
    pub min_edge_threshold: f64,
    /// Daily volatility above which the fraction is scaled down
    #[serde(default = "default_volatility_ceiling")]
    pub volatility_ceiling: f64,
    /// Calendar days of daily bars requested
    #[serde(default = "default_kelly_history_days")]
    pub history_days: i64,
    #[serde(default = "default_min_sample")]
    pub min_winning_days: usize,
    #[serde(default = "default_min_sample")]
    pub min_losing_days: usize,
    #[serde(default = "default_ml_confidence_threshold")]
    pub ml_confidence_threshold: f64,
    /// Largest win-probability nudge from an ML direction prediction
    #[serde(default = "default_max_ml_adjustment")]
    pub max_ml_adjustment: f64,
    /// Total allocation ceiling when sizing several symbols together
    #[serde(default = "default_portfolio_exposure_ceiling")]
    pub portfolio_exposure_ceiling: f64,
    /// Per-position cap when sizing several symbols together
    #[serde(default = "default_max_single_position")]
    pub max_single_position: f64,
}

fn default_max_kelly_fraction() -> f64 {
    0.25
}

fn default_conservative_multiplier() -> f64 {
    0.5
}

fn default_min_edge_threshold() -> f64 {
    0.02
}

fn default_volatility_ceiling() -> f64 {
    0.10
}

fn default_kelly_history_days() -> i64 {
    365
}

fn default_min_sample() -> usize {
    50
}

fn default_ml_confidence_threshold() -> f64 {
    0.6
}

fn default_max_ml_adjustment() -> f64 {
    0.10
}

fn default_portfolio_exposure_ceiling() -> f64 {
    0.8
}

fn default_max_single_position() -> f64 {
    0.15
}

impl Default for KellyConfig {
    fn default() -> Self {
        Self {
            max_kelly_fraction: default_max_kelly_fraction(),
            conservative_multiplier: default_conservative_multiplier(),
            min_edge_threshold: default_min_edge_threshold(),
            volatility_ceiling: default_volatility_ceiling(),
            history_days: default_kelly_history_days(),
            min_winning_days: default_min_sample(),
            min_losing_days: default_min_sample(),
            ml_confidence_threshold: default_ml_confidence_threshold(),
            max_ml_adjustment: default_max_ml_adjustment(),
            portfolio_exposure_ceiling: default_portfolio_exposure_ceiling(),
            max_single_position: default_max_single_position(),
        }
    }
}

/// Cutoffs for one EV recommendation tier
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct EvTierThreshold {
    pub min_expected_value: f64,
    pub min_sharpe: f64,
    pub max_loss_probability: f64,
    pub min_confidence: f64,
}

/// Expected-value scenario engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExpectedValueConfig {
    #[serde(default = "default_horizon_days")]
    pub time_horizon_days: usize,
    /// Calendar days of daily bars requested
    #[serde(default = "default_ev_history_days")]
    pub history_days: i64,
    /// Minimum bars required to build scenarios
    #[serde(default = "default_min_history_bars")]
    pub min_history_bars: usize,
    /// Prior probabilities for bear, normal-down, sideways, normal-up, bull
    #[serde(default = "default_scenario_probabilities")]
    pub scenario_probabilities: [f64; 5],
    /// Percentiles (0-100) of the horizon-return distribution per scenario
    #[serde(default = "default_scenario_percentiles")]
    pub scenario_percentiles: [f64; 5],
    #[serde(default = "default_ml_confidence_threshold")]
    pub ml_confidence_threshold: f64,
    /// Multiplier applied to outcomes the prediction agrees with
    #[serde(default = "default_ml_amplification")]
    pub ml_amplification: f64,
    /// Multiplier applied to outcomes the prediction disagrees with
    #[serde(default = "default_ml_dampening")]
    pub ml_dampening: f64,
    /// Variance penalty in risk-adjusted EV
    #[serde(default = "default_risk_aversion")]
    pub risk_aversion: f64,
    #[serde(default = "default_annual_risk_free_rate")]
    pub annual_risk_free_rate: f64,
    #[serde(default = "default_trading_days_per_year")]
    pub trading_days_per_year: f64,
    #[serde(default = "default_ev_strong_buy")]
    pub strong_buy: EvTierThreshold,
    #[serde(default = "default_ev_buy")]
    pub buy: EvTierThreshold,
    /// EV above which the recommendation is hold rather than avoid
    #[serde(default = "default_hold_floor")]
    pub hold_floor: f64,
    /// EV above which the recommendation is avoid rather than sell
    #[serde(default = "default_avoid_floor")]
    pub avoid_floor: f64,
}

fn default_horizon_days() -> usize {
    30
}

fn default_ev_history_days() -> i64 {
    730
}

fn default_min_history_bars() -> usize {
    100
}

fn default_scenario_probabilities() -> [f64; 5] {
    [0.05, 0.15, 0.60, 0.15, 0.05]
}

fn default_scenario_percentiles() -> [f64; 5] {
    [5.0, 25.0, 50.0, 75.0, 95.0]
}

fn default_ml_amplification() -> f64 {
    1.2
}

fn default_ml_dampening() -> f64 {
    0.8
}

fn default_risk_aversion() -> f64 {
    0.5
}

fn default_annual_risk_free_rate() -> f64 {
    0.02
}

fn default_trading_days_per_year() -> f64 {
    252.0
}

fn default_ev_strong_buy() -> EvTierThreshold {
    EvTierThreshold {
        min_expected_value: 0.10,
        min_sharpe: 1.5,
        max_loss_probability: 0.3,
        min_confidence: 0.7,
    }
}

fn default_ev_buy() -> EvTierThreshold {
    EvTierThreshold {
        min_expected_value: 0.03,
        min_sharpe: 0.5,
        max_loss_probability: 0.4,
        min_confidence: 0.3,
    }
}

fn default_hold_floor() -> f64 {
    -0.02
}

fn default_avoid_floor() -> f64 {
    -0.05
}

impl Default for ExpectedValueConfig {
    fn default() -> Self {
        Self {
            time_horizon_days: default_horizon_days(),
            history_days: default_ev_history_days(),
            min_history_bars: default_min_history_bars(),
            scenario_probabilities: default_scenario_probabilities(),
            scenario_percentiles: default_scenario_percentiles(),
            ml_confidence_threshold: default_ml_confidence_threshold(),
            ml_amplification: default_ml_amplification(),
            ml_dampening: default_ml_dampening(),
            risk_aversion: default_risk_aversion(),
            annual_risk_free_rate: default_annual_risk_free_rate(),
            trading_days_per_year: default_trading_days_per_year(),
            strong_buy: default_ev_strong_buy(),
            buy: default_ev_buy(),
            hold_floor: default_hold_floor(),
            avoid_floor: default_avoid_floor(),
        }
    }
}

/// Portfolio manager configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PortfolioConfig {
    /// Symbols analyzed concurrently
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Timeout for one external data fetch
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    /// Timeout for the whole per-symbol analysis
    #[serde(default = "default_symbol_timeout")]
    pub symbol_timeout_secs: u64,
    /// EV above which a double buy signal becomes a full-size entry
    #[serde(default = "default_strong_ev_threshold")]
    pub strong_ev_threshold: f64,
    /// EV above which a mixed signal becomes a half-size entry
    #[serde(default = "default_moderate_ev_threshold")]
    pub moderate_ev_threshold: f64,
    /// EV below which either source forces avoid
    #[serde(default = "default_avoid_ev_threshold")]
    pub avoid_ev_threshold: f64,
    /// Loss probability above which strong_buy is never issued
    #[serde(default = "default_strong_buy_max_loss_probability")]
    pub strong_buy_max_loss_probability: f64,
    /// Fraction of portfolio above which a position is oversized
    #[serde(default = "default_oversized_position")]
    pub oversized_position: f64,
    /// Position change (fraction of portfolio) counted as large
    #[serde(default = "default_large_change")]
    pub large_change_fraction: f64,
    /// Share of recommendations with large changes that triggers rebalancing
    #[serde(default = "default_rebalance_share")]
    pub rebalance_share: f64,
}

fn default_max_concurrency() -> usize {
    5
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_symbol_timeout() -> u64 {
    90
}

fn default_strong_ev_threshold() -> f64 {
    0.03
}

fn default_moderate_ev_threshold() -> f64 {
    0.01
}

fn default_avoid_ev_threshold() -> f64 {
    -0.01
}

/// Loss probability above which strong_buy is never issued, whatever the configuration
pub const STRONG_BUY_LOSS_PROBABILITY_LIMIT: f64 = 0.6;

fn default_strong_buy_max_loss_probability() -> f64 {
    STRONG_BUY_LOSS_PROBABILITY_LIMIT
}

fn default_oversized_position() -> f64 {
    0.15
}

fn default_large_change() -> f64 {
    0.05
}

fn default_rebalance_share() -> f64 {
    0.3
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            fetch_timeout_secs: default_fetch_timeout(),
            symbol_timeout_secs: default_symbol_timeout(),
            strong_ev_threshold: default_strong_ev_threshold(),
            moderate_ev_threshold: default_moderate_ev_threshold(),
            avoid_ev_threshold: default_avoid_ev_threshold(),
            strong_buy_max_loss_probability: default_strong_buy_max_loss_probability(),
            oversized_position: default_oversized_position(),
            large_change_fraction: default_large_change(),
            rebalance_share: default_rebalance_share(),
        }
    }
}

/// Analysis cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: i64,
}

fn default_cache_capacity() -> usize {
    500
}

fn default_cache_ttl() -> i64 {
    900 // 15 minutes
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            ttl_seconds: default_cache_ttl(),
        }
    }
}

/// Historical bar source configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MarketDataConfig {
    /// Directory holding `<SYMBOL>.json` bar files
    #[serde(default = "default_bars_dir")]
    pub bars_dir: PathBuf,
}

fn default_bars_dir() -> PathBuf {
    PathBuf::from("data/bars")
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            bars_dir: default_bars_dir(),
        }
    }
}

/// ML prediction service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PredictionsConfig {
    /// Base URL of the prediction service; predictions are skipped when unset
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_prediction_timeout")]
    pub timeout_ms: u64,
}

fn default_prediction_timeout() -> u64 {
    5000
}

impl Default for PredictionsConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: default_prediction_timeout(),
        }
    }
}

/// Audit log configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Persist audit events to SQLite (otherwise they are only logged)
    #[serde(default)]
    pub persist: bool,
    #[serde(default)]
    pub database: DatabaseConfig,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            persist: false,
            database: DatabaseConfig::default(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/audit.db")
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (SIZING_*)
    /// 2. config/config.yaml (if exists)
    /// 3. config.yaml (if exists)
    /// 4. Default values
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("performance.lookback_days", default_lookback_days())?
            .set_default("portfolio.max_concurrency", default_max_concurrency() as i64)?
            .set_default("portfolio.fetch_timeout_secs", default_fetch_timeout() as i64)?
            .set_default("cache.ttl_seconds", default_cache_ttl())?
            .add_source(File::with_name("config").required(false))
            .add_source(File::with_name("config/config").required(false))
            // SIZING_KELLY__MAX_KELLY_FRACTION=0.2 -> kelly.max_kelly_fraction = 0.2
            .add_source(
                Environment::with_prefix("SIZING")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ev = &self.expected_value;
        let prob_sum: f64 = ev.scenario_probabilities.iter().sum();
        if (prob_sum - 1.0).abs() > 1e-9 {
            return Err(ConfigError::Message(format!(
                "Scenario probabilities must sum to 1.0 (got {:.6})",
                prob_sum
            )));
        }
        if ev.scenario_probabilities.iter().any(|p| *p <= 0.0) {
            return Err(ConfigError::Message(
                "Scenario probabilities must be positive".to_string(),
            ));
        }
        if !ev
            .scenario_percentiles
            .windows(2)
            .all(|w| w[0] < w[1])
            || ev.scenario_percentiles[0] < 0.0
            || ev.scenario_percentiles[4] > 100.0
        {
            return Err(ConfigError::Message(
                "Scenario percentiles must be strictly increasing within 0-100".to_string(),
            ));
        }
        if ev.time_horizon_days == 0 {
            return Err(ConfigError::Message(
                "Time horizon must be at least one day".to_string(),
            ));
        }

        let rl = &self.risk_limits;
        let multipliers = [
            rl.excellent.multiplier,
            rl.good.multiplier,
            rl.average.multiplier,
            rl.poor.multiplier,
            rl.bad_multiplier,
        ];
        if !multipliers.windows(2).all(|w| w[0] >= w[1]) || rl.bad_multiplier <= 0.0 {
            return Err(ConfigError::Message(
                "Performance category multipliers must be positive and ordered best to worst"
                    .to_string(),
            ));
        }
        let ceilings = &rl.ceilings;
        for (name, value) in [
            ("max_position_size", ceilings.max_position_size),
            ("max_portfolio_exposure", ceilings.max_portfolio_exposure),
            ("max_correlation", ceilings.max_correlation),
        ] {
            if value <= 0.0 || value > 1.0 {
                return Err(ConfigError::Message(format!(
                    "Ceiling {} must be within (0, 1]",
                    name
                )));
            }
        }
        if ceilings.min_stop_loss_pct > ceilings.max_stop_loss_pct
            || ceilings.min_cooling_hours > ceilings.max_cooling_hours
        {
            return Err(ConfigError::Message(
                "Limit floors must not exceed their ceilings".to_string(),
            ));
        }

        let kelly = &self.kelly;
        if kelly.max_kelly_fraction <= 0.0 || kelly.max_kelly_fraction > 1.0 {
            return Err(ConfigError::Message(
                "Kelly max fraction must be within (0, 1]".to_string(),
            ));
        }
        if kelly.conservative_multiplier <= 0.0 || kelly.conservative_multiplier > 1.0 {
            return Err(ConfigError::Message(
                "Kelly conservative multiplier must be within (0, 1]".to_string(),
            ));
        }

        if self.portfolio.max_concurrency == 0 {
            return Err(ConfigError::Message(
                "Portfolio max_concurrency must be at least 1".to_string(),
            ));
        }
        let loss_cap = self.portfolio.strong_buy_max_loss_probability;
        if !(0.0..=STRONG_BUY_LOSS_PROBABILITY_LIMIT).contains(&loss_cap) {
            return Err(ConfigError::Message(format!(
                "strong_buy_max_loss_probability must be within [0, {}] (got {})",
                STRONG_BUY_LOSS_PROBABILITY_LIMIT, loss_cap
            )));
        }

        Ok(())
    }
}
