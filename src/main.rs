//! Sizing Operator - portfolio risk and position sizing
//!
//! Runs one dry-run portfolio analysis and prints the report as JSON.
//!
//! Usage: sizing_operator --value USD [--holding SYM=USD]... [--trades PATH] SYM...

use anyhow::Context;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sizing_operator::audit::{AuditSink, SqliteAuditLog, TracingAuditSink};
use sizing_operator::config::AppConfig;
use sizing_operator::db;
use sizing_operator::engine::{PortfolioRequest, SizingEngine};
use sizing_operator::market_data::JsonFilePriceSource;
use sizing_operator::metrics::MetricsState;
use sizing_operator::models::TradeDirection;
use sizing_operator::predictions::{HttpPredictionService, NoPredictions, PredictionService};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "Usage: sizing_operator --value USD [--holding SYM=USD]... [--trades PATH] SYM...
  --value USD         Total portfolio value in dollars
  --holding SYM=USD   Current dollar position in SYM (repeatable)
  --trades PATH       JSON array of closed trades to seed the performance tracker";

/// Closed trade as read from `--trades`
#[derive(Debug, Deserialize)]
struct ClosedTrade {
    symbol: String,
    entry_price: f64,
    exit_price: f64,
    size: f64,
    entry_time: DateTime<Utc>,
    exit_time: DateTime<Utc>,
    direction: TradeDirection,
}

#[derive(Debug)]
struct CliArgs {
    request: PortfolioRequest,
    trades: Option<PathBuf>,
}

fn parse_args(args: &[String]) -> anyhow::Result<Option<CliArgs>> {
    let mut value: Option<Decimal> = None;
    let mut holdings = Vec::new();
    let mut trades = None;
    let mut symbols = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--value" => {
                let raw = args.get(i + 1).context("--value requires a value")?;
                value = Some(Decimal::from_str(raw).with_context(|| format!("invalid --value {}", raw))?);
                i += 2;
            }
            "--holding" => {
                let raw = args.get(i + 1).context("--holding requires SYM=USD")?;
                let (symbol, amount) = raw
                    .split_once('=')
                    .with_context(|| format!("invalid --holding {}, expected SYM=USD", raw))?;
                let amount =
                    Decimal::from_str(amount).with_context(|| format!("invalid amount in --holding {}", raw))?;
                holdings.push((symbol.to_uppercase(), amount));
                i += 2;
            }
            "--trades" => {
                let raw = args.get(i + 1).context("--trades requires a path")?;
                trades = Some(PathBuf::from(raw));
                i += 2;
            }
            "--help" | "-h" => return Ok(None),
            flag if flag.starts_with("--") => anyhow::bail!("Unknown argument: {}", flag),
            symbol => {
                symbols.push(symbol.to_uppercase());
                i += 1;
            }
        }
    }

    let value = value.context("--value is required")?;

    let mut request = PortfolioRequest::new(symbols, value);
    for (symbol, amount) in holdings {
        request = request.with_holding(&symbol, amount);
    }
    request.validate()?;
    Ok(Some(CliArgs { request, trades }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(cli) = parse_args(&args)? else {
        println!("{}", USAGE);
        return Ok(());
    };

    tracing::info!("Starting Sizing Operator v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;

    let prices = Arc::new(JsonFilePriceSource::new(config.market_data.bars_dir.clone()));
    let predictions: Arc<dyn PredictionService> =
        match HttpPredictionService::from_config(&config.predictions)? {
            Some(service) => Arc::new(service),
            None => {
                tracing::info!("No prediction service configured, ML adjustments disabled");
                Arc::new(NoPredictions)
            }
        };

    let audit_log = if config.audit.persist {
        let pool = db::init_pool(&config.audit.database).await?;
        db::run_migrations(&pool).await?;
        Some(Arc::new(SqliteAuditLog::new(pool)))
    } else {
        None
    };
    let audit: Arc<dyn AuditSink> = match &audit_log {
        Some(log) => log.clone(),
        None => Arc::new(TracingAuditSink),
    };

    let metrics = Arc::new(MetricsState::new()?);
    let engine = SizingEngine::new(&config, prices, predictions, audit, Some(metrics.clone()));

    if let Some(path) = &cli.trades {
        let raw = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let trades: Vec<ClosedTrade> = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        for t in &trades {
            engine.tracker.record_trade(
                &t.symbol,
                t.entry_price,
                t.exit_price,
                t.size,
                t.entry_time,
                t.exit_time,
                t.direction,
            );
        }
        tracing::info!(trades = trades.len(), "Performance history loaded");
    }

    let report = engine
        .manager
        .analyze_portfolio_with_risk_management(&cli.request)
        .await;

    println!("{}", serde_json::to_string_pretty(&report)?);

    let rendered = metrics.render()?;
    tracing::debug!(metrics = %rendered, "Run metrics");

    if let Some(log) = audit_log {
        log.flush().await;
        log.pool().close().await;
    }

    Ok(())
}

/// Initialize tracing subscriber with JSON output
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sizing_operator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();
}

/// Load and validate configuration
fn load_config() -> anyhow::Result<AppConfig> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = AppConfig::load().map_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration validation failed: {}", e))?;

    Ok(config)
}
