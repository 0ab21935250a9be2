//! Prometheus metrics for the sizing operator
//!
//! - Per-component analysis and failure counters
//! - Entry veto counter
//! - Recommendations by action
//! - Analysis latency histogram
//! - Last portfolio score and recommended exposure

use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};

/// Metrics state
pub struct MetricsState {
    /// Prometheus registry
    registry: Registry,
    /// Completed analyses by component (`kelly`, `ev`, `symbol`)
    pub analyses_total: IntCounterVec,
    /// Failed analyses by component
    pub analysis_failures_total: IntCounterVec,
    /// Entries vetoed by the risk limiter
    pub entry_vetoes_total: IntCounter,
    /// Recommendations by action
    pub recommendations_total: IntCounterVec,
    /// Per-symbol analysis latency in milliseconds
    pub analysis_latency: Histogram,
    /// Portfolio score of the last run (0-100)
    pub portfolio_score: Gauge,
    /// Recommended exposure of the last run as a fraction of portfolio value
    pub recommended_exposure: Gauge,
}

impl MetricsState {
    /// Create a new metrics state with all metrics registered
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let analyses_total = IntCounterVec::new(
            Opts::new("sizing_analyses_total", "Completed analyses by component"),
            &["component"],
        )?;
        registry.register(Box::new(analyses_total.clone()))?;

        let analysis_failures_total = IntCounterVec::new(
            Opts::new(
                "sizing_analysis_failures_total",
                "Analyses that fell back to neutral values, by component",
            ),
            &["component"],
        )?;
        registry.register(Box::new(analysis_failures_total.clone()))?;

        let entry_vetoes_total = IntCounter::with_opts(Opts::new(
            "sizing_entry_vetoes_total",
            "Entries rejected by the dynamic risk limiter",
        ))?;
        registry.register(Box::new(entry_vetoes_total.clone()))?;

        let recommendations_total = IntCounterVec::new(
            Opts::new("sizing_recommendations_total", "Position recommendations by action"),
            &["action"],
        )?;
        registry.register(Box::new(recommendations_total.clone()))?;

        let analysis_latency = Histogram::with_opts(
            HistogramOpts::new(
                "sizing_analysis_latency_ms",
                "Per-symbol analysis latency in milliseconds",
            )
            .buckets(vec![10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0, 30000.0]),
        )?;
        registry.register(Box::new(analysis_latency.clone()))?;

        let portfolio_score = Gauge::with_opts(Opts::new(
            "sizing_portfolio_score",
            "Portfolio score of the last analysis run",
        ))?;
        registry.register(Box::new(portfolio_score.clone()))?;

        let recommended_exposure = Gauge::with_opts(Opts::new(
            "sizing_recommended_exposure",
            "Recommended total exposure as a fraction of portfolio value",
        ))?;
        registry.register(Box::new(recommended_exposure.clone()))?;

        Ok(Self {
            registry,
            analyses_total,
            analysis_failures_total,
            entry_vetoes_total,
            recommendations_total,
            analysis_latency,
            portfolio_score,
            recommended_exposure,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition of all registered metrics
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
