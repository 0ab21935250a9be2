//! ML prediction service client
//!
//! Predictions are best-effort. A missing, failed or low-confidence
//! prediction only skips the ML adjustment step of an analysis.

use crate::config::PredictionsConfig;
use crate::error::DataError;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// A predicted value with its confidence (0-1)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionSignal {
    pub value: f64,
    pub confidence: f64,
}

/// Predictions for one symbol and horizon
///
/// - `price`: predicted fractional price change over the horizon
/// - `direction`: probability of an up move
/// - `volatility`: predicted volatility over the horizon
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MlPrediction {
    #[serde(default)]
    pub price: Option<PredictionSignal>,
    #[serde(default)]
    pub direction: Option<PredictionSignal>,
    #[serde(default)]
    pub volatility: Option<PredictionSignal>,
}

impl MlPrediction {
    /// Direction signal whose confidence exceeds `threshold`
    pub fn confident_direction(&self, threshold: f64) -> Option<PredictionSignal> {
        self.direction.filter(|d| d.confidence > threshold)
    }
}

#[async_trait]
pub trait PredictionService: Send + Sync {
    async fn predict(&self, symbol: &str, horizon_days: usize) -> Result<MlPrediction, DataError>;
}

/// Service that never predicts anything
pub struct NoPredictions;

#[async_trait]
impl PredictionService for NoPredictions {
    async fn predict(&self, _symbol: &str, _horizon_days: usize) -> Result<MlPrediction, DataError> {
        Ok(MlPrediction::default())
    }
}

/// Fixed predictions per symbol
#[derive(Default)]
pub struct StaticPredictions {
    predictions: RwLock<HashMap<String, MlPrediction>>,
}

impl StaticPredictions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, symbol: &str, prediction: MlPrediction) {
        self.predictions.write().insert(symbol.to_string(), prediction);
    }
}

#[async_trait]
impl PredictionService for StaticPredictions {
    async fn predict(&self, symbol: &str, _horizon_days: usize) -> Result<MlPrediction, DataError> {
        Ok(self
            .predictions
            .read()
            .get(symbol)
            .cloned()
            .unwrap_or_default())
    }
}

/// HTTP client for a prediction service exposing
/// `GET {base_url}/predict/{symbol}?horizon_days=N` returning [`MlPrediction`]
pub struct HttpPredictionService {
    client: reqwest::Client,
    base_url: String,
    timeout_ms: u64,
}

impl HttpPredictionService {
    pub fn new(base_url: &str, timeout_ms: u64) -> Result<Self, DataError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| DataError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_ms,
        })
    }

    /// Build from configuration; `None` when no base URL is configured
    pub fn from_config(config: &PredictionsConfig) -> Result<Option<Self>, DataError> {
        match config.base_url.as_deref() {
            Some(url) if !url.is_empty() => Ok(Some(Self::new(url, config.timeout_ms)?)),
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl PredictionService for HttpPredictionService {
    async fn predict(&self, symbol: &str, horizon_days: usize) -> Result<MlPrediction, DataError> {
        let url = format!("{}/predict/{}", self.base_url, symbol);
        let response = self
            .client
            .get(&url)
            .query(&[("horizon_days", horizon_days)])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DataError::Timeout(self.timeout_ms.div_ceil(1000))
                } else {
                    DataError::Transport(e.to_string())
                }
            })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(DataError::NotFound(symbol.to_string()));
        }
        let response = response
            .error_for_status()
            .map_err(|e| DataError::Transport(e.to_string()))?;

        response
            .json::<MlPrediction>()
            .await
            .map_err(|e| DataError::Parse(e.to_string()))
    }
}

/// Fetch a prediction, treating any failure as absence
pub async fn best_effort(
    service: &dyn PredictionService,
    symbol: &str,
    horizon_days: usize,
) -> Option<MlPrediction> {
    match service.predict(symbol, horizon_days).await {
        Ok(prediction) => Some(prediction),
        Err(e) => {
            tracing::warn!(symbol, error = %e, "Prediction unavailable, skipping ML adjustment");
            None
        }
    }
}
