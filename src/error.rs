//! Error types for the sizing operator

use thiserror::Error;

/// Application-level errors
///
/// These indicate a setup problem (bad configuration, unreachable audit
/// database) and propagate to the caller.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// Failure of an external data collaborator (price history, predictions)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    /// No data exists for the symbol
    #[error("No data for symbol {0}")]
    NotFound(String),

    /// Response could not be decoded
    #[error("Malformed data: {0}")]
    Parse(String),

    /// Transport failure
    #[error("Request failed: {0}")]
    Transport(String),

    /// Call exceeded its timeout
    #[error("Timed out after {0}s")]
    Timeout(u64),
}

/// Per-symbol analysis failure
///
/// Batch operations turn these into fallback analyses instead of aborting.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// Too few historical days or trades
    #[error("Insufficient data for {symbol}: need {required}, have {available}")]
    InsufficientData {
        symbol: String,
        required: usize,
        available: usize,
    },

    /// Historical data could not be fetched
    #[error("Data unavailable for {symbol}: {source}")]
    DataUnavailable {
        symbol: String,
        #[source]
        source: DataError,
    },

    /// Whole analysis exceeded its timeout
    #[error("timed out after {secs}s")]
    Timeout { symbol: String, secs: u64 },

    /// Invalid numeric input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl AnalysisError {
    pub fn insufficient(symbol: &str, required: usize, available: usize) -> Self {
        Self::InsufficientData {
            symbol: symbol.to_string(),
            required,
            available,
        }
    }
}
