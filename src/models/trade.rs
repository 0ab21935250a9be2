//! Closed trade records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeDirection {
    Long,
    Short,
}

impl std::fmt::Display for TradeDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeDirection::Long => write!(f, "LONG"),
            TradeDirection::Short => write!(f, "SHORT"),
        }
    }
}

impl std::str::FromStr for TradeDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "long" | "buy" => Ok(TradeDirection::Long),
            "short" | "sell" => Ok(TradeDirection::Short),
            _ => Err(format!("Unknown trade direction: {}", s)),
        }
    }
}

/// One closed position
///
/// Immutable once recorded. `return_pct` is a fraction (0.04 = 4%) signed
/// from the trade's perspective, so a short that falls in price is positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: String,
    pub entry_price: f64,
    pub exit_price: f64,
    /// Units held
    pub size: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub direction: TradeDirection,
    pub return_pct: f64,
    /// Profit in quote currency
    pub profit: f64,
    pub holding_hours: f64,
}

impl TradeRecord {
    /// Build a record, deriving return, profit and holding period
    pub fn new(
        symbol: &str,
        entry_price: f64,
        exit_price: f64,
        size: f64,
        entry_time: DateTime<Utc>,
        exit_time: DateTime<Utc>,
        direction: TradeDirection,
    ) -> Self {
        let price_move = match direction {
            TradeDirection::Long => exit_price - entry_price,
            TradeDirection::Short => entry_price - exit_price,
        };
        let return_pct = if entry_price > 0.0 {
            price_move / entry_price
        } else {
            0.0
        };
        let holding_hours =
            exit_time.signed_duration_since(entry_time).num_seconds() as f64 / 3600.0;

        Self {
            symbol: symbol.to_string(),
            entry_price,
            exit_price,
            size,
            entry_time,
            exit_time,
            direction,
            return_pct,
            profit: price_move * size,
            holding_hours: holding_hours.max(0.0),
        }
    }

    pub fn is_win(&self) -> bool {
        self.return_pct > 0.0
    }

    pub fn is_loss(&self) -> bool {
        self.return_pct < 0.0
    }
}
