//! Plain data models shared across the sizing engine

pub mod recommendation;
pub mod trade;

pub use recommendation::{Recommendation, RiskLevel};
pub use trade::{TradeDirection, TradeRecord};

use rust_decimal::prelude::*;

/// Convert a dollar amount to a cent-rounded Decimal
pub fn usd(amount: f64) -> Decimal {
    Decimal::from_f64_retain(amount)
        .unwrap_or(Decimal::ZERO)
        .round_dp(2)
}

/// Convert a Decimal amount back to f64 for ratio arithmetic
pub fn to_f64(amount: Decimal) -> f64 {
    amount.to_f64().unwrap_or(0.0)
}
