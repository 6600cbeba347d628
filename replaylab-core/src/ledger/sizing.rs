//! Default sizing: quantity for signals that leave it unspecified.
//!
//! Sizers are equity-aware but signal-agnostic: they never change the side or
//! kind of an order, only how much of it to trade.

use serde::{Deserialize, Serialize};

/// How the ledger sizes a signal whose quantity is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SizingPolicy {
    /// Always trade this many units.
    FixedQuantity { quantity: f64 },

    /// Trade this cash notional at the reference price.
    FixedCash { amount: f64 },

    /// Trade this fraction (0–1] of current equity at the reference price.
    PercentEquity { fraction: f64 },
}

impl Default for SizingPolicy {
    fn default() -> Self {
        Self::PercentEquity { fraction: 1.0 }
    }
}

impl SizingPolicy {
    /// Quantity to trade for the given equity and reference price.
    ///
    /// Rounds down to whole units unless `fractional` is set. Returns 0.0 when
    /// no positive size fits (non-positive equity or price).
    pub fn size(&self, equity: f64, price: f64, fractional: bool) -> f64 {
        let raw = match *self {
            Self::FixedQuantity { quantity } => quantity,
            Self::FixedCash { amount } => {
                if price <= 0.0 {
                    return 0.0;
                }
                amount / price
            }
            Self::PercentEquity { fraction } => {
                if price <= 0.0 || equity <= 0.0 {
                    return 0.0;
                }
                equity * fraction / price
            }
        };

        if !raw.is_finite() || raw <= 0.0 {
            return 0.0;
        }
        if fractional {
            raw
        } else {
            raw.floor()
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::FixedQuantity { .. } => "FixedQuantity",
            Self::FixedCash { .. } => "FixedCash",
            Self::PercentEquity { .. } => "PercentEquity",
        }
    }

    /// True if the policy's parameters can produce a positive size.
    pub fn is_valid(&self) -> bool {
        match *self {
            Self::FixedQuantity { quantity } => quantity.is_finite() && quantity > 0.0,
            Self::FixedCash { amount } => amount.is_finite() && amount > 0.0,
            Self::PercentEquity { fraction } => fraction.is_finite() && fraction > 0.0 && fraction <= 1.0,
        }
    }
}
