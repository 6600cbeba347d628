use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Quantities below this are treated as flat.
pub const FLAT_EPSILON: f64 = 1e-9;

/// Net signed exposure in one symbol. Quantity 0 means flat, not absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: f64,
    pub avg_price: f64,
    pub unrealized_pnl: f64,
    pub realized_pnl: f64,
    pub opened_at: Option<DateTime<Utc>>,
}

impl Position {
    pub fn flat(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            quantity: 0.0,
            avg_price: 0.0,
            unrealized_pnl: 0.0,
            realized_pnl: 0.0,
            opened_at: None,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.quantity.abs() < FLAT_EPSILON
    }

    pub fn is_long(&self) -> bool {
        self.quantity >= FLAT_EPSILON
    }

    pub fn is_short(&self) -> bool {
        self.quantity <= -FLAT_EPSILON
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity * price
    }

    /// Recompute unrealized PnL against `price`.
    pub fn mark(&mut self, price: f64) {
        self.unrealized_pnl = if self.is_flat() {
            0.0
        } else {
            self.quantity * (price - self.avg_price)
        };
    }
}
