//! Signals: a strategy's proposed trading action for one bar.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// +1.0 for buys, -1.0 for sells.
    pub fn sign(self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }

    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// What kind of order a signal asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    /// Fill at the next bar's open.
    Market,
    /// Fill at `price` or better once the bar range crosses it.
    Limit,
    /// Fill as market once the bar range crosses `stop_price`.
    Stop,
    /// Arm at `stop_price`, then fill under the `price` limit rule.
    StopLimit,
}

/// A proposed trading action, produced by a strategy decision.
///
/// `quantity: None` means the ledger's default sizing policy decides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub side: Side,
    pub kind: OrderKind,
    pub quantity: Option<f64>,
    pub price: Option<f64>,
    pub stop_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub tag: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Signal {
    /// A market signal with default sizing and no attachments.
    pub fn market(symbol: impl Into<String>, side: Side, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            kind: OrderKind::Market,
            quantity: None,
            price: None,
            stop_price: None,
            stop_loss: None,
            take_profit: None,
            tag: None,
            timestamp,
        }
    }

    pub fn with_quantity(mut self, quantity: f64) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}
