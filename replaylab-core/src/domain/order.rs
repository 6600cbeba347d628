//! Orders and their lifecycle states.

use super::signal::{OrderKind, Side};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ledger-assigned order identifier. Monotonic within one replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// OCO group identifier for bracket children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OcoGroupId(pub u64);

/// Order lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Filled,
    Cancelled,
}

/// Why an order exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderRole {
    /// Submitted from a strategy signal.
    Entry,
    /// Protective stop spawned by an entry fill.
    StopLoss,
    /// Protective target spawned by an entry fill.
    TakeProfit,
}

/// A single order in the book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub symbol: String,
    pub side: Side,
    pub kind: OrderKind,
    pub quantity: f64,
    /// Limit price (limit and stop-limit orders).
    pub price: Option<f64>,
    /// Trigger price (stop and stop-limit orders).
    pub stop_price: Option<f64>,
    pub submitted_bar: usize,
    pub status: OrderStatus,
    pub role: OrderRole,
    /// Protective levels to attach when this entry fills.
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub tag: Option<String>,
    pub oco_group: Option<OcoGroupId>,
    /// Stop-limit orders arm once the stop is crossed and stay armed.
    pub triggered: bool,
    pub filled_bar: Option<usize>,
    pub fill_price: Option<f64>,
    pub cancel_reason: Option<String>,
}

impl Order {
    pub fn is_pending(&self) -> bool {
        self.status == OrderStatus::Pending
    }

    /// Signed quantity: positive for buys, negative for sells.
    pub fn signed_quantity(&self) -> f64 {
        self.side.sign() * self.quantity
    }
}
