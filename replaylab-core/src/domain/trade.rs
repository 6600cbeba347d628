//! Trade: the realized result of one order fill.

use super::order::OrderId;
use super::signal::Side;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a fill did to the position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeReason {
    /// Opened a position from flat.
    Entry,
    /// Added to an existing position in the same direction.
    ScaleIn,
    /// Reduced a position without closing it.
    Reduce,
    /// Closed the position back to flat.
    Exit,
    /// Closed the position and opened the opposite one.
    Reversal,
    /// Protective stop filled.
    StopLoss,
    /// Protective target filled.
    TakeProfit,
}

/// One fill, with the realized PnL of the portion that closed exposure.
///
/// Opening fills carry `pnl = -commission`. `entry_price` / `entry_time` refer to
/// the position being closed when the fill reduces exposure, and to the fill
/// itself otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub order_id: OrderId,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: f64,
    pub pnl: f64,
    pub commission: f64,
    pub reason: TradeReason,
    pub bar_index: usize,
    pub tag: Option<String>,
}

impl Trade {
    /// Signed quantity: positive for buys, negative for sells.
    pub fn signed_quantity(&self) -> f64 {
        self.side.sign() * self.quantity
    }

    /// True if this fill closed some exposure (its PnL is realized).
    pub fn is_realized(&self) -> bool {
        !matches!(self.reason, TradeReason::Entry | TradeReason::ScaleIn)
    }

    pub fn is_winner(&self) -> bool {
        self.pnl > 0.0
    }
}
