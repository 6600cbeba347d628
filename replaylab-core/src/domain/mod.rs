//! Domain types for replaylab

pub mod bar;
pub mod equity;
pub mod order;
pub mod position;
pub mod signal;
pub mod trade;

pub use bar::{is_ordered, Bar};
pub use equity::EquityPoint;
pub use order::{OcoGroupId, Order, OrderId, OrderRole, OrderStatus};
pub use position::{Position, FLAT_EPSILON};
pub use signal::{OrderKind, Side, Signal};
pub use trade::{Trade, TradeReason};

/// Symbol type alias
pub type Symbol = String;
