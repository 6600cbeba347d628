//! Strategy interface.
//!
//! A strategy has one mandatory decision function, `on_bar`, and three
//! optional hooks. The executor only calls a hook when the strategy declares
//! it in `capabilities()`, so a strategy that does not declare `on_end` never
//! sees that call even if it overrides the method.

pub mod context;
pub mod params;

pub use context::{OrderRequest, StrategyContext};
pub use params::{parse_assignment, ParamSpec, Params};

use crate::domain::{Order, Signal, Trade};
use serde::{Deserialize, Serialize};

/// Which optional hooks a strategy wants called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub init: bool,
    pub order_filled: bool,
    pub end: bool,
}

impl Capabilities {
    pub const NONE: Self = Self {
        init: false,
        order_filled: false,
        end: false,
    };

    pub const ALL: Self = Self {
        init: true,
        order_filled: true,
        end: true,
    };
}

/// A per-bar decision strategy.
///
/// `on_bar` sees only `ctx.bars()` (history up to and including the current
/// bar), so a strategy cannot read the future.
pub trait Strategy: Send {
    fn name(&self) -> &str;

    /// Declared parameters with their defaults.
    fn parameters(&self) -> Vec<ParamSpec> {
        Vec::new()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
    }

    /// Called once before the first bar, bound to bar 0.
    fn init(&mut self, _ctx: &mut StrategyContext<'_>) {}

    /// Decide on the current bar. Returned signals become orders that may fill
    /// from the next bar on.
    fn on_bar(&mut self, ctx: &mut StrategyContext<'_>) -> Vec<Signal>;

    /// Called for every fill, after the ledger has applied it.
    fn on_order_filled(&mut self, _ctx: &mut StrategyContext<'_>, _order: &Order, _trade: &Trade) {}

    /// Called once after the last bar, bound to the final bar.
    fn on_end(&mut self, _ctx: &mut StrategyContext<'_>) {}
}
