//! Buy-and-hold: one default-sized market buy on the first bar, then hold.

use crate::domain::Signal;
use crate::strategy::{Capabilities, OrderRequest, Strategy, StrategyContext};

#[derive(Debug, Clone, Default)]
pub struct BuyAndHold {
    entered: bool,
}

impl BuyAndHold {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Strategy for BuyAndHold {
    fn name(&self) -> &str {
        "buy_and_hold"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            init: true,
            ..Capabilities::NONE
        }
    }

    fn init(&mut self, _ctx: &mut StrategyContext<'_>) {
        self.entered = false;
    }

    fn on_bar(&mut self, ctx: &mut StrategyContext<'_>) -> Vec<Signal> {
        if self.entered {
            return Vec::new();
        }
        self.entered = true;
        vec![ctx.buy(OrderRequest::market().tag("buy_and_hold"))]
    }
}
