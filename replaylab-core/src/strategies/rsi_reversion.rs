//! RSI mean reversion: buy oversold, exit overbought.

use crate::domain::Signal;
use crate::indicators::rsi;
use crate::strategy::{OrderRequest, ParamSpec, Strategy, StrategyContext};

#[derive(Debug, Clone, Default)]
pub struct RsiReversion;

impl RsiReversion {
    pub fn new() -> Self {
        Self
    }
}

impl Strategy for RsiReversion {
    fn name(&self) -> &str {
        "rsi_reversion"
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::new("period", 14.0),
            ParamSpec::new("oversold", 30.0),
            ParamSpec::new("overbought", 70.0),
        ]
    }

    fn on_bar(&mut self, ctx: &mut StrategyContext<'_>) -> Vec<Signal> {
        let period = ctx.period("period", 14);
        if ctx.bars().len() < period + 1 {
            return Vec::new();
        }
        let oversold = ctx.param("oversold", 30.0);
        let overbought = ctx.param("overbought", 70.0);
        let value = rsi(ctx.bars(), period);

        if value < oversold && ctx.is_flat() {
            ctx.log(format!("rsi {value:.2} below {oversold}"));
            return vec![ctx.buy(OrderRequest::market().tag("rsi_oversold"))];
        }
        if value > overbought && ctx.is_long() {
            return ctx
                .close()
                .map(|s| s.with_tag("rsi_overbought"))
                .into_iter()
                .collect();
        }
        Vec::new()
    }
}
