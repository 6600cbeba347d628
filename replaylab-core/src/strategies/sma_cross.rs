//! SMA crossover: long while the fast SMA is above the slow SMA.
//!
//! Buys when the fast SMA crosses from at-or-below to above the slow SMA while
//! flat; closes when it crosses back below while long. Each cross compares the
//! previous bar's averages with the current bar's, so the first decision needs
//! `slow_period + 1` bars.

use crate::domain::Signal;
use crate::indicators::sma;
use crate::strategy::{OrderRequest, ParamSpec, Strategy, StrategyContext};

#[derive(Debug, Clone, Default)]
pub struct SmaCrossover;

impl SmaCrossover {
    pub fn new() -> Self {
        Self
    }
}

impl Strategy for SmaCrossover {
    fn name(&self) -> &str {
        "sma_cross"
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::new("fast_period", 10.0),
            ParamSpec::new("slow_period", 30.0),
        ]
    }

    fn on_bar(&mut self, ctx: &mut StrategyContext<'_>) -> Vec<Signal> {
        let fast = ctx.period("fast_period", 10);
        let slow = ctx.period("slow_period", 30);
        if ctx.index() < fast.max(slow) {
            return Vec::new();
        }

        let bars = ctx.bars();
        let prev = &bars[..bars.len() - 1];
        let (prev_fast, prev_slow) = (sma(prev, fast), sma(prev, slow));
        let (fast_now, slow_now) = (sma(bars, fast), sma(bars, slow));

        let crossed_up = prev_fast <= prev_slow && fast_now > slow_now;
        let crossed_down = prev_fast >= prev_slow && fast_now < slow_now;

        if crossed_up && ctx.is_flat() {
            ctx.log(format!("fast {fast_now:.4} crossed above slow {slow_now:.4}"));
            return vec![ctx.buy(OrderRequest::market().tag("sma_cross_up"))];
        }
        if crossed_down && ctx.is_long() {
            return ctx
                .close()
                .map(|s| s.with_tag("sma_cross_down"))
                .into_iter()
                .collect();
        }
        Vec::new()
    }
}
