//! Per-bar view handed to a strategy.
//!
//! The context exposes history up to the current bar only, a snapshot of the
//! ledger marked at the bar's close, and the strategy's action methods. `buy`,
//! `sell` and `close` build signals; the executor turns returned signals into
//! orders. `cancel` and `cancel_all` act on the ledger immediately.

use super::params::{resolve, ParamSpec, Params};
use crate::domain::{Bar, Order, OrderId, OrderKind, Position, Side, Signal};
use crate::ledger::{closing_side, price_map, Ledger};
use chrono::{DateTime, Utc};
use tracing::info;

/// Optional order attributes for `buy` / `sell`.
///
/// The order kind follows from the prices set: limit and stop → stop-limit,
/// limit only → limit, stop only → stop, neither → market.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderRequest {
    pub quantity: Option<f64>,
    pub price: Option<f64>,
    pub stop_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub tag: Option<String>,
}

impl OrderRequest {
    pub fn market() -> Self {
        Self::default()
    }

    pub fn quantity(mut self, quantity: f64) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn limit(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn stop(mut self, stop_price: f64) -> Self {
        self.stop_price = Some(stop_price);
        self
    }

    pub fn stop_loss(mut self, level: f64) -> Self {
        self.stop_loss = Some(level);
        self
    }

    pub fn take_profit(mut self, level: f64) -> Self {
        self.take_profit = Some(level);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn kind(&self) -> OrderKind {
        match (self.price, self.stop_price) {
            (Some(_), Some(_)) => OrderKind::StopLimit,
            (Some(_), None) => OrderKind::Limit,
            (None, Some(_)) => OrderKind::Stop,
            (None, None) => OrderKind::Market,
        }
    }

    fn into_signal(self, symbol: &str, side: Side, timestamp: DateTime<Utc>) -> Signal {
        Signal {
            symbol: symbol.to_string(),
            side,
            kind: self.kind(),
            quantity: self.quantity,
            price: self.price,
            stop_price: self.stop_price,
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
            tag: self.tag,
            timestamp,
        }
    }
}

/// Read/action view bound to one bar of a replay.
pub struct StrategyContext<'a> {
    strategy: &'a str,
    symbol: &'a str,
    index: usize,
    history: &'a [Bar],
    ledger: &'a mut Ledger,
    overrides: &'a Params,
    specs: &'a [ParamSpec],
}

impl<'a> StrategyContext<'a> {
    /// Bind a context to `bars[index]`. `bars` may extend past `index`; the
    /// context only ever exposes `bars[..=index]`.
    ///
    /// # Panics
    /// If `index >= bars.len()`.
    pub fn new(
        strategy: &'a str,
        symbol: &'a str,
        bars: &'a [Bar],
        index: usize,
        ledger: &'a mut Ledger,
        overrides: &'a Params,
        specs: &'a [ParamSpec],
    ) -> Self {
        Self {
            strategy,
            symbol,
            index,
            history: &bars[..=index],
            ledger,
            overrides,
            specs,
        }
    }

    // ── Market data ──

    pub fn bar(&self) -> &Bar {
        &self.history[self.index]
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.bar().timestamp
    }

    pub fn symbol(&self) -> &str {
        self.symbol
    }

    /// All bars up to and including the current one.
    pub fn bars(&self) -> &[Bar] {
        self.history
    }

    /// The last `n` bars including the current one; fewer near the start.
    pub fn lookback(&self, n: usize) -> &[Bar] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }

    /// The bar `n` bars back (`0` is the current bar).
    pub fn bar_ago(&self, n: usize) -> Option<&Bar> {
        self.index.checked_sub(n).map(|i| &self.history[i])
    }

    // ── Portfolio snapshot ──

    /// Equity marked at the current close.
    pub fn equity(&self) -> f64 {
        self.ledger.equity(&price_map(self.symbol, self.bar().close))
    }

    pub fn cash(&self) -> f64 {
        self.ledger.cash()
    }

    pub fn position(&self) -> Option<&Position> {
        self.ledger.position(self.symbol)
    }

    /// Signed position quantity; 0 when flat.
    pub fn position_quantity(&self) -> f64 {
        self.position().map_or(0.0, |p| p.quantity)
    }

    pub fn is_flat(&self) -> bool {
        self.position().map_or(true, Position::is_flat)
    }

    pub fn is_long(&self) -> bool {
        self.position().is_some_and(Position::is_long)
    }

    pub fn is_short(&self) -> bool {
        self.position().is_some_and(Position::is_short)
    }

    pub fn open_orders(&self) -> Vec<&Order> {
        self.ledger.pending_orders()
    }

    // ── Actions ──

    pub fn buy(&self, request: OrderRequest) -> Signal {
        request.into_signal(self.symbol, Side::Buy, self.timestamp())
    }

    pub fn sell(&self, request: OrderRequest) -> Signal {
        request.into_signal(self.symbol, Side::Sell, self.timestamp())
    }

    /// Market signal that flattens the current position, or `None` when flat.
    pub fn close(&self) -> Option<Signal> {
        let quantity = self.position().filter(|p| !p.is_flat())?.quantity;
        Some(
            Signal::market(self.symbol, closing_side(quantity), self.timestamp())
                .with_quantity(quantity.abs()),
        )
    }

    pub fn cancel(&mut self, id: OrderId) -> bool {
        self.ledger.cancel_order(id)
    }

    pub fn cancel_all(&mut self) -> usize {
        self.ledger.cancel_all_orders()
    }

    /// User override, then declared default, then `default`.
    pub fn param(&self, name: &str, default: f64) -> f64 {
        resolve(self.overrides, self.specs, name, default)
    }

    /// Integer parameter, clamped to at least 1.
    pub fn period(&self, name: &str, default: usize) -> usize {
        let value = self.param(name, default as f64);
        if value.is_finite() && value >= 1.0 {
            value as usize
        } else {
            1
        }
    }

    pub fn log(&self, message: impl AsRef<str>) {
        info!(
            target: "replaylab::strategy",
            strategy = self.strategy,
            bar = self.index,
            "{}",
            message.as_ref()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::indicators::make_bars;

    fn with_ctx<R>(ledger: &mut Ledger, index: usize, f: impl FnOnce(&mut StrategyContext<'_>) -> R) -> R {
        let bars = make_bars(&[10.0, 11.0, 12.0, 13.0, 14.0]);
        let overrides = Params::from([("fast_period".to_string(), 3.0)]);
        let specs = vec![ParamSpec::new("fast_period", 10.0), ParamSpec::new("slow_period", 30.0)];
        let mut ctx = StrategyContext::new("test", "TEST", &bars, index, ledger, &overrides, &specs);
        f(&mut ctx)
    }

    #[test]
    fn history_stops_at_current_bar() {
        let mut ledger = Ledger::new(EngineConfig::default());
        with_ctx(&mut ledger, 2, |ctx| {
            assert_eq!(ctx.bars().len(), 3);
            assert_eq!(ctx.bar().close, 12.0);
            assert_eq!(ctx.lookback(2).len(), 2);
            assert_eq!(ctx.lookback(10).len(), 3);
            assert_eq!(ctx.bar_ago(1).map(|b| b.close), Some(11.0));
            assert!(ctx.bar_ago(3).is_none());
        });
    }

    #[test]
    fn close_on_flat_is_none() {
        let mut ledger = Ledger::new(EngineConfig::default());
        with_ctx(&mut ledger, 0, |ctx| {
            assert!(ctx.is_flat());
            assert!(ctx.close().is_none());
        });
    }

    #[test]
    fn close_flattens_long() {
        let mut ledger = Ledger::new(EngineConfig::default());
        ledger.update_positions(&price_map("TEST", 10.0));
        let sig = Signal::market("TEST", Side::Buy, make_bars(&[10.0])[0].timestamp).with_quantity(7.0);
        ledger.submit_order(&sig, 0).unwrap();
        ledger.process_orders(&make_bars(&[10.0, 11.0])[1], 1);

        with_ctx(&mut ledger, 2, |ctx| {
            assert!(ctx.is_long());
            let exit = ctx.close().unwrap();
            assert_eq!(exit.side, Side::Sell);
            assert_eq!(exit.quantity, Some(7.0));
            assert_eq!(exit.kind, OrderKind::Market);
            assert_eq!(exit.timestamp, ctx.timestamp());
        });
    }

    #[test]
    fn buy_builds_signal_from_request() {
        let mut ledger = Ledger::new(EngineConfig::default());
        with_ctx(&mut ledger, 1, |ctx| {
            let sig = ctx.buy(OrderRequest::market().limit(10.5).stop_loss(9.0).tag("dip"));
            assert_eq!(sig.side, Side::Buy);
            assert_eq!(sig.kind, OrderKind::Limit);
            assert_eq!(sig.stop_loss, Some(9.0));
            assert_eq!(sig.tag.as_deref(), Some("dip"));
            assert_eq!(sig.symbol, "TEST");
            assert_eq!(ctx.sell(OrderRequest::market().stop(9.0).limit(8.5)).kind, OrderKind::StopLimit);
        });
    }

    #[test]
    fn params_resolve_through_context() {
        let mut ledger = Ledger::new(EngineConfig::default());
        with_ctx(&mut ledger, 0, |ctx| {
            assert_eq!(ctx.param("fast_period", 1.0), 3.0);
            assert_eq!(ctx.param("slow_period", 1.0), 30.0);
            assert_eq!(ctx.param("unknown", 1.5), 1.5);
            assert_eq!(ctx.period("slow_period", 5), 30);
        });
    }

    #[test]
    fn cancel_all_through_context() {
        let mut ledger = Ledger::new(EngineConfig::default());
        ledger.update_positions(&price_map("TEST", 10.0));
        let sig = Signal::market("TEST", Side::Buy, make_bars(&[10.0])[0].timestamp).with_quantity(1.0);
        ledger.submit_order(&sig, 0).unwrap();
        with_ctx(&mut ledger, 0, |ctx| {
            assert_eq!(ctx.open_orders().len(), 1);
            assert_eq!(ctx.cancel_all(), 1);
            assert!(ctx.open_orders().is_empty());
        });
    }
}
