//! Strategy execution loop: drives one replay bar by bar.
//!
//! Per bar, in this exact order:
//! 1. Process pending orders against the bar (fills for earlier submissions).
//! 2. Notify the strategy of each fill, if it declares `on_order_filled`.
//! 3. Mark positions to the bar's close.
//! 4. Invoke `on_bar` with a context bound to this bar.
//! 5. Submit each returned signal as a pending order tagged with this bar.
//! 6. Record exactly one equity point.
//!
//! Nothing here reads the wall clock or a random source, so a replay over the
//! same bars, parameters and strategy is exactly reproducible.

use super::result::{BarOutcome, ExecutorResult, IncrementBatch, RejectedSignal};
use crate::config::EngineConfig;
use crate::domain::Bar;
use crate::ledger::{price_map, Ledger};
use crate::metrics::PerformanceMetrics;
use crate::strategy::{Capabilities, ParamSpec, Params, Strategy, StrategyContext};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default)]
struct DrainCursor {
    equity: usize,
    trades: usize,
    candles: usize,
}

pub struct Executor {
    strategy: Box<dyn Strategy>,
    name: String,
    specs: Vec<ParamSpec>,
    capabilities: Capabilities,
    params: Params,
    ledger: Ledger,
    rejected: Vec<RejectedSignal>,
    processed: usize,
    cursor: DrainCursor,
}

impl Executor {
    pub fn new(strategy: Box<dyn Strategy>, params: Params, config: EngineConfig) -> Self {
        Self {
            name: strategy.name().to_string(),
            specs: strategy.parameters(),
            capabilities: strategy.capabilities(),
            strategy,
            params,
            ledger: Ledger::new(config),
            rejected: Vec::new(),
            processed: 0,
            cursor: DrainCursor::default(),
        }
    }

    /// Call the strategy's `init` hook, bound to bar 0. No-op for empty input.
    pub fn init(&mut self, bars: &[Bar], symbol: &str) {
        if !self.capabilities.init || bars.is_empty() {
            return;
        }
        let mut ctx = StrategyContext::new(
            &self.name,
            symbol,
            bars,
            0,
            &mut self.ledger,
            &self.params,
            &self.specs,
        );
        self.strategy.init(&mut ctx);
    }

    /// Process one bar. `bars` must contain `bar_index`; the strategy only sees
    /// `bars[..=bar_index]`.
    ///
    /// # Panics
    /// If `bar_index >= bars.len()`.
    pub fn execute(&mut self, bar: &Bar, bar_index: usize, bars: &[Bar], symbol: &str) -> BarOutcome {
        let fills = self.ledger.process_orders(bar, bar_index);

        if self.capabilities.order_filled {
            for (order, trade) in &fills {
                let mut ctx = StrategyContext::new(
                    &self.name,
                    symbol,
                    bars,
                    bar_index,
                    &mut self.ledger,
                    &self.params,
                    &self.specs,
                );
                self.strategy.on_order_filled(&mut ctx, order, trade);
            }
        }

        let prices = price_map(symbol, bar.close);
        self.ledger.update_positions(&prices);

        let signals = {
            let mut ctx = StrategyContext::new(
                &self.name,
                symbol,
                bars,
                bar_index,
                &mut self.ledger,
                &self.params,
                &self.specs,
            );
            self.strategy.on_bar(&mut ctx)
        };

        for signal in &signals {
            if let Err(err) = self.ledger.submit_order(signal, bar_index) {
                warn!(strategy = %self.name, bar = bar_index, error = %err, "signal rejected");
                self.rejected.push(RejectedSignal {
                    bar_index,
                    signal: signal.clone(),
                    reason: err.to_string(),
                });
            }
        }

        self.ledger.record_equity(bar.timestamp, bar_index, &prices);
        self.processed += 1;

        BarOutcome {
            signals,
            trades: fills.into_iter().map(|(_, trade)| trade).collect(),
        }
    }

    /// Call the strategy's `on_end` hook, bound to the final bar.
    pub fn end(&mut self, bars: &[Bar], symbol: &str) {
        if !self.capabilities.end || bars.is_empty() {
            return;
        }
        let last = bars.len() - 1;
        let mut ctx = StrategyContext::new(
            &self.name,
            symbol,
            bars,
            last,
            &mut self.ledger,
            &self.params,
            &self.specs,
        );
        self.strategy.on_end(&mut ctx);
    }

    /// Full replay: `init`, `execute` for every bar, `end`.
    pub fn run(&mut self, bars: &[Bar], symbol: &str) -> ExecutorResult {
        info!(strategy = %self.name, symbol, bars = bars.len(), "replay started");
        self.init(bars, symbol);
        for (i, bar) in bars.iter().enumerate() {
            self.execute(bar, i, bars, symbol);
        }
        self.end(bars, symbol);

        let result = self.result(bars);
        info!(
            strategy = %self.name,
            symbol,
            trades = result.trades.len(),
            final_equity = result.metrics.final_equity,
            rejected = self.rejected.len(),
            "replay finished"
        );
        result
    }

    /// Everything produced so far, as a complete result.
    pub fn result(&self, bars: &[Bar]) -> ExecutorResult {
        ExecutorResult {
            metrics: self.metrics(),
            equity_curve: self.ledger.equity_curve().to_vec(),
            trades: self.ledger.trades().to_vec(),
            candles: bars[..self.processed.min(bars.len())].to_vec(),
        }
    }

    /// Drain output produced since the previous call into one batch.
    pub fn take_increment(&mut self, bars: &[Bar], total_bars: usize) -> IncrementBatch {
        let curve = self.ledger.equity_curve();
        let trades = self.ledger.trades();
        let candles_end = self.processed.min(bars.len());
        let batch = IncrementBatch {
            new_equity_points: curve[self.cursor.equity..].to_vec(),
            new_trades: trades[self.cursor.trades..].to_vec(),
            new_candles: bars[self.cursor.candles.min(candles_end)..candles_end].to_vec(),
            current_metrics: Some(self.metrics()),
            processed_bars: Some(self.processed),
            total_bars: Some(total_bars),
        };
        self.cursor = DrainCursor {
            equity: curve.len(),
            trades: trades.len(),
            candles: candles_end,
        };
        batch
    }

    pub fn metrics(&self) -> PerformanceMetrics {
        PerformanceMetrics::compute(
            self.ledger.equity_curve(),
            self.ledger.trades(),
            self.ledger.initial_capital(),
        )
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn rejected(&self) -> &[RejectedSignal] {
        &self.rejected
    }

    pub fn processed_bars(&self) -> usize {
        self.processed
    }

    pub fn strategy_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Order, Side, Signal, Trade};
    use crate::indicators::make_bars;
    use crate::strategy::OrderRequest;

    /// Records every hook call so ordering can be asserted.
    #[derive(Default)]
    struct Recorder {
        caps: Capabilities,
        calls: std::sync::Arc<std::sync::Mutex<Vec<String>>>,
        buy_at: Option<usize>,
    }

    impl Strategy for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }
        fn capabilities(&self) -> Capabilities {
            self.caps
        }
        fn init(&mut self, ctx: &mut StrategyContext<'_>) {
            self.calls.lock().unwrap().push(format!("init@{}", ctx.index()));
        }
        fn on_bar(&mut self, ctx: &mut StrategyContext<'_>) -> Vec<Signal> {
            self.calls.lock().unwrap().push(format!("bar@{}", ctx.index()));
            if Some(ctx.index()) == self.buy_at {
                return vec![ctx.buy(OrderRequest::market().quantity(10.0))];
            }
            Vec::new()
        }
        fn on_order_filled(&mut self, ctx: &mut StrategyContext<'_>, _order: &Order, trade: &Trade) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("fill@{}:{}", ctx.index(), trade.exit_price));
        }
        fn on_end(&mut self, ctx: &mut StrategyContext<'_>) {
            self.calls.lock().unwrap().push(format!("end@{}", ctx.index()));
        }
    }

    fn recorder(caps: Capabilities, buy_at: Option<usize>) -> (Recorder, std::sync::Arc<std::sync::Mutex<Vec<String>>>) {
        let r = Recorder {
            caps,
            buy_at,
            ..Recorder::default()
        };
        let calls = r.calls.clone();
        (r, calls)
    }

    #[test]
    fn hooks_follow_declared_capabilities() {
        let bars = make_bars(&[10.0, 11.0, 12.0]);
        let (strategy, calls) = recorder(Capabilities::ALL, Some(0));
        let mut exec = Executor::new(Box::new(strategy), Params::new(), EngineConfig::default());
        exec.run(&bars, "TEST");

        let calls = calls.lock().unwrap().clone();
        // bar 1 opens at 10.0 (previous close)
        assert_eq!(
            calls,
            vec!["init@0", "bar@0", "fill@1:10", "bar@1", "bar@2", "end@2"]
        );
    }

    #[test]
    fn undeclared_hooks_are_skipped() {
        let bars = make_bars(&[10.0, 11.0, 12.0]);
        let (strategy, calls) = recorder(Capabilities::NONE, Some(0));
        let mut exec = Executor::new(Box::new(strategy), Params::new(), EngineConfig::default());
        exec.run(&bars, "TEST");
        assert_eq!(calls.lock().unwrap().clone(), vec!["bar@0", "bar@1", "bar@2"]);
    }

    #[test]
    fn one_equity_point_per_bar() {
        let bars = make_bars(&[10.0, 11.0, 12.0, 11.5, 13.0]);
        let (strategy, _) = recorder(Capabilities::NONE, Some(1));
        let mut exec = Executor::new(Box::new(strategy), Params::new(), EngineConfig::default());
        let result = exec.run(&bars, "TEST");

        assert_eq!(result.equity_curve.len(), bars.len());
        assert_eq!(result.candles.len(), bars.len());
        for (i, p) in result.equity_curve.iter().enumerate() {
            assert_eq!(p.bar_index, i);
            assert_eq!(p.timestamp, bars[i].timestamp);
        }
        // bought 10 at bar 2's open (11.0), marked at 13.0 on the last bar
        let last = result.equity_curve.last().unwrap();
        assert!((last.equity - (100_000.0 + 10.0 * (13.0 - 11.0))).abs() < 1e-9);
    }

    #[test]
    fn execute_returns_signals_and_trades() {
        let bars = make_bars(&[10.0, 11.0]);
        let (strategy, _) = recorder(Capabilities::NONE, Some(0));
        let mut exec = Executor::new(Box::new(strategy), Params::new(), EngineConfig::default());
        let first = exec.execute(&bars[0], 0, &bars, "TEST");
        assert_eq!(first.signals.len(), 1);
        assert!(first.trades.is_empty());
        let second = exec.execute(&bars[1], 1, &bars, "TEST");
        assert!(second.signals.is_empty());
        assert_eq!(second.trades.len(), 1);
        assert_eq!(second.trades[0].side, Side::Buy);
    }

    #[test]
    fn rejected_signals_do_not_abort() {
        struct BadQuantity;
        impl Strategy for BadQuantity {
            fn name(&self) -> &str {
                "bad"
            }
            fn on_bar(&mut self, ctx: &mut StrategyContext<'_>) -> Vec<Signal> {
                vec![ctx.buy(OrderRequest::market().quantity(-1.0))]
            }
        }
        let bars = make_bars(&[10.0, 11.0, 12.0]);
        let mut exec = Executor::new(Box::new(BadQuantity), Params::new(), EngineConfig::default());
        let result = exec.run(&bars, "TEST");
        assert_eq!(exec.rejected().len(), 3);
        assert!(result.trades.is_empty());
        assert_eq!(result.equity_curve.len(), 3);
    }

    #[test]
    fn increments_drain_without_overlap() {
        let bars = make_bars(&[10.0, 11.0, 12.0, 13.0]);
        let (strategy, _) = recorder(Capabilities::NONE, Some(0));
        let mut exec = Executor::new(Box::new(strategy), Params::new(), EngineConfig::default());

        exec.execute(&bars[0], 0, &bars, "TEST");
        exec.execute(&bars[1], 1, &bars, "TEST");
        let a = exec.take_increment(&bars, bars.len());
        assert_eq!(a.new_equity_points.len(), 2);
        assert_eq!(a.new_candles.len(), 2);
        assert_eq!(a.new_trades.len(), 1);
        assert_eq!(a.processed_bars, Some(2));
        assert_eq!(a.total_bars, Some(4));

        exec.execute(&bars[2], 2, &bars, "TEST");
        exec.execute(&bars[3], 3, &bars, "TEST");
        let b = exec.take_increment(&bars, bars.len());
        assert_eq!(b.new_equity_points[0].bar_index, 2);
        assert_eq!(b.new_candles.len(), 2);
        assert!(b.new_trades.is_empty());

        let empty = exec.take_increment(&bars, bars.len());
        assert!(empty.new_equity_points.is_empty());
        assert_eq!(empty.processed_bars, Some(4));
    }

    #[test]
    fn empty_input_runs_cleanly() {
        let (strategy, calls) = recorder(Capabilities::ALL, None);
        let mut exec = Executor::new(Box::new(strategy), Params::new(), EngineConfig::default());
        let result = exec.run(&[], "TEST");
        assert!(result.equity_curve.is_empty());
        assert!(calls.lock().unwrap().is_empty());
    }
}
