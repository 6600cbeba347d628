//! Increment buffering and the best-known result view.

use replaylab_core::domain::{Bar, EquityPoint, Trade};
use replaylab_core::metrics::PerformanceMetrics;
use replaylab_core::{ExecutorResult, IncrementBatch};
use serde::{Deserialize, Serialize};

/// Batches received since the last flush, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct IncrementBuffer {
    batches: Vec<IncrementBatch>,
}

impl IncrementBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when this is the first batch since the last flush.
    pub fn push(&mut self, batch: IncrementBatch) -> bool {
        self.batches.push(batch);
        self.batches.len() == 1
    }

    /// Fold and drain everything buffered. `None` when empty.
    pub fn take(&mut self) -> Option<IncrementBatch> {
        if self.batches.is_empty() {
            return None;
        }
        Some(IncrementBatch::fold(self.batches.drain(..)))
    }

    pub fn clear(&mut self) {
        self.batches.clear();
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

/// Partial or final output as the caller sees it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultView {
    pub metrics: Option<PerformanceMetrics>,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<Trade>,
    pub candles: Vec<Bar>,
    pub processed_bars: Option<usize>,
    pub total_bars: Option<usize>,
}

impl ResultView {
    /// Apply one (possibly folded) batch.
    pub fn apply(&mut self, batch: IncrementBatch) {
        self.equity_curve.extend(batch.new_equity_points);
        self.trades.extend(batch.new_trades);
        self.candles.extend(batch.new_candles);
        if batch.current_metrics.is_some() {
            self.metrics = batch.current_metrics;
        }
        if batch.processed_bars.is_some() {
            self.processed_bars = batch.processed_bars;
        }
        if batch.total_bars.is_some() {
            self.total_bars = batch.total_bars;
        }
    }

    pub fn from_result(result: ExecutorResult) -> Self {
        let bars = result.candles.len();
        Self {
            metrics: Some(result.metrics),
            equity_curve: result.equity_curve,
            trades: result.trades,
            candles: result.candles,
            processed_bars: Some(bars),
            total_bars: Some(bars),
        }
    }

    /// A complete result, if metrics have been seen.
    pub fn to_result(&self) -> Option<ExecutorResult> {
        Some(ExecutorResult {
            metrics: self.metrics.clone()?,
            equity_curve: self.equity_curve.clone(),
            trades: self.trades.clone(),
            candles: self.candles.clone(),
        })
    }

    pub fn is_empty(&self) -> bool {
        *self == ResultView::default()
    }
}
