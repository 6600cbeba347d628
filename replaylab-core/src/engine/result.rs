//! Replay outputs: the full result and the incremental batches streamed while
//! a replay is running.

use crate::domain::{Bar, EquityPoint, Signal, Trade};
use crate::fingerprint::Fingerprint;
use crate::metrics::PerformanceMetrics;
use serde::{Deserialize, Serialize};

/// Complete output of one replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorResult {
    pub metrics: PerformanceMetrics,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<Trade>,
    pub candles: Vec<Bar>,
}

impl ExecutorResult {
    /// BLAKE3 identity of the whole result. Equal for reproducible replays.
    pub fn fingerprint(&self) -> Result<Fingerprint, serde_json::Error> {
        Fingerprint::of(self)
    }
}

/// Output produced since the previous batch.
///
/// Vectors are deltas. The optional fields are snapshots: absent means "no
/// new value", and when batches are folded the last present value wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncrementBatch {
    pub new_equity_points: Vec<EquityPoint>,
    pub new_trades: Vec<Trade>,
    pub new_candles: Vec<Bar>,
    pub current_metrics: Option<PerformanceMetrics>,
    pub processed_bars: Option<usize>,
    pub total_bars: Option<usize>,
}

impl IncrementBatch {
    pub fn is_empty(&self) -> bool {
        self.new_equity_points.is_empty()
            && self.new_trades.is_empty()
            && self.new_candles.is_empty()
            && self.current_metrics.is_none()
            && self.processed_bars.is_none()
            && self.total_bars.is_none()
    }

    /// Append `later` onto `self`: vectors concatenate, snapshots take
    /// `later`'s value when it has one.
    pub fn absorb(&mut self, later: IncrementBatch) {
        self.new_equity_points.extend(later.new_equity_points);
        self.new_trades.extend(later.new_trades);
        self.new_candles.extend(later.new_candles);
        if later.current_metrics.is_some() {
            self.current_metrics = later.current_metrics;
        }
        if later.processed_bars.is_some() {
            self.processed_bars = later.processed_bars;
        }
        if later.total_bars.is_some() {
            self.total_bars = later.total_bars;
        }
    }

    /// Fold batches in arrival order into one.
    pub fn fold(batches: impl IntoIterator<Item = IncrementBatch>) -> IncrementBatch {
        batches.into_iter().fold(IncrementBatch::default(), |mut acc, b| {
            acc.absorb(b);
            acc
        })
    }
}

/// What one call to `Executor::execute` produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BarOutcome {
    pub signals: Vec<Signal>,
    pub trades: Vec<Trade>,
}

/// A signal the ledger refused to turn into an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedSignal {
    pub bar_index: usize,
    pub signal: Signal,
    pub reason: String,
}
