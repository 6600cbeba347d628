//! Simple Moving Average (SMA).
//!
//! Mean of the last `period` closes.

use crate::domain::Bar;

/// Returned when fewer than `period` bars are available.
pub const SMA_INSUFFICIENT: f64 = 0.0;

/// SMA of the last `period` closes in `bars`.
///
/// Returns [`SMA_INSUFFICIENT`] when `bars.len() < period` or `period == 0`.
pub fn sma(bars: &[Bar], period: usize) -> f64 {
    if period == 0 || bars.len() < period {
        return SMA_INSUFFICIENT;
    }
    let window = &bars[bars.len() - period..];
    window.iter().map(|b| b.close).sum::<f64>() / period as f64
}
