//! Relative Strength Index (RSI).
//!
//! Uses Wilder smoothing: the first `period` one-bar close changes seed the
//! average gain and loss, then each later change updates them as
//! `(prev * (period - 1) + change) / period`.
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss)
//! Edge cases: not enough history → 50; no movement → 50; avg_loss == 0 → 100.

use crate::domain::Bar;

/// Neutral RSI, returned on insufficient history or a flat window.
pub const RSI_NEUTRAL: f64 = 50.0;

/// RSI at the last bar of `bars`, smoothed from the start of the slice.
/// Never NaN or infinite.
pub fn rsi(bars: &[Bar], period: usize) -> f64 {
    if period == 0 || bars.len() < period + 1 {
        return RSI_NEUTRAL;
    }

    let p = period as f64;
    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for (i, pair) in bars.windows(2).enumerate() {
        let change = pair[1].close - pair[0].close;
        if !change.is_finite() {
            return RSI_NEUTRAL;
        }
        let (gain, loss) = if change > 0.0 { (change, 0.0) } else { (0.0, -change) };

        if i < period {
            avg_gain += gain / p;
            avg_loss += loss / p;
        } else {
            avg_gain = (avg_gain * (p - 1.0) + gain) / p;
            avg_loss = (avg_loss * (p - 1.0) + loss) / p;
        }
    }

    if avg_loss == 0.0 {
        return if avg_gain == 0.0 { RSI_NEUTRAL } else { 100.0 };
    }
    100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
}
