//! Performance metrics: pure functions that compute strategy statistics.
//!
//! Every metric is a pure function: equity series and/or trade list in, scalar
//! out. Trade statistics count realized fills only; opening fills carry no
//! outcome yet.

use crate::domain::{EquityPoint, Trade};
use serde::{Deserialize, Serialize};

/// Periods per year used for annualization.
pub const PERIODS_PER_YEAR: f64 = 252.0;

/// Aggregate performance metrics for one replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub initial_capital: f64,
    pub final_equity: f64,
    pub total_return: f64,
    pub sharpe: f64,
    pub sortino: f64,
    /// Largest peak-to-trough decline as a non-negative fraction.
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub trade_count: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub total_commission: f64,
    pub bars_processed: usize,
}

impl PerformanceMetrics {
    /// Compute all metrics from an equity curve and the fills of a replay.
    pub fn compute(equity_curve: &[EquityPoint], trades: &[Trade], initial_capital: f64) -> Self {
        let mut series = Vec::with_capacity(equity_curve.len() + 1);
        series.push(initial_capital);
        series.extend(equity_curve.iter().map(|p| p.equity));

        let realized: Vec<f64> = trades
            .iter()
            .filter(|t| t.is_realized())
            .map(|t| t.pnl)
            .collect();
        let wins: Vec<f64> = realized.iter().copied().filter(|p| *p > 0.0).collect();
        let losses: Vec<f64> = realized.iter().copied().filter(|p| *p < 0.0).collect();

        let final_equity = series.last().copied().unwrap_or(initial_capital);
        Self {
            initial_capital,
            final_equity,
            total_return: total_return(&series),
            sharpe: sharpe_ratio(&series),
            sortino: sortino_ratio(&series),
            max_drawdown: max_drawdown(&series),
            win_rate: win_rate(&realized),
            profit_factor: profit_factor(&realized),
            trade_count: realized.len(),
            winning_trades: wins.len(),
            losing_trades: losses.len(),
            avg_win: mean_f64(&wins),
            avg_loss: mean_f64(&losses),
            largest_win: wins.iter().copied().fold(0.0, f64::max),
            largest_loss: losses.iter().copied().fold(0.0, f64::min),
            total_commission: trades.iter().map(|t| t.commission).sum(),
            bars_processed: equity_curve.len(),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Total return as a fraction: (final - initial) / initial.
pub fn total_return(equity: &[f64]) -> f64 {
    match (equity.first(), equity.last()) {
        (Some(&initial), Some(&last)) if equity.len() >= 2 && initial > 0.0 => {
            (last - initial) / initial
        }
        _ => 0.0,
    }
}

/// Annualized Sharpe ratio of per-bar returns (zero risk-free rate).
///
/// Returns 0.0 if variance is zero or there are fewer than 2 returns.
pub fn sharpe_ratio(equity: &[f64]) -> f64 {
    let returns = period_returns(equity);
    if returns.len() < 2 {
        return 0.0;
    }
    let std = std_dev(&returns);
    if std < 1e-15 {
        return 0.0;
    }
    mean_f64(&returns) / std * PERIODS_PER_YEAR.sqrt()
}

/// Annualized Sortino ratio (downside deviation only).
///
/// Returns 0.0 if there is no downside or fewer than 2 returns.
pub fn sortino_ratio(equity: &[f64]) -> f64 {
    let returns = period_returns(equity);
    if returns.len() < 2 {
        return 0.0;
    }
    let downside_sq: f64 = returns.iter().filter(|r| **r < 0.0).map(|r| r * r).sum();
    if downside_sq == 0.0 {
        return 0.0;
    }
    let downside_std = (downside_sq / returns.len() as f64).sqrt();
    if downside_std < 1e-15 {
        return 0.0;
    }
    mean_f64(&returns) / downside_std * PERIODS_PER_YEAR.sqrt()
}

/// Maximum drawdown as a non-negative fraction (0.15 = 15% decline).
pub fn max_drawdown(equity: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut max_dd = 0.0_f64;
    for &eq in equity {
        peak = peak.max(eq);
        if peak > 0.0 {
            max_dd = max_dd.max((peak - eq) / peak);
        }
    }
    max_dd
}

/// Fraction of realized PnLs that are positive.
pub fn win_rate(realized: &[f64]) -> f64 {
    if realized.is_empty() {
        return 0.0;
    }
    realized.iter().filter(|p| **p > 0.0).count() as f64 / realized.len() as f64
}

/// Gross profits / gross losses.
///
/// Capped at 100.0 for edge cases (all winners, zero losses).
pub fn profit_factor(realized: &[f64]) -> f64 {
    let gross_profit: f64 = realized.iter().filter(|p| **p > 0.0).sum();
    let gross_loss: f64 = realized.iter().filter(|p| **p < 0.0).map(|p| p.abs()).sum();
    if gross_loss < 1e-10 {
        return if gross_profit > 0.0 { 100.0 } else { 0.0 };
    }
    (gross_profit / gross_loss).min(100.0)
}

// ─── Helpers ────────────────────────────────────────────────────────

/// Simple returns between consecutive equity values.
pub fn period_returns(equity: &[f64]) -> Vec<f64> {
    equity
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}
