use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One point on the equity curve. Exactly one per processed bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub bar_index: usize,
    pub equity: f64,
    pub cash: f64,
    pub position_value: f64,
    /// (peak - equity) / peak, as a non-negative fraction.
    pub drawdown: f64,
}
