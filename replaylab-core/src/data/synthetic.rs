//! Seeded random-walk bars for demos, tests and benchmarks.
//!
//! The per-symbol seed is derived from the master seed and the symbol via
//! BLAKE3, so the same `(seed, symbol, range)` always yields the same bars.

use super::provider::{BarProvider, BarRequest, BarSet, DataError};
use crate::domain::Bar;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone)]
pub struct SyntheticBarProvider {
    seed: u64,
    start_price: f64,
    /// Maximum absolute per-bar return.
    volatility: f64,
}

impl SyntheticBarProvider {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            start_price: 100.0,
            volatility: 0.02,
        }
    }

    pub fn with_start_price(mut self, price: f64) -> Self {
        self.start_price = price;
        self
    }

    pub fn with_volatility(mut self, volatility: f64) -> Self {
        self.volatility = volatility;
        self
    }

    fn symbol_seed(&self, symbol: &str) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.seed.to_le_bytes());
        hasher.update(symbol.as_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(bytes)
    }

    /// `count` bars starting at `start`, one `step` apart. Fails when a
    /// timestamp falls outside the representable range.
    pub fn generate(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        step: chrono::Duration,
        count: usize,
    ) -> Result<Vec<Bar>, DataError> {
        let mut rng = StdRng::seed_from_u64(self.symbol_seed(symbol));
        let vol = self.volatility.abs().max(1e-6);
        let mut prev_close = self.start_price;
        let mut bars = Vec::with_capacity(count);

        for i in 0..count {
            let open = prev_close;
            let close = (open * (1.0 + rng.gen_range(-vol..vol))).max(0.01);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..vol / 2.0));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..vol / 2.0));
            let volume = rng.gen_range(10_000.0..100_000.0_f64).round();
            bars.push(Bar::new(timestamp_at(start, step, i)?, open, high, low, close, volume));
            prev_close = close;
        }
        Ok(bars)
    }
}

fn timestamp_at(start: DateTime<Utc>, step: chrono::Duration, i: usize) -> Result<DateTime<Utc>, DataError> {
    i32::try_from(i)
        .ok()
        .and_then(|n| step.checked_mul(n))
        .and_then(|offset| start.checked_add_signed(offset))
        .ok_or_else(|| DataError::InvalidRequest(format!("bar {i} lies outside the supported time range")))
}

impl BarProvider for SyntheticBarProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(&self, request: &BarRequest) -> Result<BarSet, DataError> {
        request.validate()?;
        let timeframe = request.primary_timeframe()?;
        let (start, end) = request.bounds();
        let step = timeframe.duration();
        let span = end - start;
        let count = (span.num_seconds() / step.num_seconds()) as usize + 1;
        Ok(BarSet {
            symbol: request.symbol.clone(),
            timeframe,
            bars: self.generate(&request.symbol, start, step, count)?,
        })
    }
}
