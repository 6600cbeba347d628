//! Replay fingerprinting: deterministic identity of results and datasets.
//!
//! A fingerprint is the BLAKE3 hex digest of a value's JSON serialization.
//! Every hashed type keeps its collections in `Vec` or `BTreeMap`, so the JSON
//! is canonical and two identical replays produce the same digest.

use crate::domain::Bar;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    pub fn of<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        let mut hasher = blake3::Hasher::new();
        serde_json::to_writer(&mut hasher, value)?;
        Ok(Self(hasher.finalize().to_hex().to_string()))
    }

    /// Dataset identity of a bar sequence.
    pub fn of_bars(bars: &[Bar]) -> Result<Self, serde_json::Error> {
        Self::of(bars)
    }

    /// First 12 hex digits, for display.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_bars;

    #[test]
    fn same_input_same_fingerprint() {
        let a = Fingerprint::of_bars(&make_bars(&[1.0, 2.0, 3.0])).unwrap();
        let b = Fingerprint::of_bars(&make_bars(&[1.0, 2.0, 3.0])).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.0.len(), 64);
        assert_eq!(a.short().len(), 12);
    }

    #[test]
    fn different_input_different_fingerprint() {
        let a = Fingerprint::of_bars(&make_bars(&[1.0, 2.0, 3.0])).unwrap();
        let b = Fingerprint::of_bars(&make_bars(&[1.0, 2.0, 3.5])).unwrap();
        assert_ne!(a, b);
    }
}
