//! Reference strategies built on the indicator library.

pub mod buy_and_hold;
pub mod rsi_reversion;
pub mod sma_cross;

pub use buy_and_hold::BuyAndHold;
pub use rsi_reversion::RsiReversion;
pub use sma_cross::SmaCrossover;

use crate::strategy::Strategy;

/// Names accepted by [`by_name`].
pub const BUILTIN: &[&str] = &["sma_cross", "rsi_reversion", "buy_and_hold"];

/// Construct a built-in strategy by name.
pub fn by_name(name: &str) -> Option<Box<dyn Strategy>> {
    match name {
        "sma_cross" => Some(Box::new(SmaCrossover::new())),
        "rsi_reversion" => Some(Box::new(RsiReversion::new())),
        "buy_and_hold" => Some(Box::new(BuyAndHold::new())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_builtin_resolves() {
        for name in BUILTIN {
            let strategy = by_name(name).unwrap();
            assert_eq!(strategy.name(), *name);
        }
        assert!(by_name("not_a_strategy").is_none());
    }
}
