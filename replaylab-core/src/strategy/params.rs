//! Strategy parameters: declared specs plus user overrides.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// User-supplied parameter overrides, keyed by parameter name.
///
/// `BTreeMap` so parameter sets serialize (and hash) in a stable order.
pub type Params = BTreeMap<String, f64>;

/// A parameter a strategy declares, with its default value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub default: f64,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, default: f64) -> Self {
        Self {
            name: name.into(),
            default,
        }
    }
}

/// Resolve `name`: user override, then declared default, then `fallback`.
pub fn resolve(overrides: &Params, specs: &[ParamSpec], name: &str, fallback: f64) -> f64 {
    overrides
        .get(name)
        .copied()
        .or_else(|| specs.iter().find(|s| s.name == name).map(|s| s.default))
        .unwrap_or(fallback)
}

/// Parse `name=value` pairs such as `fast_period=5`.
pub fn parse_assignment(text: &str) -> Option<(String, f64)> {
    let (name, value) = text.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let value = value.trim().parse::<f64>().ok()?;
    Some((name.to_string(), value))
}
