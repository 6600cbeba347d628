//! Replay configuration, loaded from TOML.
//!
//! ```toml
//! [engine]
//! initial_capital = 100000.0
//! commission_rate = 0.001
//! slippage_bps = 5.0
//!
//! [engine.sizing]
//! type = "PERCENT_EQUITY"
//! fraction = 0.95
//!
//! [stream]
//! flush_delay_ms = 100
//! increment_every = 25
//! ```

use crate::ledger::SizingPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Ledger and cost settings for one replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub initial_capital: f64,
    /// Commission as a fraction of fill notional.
    pub commission_rate: f64,
    /// Adverse slippage in basis points of the fill price.
    pub slippage_bps: f64,
    /// Allow fractional quantities from the default sizer.
    pub fractional: bool,
    /// Cancel unfilled orders after this many bars. `None` keeps them forever.
    pub order_ttl_bars: Option<usize>,
    pub sizing: SizingPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_capital: 100_000.0,
            commission_rate: 0.0,
            slippage_bps: 0.0,
            fractional: false,
            order_ttl_bars: None,
            sizing: SizingPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return Err(ConfigError::Invalid {
                field: "engine.initial_capital",
                reason: format!("must be positive, got {}", self.initial_capital),
            });
        }
        if !(self.commission_rate.is_finite() && (0.0..1.0).contains(&self.commission_rate)) {
            return Err(ConfigError::Invalid {
                field: "engine.commission_rate",
                reason: format!("must be in [0, 1), got {}", self.commission_rate),
            });
        }
        if !(self.slippage_bps.is_finite() && self.slippage_bps >= 0.0) {
            return Err(ConfigError::Invalid {
                field: "engine.slippage_bps",
                reason: format!("must be non-negative, got {}", self.slippage_bps),
            });
        }
        if self.order_ttl_bars == Some(0) {
            return Err(ConfigError::Invalid {
                field: "engine.order_ttl_bars",
                reason: "must be at least 1 when set".into(),
            });
        }
        if !self.sizing.is_valid() {
            return Err(ConfigError::Invalid {
                field: "engine.sizing",
                reason: format!("{} has non-positive parameters", self.sizing.name()),
            });
        }
        Ok(())
    }
}

/// Streaming settings, consumed by the orchestrator and execution boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Delay between the first buffered increment and its flush.
    pub flush_delay_ms: u64,
    /// The execution boundary emits an increment every this many bars.
    pub increment_every: usize,
    /// Fail a running task after this long without events. `None` waits forever.
    pub stall_timeout_ms: Option<u64>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            flush_delay_ms: 100,
            increment_every: 25,
            stall_timeout_ms: None,
        }
    }
}

impl StreamConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.increment_every == 0 {
            return Err(ConfigError::Invalid {
                field: "stream.increment_every",
                reason: "must be at least 1".into(),
            });
        }
        if self.stall_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid {
                field: "stream.stall_timeout_ms",
                reason: "must be positive when set".into(),
            });
        }
        Ok(())
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    pub engine: EngineConfig,
    pub stream: StreamConfig,
}

impl ReplayConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: ReplayConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;
        self.stream.validate()
    }
}
