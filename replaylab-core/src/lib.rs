//! ReplayLab Core: deterministic bar-by-bar strategy replay.
//!
//! This crate contains the replay engine:
//! - Domain types (bars, signals, orders, trades, positions, equity points)
//! - Windowed indicators with insufficient-history sentinels
//! - The ledger: order book, fills, positions, cash and equity
//! - The strategy trait, its per-bar context, and reference strategies
//! - The execution loop, performance metrics and result fingerprints
//! - Bar providers (CSV, synthetic) and TOML configuration

pub mod config;
pub mod data;
pub mod domain;
pub mod engine;
pub mod fingerprint;
pub mod indicators;
pub mod ledger;
pub mod metrics;
pub mod strategies;
pub mod strategy;

pub use config::{ConfigError, EngineConfig, ReplayConfig, StreamConfig};
pub use engine::{Executor, ExecutorResult, IncrementBatch};
pub use strategy::{Capabilities, Strategy, StrategyContext};
