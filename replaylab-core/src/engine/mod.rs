//! Replay engine: the per-bar execution loop and its outputs.

pub mod executor;
pub mod result;

pub use executor::Executor;
pub use result::{BarOutcome, ExecutorResult, IncrementBatch, RejectedSignal};
