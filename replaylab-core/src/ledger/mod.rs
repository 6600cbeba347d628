//! Order book and portfolio ledger.
//!
//! The ledger owns every order, position, fill and equity point of a replay.
//! Fills come only from `process_orders`, and only for orders submitted on an
//! earlier bar.

pub mod book;
pub(crate) mod fill;
pub mod sizing;

pub use book::{closing_side, price_map, Ledger, LedgerError};
pub use sizing::SizingPolicy;
