//! Bar acquisition: provider trait, CSV files and synthetic series.

pub mod csv_bars;
pub mod provider;
pub mod synthetic;

pub use csv_bars::{read_bars, CsvBarProvider};
pub use provider::{BarProvider, BarRequest, BarSet, DataError, Timeframe};
pub use synthetic::SyntheticBarProvider;
