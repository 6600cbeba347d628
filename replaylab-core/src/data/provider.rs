//! Bar provider trait and structured error types.
//!
//! The BarProvider trait abstracts over bar sources (CSV files, synthetic
//! series) so the replay and the streaming session can swap implementations
//! and mock them in tests.

use crate::domain::Bar;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Structured error types for bar acquisition.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("no data for {symbol} at {timeframe} between {start} and {end}")]
    NoData {
        symbol: String,
        timeframe: Timeframe,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("data file not found: {0}")]
    FileNotFound(String),

    #[error("failed to read bar file {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("invalid bar at {path} row {row}: {reason}")]
    InvalidBar {
        path: String,
        row: usize,
        reason: String,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unknown timeframe '{0}' (expected 1m, 5m, 15m, 1h, 4h or 1d)")]
    UnknownTimeframe(String),

    #[error("data error: {0}")]
    Other(String),
}

/// Bar interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }

    pub fn duration(self) -> Duration {
        match self {
            Timeframe::M1 => Duration::minutes(1),
            Timeframe::M5 => Duration::minutes(5),
            Timeframe::M15 => Duration::minutes(15),
            Timeframe::H1 => Duration::hours(1),
            Timeframe::H4 => Duration::hours(4),
            Timeframe::D1 => Duration::days(1),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1m" => Ok(Timeframe::M1),
            "5m" => Ok(Timeframe::M5),
            "15m" => Ok(Timeframe::M15),
            "1h" => Ok(Timeframe::H1),
            "4h" => Ok(Timeframe::H4),
            "1d" => Ok(Timeframe::D1),
            _ => Err(DataError::UnknownTimeframe(s.to_string())),
        }
    }
}

/// What to fetch: one symbol over an inclusive date range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarRequest {
    pub symbol: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub timeframes: Vec<Timeframe>,
}

impl BarRequest {
    pub fn daily(symbol: impl Into<String>, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            symbol: symbol.into(),
            start,
            end,
            timeframes: vec![Timeframe::D1],
        }
    }

    /// The shortest requested timeframe, which drives the replay.
    pub fn primary_timeframe(&self) -> Result<Timeframe, DataError> {
        self.timeframes
            .iter()
            .copied()
            .min()
            .ok_or_else(|| DataError::InvalidRequest("no timeframe requested".into()))
    }

    pub fn validate(&self) -> Result<(), DataError> {
        if self.symbol.trim().is_empty() {
            return Err(DataError::InvalidRequest("empty symbol".into()));
        }
        if self.start > self.end {
            return Err(DataError::InvalidRequest(format!(
                "start {} is after end {}",
                self.start, self.end
            )));
        }
        self.primary_timeframe().map(|_| ())
    }

    /// Inclusive UTC bounds: start-of-day `start` through end-of-day `end`.
    pub fn bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.start.and_time(chrono::NaiveTime::MIN).and_utc();
        let end = (self.end + Duration::days(1)).and_time(chrono::NaiveTime::MIN).and_utc()
            - Duration::nanoseconds(1);
        (start, end)
    }
}

/// Ordered bars of the primary timeframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarSet {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub bars: Vec<Bar>,
}

/// Trait for bar sources.
///
/// Implementations return bars ordered by timestamp for the primary
/// (shortest) requested timeframe, or a descriptive error.
pub trait BarProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    fn fetch(&self, request: &BarRequest) -> Result<BarSet, DataError>;
}
