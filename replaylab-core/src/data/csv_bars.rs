//! CSV bar files.
//!
//! One file per symbol and timeframe, `<root>/<SYMBOL>_<timeframe>.csv`, with
//! a header row `timestamp,open,high,low,close,volume`. Timestamps are RFC 3339
//! or plain `YYYY-MM-DD` dates (midnight UTC).

use super::provider::{BarProvider, BarRequest, BarSet, DataError};
use crate::domain::Bar;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

#[derive(Debug, Clone)]
pub struct CsvBarProvider {
    root: PathBuf,
}

impl CsvBarProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, symbol: &str, timeframe: &str) -> PathBuf {
        self.root.join(format!("{symbol}_{timeframe}.csv"))
    }
}

impl BarProvider for CsvBarProvider {
    fn name(&self) -> &str {
        "csv"
    }

    fn fetch(&self, request: &BarRequest) -> Result<BarSet, DataError> {
        request.validate()?;
        let timeframe = request.primary_timeframe()?;
        let path = self.path_for(&request.symbol, timeframe.as_str());
        let (start, end) = request.bounds();

        let bars: Vec<Bar> = read_bars(&path)?
            .into_iter()
            .filter(|b| b.timestamp >= start && b.timestamp <= end)
            .collect();
        if bars.is_empty() {
            return Err(DataError::NoData {
                symbol: request.symbol.clone(),
                timeframe,
                start: request.start,
                end: request.end,
            });
        }
        debug!(symbol = %request.symbol, %timeframe, bars = bars.len(), path = %path.display(), "loaded csv bars");
        Ok(BarSet {
            symbol: request.symbol.clone(),
            timeframe,
            bars,
        })
    }
}

/// Read every bar in a CSV file, requiring sane and non-decreasing rows.
pub fn read_bars(path: &Path) -> Result<Vec<Bar>, DataError> {
    let display = path.display().to_string();
    if !path.exists() {
        return Err(DataError::FileNotFound(display));
    }
    let mut reader = csv::Reader::from_path(path).map_err(|source| DataError::Csv {
        path: display.clone(),
        source,
    })?;

    let mut bars: Vec<Bar> = Vec::new();
    for (i, row) in reader.deserialize::<CsvRow>().enumerate() {
        // header is line 1
        let line = i + 2;
        let row = row.map_err(|source| DataError::Csv {
            path: display.clone(),
            source,
        })?;
        let invalid = |reason: String| DataError::InvalidBar {
            path: display.clone(),
            row: line,
            reason,
        };
        let timestamp = parse_timestamp(&row.timestamp)
            .ok_or_else(|| invalid(format!("unparseable timestamp '{}'", row.timestamp)))?;
        let bar = Bar::new(timestamp, row.open, row.high, row.low, row.close, row.volume);
        if !bar.is_sane() {
            return Err(invalid("inconsistent OHLCV values".into()));
        }
        if let Some(prev) = bars.last() {
            if bar.timestamp < prev.timestamp {
                return Err(invalid("timestamp goes backwards".into()));
            }
        }
        bars.push(bar);
    }
    Ok(bars)
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(chrono::NaiveTime::MIN).and_utc())
}
