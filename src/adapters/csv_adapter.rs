//! CSV directory data adapter.
//!
//! Each instrument lives in `<dir>/<CODE>.csv` with a header row naming at
//! least `date, open, high, low, close, volume` (any case, any order; extra
//! columns such as `Adj Close` are ignored). Rows must be in strictly
//! ascending or strictly descending date order; a descending file is reversed.
//! The USD/KRW rate is read from the last close of `<dir>/KRW=X.csv` when that
//! file exists.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use chrono::NaiveDate;
use csv::StringRecord;

use crate::domain::error::TrendscanError;
use crate::domain::ohlcv::OhlcvBar;
use crate::ports::data_port::{DataPort, EXCHANGE_RATE_CODE};

const COLUMNS: [&str; 6] = ["date", "open", "high", "low", "close", "volume"];

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, code: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", code))
    }

    fn read_all(&self, code: &str) -> Result<Vec<OhlcvBar>, TrendscanError> {
        let path = self.csv_path(code);
        let content = fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => TrendscanError::NotFound {
                code: code.to_string(),
            },
            _ => TrendscanError::SourceUnavailable {
                reason: format!("failed to read {}: {}", path.display(), e),
            },
        })?;

        let malformed = |reason: String| TrendscanError::MalformedSeries {
            code: code.to_string(),
            reason,
        };

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let headers = rdr
            .headers()
            .map_err(|e| malformed(format!("unreadable header: {}", e)))?
            .clone();
        let mut index = [0usize; 6];
        for (slot, name) in index.iter_mut().zip(COLUMNS) {
            *slot = headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
                .ok_or_else(|| malformed(format!("missing {} column", name)))?;
        }

        let mut bars = Vec::new();
        for (line, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| malformed(format!("CSV parse error: {}", e)))?;
            let row = line + 2;
            let date_str = field(&record, index[0]);
            let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
                .map_err(|e| malformed(format!("row {}: invalid date '{}': {}", row, date_str, e)))?;
            let number = |col: usize| -> Result<f64, TrendscanError> {
                let raw = field(&record, index[col]);
                raw.parse::<f64>().map_err(|_| {
                    malformed(format!("row {}: invalid {} value '{}'", row, COLUMNS[col], raw))
                })
            };

            bars.push(OhlcvBar {
                code: code.to_string(),
                date,
                open: number(1)?,
                high: number(2)?,
                low: number(3)?,
                close: number(4)?,
                volume: whole_volume(number(5)?).ok_or_else(|| {
                    malformed(format!(
                        "row {}: invalid volume value '{}'",
                        row,
                        field(&record, index[5])
                    ))
                })?,
            });
        }

        if bars.len() > 1 && bars.windows(2).all(|w| w[0].date > w[1].date) {
            bars.reverse();
        }
        if let Some(w) = bars.windows(2).find(|w| w[0].date >= w[1].date) {
            return Err(malformed(format!(
                "dates out of order: {} follows {}",
                w[1].date, w[0].date
            )));
        }
        Ok(bars)
    }
}

/// Share counts may be written as floats ("1200000.0"); anything that is not
/// a finite, non-negative value an `i64` can hold is rejected.
fn whole_volume(value: f64) -> Option<i64> {
    (0.0..i64::MAX as f64)
        .contains(&value)
        .then(|| value.round() as i64)
}

fn field(record: &StringRecord, index: usize) -> &str {
    record.get(index).map(str::trim).unwrap_or("")
}

impl DataPort for CsvAdapter {
    fn fetch_series(&self, code: &str, lookback: usize) -> Result<Vec<OhlcvBar>, TrendscanError> {
        let mut bars = self.read_all(code)?;
        let skip = bars.len().saturating_sub(lookback);
        bars.drain(..skip);
        Ok(bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, TrendscanError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| TrendscanError::SourceUnavailable {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| TrendscanError::SourceUnavailable {
                reason: format!("directory entry error: {}", e),
            })?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(code) = name.strip_suffix(".csv") {
                if code != EXCHANGE_RATE_CODE {
                    symbols.push(code.to_string());
                }
            }
        }

        symbols.sort();
        Ok(symbols)
    }

    fn fetch_exchange_rate(&self) -> Result<f64, TrendscanError> {
        let bars = self.read_all(EXCHANGE_RATE_CODE)?;
        bars.last()
            .map(|b| b.close)
            .filter(|rate| *rate > 0.0)
            .ok_or_else(|| TrendscanError::SourceUnavailable {
                reason: format!("{} has no usable close", EXCHANGE_RATE_CODE),
            })
    }
}
