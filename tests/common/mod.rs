#![allow(dead_code)]

use chrono::{Duration, NaiveDate};
use std::collections::HashMap;
use trendscan::domain::error::TrendscanError;
pub use trendscan::domain::ohlcv::OhlcvBar;
use trendscan::domain::rule::{Operand, Rule};
use trendscan::domain::strategy::Strategy;
use trendscan::ports::data_port::DataPort;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<OhlcvBar>>,
    pub errors: HashMap<String, String>,
    pub exchange_rate: Option<f64>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
            exchange_rate: None,
        }
    }

    pub fn with_bars(mut self, code: &str, bars: Vec<OhlcvBar>) -> Self {
        self.data.insert(code.to_string(), bars);
        self
    }

    pub fn with_error(mut self, code: &str, reason: &str) -> Self {
        self.errors.insert(code.to_string(), reason.to_string());
        self
    }

    pub fn with_exchange_rate(mut self, rate: f64) -> Self {
        self.exchange_rate = Some(rate);
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_series(&self, code: &str, lookback: usize) -> Result<Vec<OhlcvBar>, TrendscanError> {
        if let Some(reason) = self.errors.get(code) {
            return Err(TrendscanError::SourceUnavailable {
                reason: reason.clone(),
            });
        }
        let bars = self.data.get(code).ok_or_else(|| TrendscanError::NotFound {
            code: code.to_string(),
        })?;
        let skip = bars.len().saturating_sub(lookback);
        Ok(bars[skip..].to_vec())
    }

    fn list_symbols(&self) -> Result<Vec<String>, TrendscanError> {
        let mut codes: Vec<String> = self.data.keys().cloned().collect();
        codes.sort();
        Ok(codes)
    }

    fn fetch_exchange_rate(&self) -> Result<f64, TrendscanError> {
        self.exchange_rate
            .ok_or_else(|| TrendscanError::SourceUnavailable {
                reason: "no rate".into(),
            })
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// One bar per calendar day from 2023-01-02, flat volume.
pub fn series(code: &str, closes: &[f64]) -> Vec<OhlcvBar> {
    series_with_volume(code, closes, &vec![1_000; closes.len()])
}

pub fn series_with_volume(code: &str, closes: &[f64], volumes: &[i64]) -> Vec<OhlcvBar> {
    let start = date(2023, 1, 2);
    closes
        .iter()
        .zip(volumes)
        .enumerate()
        .map(|(i, (&close, &volume))| OhlcvBar {
            code: code.to_string(),
            date: start + Duration::days(i as i64),
            open: close,
            high: close * 1.01,
            low: close * 0.99,
            close,
            volume,
        })
        .collect()
}

/// Closes 100, 101, 102, ...
pub fn rising(code: &str, len: usize) -> Vec<OhlcvBar> {
    let closes: Vec<f64> = (0..len).map(|i| 100.0 + i as f64).collect();
    series(code, &closes)
}

/// `flat_len` closes at 100 followed by one close at `crash_close`.
pub fn flat_then_crash(code: &str, flat_len: usize, crash_close: f64) -> Vec<OhlcvBar> {
    let mut closes = vec![100.0; flat_len];
    closes.push(crash_close);
    series(code, &closes)
}

/// Drifting sine wave with uneven volume; trends up and down several times.
pub fn wave(code: &str, len: usize) -> Vec<OhlcvBar> {
    let closes: Vec<f64> = (0..len)
        .map(|i| {
            let t = i as f64;
            100.0 + 0.15 * t + 12.0 * (t / 9.0).sin()
        })
        .collect();
    let volumes: Vec<i64> = (0..len)
        .map(|i| 1_000 + ((i * 7) % 11) as i64 * 250)
        .collect();
    series_with_volume(code, &closes, &volumes)
}

/// Trend rider with an entry rule that fires on every bar.
pub fn always_enter() -> Strategy {
    Strategy {
        entry: Rule::AtLeast {
            left: Operand::Close,
            right: Operand::Constant(0.0),
        },
        ..Strategy::trend_rider()
    }
}

/// Trend rider with an entry rule that never fires.
pub fn never_enter() -> Strategy {
    Strategy {
        entry: Rule::Below {
            left: Operand::Close,
            right: Operand::Constant(0.0),
        },
        ..Strategy::trend_rider()
    }
}
