//! OHLCV bar representation and price-series validation.

use chrono::NaiveDate;

use super::error::TrendscanError;

#[derive(Debug, Clone, PartialEq)]
pub struct OhlcvBar {
    pub code: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl OhlcvBar {
    /// Percent change of this close against `prev_close`; 0 when `prev_close` is 0.
    pub fn change_pct(&self, prev_close: f64) -> f64 {
        if prev_close == 0.0 {
            return 0.0;
        }
        (self.close - prev_close) / prev_close * 100.0
    }
}

/// Reject series with non-increasing dates, non-positive or non-finite prices,
/// or negative volume.
pub fn validate_series(code: &str, bars: &[OhlcvBar]) -> Result<(), TrendscanError> {
    let malformed = |reason: String| TrendscanError::MalformedSeries {
        code: code.to_string(),
        reason,
    };

    for (i, bar) in bars.iter().enumerate() {
        let prices = [bar.open, bar.high, bar.low, bar.close];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return Err(malformed(format!("non-positive price on {}", bar.date)));
        }
        if bar.volume < 0 {
            return Err(malformed(format!("negative volume on {}", bar.date)));
        }
        if i > 0 && bar.date <= bars[i - 1].date {
            return Err(malformed(format!(
                "dates not increasing at {} (after {})",
                bar.date,
                bars[i - 1].date
            )));
        }
    }

    Ok(())
}
