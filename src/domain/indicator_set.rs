//! Indicator bundle computed once per price series, and the per-bar snapshot
//! the scoring model and simulator read from.

use chrono::NaiveDate;

use crate::domain::error::TrendscanError;
use crate::domain::indicator::bollinger::calculate_bollinger;
use crate::domain::indicator::rsi::{RsiSmoothing, calculate_rsi};
use crate::domain::indicator::sma::calculate_sma;
use crate::domain::indicator::volume::{calculate_volume_average, volume_ratio};
use crate::domain::indicator::IndicatorSeries;
use crate::domain::ohlcv::{OhlcvBar, validate_series};

pub const VOLUME_SPIKE_LOOKBACK: usize = 5;
pub const VOLUME_SPIKE_MULTIPLE: f64 = 2.5;

/// Window lengths and multipliers for every indicator a strategy reads.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorParams {
    pub ma_short: usize,
    pub ma_mid: usize,
    pub ma_long: usize,
    pub bollinger_period: usize,
    pub bollinger_mult: f64,
    pub rsi_period: usize,
    pub rsi_smoothing: RsiSmoothing,
    pub volume_period: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            ma_short: 5,
            ma_mid: 20,
            ma_long: 60,
            bollinger_period: 20,
            bollinger_mult: 2.0,
            rsi_period: 14,
            rsi_smoothing: RsiSmoothing::Simple,
            volume_period: 20,
        }
    }
}

impl IndicatorParams {
    /// Number of bars needed before the last bar has a complete snapshot.
    ///
    /// The previous mid MA and the previous volume average each need one bar
    /// more than their window.
    pub fn min_history(&self) -> usize {
        [
            self.ma_short,
            self.ma_mid + 1,
            self.ma_long,
            self.bollinger_period,
            self.rsi_period + 1,
            self.volume_period + 1,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }
}

/// Read-only view of every indicator at one bar.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSnapshot {
    pub index: usize,
    pub date: NaiveDate,
    pub close: f64,
    pub volume: i64,
    pub ma_short: f64,
    pub ma_mid: f64,
    pub ma_long: f64,
    pub prev_ma_mid: f64,
    pub bollinger_upper: f64,
    pub bollinger_middle: f64,
    pub bollinger_lower: f64,
    pub rsi: f64,
    pub volume_average: f64,
    pub volume_ratio: f64,
    pub prior_volume_ratio: f64,
}

impl IndicatorSnapshot {
    /// Percent distance of the close from the mid MA.
    pub fn disparity(&self) -> f64 {
        if self.ma_mid == 0.0 {
            return 0.0;
        }
        (self.close - self.ma_mid) / self.ma_mid * 100.0
    }

    /// Percent distance of the close from the upper Bollinger band.
    pub fn band_distance(&self) -> f64 {
        if self.bollinger_upper == 0.0 {
            return 0.0;
        }
        (self.close - self.bollinger_upper) / self.bollinger_upper * 100.0
    }

    pub fn ma_mid_slope(&self) -> f64 {
        self.ma_mid - self.prev_ma_mid
    }

    pub fn is_aligned(&self) -> bool {
        self.ma_short > self.ma_mid && self.ma_mid > self.ma_long
    }

    pub fn is_breakout(&self) -> bool {
        self.close > self.bollinger_upper
    }
}

pub struct IndicatorSet<'a> {
    code: String,
    bars: &'a [OhlcvBar],
    ma_short: IndicatorSeries,
    ma_mid: IndicatorSeries,
    ma_long: IndicatorSeries,
    bollinger: IndicatorSeries,
    rsi: IndicatorSeries,
    volume_average: IndicatorSeries,
}

impl<'a> IndicatorSet<'a> {
    /// Validate the series and compute every indicator over it.
    ///
    /// Fails with `InsufficientHistory` when the series is shorter than
    /// `params.min_history()`.
    pub fn compute(
        code: &str,
        bars: &'a [OhlcvBar],
        params: &IndicatorParams,
    ) -> Result<Self, TrendscanError> {
        validate_series(code, bars)?;

        let minimum = params.min_history();
        if bars.len() < minimum {
            return Err(TrendscanError::InsufficientHistory {
                code: code.to_string(),
                bars: bars.len(),
                minimum,
            });
        }

        Ok(Self {
            code: code.to_string(),
            bars,
            ma_short: calculate_sma(bars, params.ma_short),
            ma_mid: calculate_sma(bars, params.ma_mid),
            ma_long: calculate_sma(bars, params.ma_long),
            bollinger: calculate_bollinger(
                bars,
                params.bollinger_period,
                params.bollinger_mult,
            ),
            rsi: calculate_rsi(bars, params.rsi_period, params.rsi_smoothing),
            volume_average: calculate_volume_average(bars, params.volume_period),
        })
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn bars(&self) -> &'a [OhlcvBar] {
        self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Snapshot at `index`, `None` while any input is still warming up.
    pub fn snapshot(&self, index: usize) -> Option<IndicatorSnapshot> {
        if index == 0 {
            return None;
        }
        let bar = self.bars.get(index)?;
        let ma_short = self.ma_short.value_at(index)?;
        let ma_mid = self.ma_mid.value_at(index)?;
        let ma_long = self.ma_long.value_at(index)?;
        let prev_ma_mid = self.ma_mid.value_at(index - 1)?;
        let (upper, middle, lower) = self.bollinger.bands_at(index)?;
        let rsi = self.rsi.value_at(index)?;
        let volume_average = self.volume_average.value_at(index)?;
        let prior_average = self.volume_average.value_at(index - 1)?;

        Some(IndicatorSnapshot {
            index,
            date: bar.date,
            close: bar.close,
            volume: bar.volume,
            ma_short,
            ma_mid,
            ma_long,
            prev_ma_mid,
            bollinger_upper: upper,
            bollinger_middle: middle,
            bollinger_lower: lower,
            rsi,
            volume_average,
            volume_ratio: volume_ratio(bar.volume, volume_average),
            prior_volume_ratio: volume_ratio(bar.volume, prior_average),
        })
    }

    /// Snapshot of the most recent bar.
    pub fn latest(&self) -> Option<IndicatorSnapshot> {
        self.snapshot(self.bars.len().checked_sub(1)?)
    }

    /// Date of the most recent bar within `lookback` bars ending at `index`
    /// whose volume exceeds `multiple` times its rolling average.
    pub fn recent_volume_spike(
        &self,
        index: usize,
        lookback: usize,
        multiple: f64,
    ) -> Option<NaiveDate> {
        if index >= self.bars.len() || lookback == 0 {
            return None;
        }
        let start = (index + 1).saturating_sub(lookback);
        (start..=index).rev().find_map(|i| {
            let average = self.volume_average.value_at(i)?;
            let bar = &self.bars[i];
            (average > 0.0 && bar.volume as f64 > multiple * average).then_some(bar.date)
        })
    }
}
