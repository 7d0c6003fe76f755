//! RSI (Relative Strength Index) indicator implementation.
//!
//! Gains and losses are the positive and negative parts of close-to-close
//! changes. Two smoothing modes are supported:
//! - `Simple`: plain rolling mean of the last n gains and the last n losses
//! - `Wilder`: seeded with the simple mean, then
//!   avg = (prev_avg * (n-1) + current) / n
//!
//! Formula: RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//! If avg_loss == 0: RSI = 100
//!
//! Warmup: first n bars are invalid (need n price changes).

use std::fmt;
use std::str::FromStr;

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::OhlcvBar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RsiSmoothing {
    #[default]
    Simple,
    Wilder,
}

impl fmt::Display for RsiSmoothing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RsiSmoothing::Simple => write!(f, "simple"),
            RsiSmoothing::Wilder => write!(f, "wilder"),
        }
    }
}

impl FromStr for RsiSmoothing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" | "sma" => Ok(RsiSmoothing::Simple),
            "wilder" => Ok(RsiSmoothing::Wilder),
            other => Err(format!("unknown RSI smoothing '{other}'")),
        }
    }
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
    }
}

pub fn calculate_rsi(bars: &[OhlcvBar], period: usize, smoothing: RsiSmoothing) -> IndicatorSeries {
    let invalid = |b: &OhlcvBar| IndicatorPoint {
        date: b.date,
        valid: false,
        value: IndicatorValue::Simple(0.0),
    };

    if period == 0 || bars.len() < 2 {
        return IndicatorSeries {
            indicator_type: IndicatorType::Rsi(period),
            values: bars.iter().map(invalid).collect(),
        };
    }

    // gains[k] / losses[k] belong to the change ending at bar k+1
    let (gains, losses): (Vec<f64>, Vec<f64>) = bars
        .windows(2)
        .map(|w| {
            let change = w[1].close - w[0].close;
            (change.max(0.0), (-change).max(0.0))
        })
        .unzip();

    let mut values = Vec::with_capacity(bars.len());
    values.push(invalid(&bars[0]));

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;

    for (i, bar) in bars.iter().enumerate().skip(1) {
        let change_idx = i - 1;

        if i < period {
            values.push(invalid(bar));
            continue;
        }

        let window = change_idx + 1 - period..=change_idx;
        match smoothing {
            RsiSmoothing::Simple => {
                avg_gain = gains[window.clone()].iter().sum::<f64>() / period as f64;
                avg_loss = losses[window].iter().sum::<f64>() / period as f64;
            }
            RsiSmoothing::Wilder if i == period => {
                avg_gain = gains[window.clone()].iter().sum::<f64>() / period as f64;
                avg_loss = losses[window].iter().sum::<f64>() / period as f64;
            }
            RsiSmoothing::Wilder => {
                avg_gain = (avg_gain * (period - 1) as f64 + gains[change_idx]) / period as f64;
                avg_loss = (avg_loss * (period - 1) as f64 + losses[change_idx]) / period as f64;
            }
        }

        values.push(IndicatorPoint {
            date: bar.date,
            valid: true,
            value: IndicatorValue::Simple(rsi_from_averages(avg_gain, avg_loss)),
        });
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Rsi(period),
        values,
    }
}
