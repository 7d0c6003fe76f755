//! Technical indicator implementations.
//!
//! This module provides types for representing indicator values and series:
//! - `IndicatorPoint`: A single point in an indicator time series
//! - `IndicatorValue`: Enum for the indicator output shapes
//! - `IndicatorType`: Enum for indicator identity + parameters
//! - `IndicatorSeries`: A time series of indicator values
//!
//! Every calculator emits exactly one point per input bar. Points inside the
//! warmup window are marked `valid: false` and must not feed a signal.

pub mod sma;
pub mod bollinger;
pub mod rsi;
pub mod volume;

use chrono::NaiveDate;
use std::fmt;

#[derive(Debug, Clone)]
pub struct IndicatorPoint {
    pub date: NaiveDate,
    pub valid: bool,
    pub value: IndicatorValue,
}

#[derive(Debug, Clone)]
pub enum IndicatorValue {
    Simple(f64),
    Bollinger { upper: f64, middle: f64, lower: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndicatorType {
    Sma(usize),
    Rsi(usize),
    VolumeAverage(usize),
    Bollinger {
        period: usize,
        mult: f64,
    },
}

#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    /// Value of a single-valued indicator at `index`, `None` when undefined.
    pub fn value_at(&self, index: usize) -> Option<f64> {
        let point = self.values.get(index)?;
        if !point.valid {
            return None;
        }
        match point.value {
            IndicatorValue::Simple(v) if v.is_finite() => Some(v),
            _ => None,
        }
    }

    /// `(upper, middle, lower)` of a band indicator at `index`.
    pub fn bands_at(&self, index: usize) -> Option<(f64, f64, f64)> {
        let point = self.values.get(index)?;
        if !point.valid {
            return None;
        }
        match point.value {
            IndicatorValue::Bollinger {
                upper,
                middle,
                lower,
            } => Some((upper, middle, lower)),
            _ => None,
        }
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Sma(period) => write!(f, "SMA({})", period),
            IndicatorType::Rsi(period) => write!(f, "RSI({})", period),
            IndicatorType::VolumeAverage(period) => write!(f, "VOLUME_AVG({})", period),
            IndicatorType::Bollinger { period, mult } => {
                write!(f, "BOLLINGER({},{})", period, mult)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(valid: bool, value: IndicatorValue) -> IndicatorPoint {
        IndicatorPoint {
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            valid,
            value,
        }
    }

    #[test]
    fn indicator_type_display() {
        assert_eq!(IndicatorType::Sma(20).to_string(), "SMA(20)");
        assert_eq!(IndicatorType::Rsi(14).to_string(), "RSI(14)");
        assert_eq!(IndicatorType::VolumeAverage(20).to_string(), "VOLUME_AVG(20)");
        let boll = IndicatorType::Bollinger {
            period: 20,
            mult: 2.0,
        };
        assert_eq!(boll.to_string(), "BOLLINGER(20,2)");
    }

    #[test]
    fn value_at_respects_validity() {
        let series = IndicatorSeries {
            indicator_type: IndicatorType::Sma(2),
            values: vec![
                point(false, IndicatorValue::Simple(0.0)),
                point(true, IndicatorValue::Simple(5.0)),
            ],
        };
        assert_eq!(series.value_at(0), None);
        assert_eq!(series.value_at(1), Some(5.0));
        assert_eq!(series.value_at(2), None);
    }

    #[test]
    fn value_at_rejects_non_finite() {
        let series = IndicatorSeries {
            indicator_type: IndicatorType::Sma(1),
            values: vec![point(true, IndicatorValue::Simple(f64::NAN))],
        };
        assert_eq!(series.value_at(0), None);
    }

    #[test]
    fn bands_at_shape_mismatch_is_none() {
        let series = IndicatorSeries {
            indicator_type: IndicatorType::Sma(1),
            values: vec![point(true, IndicatorValue::Simple(1.0))],
        };
        assert_eq!(series.bands_at(0), None);
    }
}
