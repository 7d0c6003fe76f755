//! Rolling average of traded volume.
//!
//! VOLUME_AVG(n)[i] = sum(V[i-j] for j in 0..n) / n
//! Warmup: first (n-1) bars are invalid.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_volume_average(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    let mut values = Vec::with_capacity(bars.len());
    let mut running: i64 = 0;

    for (i, bar) in bars.iter().enumerate() {
        running += bar.volume;
        if period > 0 && i >= period {
            running -= bars[i - period].volume;
        }

        let valid = period > 0 && i + 1 >= period;
        let value = if valid {
            running as f64 / period as f64
        } else {
            0.0
        };

        values.push(IndicatorPoint {
            date: bar.date,
            valid,
            value: IndicatorValue::Simple(value),
        });
    }

    IndicatorSeries {
        indicator_type: IndicatorType::VolumeAverage(period),
        values,
    }
}

/// `volume / average`, 0 when the average is 0.
pub fn volume_ratio(volume: i64, average: f64) -> f64 {
    if average == 0.0 {
        0.0
    } else {
        volume as f64 / average
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn make_bars(volumes: &[i64]) -> Vec<OhlcvBar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        volumes
            .iter()
            .enumerate()
            .map(|(i, &volume)| OhlcvBar {
                code: "TEST".into(),
                date: start + chrono::Duration::days(i as i64),
                open: 10.0,
                high: 10.0,
                low: 10.0,
                close: 10.0,
                volume,
            })
            .collect()
    }

    #[test]
    fn volume_average_values() {
        let series = calculate_volume_average(&make_bars(&[100, 200, 300, 400]), 2);
        assert_eq!(series.value_at(0), None);
        assert_eq!(series.value_at(1), Some(150.0));
        assert_eq!(series.value_at(2), Some(250.0));
        assert_eq!(series.value_at(3), Some(350.0));
    }

    #[test]
    fn volume_average_zero_volume() {
        let series = calculate_volume_average(&make_bars(&[0, 0, 0]), 3);
        assert_eq!(series.value_at(2), Some(0.0));
    }

    #[test]
    fn volume_average_indicator_type() {
        let series = calculate_volume_average(&make_bars(&[1]), 20);
        assert_eq!(series.indicator_type, IndicatorType::VolumeAverage(20));
        assert!(!series.values[0].valid);
    }

    #[test]
    fn ratio_guards_zero_average() {
        assert_eq!(volume_ratio(500, 0.0), 0.0);
        assert_eq!(volume_ratio(300, 200.0), 1.5);
    }
}
