//! Rule evaluation engine.
//!
//! Evaluates rules against a single indicator snapshot.
//!
//! # Evaluation Semantics
//!
//! - Comparison rules: strict for `ABOVE`/`BELOW`, inclusive for
//!   `AT_LEAST`/`AT_MOST` and both `BETWEEN` bounds
//! - A NaN operand makes every comparison false
//! - `AND`: Short-circuits on first `false`
//! - `OR`: Short-circuits on first `true`

use crate::domain::indicator_set::IndicatorSnapshot;
use crate::domain::rule::{Operand, Rule};

pub fn evaluate(rule: &Rule, snapshot: &IndicatorSnapshot) -> bool {
    match rule {
        Rule::Above { left, right } => {
            resolve_operand(left, snapshot) > resolve_operand(right, snapshot)
        }
        Rule::Below { left, right } => {
            resolve_operand(left, snapshot) < resolve_operand(right, snapshot)
        }
        Rule::AtLeast { left, right } => {
            resolve_operand(left, snapshot) >= resolve_operand(right, snapshot)
        }
        Rule::AtMost { left, right } => {
            resolve_operand(left, snapshot) <= resolve_operand(right, snapshot)
        }
        Rule::Between {
            operand,
            lower,
            upper,
        } => {
            let val = resolve_operand(operand, snapshot);
            val >= *lower && val <= *upper
        }
        Rule::And(rules) => rules.iter().all(|r| evaluate(r, snapshot)),
        Rule::Or(rules) => rules.iter().any(|r| evaluate(r, snapshot)),
        Rule::Not(rule) => !evaluate(rule, snapshot),
    }
}

pub fn resolve_operand(operand: &Operand, snapshot: &IndicatorSnapshot) -> f64 {
    match operand {
        Operand::Close => snapshot.close,
        Operand::Volume => snapshot.volume as f64,
        Operand::MaShort => snapshot.ma_short,
        Operand::MaMid => snapshot.ma_mid,
        Operand::MaLong => snapshot.ma_long,
        Operand::MaMidPrev => snapshot.prev_ma_mid,
        Operand::MaMidSlope => snapshot.ma_mid_slope(),
        Operand::BollingerUpper => snapshot.bollinger_upper,
        Operand::BollingerMiddle => snapshot.bollinger_middle,
        Operand::BollingerLower => snapshot.bollinger_lower,
        Operand::Rsi => snapshot.rsi,
        Operand::VolumeRatio => snapshot.volume_ratio,
        Operand::PriorVolumeRatio => snapshot.prior_volume_ratio,
        Operand::Disparity => snapshot.disparity(),
        Operand::BandDistance => snapshot.band_distance(),
        Operand::Constant(v) => *v,
    }
}
