//! Rule AST data structures.
//!
//! This module defines the abstract syntax tree for scoring and entry rules:
//! - `Operand`: What can be compared (bar fields, snapshot indicators, constants)
//! - `Rule`: Comparison and composite predicates over operands
//!
//! `Display` renders a rule back into the text form `rule_parser` accepts.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Close,
    Volume,
    MaShort,
    MaMid,
    MaLong,
    MaMidPrev,
    MaMidSlope,
    BollingerUpper,
    BollingerMiddle,
    BollingerLower,
    Rsi,
    VolumeRatio,
    PriorVolumeRatio,
    Disparity,
    BandDistance,
    Constant(f64),
}

const NAMED_OPERANDS: &[(&str, Operand)] = &[
    ("close", Operand::Close),
    ("volume", Operand::Volume),
    ("ma_short", Operand::MaShort),
    ("ma_mid", Operand::MaMid),
    ("ma_long", Operand::MaLong),
    ("ma_mid_prev", Operand::MaMidPrev),
    ("ma_mid_slope", Operand::MaMidSlope),
    ("bb_upper", Operand::BollingerUpper),
    ("bb_middle", Operand::BollingerMiddle),
    ("bb_lower", Operand::BollingerLower),
    ("rsi", Operand::Rsi),
    ("volume_ratio", Operand::VolumeRatio),
    ("prior_volume_ratio", Operand::PriorVolumeRatio),
    ("disparity", Operand::Disparity),
    ("band_distance", Operand::BandDistance),
];

impl Operand {
    /// Look up a named operand; names are case-insensitive.
    pub fn from_name(name: &str) -> Option<Operand> {
        NAMED_OPERANDS
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, op)| op.clone())
    }

    pub fn names() -> impl Iterator<Item = &'static str> {
        NAMED_OPERANDS.iter().map(|(n, _)| *n)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Operand::Constant(v) = self {
            return write!(f, "{}", v);
        }
        let name = NAMED_OPERANDS
            .iter()
            .find(|(_, op)| op == self)
            .map(|(n, _)| *n)
            .unwrap_or("?");
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Above { left: Operand, right: Operand },
    Below { left: Operand, right: Operand },
    AtLeast { left: Operand, right: Operand },
    AtMost { left: Operand, right: Operand },
    Between {
        operand: Operand,
        lower: f64,
        upper: f64,
    },
    And(Vec<Rule>),
    Or(Vec<Rule>),
    Not(Box<Rule>),
}

fn write_list(f: &mut fmt::Formatter<'_>, name: &str, rules: &[Rule]) -> fmt::Result {
    write!(f, "{}(", name)?;
    for (i, r) in rules.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", r)?;
    }
    write!(f, ")")
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Above { left, right } => write!(f, "ABOVE({}, {})", left, right),
            Rule::Below { left, right } => write!(f, "BELOW({}, {})", left, right),
            Rule::AtLeast { left, right } => write!(f, "AT_LEAST({}, {})", left, right),
            Rule::AtMost { left, right } => write!(f, "AT_MOST({}, {})", left, right),
            Rule::Between {
                operand,
                lower,
                upper,
            } => write!(f, "BETWEEN({}, {}, {})", operand, lower, upper),
            Rule::And(rules) => write_list(f, "AND", rules),
            Rule::Or(rules) => write_list(f, "OR", rules),
            Rule::Not(rule) => write!(f, "NOT({})", rule),
        }
    }
}
