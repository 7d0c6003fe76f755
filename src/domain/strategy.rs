//! Strategy configuration and composition.
//!
//! A strategy bundles indicator windows, the scoring table, the entry rule and
//! the exit policy. Built-in presets cover the breakout trend rider, the
//! pullback ("knee") trader and a stricter breakout variant with fixed
//! take-profit and stop-loss levels. Strategy files may start from a preset
//! and override any part of it.

use std::fmt;
use std::str::FromStr;

use crate::domain::error::TrendscanError;
use crate::domain::indicator::rsi::RsiSmoothing;
use crate::domain::indicator_set::IndicatorParams;
use crate::domain::rule::{Operand, Rule};
use crate::domain::rule_parser::parse;
use crate::domain::scoring::{RuleGroup, ScoreRule, ScoringModel, Tier, TierTable};
use crate::ports::config_port::ConfigPort;

pub const PRESET_NAMES: &[&str] = &["trend_rider", "knee", "enhanced"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    TrendBreak,
}

impl ExitReason {
    pub const ALL: [ExitReason; 3] = [
        ExitReason::TakeProfit,
        ExitReason::StopLoss,
        ExitReason::TrendBreak,
    ];
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::TakeProfit => write!(f, "take_profit"),
            ExitReason::StopLoss => write!(f, "stop_loss"),
            ExitReason::TrendBreak => write!(f, "trend_break"),
        }
    }
}

impl FromStr for ExitReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "take_profit" => Ok(ExitReason::TakeProfit),
            "stop_loss" => Ok(ExitReason::StopLoss),
            "trend_break" => Ok(ExitReason::TrendBreak),
            other => Err(format!("unknown exit reason '{other}'")),
        }
    }
}

/// Which exits are armed and the order they are checked on a bar.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitPolicy {
    pub trend_break: bool,
    pub take_profit_pct: Option<f64>,
    pub stop_loss_pct: Option<f64>,
    pub priority: Vec<ExitReason>,
}

impl Default for ExitPolicy {
    fn default() -> Self {
        Self {
            trend_break: true,
            take_profit_pct: None,
            stop_loss_pct: None,
            priority: ExitReason::ALL.to_vec(),
        }
    }
}

impl ExitPolicy {
    pub fn is_enabled(&self, reason: ExitReason) -> bool {
        match reason {
            ExitReason::TakeProfit => self.take_profit_pct.is_some(),
            ExitReason::StopLoss => self.stop_loss_pct.is_some(),
            ExitReason::TrendBreak => self.trend_break,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Strategy {
    pub name: String,
    pub description: String,
    pub params: IndicatorParams,
    pub scoring: ScoringModel,
    pub entry: Rule,
    pub exit: ExitPolicy,
    pub allow_same_bar_reentry: bool,
}

fn above(left: Operand, right: Operand) -> Rule {
    Rule::Above { left, right }
}

fn below(left: Operand, right: Operand) -> Rule {
    Rule::Below { left, right }
}

fn at_least(left: Operand, right: f64) -> Rule {
    Rule::AtLeast {
        left,
        right: Operand::Constant(right),
    }
}

fn between(operand: Operand, lower: f64, upper: f64) -> Rule {
    Rule::Between {
        operand,
        lower,
        upper,
    }
}

fn tier(min_score: i32, label: &str) -> Tier {
    Tier {
        min_score,
        label: label.to_string(),
    }
}

fn alignment() -> Rule {
    Rule::And(vec![
        above(Operand::MaShort, Operand::MaMid),
        above(Operand::MaMid, Operand::MaLong),
    ])
}

fn breakout_entry() -> Rule {
    Rule::And(vec![
        above(Operand::MaShort, Operand::MaMid),
        above(Operand::MaMid, Operand::MaLong),
        above(Operand::Close, Operand::BollingerUpper),
        above(Operand::PriorVolumeRatio, Operand::Constant(1.5)),
        at_least(Operand::Rsi, 50.0),
    ])
}

fn breakout_groups() -> Vec<RuleGroup> {
    vec![
        RuleGroup::new("trend").rule(alignment(), 30, "MA alignment (short > mid > long)"),
        RuleGroup::new("band")
            .rule(at_least(Operand::BandDistance, 0.0), 30, "Bollinger upper band breakout")
            .rule(at_least(Operand::BandDistance, -2.0), 15, "within 2% of upper band"),
        RuleGroup::new("volume")
            .rule(at_least(Operand::VolumeRatio, 1.5), 20, "volume 1.5x average")
            .rule(at_least(Operand::VolumeRatio, 1.2), 10, "volume 1.2x average"),
    ]
}

impl Strategy {
    /// Breakout trend rider: buys a band breakout on volume inside an aligned
    /// trend and holds until the close falls below the mid MA.
    pub fn trend_rider() -> Self {
        let mut groups = breakout_groups();
        groups.push(RuleGroup::new("momentum").rule(
            at_least(Operand::Rsi, 50.0),
            20,
            "RSI at or above 50",
        ));

        Self {
            name: "trend_rider".to_string(),
            description: "Bollinger breakout inside an aligned trend, exit on mid MA break"
                .to_string(),
            params: IndicatorParams::default(),
            scoring: ScoringModel::new(
                groups,
                TierTable::new(vec![tier(80, "strong buy"), tier(50, "consider")], "wait"),
            ),
            entry: breakout_entry(),
            exit: ExitPolicy::default(),
            allow_same_bar_reentry: false,
        }
    }

    /// Pullback trader: buys a close just above a rising mid MA.
    pub fn knee() -> Self {
        let rising = above(Operand::MaMidSlope, Operand::Constant(0.0));
        let groups = vec![
            RuleGroup::new("trend").rule(
                above(Operand::MaMid, Operand::MaLong),
                20,
                "mid MA above long MA",
            ),
            RuleGroup::new("slope").rule(rising.clone(), 20, "mid MA rising"),
            RuleGroup::new("position")
                .rule(between(Operand::Disparity, 0.0, 3.0), 40, "knee zone (0-3% above mid MA)")
                .rule(between(Operand::Disparity, 3.0, 5.0), 20, "slightly extended (3-5%)")
                .rule(above(Operand::Disparity, Operand::Constant(5.0)), 5, "extended above mid MA")
                .rule(at_least(Operand::Disparity, -1.0), 10, "support test (within 1% below)")
                .rule(below(Operand::Disparity, Operand::Constant(-1.0)), -20, "mid MA breakdown"),
            RuleGroup::new("momentum").rule(
                between(Operand::Rsi, 35.0, 65.0),
                20,
                "RSI neutral (35-65)",
            ),
            RuleGroup::new("volume").rule(
                at_least(Operand::VolumeRatio, 0.8),
                10,
                "volume holding up",
            ),
        ];

        Self {
            name: "knee".to_string(),
            description: "Pullback to a rising mid MA, exit on mid MA break".to_string(),
            params: IndicatorParams::default(),
            scoring: ScoringModel::new(
                groups,
                TierTable::new(vec![tier(80, "strong buy"), tier(60, "buy")], "wait"),
            ),
            entry: Rule::And(vec![
                above(Operand::MaMid, Operand::MaLong),
                rising,
                between(Operand::Disparity, 0.0, 5.0),
            ]),
            exit: ExitPolicy::default(),
            allow_same_bar_reentry: false,
        }
    }

    /// Breakout entry with +7% take-profit, -3% stop-loss and an overbought
    /// RSI penalty.
    pub fn enhanced() -> Self {
        let mut groups = breakout_groups();
        groups.push(
            RuleGroup::new("momentum")
                .rule(above(Operand::Rsi, Operand::Constant(70.0)), -10, "RSI overbought (above 70)")
                .rule(at_least(Operand::Rsi, 50.0), 20, "RSI between 50 and 70"),
        );

        Self {
            name: "enhanced".to_string(),
            description: "Breakout with +7% take-profit, -3% stop-loss and trend break"
                .to_string(),
            params: IndicatorParams::default(),
            scoring: ScoringModel::new(
                groups,
                TierTable::new(vec![tier(80, "strong buy"), tier(50, "consider")], "wait"),
            ),
            entry: breakout_entry(),
            exit: ExitPolicy {
                trend_break: true,
                take_profit_pct: Some(7.0),
                stop_loss_pct: Some(3.0),
                priority: ExitReason::ALL.to_vec(),
            },
            allow_same_bar_reentry: false,
        }
    }

    pub fn preset(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "trend_rider" => Some(Self::trend_rider()),
            "knee" => Some(Self::knee()),
            "enhanced" => Some(Self::enhanced()),
            _ => None,
        }
    }

    pub fn presets() -> Vec<Self> {
        PRESET_NAMES.iter().filter_map(|n| Self::preset(n)).collect()
    }

    pub fn min_history(&self) -> usize {
        self.params.min_history()
    }

    /// Build a strategy from the `[strategy]`, `[indicators]` and `[scoring]`
    /// sections, starting from the named preset (default `trend_rider`).
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, TrendscanError> {
        let preset_name = config
            .get_string("strategy", "preset")
            .unwrap_or_else(|| "trend_rider".to_string());
        let mut strategy = Self::preset(&preset_name).ok_or_else(|| invalid(
            "strategy",
            "preset",
            format!("unknown preset '{}', expected one of {}", preset_name, PRESET_NAMES.join(", ")),
        ))?;

        if let Some(name) = config.get_string("strategy", "name") {
            strategy.name = name;
        }
        if let Some(description) = config.get_string("strategy", "description") {
            strategy.description = description;
        }
        if let Some(entry) = config.get_string("strategy", "entry") {
            strategy.entry = parse_rule_value(&entry, "strategy", "entry")?;
        }

        load_exit_policy(config, &mut strategy.exit)?;
        strategy.allow_same_bar_reentry =
            flag(config, "same_bar_reentry", strategy.allow_same_bar_reentry)?;

        load_params(config, &mut strategy.params)?;
        load_scoring(config, &mut strategy.scoring)?;

        tracing::debug!(
            strategy = %strategy.name,
            preset = %preset_name,
            "strategy loaded"
        );
        Ok(strategy)
    }
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> TrendscanError {
    TrendscanError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn parse_rule_value(text: &str, section: &str, key: &str) -> Result<Rule, TrendscanError> {
    parse(text).map_err(|e| {
        tracing::error!(
            section,
            key,
            "rule does not parse:\n{}",
            e.display_with_context(text)
        );
        TrendscanError::RuleParse(e)
    })
}

/// `None` for an absent key or an explicit "off"/"none"; the percentage otherwise.
fn optional_pct(
    config: &dyn ConfigPort,
    key: &str,
    current: Option<f64>,
) -> Result<Option<f64>, TrendscanError> {
    let Some(raw) = config.get_string("strategy", key) else {
        return Ok(current);
    };
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("off") || raw.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    let value: f64 = raw
        .parse()
        .map_err(|_| invalid("strategy", key, format!("'{}' is not a number", raw)))?;
    if !value.is_finite() || value < 0.0 {
        return Err(invalid("strategy", key, "must be a non-negative percentage"));
    }
    Ok(if value == 0.0 { None } else { Some(value) })
}

fn load_exit_policy(config: &dyn ConfigPort, exit: &mut ExitPolicy) -> Result<(), TrendscanError> {
    exit.trend_break = flag(config, "trend_break", exit.trend_break)?;
    exit.take_profit_pct = optional_pct(config, "take_profit", exit.take_profit_pct)?;
    exit.stop_loss_pct = optional_pct(config, "stop_loss", exit.stop_loss_pct)?;

    if let Some(raw) = config.get_string("strategy", "exit_priority") {
        let mut priority = Vec::new();
        for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let reason: ExitReason = token
                .parse()
                .map_err(|e: String| invalid("strategy", "exit_priority", e))?;
            if priority.contains(&reason) {
                return Err(invalid(
                    "strategy",
                    "exit_priority",
                    format!("'{}' listed twice", reason),
                ));
            }
            priority.push(reason);
        }
        // unlisted exits keep their default relative order after the listed ones
        for reason in ExitReason::ALL {
            if !priority.contains(&reason) {
                priority.push(reason);
            }
        }
        exit.priority = priority;
    }
    Ok(())
}

fn flag(config: &dyn ConfigPort, key: &str, current: bool) -> Result<bool, TrendscanError> {
    let value = config
        .try_bool("strategy", key)
        .map_err(|raw| invalid("strategy", key, format!("'{}' is not a boolean", raw)))?;
    Ok(value.unwrap_or(current))
}

fn window(config: &dyn ConfigPort, key: &str, current: usize) -> Result<usize, TrendscanError> {
    let Some(value) = config
        .try_int("indicators", key)
        .map_err(|raw| invalid("indicators", key, format!("'{}' is not an integer", raw)))?
    else {
        return Ok(current);
    };
    usize::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| invalid("indicators", key, "must be a positive integer"))
}

fn load_params(config: &dyn ConfigPort, params: &mut IndicatorParams) -> Result<(), TrendscanError> {
    params.ma_short = window(config, "ma_short", params.ma_short)?;
    params.ma_mid = window(config, "ma_mid", params.ma_mid)?;
    params.ma_long = window(config, "ma_long", params.ma_long)?;
    params.bollinger_period = window(config, "bollinger_period", params.bollinger_period)?;
    params.rsi_period = window(config, "rsi_period", params.rsi_period)?;
    params.volume_period = window(config, "volume_period", params.volume_period)?;
    if let Some(mult) = config
        .try_double("indicators", "bollinger_mult")
        .map_err(|raw| invalid("indicators", "bollinger_mult", format!("'{}' is not a number", raw)))?
    {
        params.bollinger_mult = mult;
    }

    if let Some(raw) = config.get_string("indicators", "rsi_smoothing") {
        params.rsi_smoothing = raw
            .parse::<RsiSmoothing>()
            .map_err(|e| invalid("indicators", "rsi_smoothing", e))?;
    }
    Ok(())
}

/// Numbered keys `<prefix><n>` sorted by `n`.
fn numbered_keys(keys: &[String], prefix: &str) -> Result<Vec<(usize, String)>, TrendscanError> {
    let mut numbered = Vec::new();
    for key in keys.iter().filter(|k| k.starts_with(prefix)) {
        let n = key[prefix.len()..]
            .parse::<usize>()
            .map_err(|_| invalid("scoring", key, format!("expected {}<number>", prefix)))?;
        numbered.push((n, key.clone()));
    }
    numbered.sort();
    Ok(numbered)
}

fn load_scoring(config: &dyn ConfigPort, scoring: &mut ScoringModel) -> Result<(), TrendscanError> {
    if !config.has_section("scoring") {
        return Ok(());
    }
    let keys = config.keys("scoring");

    if let Some(unknown) = keys
        .iter()
        .find(|k| !(k.starts_with("rule_") || k.starts_with("tier_") || k.as_str() == "floor"))
    {
        return Err(invalid("scoring", unknown, "unknown key"));
    }

    let rule_keys = numbered_keys(&keys, "rule_")?;
    if !rule_keys.is_empty() {
        let mut groups: Vec<RuleGroup> = Vec::new();
        for (_, key) in &rule_keys {
            let raw = config.get_string("scoring", key).unwrap_or_default();
            let fields: Vec<&str> = raw.splitn(4, '|').map(str::trim).collect();
            let [group, points, reason, text] = fields[..] else {
                return Err(invalid(
                    "scoring",
                    key,
                    "expected 'group | points | reason | RULE'",
                ));
            };
            let points: i32 = points
                .parse()
                .map_err(|_| invalid("scoring", key, format!("points '{}' is not an integer", points)))?;
            let score_rule = ScoreRule {
                rule: parse_rule_value(text, "scoring", key)?,
                points,
                reason: reason.to_string(),
            };
            match groups.last_mut() {
                Some(last) if last.name == group => last.rules.push(score_rule),
                _ => groups.push(RuleGroup {
                    name: group.to_string(),
                    rules: vec![score_rule],
                }),
            }
        }
        scoring.groups = groups;
    }

    let tier_keys = numbered_keys(&keys, "tier_")?;
    let floor = config.get_string("scoring", "floor");
    if !tier_keys.is_empty() || floor.is_some() {
        let mut tiers = Vec::new();
        for (_, key) in &tier_keys {
            let raw = config.get_string("scoring", key).unwrap_or_default();
            let Some((min, label)) = raw.split_once('|') else {
                return Err(invalid("scoring", key, "expected 'min_score | label'"));
            };
            let min_score: i32 = min
                .trim()
                .parse()
                .map_err(|_| invalid("scoring", key, format!("'{}' is not an integer", min.trim())))?;
            tiers.push(Tier {
                min_score,
                label: label.trim().to_string(),
            });
        }
        if tier_keys.is_empty() {
            tiers = scoring.tiers.tiers().to_vec();
        }
        let floor = floor.unwrap_or_else(|| scoring.tiers.floor().to_string());
        let table = TierTable::new(tiers, floor);
        table
            .validate()
            .map_err(|e| invalid("scoring", "tier", e.to_string()))?;
        scoring.tiers = table;
    }
    Ok(())
}
