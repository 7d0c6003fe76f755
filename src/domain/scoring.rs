//! Multi-factor scoring of an indicator snapshot.
//!
//! A model is an ordered list of rule groups. Within a group the first rule
//! that holds contributes its points and reason; later rules in the group are
//! skipped. The summed points are mapped to a label by a tier table whose
//! floor label catches every score below the lowest tier.

use crate::domain::error::TrendscanError;
use crate::domain::indicator_set::IndicatorSnapshot;
use crate::domain::rule::Rule;
use crate::domain::rule_eval::evaluate;

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRule {
    pub rule: Rule,
    pub points: i32,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleGroup {
    pub name: String,
    pub rules: Vec<ScoreRule>,
}

impl RuleGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
        }
    }

    pub fn rule(mut self, rule: Rule, points: i32, reason: impl Into<String>) -> Self {
        self.rules.push(ScoreRule {
            rule,
            points,
            reason: reason.into(),
        });
        self
    }

    fn first_match(&self, snapshot: &IndicatorSnapshot) -> Option<&ScoreRule> {
        self.rules.iter().find(|r| evaluate(&r.rule, snapshot))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tier {
    pub min_score: i32,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TierTable {
    tiers: Vec<Tier>,
    floor: String,
}

impl TierTable {
    /// Build a table from `(min_score, label)` tiers and the floor label.
    /// Tiers are kept sorted by descending minimum.
    pub fn new(mut tiers: Vec<Tier>, floor: impl Into<String>) -> Self {
        tiers.sort_by(|a, b| b.min_score.cmp(&a.min_score));
        Self {
            tiers,
            floor: floor.into(),
        }
    }

    /// Reject an empty floor label, empty tier labels and duplicate minimums.
    pub fn validate(&self) -> Result<(), TrendscanError> {
        if self.floor.trim().is_empty() {
            return Err(TrendscanError::RuleInvalid {
                reason: "tier table needs a floor label".to_string(),
            });
        }
        if let Some(tier) = self.tiers.iter().find(|t| t.label.trim().is_empty()) {
            return Err(TrendscanError::RuleInvalid {
                reason: format!("tier at {} has an empty label", tier.min_score),
            });
        }
        if let Some(pair) = self
            .tiers
            .windows(2)
            .find(|w| w[0].min_score == w[1].min_score)
        {
            return Err(TrendscanError::RuleInvalid {
                reason: format!("duplicate tier minimum {}", pair[0].min_score),
            });
        }
        Ok(())
    }

    pub fn label(&self, score: i32) -> &str {
        self.tiers
            .iter()
            .find(|t| score >= t.min_score)
            .map(|t| t.label.as_str())
            .unwrap_or(&self.floor)
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    pub fn floor(&self) -> &str {
        &self.floor
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreReason {
    pub reason: String,
    pub points: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreResult {
    pub score: i32,
    pub label: String,
    pub reasons: Vec<ScoreReason>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoringModel {
    pub groups: Vec<RuleGroup>,
    pub tiers: TierTable,
}

impl ScoringModel {
    pub fn new(groups: Vec<RuleGroup>, tiers: TierTable) -> Self {
        Self { groups, tiers }
    }

    pub fn score(&self, snapshot: &IndicatorSnapshot) -> ScoreResult {
        let reasons: Vec<ScoreReason> = self
            .groups
            .iter()
            .filter_map(|g| g.first_match(snapshot))
            .map(|r| ScoreReason {
                reason: r.reason.clone(),
                points: r.points,
            })
            .collect();

        let score = reasons.iter().map(|r| r.points).sum();
        ScoreResult {
            score,
            label: self.tiers.label(score).to_string(),
            reasons,
        }
    }

    /// Highest score any snapshot can reach.
    pub fn max_score(&self) -> i32 {
        self.groups
            .iter()
            .map(|g| g.rules.iter().map(|r| r.points).max().unwrap_or(0).max(0))
            .sum()
    }
}
