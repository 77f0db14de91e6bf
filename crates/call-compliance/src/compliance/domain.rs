use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Highest score a call can receive and the ceiling for a single rule's impact.
pub const PERFECT_SCORE: u8 = 100;

/// Identifier wrapper for policy rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub String);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tenant that owns rules and whose calls are evaluated against them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrganizationId(pub String);

impl fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Selects which matcher strategy evaluates a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    Keyword,
    Sentiment,
    Duration,
    Topic,
    Custom,
    /// Any tag this build does not know; no matcher is registered for it.
    #[serde(other)]
    Unknown,
}

impl RuleType {
    pub fn label(&self) -> &'static str {
        match self {
            RuleType::Keyword => "keyword",
            RuleType::Sentiment => "sentiment",
            RuleType::Duration => "duration",
            RuleType::Topic => "topic",
            RuleType::Custom => "custom",
            RuleType::Unknown => "unknown",
        }
    }
}

/// Informational classification of a rule. Scoring only reads `score_impact`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// Single comparison inside a rule. Conditions within a rule are OR-combined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default)]
    pub field: String,
    pub operator: String,
    #[serde(default)]
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            operator: operator.into(),
            value,
        }
    }

    pub fn parsed_operator(&self) -> Option<ConditionOperator> {
        ConditionOperator::parse(&self.operator)
    }
}

/// Operator vocabulary understood by the built-in matchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionOperator {
    Contains,
    LessThan,
    GreaterThan,
}

impl ConditionOperator {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "contains" => Some(Self::Contains),
            "less_than" => Some(Self::LessThan),
            "greater_than" => Some(Self::GreaterThan),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Notify,
    Flag,
    Escalate,
}

impl ActionType {
    pub fn label(&self) -> &'static str {
        match self {
            ActionType::Notify => "notify",
            ActionType::Flag => "flag",
            ActionType::Escalate => "escalate",
        }
    }
}

/// Follow-up executed when the owning rule is violated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub target: String,
    #[serde(default)]
    pub value: Value,
}

/// Organization-scoped policy unit, in its persisted shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub organization_id: OrganizationId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    pub severity: Severity,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub actions: Vec<Action>,
    pub is_active: bool,
    pub score_impact: u8,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
}

impl Rule {
    /// Checks the invariants a rule must hold before it may be stored.
    pub fn validate(&self) -> Result<(), RuleDefinitionError> {
        if self.id.0.trim().is_empty() {
            return Err(RuleDefinitionError::MissingId);
        }
        if self.organization_id.0.trim().is_empty() {
            return Err(RuleDefinitionError::MissingOrganization {
                rule_id: self.id.clone(),
            });
        }
        if self.score_impact > PERFECT_SCORE {
            return Err(RuleDefinitionError::ScoreImpactOutOfRange {
                rule_id: self.id.clone(),
                found: self.score_impact,
            });
        }
        Ok(())
    }

    pub fn is_owned_by(&self, organization_id: &OrganizationId) -> bool {
        &self.organization_id == organization_id
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RuleDefinitionError {
    #[error("rule id must not be empty")]
    MissingId,
    #[error("rule {rule_id} is not owned by any organization")]
    MissingOrganization { rule_id: RuleId },
    #[error("rule {rule_id} score impact must be within 0..=100 (found {found})")]
    ScoreImpactOutOfRange { rule_id: RuleId, found: u8 },
}

/// Derived per-call inputs under evaluation. Missing numeric signals read as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallSignals {
    #[serde(default)]
    pub keywords: BTreeSet<String>,
    #[serde(default)]
    pub sentiment: Option<f64>,
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub topics: BTreeSet<String>,
}

impl CallSignals {
    pub fn sentiment_or_default(&self) -> f64 {
        self.sentiment.unwrap_or(0.0)
    }

    pub fn duration_or_default(&self) -> u64 {
        self.duration.unwrap_or(0)
    }
}

/// Record produced for every rule whose conditions matched a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub rule_id: RuleId,
    pub rule_name: String,
    pub severity: Severity,
    pub impact: u8,
}

impl Violation {
    pub fn from_rule(rule: &Rule) -> Self {
        Self {
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            severity: rule.severity,
            impact: rule.score_impact,
        }
    }
}

/// Engine output returned to callers of `evaluate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub violations: Vec<Violation>,
    #[serde(rename = "totalScoreImpact")]
    pub total_score_impact: u32,
    #[serde(rename = "finalScore")]
    pub final_score: u8,
}
