use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use super::domain::{Action, CallSignals, EvaluationResult, Rule, RuleId, Violation};
use super::matcher::{MatchError, MatcherRegistry};
use super::score::ScoreAggregator;

/// How a rule whose matcher fails internally is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultPolicy {
    /// The faulty rule counts as not violated; evaluation continues.
    #[default]
    FailOpen,
    /// The faulty rule counts as violated; evaluation continues.
    FailClosed,
}

impl FaultPolicy {
    pub fn label(&self) -> &'static str {
        match self {
            FaultPolicy::FailOpen => "fail_open",
            FaultPolicy::FailClosed => "fail_closed",
        }
    }
}

impl FromStr for FaultPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fail_open" | "open" => Ok(Self::FailOpen),
            "fail_closed" | "closed" => Ok(Self::FailClosed),
            other => Err(format!("unknown fault policy '{other}'")),
        }
    }
}

impl fmt::Display for FaultPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Action queued for dispatch because its rule was violated.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggeredAction {
    pub rule_id: RuleId,
    pub rule_name: String,
    pub action: Action,
}

/// Per-rule fault captured during evaluation. Only observable through logs and this record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleFault {
    pub rule_id: RuleId,
    pub detail: String,
    pub treated_as_violated: bool,
}

/// Output of the pure evaluation phase.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleEvaluation {
    pub result: EvaluationResult,
    pub triggered_actions: Vec<TriggeredAction>,
    pub faults: Vec<RuleFault>,
    pub rules_evaluated: usize,
}

/// Applies matcher strategies to a rule snapshot. Holds no per-call state.
#[derive(Debug, Clone)]
pub struct RuleEvaluator {
    matchers: MatcherRegistry,
    fault_policy: FaultPolicy,
}

impl RuleEvaluator {
    pub fn new(matchers: MatcherRegistry, fault_policy: FaultPolicy) -> Self {
        Self {
            matchers,
            fault_policy,
        }
    }

    pub fn fault_policy(&self) -> FaultPolicy {
        self.fault_policy
    }

    /// Evaluates `rules` in the given order. Violations and triggered actions keep that order.
    pub fn evaluate_rules(&self, rules: &[Rule], signals: &CallSignals) -> RuleEvaluation {
        let mut violations = Vec::new();
        let mut triggered_actions = Vec::new();
        let mut faults = Vec::new();

        for rule in rules {
            let violated = match self.check_rule(rule, signals) {
                Ok(violated) => violated,
                Err(fault) => {
                    let treated_as_violated = self.fault_policy == FaultPolicy::FailClosed;
                    if treated_as_violated {
                        error!(
                            rule_id = %rule.id,
                            organization_id = %rule.organization_id,
                            error = %fault,
                            "rule evaluation fault, treating rule as violated"
                        );
                    } else {
                        warn!(
                            rule_id = %rule.id,
                            organization_id = %rule.organization_id,
                            error = %fault,
                            "rule evaluation fault, skipping rule"
                        );
                    }
                    faults.push(RuleFault {
                        rule_id: rule.id.clone(),
                        detail: fault.to_string(),
                        treated_as_violated,
                    });
                    treated_as_violated
                }
            };

            if !violated {
                continue;
            }

            violations.push(Violation::from_rule(rule));
            triggered_actions.extend(rule.actions.iter().map(|action| TriggeredAction {
                rule_id: rule.id.clone(),
                rule_name: rule.name.clone(),
                action: action.clone(),
            }));
        }

        let summary = ScoreAggregator::aggregate(&violations);

        RuleEvaluation {
            result: EvaluationResult {
                violations,
                total_score_impact: summary.total_score_impact,
                final_score: summary.final_score,
            },
            triggered_actions,
            faults,
            rules_evaluated: rules.len(),
        }
    }

    fn check_rule(&self, rule: &Rule, signals: &CallSignals) -> Result<bool, MatchError> {
        // A rule without conditions can never match, whatever its type.
        if rule.conditions.is_empty() {
            return Ok(false);
        }

        let Some(matcher) = self.matchers.get(rule.rule_type) else {
            debug!(
                rule_id = %rule.id,
                rule_type = rule.rule_type.label(),
                "no matcher registered for rule type"
            );
            return Ok(false);
        };

        panic::catch_unwind(AssertUnwindSafe(|| matcher.is_violated(rule, signals)))
            .unwrap_or_else(|payload| Err(MatchError::Panicked(panic_message(payload.as_ref()))))
    }
}

impl Default for RuleEvaluator {
    fn default() -> Self {
        Self::new(
            MatcherRegistry::standard(Default::default()),
            FaultPolicy::default(),
        )
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
