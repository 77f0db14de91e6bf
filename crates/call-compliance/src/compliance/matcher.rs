use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::domain::{CallSignals, Condition, ConditionOperator, Rule, RuleId, RuleType};

/// Internal failure raised while matching a single rule.
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error("condition value {value} cannot be compared as a number")]
    NonNumericThreshold { value: Value },
    #[error("custom predicate failed: {0}")]
    Predicate(String),
    #[error("matcher panicked: {0}")]
    Panicked(String),
}

/// Strategy deciding whether one rule is violated by one call.
pub trait ConditionMatcher: Send + Sync {
    fn is_violated(&self, rule: &Rule, signals: &CallSignals) -> Result<bool, MatchError>;
}

/// OR-combines per-condition checks. A failing condition does not stop its siblings;
/// the error only surfaces when no sibling matched.
fn any_condition<F>(conditions: &[Condition], mut check: F) -> Result<bool, MatchError>
where
    F: FnMut(&Condition) -> Result<bool, MatchError>,
{
    let mut first_error = None;
    for condition in conditions {
        match check(condition) {
            Ok(true) => return Ok(true),
            Ok(false) => {}
            Err(error) => {
                first_error.get_or_insert(error);
            }
        }
    }

    match first_error {
        Some(error) => Err(error),
        None => Ok(false),
    }
}

fn contains_member(condition: &Condition, members: &BTreeSet<String>) -> bool {
    if condition.parsed_operator() != Some(ConditionOperator::Contains) {
        return false;
    }

    match &condition.value {
        Value::String(needle) => members.contains(needle),
        _ => false,
    }
}

/// Reads a threshold from a condition value, accepting numeric strings.
fn threshold(value: &Value) -> Result<f64, MatchError> {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => raw.trim().parse::<f64>().ok(),
        _ => None,
    };

    parsed
        .filter(|parsed| !parsed.is_nan())
        .ok_or_else(|| MatchError::NonNumericThreshold {
            value: value.clone(),
        })
}

fn compare(condition: &Condition, observed: f64) -> Result<bool, MatchError> {
    match condition.parsed_operator() {
        Some(ConditionOperator::LessThan) => Ok(observed < threshold(&condition.value)?),
        Some(ConditionOperator::GreaterThan) => Ok(observed > threshold(&condition.value)?),
        _ => Ok(false),
    }
}

/// Exact, case-sensitive membership against the call's transcript keywords.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordMatcher;

impl ConditionMatcher for KeywordMatcher {
    fn is_violated(&self, rule: &Rule, signals: &CallSignals) -> Result<bool, MatchError> {
        any_condition(&rule.conditions, |condition| {
            Ok(contains_member(condition, &signals.keywords))
        })
    }
}

/// Exact, case-sensitive membership against the call's detected topics.
#[derive(Debug, Default, Clone, Copy)]
pub struct TopicMatcher;

impl ConditionMatcher for TopicMatcher {
    fn is_violated(&self, rule: &Rule, signals: &CallSignals) -> Result<bool, MatchError> {
        any_condition(&rule.conditions, |condition| {
            Ok(contains_member(condition, &signals.topics))
        })
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SentimentMatcher;

impl ConditionMatcher for SentimentMatcher {
    fn is_violated(&self, rule: &Rule, signals: &CallSignals) -> Result<bool, MatchError> {
        let observed = signals.sentiment_or_default();
        any_condition(&rule.conditions, |condition| compare(condition, observed))
    }
}

/// Compares call length in seconds.
#[derive(Debug, Default, Clone, Copy)]
pub struct DurationMatcher;

impl ConditionMatcher for DurationMatcher {
    fn is_violated(&self, rule: &Rule, signals: &CallSignals) -> Result<bool, MatchError> {
        let observed = signals.duration_or_default() as f64;
        any_condition(&rule.conditions, |condition| compare(condition, observed))
    }
}

/// Caller-supplied predicate backing a `custom` rule.
pub type CustomPredicate = dyn Fn(&Rule, &CallSignals) -> Result<bool, MatchError> + Send + Sync;

/// Named predicates for `custom` rules, looked up by rule id first and rule name second.
#[derive(Default, Clone)]
pub struct CustomPredicateRegistry {
    by_rule_id: HashMap<RuleId, Arc<CustomPredicate>>,
    by_rule_name: HashMap<String, Arc<CustomPredicate>>,
}

impl CustomPredicateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_for_rule<F>(mut self, rule_id: RuleId, predicate: F) -> Self
    where
        F: Fn(&Rule, &CallSignals) -> Result<bool, MatchError> + Send + Sync + 'static,
    {
        self.by_rule_id.insert(rule_id, Arc::new(predicate));
        self
    }

    pub fn register_for_name<F>(mut self, rule_name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Rule, &CallSignals) -> Result<bool, MatchError> + Send + Sync + 'static,
    {
        self.by_rule_name.insert(rule_name.into(), Arc::new(predicate));
        self
    }

    pub fn lookup(&self, rule: &Rule) -> Option<&Arc<CustomPredicate>> {
        self.by_rule_id
            .get(&rule.id)
            .or_else(|| self.by_rule_name.get(&rule.name))
    }

    pub fn len(&self) -> usize {
        self.by_rule_id.len() + self.by_rule_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for CustomPredicateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.by_rule_id.keys().map(|id| id.0.as_str()).collect();
        ids.sort_unstable();
        let mut names: Vec<_> = self.by_rule_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("CustomPredicateRegistry")
            .field("by_rule_id", &ids)
            .field("by_rule_name", &names)
            .finish()
    }
}

/// Runs the registered predicate; rules without one are never violated.
#[derive(Debug, Default, Clone)]
pub struct CustomMatcher {
    predicates: CustomPredicateRegistry,
}

impl CustomMatcher {
    pub fn new(predicates: CustomPredicateRegistry) -> Self {
        Self { predicates }
    }
}

impl ConditionMatcher for CustomMatcher {
    fn is_violated(&self, rule: &Rule, signals: &CallSignals) -> Result<bool, MatchError> {
        match self.predicates.lookup(rule) {
            Some(predicate) => predicate(rule, signals),
            None => Ok(false),
        }
    }
}

/// Lookup table from rule type to matcher strategy.
#[derive(Clone, Default)]
pub struct MatcherRegistry {
    matchers: HashMap<RuleType, Arc<dyn ConditionMatcher>>,
}

impl MatcherRegistry {
    /// Registry with no strategies; every rule evaluates as not violated.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Built-in strategies for every rule type, with `custom` backed by `predicates`.
    pub fn standard(predicates: CustomPredicateRegistry) -> Self {
        Self::empty()
            .with(RuleType::Keyword, KeywordMatcher)
            .with(RuleType::Sentiment, SentimentMatcher)
            .with(RuleType::Duration, DurationMatcher)
            .with(RuleType::Topic, TopicMatcher)
            .with(RuleType::Custom, CustomMatcher::new(predicates))
    }

    pub fn with<M>(mut self, rule_type: RuleType, matcher: M) -> Self
    where
        M: ConditionMatcher + 'static,
    {
        self.register(rule_type, matcher);
        self
    }

    pub fn register<M>(&mut self, rule_type: RuleType, matcher: M)
    where
        M: ConditionMatcher + 'static,
    {
        self.matchers.insert(rule_type, Arc::new(matcher));
    }

    pub fn get(&self, rule_type: RuleType) -> Option<&Arc<dyn ConditionMatcher>> {
        self.matchers.get(&rule_type)
    }
}

impl fmt::Debug for MatcherRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.matchers.keys().map(RuleType::label).collect();
        types.sort_unstable();
        f.debug_struct("MatcherRegistry")
            .field("rule_types", &types)
            .finish()
    }
}
