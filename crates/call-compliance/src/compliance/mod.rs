//! Compliance rule evaluation for recorded calls.
//!
//! A call's derived signals are checked against its organization's active rules. The pure
//! phase (`evaluator`, `matcher`, `score`) produces violations and a score; the effect
//! phase (`dispatch`) hands triggered actions to notification sinks off the scoring path.
//! `service` composes both behind the `store` read contract.

pub mod config;
pub mod dispatch;
pub mod domain;
pub mod evaluator;
pub mod matcher;
pub mod request;
pub mod router;
pub mod score;
pub mod service;
pub mod store;

#[cfg(test)]
mod tests;

pub use config::EngineConfig;
pub use dispatch::{
    ActionDispatcher, ActionNotification, DispatchBatch, DispatchError, DispatchHandle,
    DispatchReport, NotificationSink, TracingNotificationSink,
};
pub use domain::{
    Action, ActionType, CallSignals, Condition, ConditionOperator, EvaluationResult,
    OrganizationId, Rule, RuleDefinitionError, RuleId, RuleType, Severity, Violation,
    PERFECT_SCORE,
};
pub use evaluator::{FaultPolicy, RuleEvaluation, RuleEvaluator, RuleFault, TriggeredAction};
pub use matcher::{
    ConditionMatcher, CustomMatcher, CustomPredicate, CustomPredicateRegistry, DurationMatcher,
    KeywordMatcher, MatchError, MatcherRegistry, SentimentMatcher, TopicMatcher,
};
pub use request::{CallData, EvaluateRequest, SentimentData, TranscriptData, ValidationError};
pub use router::compliance_router;
pub use score::{ScoreAggregator, ScoreSummary};
pub use service::{CallComplianceService, ComplianceServiceError};
pub use store::{CachedRuleStore, InMemoryRuleStore, RuleLoadError, RuleStore, RuleStoreError};
