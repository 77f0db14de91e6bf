use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::config::EngineConfig;
use super::dispatch::{ActionDispatcher, DispatchBatch, DispatchHandle, NotificationSink};
use super::domain::{CallSignals, EvaluationResult, OrganizationId, Rule};
use super::evaluator::RuleEvaluator;
use super::matcher::{CustomPredicateRegistry, MatcherRegistry};
use super::request::{EvaluateRequest, ValidationError};
use super::store::{RuleStore, RuleStoreError};

/// Service composing the rule store, evaluator, and action dispatcher.
pub struct CallComplianceService<S, N> {
    store: Arc<S>,
    evaluator: Arc<RuleEvaluator>,
    dispatcher: ActionDispatcher<N>,
    fetch_timeout: Duration,
}

impl<S, N> CallComplianceService<S, N>
where
    S: RuleStore + 'static,
    N: NotificationSink + 'static,
{
    pub fn new(store: Arc<S>, sink: Arc<N>, config: EngineConfig) -> Self {
        Self::with_custom_predicates(store, sink, CustomPredicateRegistry::default(), config)
    }

    pub fn with_custom_predicates(
        store: Arc<S>,
        sink: Arc<N>,
        predicates: CustomPredicateRegistry,
        config: EngineConfig,
    ) -> Self {
        Self::with_matchers(store, sink, MatcherRegistry::standard(predicates), config)
    }

    pub fn with_matchers(
        store: Arc<S>,
        sink: Arc<N>,
        matchers: MatcherRegistry,
        config: EngineConfig,
    ) -> Self {
        let evaluator = Arc::new(RuleEvaluator::new(matchers, config.fault_policy));

        Self {
            store,
            evaluator,
            dispatcher: ActionDispatcher::new(sink),
            fetch_timeout: config.fetch_timeout,
        }
    }

    pub fn evaluator(&self) -> &RuleEvaluator {
        &self.evaluator
    }

    /// Validate an inbound payload and evaluate it.
    pub async fn evaluate_request(
        &self,
        request: EvaluateRequest,
    ) -> Result<EvaluationResult, ComplianceServiceError> {
        let (organization_id, signals) = request.into_parts()?;
        self.evaluate(&organization_id, signals).await
    }

    /// Score one call against the organization's active rules. Triggered actions are
    /// dispatched in the background and never affect the returned result.
    pub async fn evaluate(
        &self,
        organization_id: &OrganizationId,
        signals: CallSignals,
    ) -> Result<EvaluationResult, ComplianceServiceError> {
        let (result, _dispatch) = self.evaluate_with_dispatch(organization_id, signals).await?;
        Ok(result)
    }

    /// Same as [`evaluate`](Self::evaluate) but hands back the dispatch handle so callers
    /// can observe delivery.
    pub async fn evaluate_with_dispatch(
        &self,
        organization_id: &OrganizationId,
        signals: CallSignals,
    ) -> Result<(EvaluationResult, DispatchHandle), ComplianceServiceError> {
        let rules = self.fetch_rules(organization_id).await?;
        let evaluation = self.evaluator.evaluate_rules(&rules, &signals);

        info!(
            %organization_id,
            rules_evaluated = evaluation.rules_evaluated,
            violations = evaluation.result.violations.len(),
            faults = evaluation.faults.len(),
            final_score = evaluation.result.final_score,
            "call evaluated"
        );

        let handle = self.dispatcher.spawn(DispatchBatch {
            organization_id: organization_id.clone(),
            signals,
            actions: evaluation.triggered_actions,
        });

        Ok((evaluation.result, handle))
    }

    async fn fetch_rules(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<Rule>, ComplianceServiceError> {
        let fetched = tokio::time::timeout(
            self.fetch_timeout,
            self.store.fetch_active_rules(organization_id),
        )
        .await
        .map_err(|_| RuleStoreError::Timeout {
            after_ms: u64::try_from(self.fetch_timeout.as_millis()).unwrap_or(u64::MAX),
        })??;

        let total = fetched.len();
        let rules: Vec<Rule> = fetched
            .into_iter()
            .filter(|rule| rule.is_active && rule.is_owned_by(organization_id))
            .collect();

        if rules.len() != total {
            warn!(
                %organization_id,
                dropped = total - rules.len(),
                "rule store returned inactive or foreign rules; ignoring them"
            );
        }

        Ok(rules)
    }
}

/// Error raised by the compliance service. Anything else degrades inside the engine.
#[derive(Debug, thiserror::Error)]
pub enum ComplianceServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    RuleStoreUnavailable(#[from] RuleStoreError),
}
