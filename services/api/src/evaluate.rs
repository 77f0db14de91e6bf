use crate::infra::load_rules;
use call_compliance::compliance::{
    CallData, ComplianceServiceError, CustomPredicateRegistry, EvaluateRequest, FaultPolicy,
    MatcherRegistry, OrganizationId, RuleEvaluation, RuleEvaluator, RuleStore,
};
use call_compliance::error::AppError;
use clap::Args;
use std::fmt::Write as _;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub(crate) struct EvaluateArgs {
    /// JSON file holding the rule definitions
    #[arg(long)]
    pub(crate) rules: PathBuf,
    /// JSON file holding either a full evaluation request or bare call data
    #[arg(long)]
    pub(crate) call: PathBuf,
    /// Organization to evaluate for (overrides `organizationId` in the call file)
    #[arg(long)]
    pub(crate) organization: Option<String>,
    /// How rules whose evaluation fails are scored (fail_open or fail_closed)
    #[arg(long, default_value_t = FaultPolicy::FailOpen)]
    pub(crate) fault_policy: FaultPolicy,
    /// Print the evaluation result as JSON instead of a report
    #[arg(long)]
    pub(crate) json: bool,
}

pub(crate) async fn run_evaluation(args: EvaluateArgs) -> Result<(), AppError> {
    let EvaluateArgs {
        rules,
        call,
        organization,
        fault_policy,
        json,
    } = args;

    let store = load_rules(Some(&rules))?;
    let raw = std::fs::read_to_string(&call)?;
    let (organization_id, signals) = read_request(&raw, organization)?
        .into_parts()
        .map_err(ComplianceServiceError::from)?;

    let active = store
        .fetch_active_rules(&organization_id)
        .await
        .map_err(ComplianceServiceError::from)?;
    let matchers = MatcherRegistry::standard(CustomPredicateRegistry::default());
    let evaluator = RuleEvaluator::new(matchers, fault_policy);
    let evaluation = evaluator.evaluate_rules(&active, &signals);

    if json {
        println!("{}", serde_json::to_string_pretty(&evaluation.result)?);
    } else {
        print!("{}", format_report(&organization_id, fault_policy, &evaluation));
    }

    Ok(())
}

/// Accepts the HTTP request body shape or a bare `callData` object.
pub(crate) fn read_request(
    raw: &str,
    organization: Option<String>,
) -> Result<EvaluateRequest, AppError> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    let is_request = value
        .as_object()
        .map(|object| object.contains_key("callData") || object.contains_key("organizationId"))
        .unwrap_or(false);

    let mut request = if is_request {
        serde_json::from_value::<EvaluateRequest>(value)?
    } else {
        EvaluateRequest {
            organization_id: None,
            call_data: Some(serde_json::from_value::<CallData>(value)?),
        }
    };

    if organization.is_some() {
        request.organization_id = organization;
    }
    Ok(request)
}

pub(crate) fn format_report(
    organization_id: &OrganizationId,
    fault_policy: FaultPolicy,
    evaluation: &RuleEvaluation,
) -> String {
    let mut out = String::new();
    let result = &evaluation.result;

    let _ = writeln!(out, "Call compliance report for {organization_id}");
    let _ = writeln!(
        out,
        "Rules evaluated: {} | fault policy: {}",
        evaluation.rules_evaluated, fault_policy
    );

    if result.violations.is_empty() {
        let _ = writeln!(out, "\nViolations: none");
    } else {
        let _ = writeln!(out, "\nViolations");
        for violation in &result.violations {
            let _ = writeln!(
                out,
                "- [{}] {} ({}) -{}",
                violation.severity.label(),
                violation.rule_name,
                violation.rule_id,
                violation.impact
            );
        }
    }

    if !evaluation.triggered_actions.is_empty() {
        let _ = writeln!(out, "\nActions that would be dispatched");
        for triggered in &evaluation.triggered_actions {
            let _ = writeln!(
                out,
                "- {} -> {} (rule {})",
                triggered.action.action_type.label(),
                triggered.action.target,
                triggered.rule_id
            );
        }
    }

    if !evaluation.faults.is_empty() {
        let _ = writeln!(out, "\nEvaluation faults");
        for fault in &evaluation.faults {
            let outcome = if fault.treated_as_violated {
                "counted as violated"
            } else {
                "skipped"
            };
            let _ = writeln!(out, "- {}: {} ({outcome})", fault.rule_id, fault.detail);
        }
    }

    let _ = writeln!(
        out,
        "\nTotal impact: {} | Final score: {}/100",
        result.total_score_impact, result.final_score
    );
    out
}
