use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use tokio::sync::Notify;

use crate::compliance::dispatch::{ActionNotification, DispatchError, NotificationSink};
use crate::compliance::domain::{
    Action, ActionType, CallSignals, Condition, OrganizationId, Rule, RuleId, RuleType, Severity,
};
use crate::compliance::store::{InMemoryRuleStore, RuleStore, RuleStoreError};
use crate::compliance::{CallComplianceService, EngineConfig, FaultPolicy};

pub(super) fn org() -> OrganizationId {
    OrganizationId("org-acme".to_string())
}

pub(super) fn other_org() -> OrganizationId {
    OrganizationId("org-globex".to_string())
}

pub(super) fn contains(value: &str) -> Condition {
    Condition::new("keywords", "contains", json!(value))
}

pub(super) fn less_than(value: Value) -> Condition {
    Condition::new("score", "less_than", value)
}

pub(super) fn greater_than(value: Value) -> Condition {
    Condition::new("score", "greater_than", value)
}

pub(super) fn rule(id: &str, rule_type: RuleType, conditions: Vec<Condition>, impact: u8) -> Rule {
    Rule {
        id: RuleId(id.to_string()),
        organization_id: org(),
        name: format!("{id} policy"),
        description: String::new(),
        rule_type,
        severity: Severity::Medium,
        conditions,
        actions: Vec::new(),
        is_active: true,
        score_impact: impact,
        created_at: Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap(),
        updated_at: Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap(),
    }
}

pub(super) fn notify(target: &str) -> Action {
    Action {
        action_type: ActionType::Notify,
        target: target.to_string(),
        value: json!({ "channel": "email" }),
    }
}

pub(super) fn escalate(target: &str) -> Action {
    Action {
        action_type: ActionType::Escalate,
        target: target.to_string(),
        value: Value::Null,
    }
}

pub(super) fn malware_rule() -> Rule {
    let mut rule = rule("kw-malware", RuleType::Keyword, vec![contains("malware")], 20);
    rule.severity = Severity::High;
    rule.actions = vec![notify("security-team")];
    rule
}

pub(super) fn signals() -> CallSignals {
    CallSignals {
        keywords: ["malware", "cpu"].into_iter().map(String::from).collect(),
        sentiment: Some(0.1),
        duration: Some(420),
        topics: ["billing"].into_iter().map(String::from).collect(),
    }
}

pub(super) fn engine_config() -> EngineConfig {
    EngineConfig {
        fault_policy: FaultPolicy::FailOpen,
        fetch_timeout: Duration::from_millis(200),
        rule_cache_ttl: Duration::ZERO,
    }
}

pub(super) fn build_service(
    rules: Vec<Rule>,
) -> (
    CallComplianceService<InMemoryRuleStore, MemorySink>,
    Arc<InMemoryRuleStore>,
    Arc<MemorySink>,
) {
    let store = Arc::new(InMemoryRuleStore::from_rules(rules).expect("valid rules"));
    let sink = Arc::new(MemorySink::default());
    let service = CallComplianceService::new(store.clone(), sink.clone(), engine_config());
    (service, store, sink)
}

#[derive(Default, Clone)]
pub(super) struct MemorySink {
    events: Arc<Mutex<Vec<ActionNotification>>>,
}

impl MemorySink {
    pub(super) fn events(&self) -> Vec<ActionNotification> {
        self.events.lock().expect("sink mutex poisoned").clone()
    }
}

impl NotificationSink for MemorySink {
    fn deliver(&self, notification: &ActionNotification) -> Result<(), DispatchError> {
        self.events
            .lock()
            .expect("sink mutex poisoned")
            .push(notification.clone());
        Ok(())
    }
}

/// Rejects every action aimed at the `offline` target and records the rest.
#[derive(Default, Clone)]
pub(super) struct FlakySink {
    pub(super) delivered: MemorySink,
}

impl NotificationSink for FlakySink {
    fn deliver(&self, notification: &ActionNotification) -> Result<(), DispatchError> {
        if notification.action.target == "offline" {
            return Err(DispatchError::Transport("smtp relay down".to_string()));
        }
        self.delivered.deliver(notification)
    }
}

pub(super) struct PanickingSink;

impl NotificationSink for PanickingSink {
    fn deliver(&self, _notification: &ActionNotification) -> Result<(), DispatchError> {
        panic!("webhook client crashed");
    }
}

pub(super) struct UnavailableStore;

#[async_trait]
impl RuleStore for UnavailableStore {
    async fn fetch_active_rules(
        &self,
        _organization_id: &OrganizationId,
    ) -> Result<Vec<Rule>, RuleStoreError> {
        Err(RuleStoreError::Unavailable("database offline".to_string()))
    }
}

pub(super) struct SlowStore;

#[async_trait]
impl RuleStore for SlowStore {
    async fn fetch_active_rules(
        &self,
        _organization_id: &OrganizationId,
    ) -> Result<Vec<Rule>, RuleStoreError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(Vec::new())
    }
}

/// Returns a fixed rule list verbatim, ignoring the active/ownership contract.
pub(super) struct CarelessStore(pub(super) Vec<Rule>);

#[async_trait]
impl RuleStore for CarelessStore {
    async fn fetch_active_rules(
        &self,
        _organization_id: &OrganizationId,
    ) -> Result<Vec<Rule>, RuleStoreError> {
        Ok(self.0.clone())
    }
}

/// Counts fetches and can be switched into a failing state.
#[derive(Default)]
pub(super) struct CountingStore {
    pub(super) inner: InMemoryRuleStore,
    pub(super) fetches: AtomicUsize,
    pub(super) failing: AtomicBool,
}

impl CountingStore {
    pub(super) fn with_rules(rules: Vec<Rule>) -> Self {
        Self {
            inner: InMemoryRuleStore::from_rules(rules).expect("valid rules"),
            ..Self::default()
        }
    }

    pub(super) fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub(super) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl RuleStore for CountingStore {
    async fn fetch_active_rules(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<Rule>, RuleStoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(RuleStoreError::Unavailable("connection reset".to_string()));
        }
        self.inner.fetch_active_rules(organization_id).await
    }
}

/// Reads its snapshot, then parks the first fetch until released, like a slow reply
/// from a database that already answered.
#[derive(Default)]
pub(super) struct GatedStore {
    pub(super) inner: InMemoryRuleStore,
    pub(super) entered: Notify,
    pub(super) release: Notify,
    passed: AtomicBool,
}

impl GatedStore {
    pub(super) fn with_rules(rules: Vec<Rule>) -> Self {
        Self {
            inner: InMemoryRuleStore::from_rules(rules).expect("valid rules"),
            ..Self::default()
        }
    }
}

#[async_trait]
impl RuleStore for GatedStore {
    async fn fetch_active_rules(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<Rule>, RuleStoreError> {
        let rules = self.inner.fetch_active_rules(organization_id).await?;
        if !self.passed.swap(true, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        Ok(rules)
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 16 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
