use call_compliance::compliance::{CachedRuleStore, InMemoryRuleStore, RuleLoadError};
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) fn load_rules(path: Option<&Path>) -> Result<InMemoryRuleStore, RuleLoadError> {
    match path {
        Some(path) => {
            let store = InMemoryRuleStore::from_path(path)?;
            info!(path = %path.display(), rules = store.len(), "loaded compliance rules");
            Ok(store)
        }
        None => {
            warn!("no rules file configured; every call will score 100");
            Ok(InMemoryRuleStore::new())
        }
    }
}

/// A zero TTL refetches on every evaluation, so the cache can always sit in front.
pub(crate) fn build_rule_store(
    path: Option<&Path>,
    ttl: Duration,
) -> Result<CachedRuleStore<InMemoryRuleStore>, RuleLoadError> {
    Ok(CachedRuleStore::new(load_rules(path)?, ttl))
}
