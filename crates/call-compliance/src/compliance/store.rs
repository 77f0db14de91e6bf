use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::domain::{OrganizationId, Rule, RuleDefinitionError, RuleId};

/// Read contract for an organization's active policy rules.
///
/// Implementations return only rules with `is_active == true` owned by the requested
/// organization, in a stable order (creation order unless documented otherwise).
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn fetch_active_rules(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<Rule>, RuleStoreError>;
}

#[async_trait]
impl<S> RuleStore for Arc<S>
where
    S: RuleStore + ?Sized,
{
    async fn fetch_active_rules(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<Rule>, RuleStoreError> {
        (**self).fetch_active_rules(organization_id).await
    }
}

/// Failure to obtain rules. Always fatal to the evaluation that requested them.
#[derive(Debug, thiserror::Error)]
pub enum RuleStoreError {
    #[error("rule store unavailable: {0}")]
    Unavailable(String),
    #[error("rule store did not respond within {after_ms}ms")]
    Timeout { after_ms: u64 },
}

/// Errors raised while loading persisted rule definitions.
#[derive(Debug, thiserror::Error)]
pub enum RuleLoadError {
    #[error("unable to read rules from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("rules payload is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] RuleDefinitionError),
    #[error("duplicate rule id {0}")]
    DuplicateId(RuleId),
    #[error("rule store unavailable: {0}")]
    Unavailable(String),
}

/// Process-local rule store, typically seeded from a JSON export of persisted rules.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRuleStore {
    rules: Arc<RwLock<Vec<Rule>>>,
}

impl InMemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rules(rules: Vec<Rule>) -> Result<Self, RuleLoadError> {
        let mut seen = HashSet::new();
        for rule in &rules {
            rule.validate()?;
            if !seen.insert(rule.id.clone()) {
                return Err(RuleLoadError::DuplicateId(rule.id.clone()));
            }
        }

        Ok(Self {
            rules: Arc::new(RwLock::new(rules)),
        })
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, RuleLoadError> {
        let rules: Vec<Rule> = serde_json::from_reader(reader)?;
        Self::from_rules(rules)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, RuleLoadError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| RuleLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(BufReader::new(file))
    }

    /// Inserts a new rule or replaces the stored rule with the same id.
    pub fn upsert(&self, rule: Rule) -> Result<(), RuleLoadError> {
        rule.validate()?;
        let mut guard = self
            .rules
            .write()
            .map_err(|_| RuleLoadError::Unavailable("rule store lock poisoned".to_string()))?;
        match guard.iter_mut().find(|existing| existing.id == rule.id) {
            Some(existing) => *existing = rule,
            None => guard.push(rule),
        }
        Ok(())
    }

    /// Marks a rule inactive, returning whether it existed.
    pub fn deactivate(&self, rule_id: &RuleId) -> Result<bool, RuleLoadError> {
        let mut guard = self
            .rules
            .write()
            .map_err(|_| RuleLoadError::Unavailable("rule store lock poisoned".to_string()))?;
        Ok(guard
            .iter_mut()
            .find(|rule| &rule.id == rule_id)
            .map(|rule| rule.is_active = false)
            .is_some())
    }

    /// Counts stored rules, active or not. A poisoned lock still reports the real count.
    pub fn len(&self) -> usize {
        match self.rules.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => {
                warn!("rule store lock poisoned while counting rules");
                poisoned.into_inner().len()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn fetch_active_rules(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<Rule>, RuleStoreError> {
        let guard = self
            .rules
            .read()
            .map_err(|_| RuleStoreError::Unavailable("rule store lock poisoned".to_string()))?;

        let mut active: Vec<Rule> = guard
            .iter()
            .filter(|rule| rule.is_active && rule.is_owned_by(organization_id))
            .cloned()
            .collect();
        // Stable sort keeps insertion order for rules created at the same instant.
        active.sort_by_key(|rule| rule.created_at);
        Ok(active)
    }
}

#[derive(Debug, Clone)]
struct CachedRules {
    fetched_at: Instant,
    rules: Vec<Rule>,
}

/// Snapshots plus invalidation counters. A fetch only stores its snapshot if no
/// invalidation touched its organization while it was in flight.
#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<OrganizationId, CachedRules>,
    generations: HashMap<OrganizationId, u64>,
    epoch: u64,
}

impl CacheState {
    fn generation(&self, organization_id: &OrganizationId) -> (u64, u64) {
        let generation = self.generations.get(organization_id).copied().unwrap_or(0);
        (self.epoch, generation)
    }
}

/// Cache probe outcome. A miss carries the generation observed before fetching, if the
/// cache lock was usable.
enum Lookup {
    Hit(Vec<Rule>),
    Miss(Option<(u64, u64)>),
}

/// Per-organization TTL cache in front of another store. Failed fetches are never cached.
#[derive(Debug)]
pub struct CachedRuleStore<S> {
    inner: S,
    ttl: Duration,
    state: Mutex<CacheState>,
}

impl<S> CachedRuleStore<S>
where
    S: RuleStore,
{
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Drops the cached snapshot for one organization, e.g. after a rule write.
    pub fn invalidate(&self, organization_id: &OrganizationId) {
        if let Ok(mut guard) = self.state.lock() {
            guard.entries.remove(organization_id);
            *guard
                .generations
                .entry(organization_id.clone())
                .or_insert(0) += 1;
        }
    }

    pub fn invalidate_all(&self) {
        if let Ok(mut guard) = self.state.lock() {
            guard.entries.clear();
            guard.epoch += 1;
        }
    }

    fn lookup(&self, organization_id: &OrganizationId) -> Lookup {
        let Ok(guard) = self.state.lock() else {
            return Lookup::Miss(None);
        };
        match guard
            .entries
            .get(organization_id)
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
        {
            Some(entry) => Lookup::Hit(entry.rules.clone()),
            None => Lookup::Miss(Some(guard.generation(organization_id))),
        }
    }

    fn remember(&self, organization_id: &OrganizationId, generation: (u64, u64), rules: &[Rule]) {
        let Ok(mut guard) = self.state.lock() else {
            return;
        };
        if guard.generation(organization_id) != generation {
            debug!(%organization_id, "rules invalidated during fetch; snapshot not cached");
            return;
        }
        guard.entries.insert(
            organization_id.clone(),
            CachedRules {
                fetched_at: Instant::now(),
                rules: rules.to_vec(),
            },
        );
    }
}

#[async_trait]
impl<S> RuleStore for CachedRuleStore<S>
where
    S: RuleStore,
{
    async fn fetch_active_rules(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<Rule>, RuleStoreError> {
        let generation = match self.lookup(organization_id) {
            Lookup::Hit(rules) => {
                debug!(%organization_id, rules = rules.len(), "serving rules from cache");
                return Ok(rules);
            }
            Lookup::Miss(generation) => generation,
        };

        let rules = self.inner.fetch_active_rules(organization_id).await?;
        if let Some(generation) = generation {
            self.remember(organization_id, generation, &rules);
        }
        Ok(rules)
    }
}
