use std::time::Duration;

use super::evaluator::FaultPolicy;

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_millis(2_000);
pub const DEFAULT_RULE_CACHE_TTL: Duration = Duration::from_secs(30);

/// Runtime dials for the evaluation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub fault_policy: FaultPolicy,
    /// Upper bound on a single rule store fetch.
    pub fetch_timeout: Duration,
    /// Zero disables caching.
    pub rule_cache_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fault_policy: FaultPolicy::default(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            rule_cache_ttl: DEFAULT_RULE_CACHE_TTL,
        }
    }
}

impl EngineConfig {
    pub fn caching_enabled(&self) -> bool {
        !self.rule_cache_ttl.is_zero()
    }
}
