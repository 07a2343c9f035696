use serde::{Deserialize, Serialize};

use crate::cache::OperationCache;
use crate::handle::HandleTable;

/// Usage level above which a run start evicts everything.
pub const DEFAULT_EVICTION_THRESHOLD: usize = 10_000;

/// Reported back to the host for `startedTheRun` and `cleanAllCache`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    pub evicted: bool,
    /// Usage counter value when the decision was taken.
    pub usage: usize,
    pub dropped_entries: usize,
    pub dropped_handles: usize,
}

/// Bounds memory across runs by evicting the whole cache.
///
/// Cross-run memoization is kept until the usage counter passes the
/// threshold; after that the next run starts empty.
#[derive(Debug)]
pub struct LifecycleManager {
    threshold: usize,
    runs_started: u64,
    evictions: u64,
}

impl LifecycleManager {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            runs_started: 0,
            evictions: 0,
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn runs_started(&self) -> u64 {
        self.runs_started
    }

    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Run boundary: evict when usage has exceeded the threshold.
    ///
    /// Usage counts every stored cache entry since the last eviction,
    /// value results (volumes, bounding boxes) as well as issued handles.
    pub fn on_run_started<T>(&mut self, table: &mut HandleTable<T>, cache: &mut OperationCache) -> RunOutcome {
        self.runs_started += 1;
        let usage = cache.usage();
        if usage > self.threshold {
            tracing::info!(
                usage,
                threshold = self.threshold,
                run = self.runs_started,
                "Usage over threshold, evicting before run"
            );
            return self.evict(table, cache);
        }
        tracing::debug!(usage, run = self.runs_started, "Run started, cache retained");
        RunOutcome {
            evicted: false,
            usage,
            dropped_entries: 0,
            dropped_handles: 0,
        }
    }

    /// Host asked for a clean slate.
    pub fn on_explicit_clear<T>(&mut self, table: &mut HandleTable<T>, cache: &mut OperationCache) -> RunOutcome {
        tracing::info!(usage = cache.usage(), "Explicit cache clear");
        self.evict(table, cache)
    }

    fn evict<T>(&mut self, table: &mut HandleTable<T>, cache: &mut OperationCache) -> RunOutcome {
        let usage = cache.usage();
        let dropped_entries = cache.clear();
        let dropped_handles = table.clear();
        self.evictions += 1;
        tracing::info!(dropped_entries, dropped_handles, "Cache evicted");
        RunOutcome {
            evicted: true,
            usage,
            dropped_entries,
            dropped_handles,
        }
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new(DEFAULT_EVICTION_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolveError;
    use crate::identity::OperationIdentity;
    use crate::kernel::KernelOutput;
    use serde_json::json;

    fn fill(table: &mut HandleTable<u64>, cache: &mut OperationCache, count: u64) {
        for i in 0..count {
            let identity = OperationIdentity::compute("make", &json!({ "i": i }));
            cache
                .compute_or_fetch(table, identity, || Ok::<_, ()>(KernelOutput::Object(i)))
                .unwrap();
        }
    }

    #[test]
    fn run_start_below_threshold_keeps_cache() {
        let mut lifecycle = LifecycleManager::new(5);
        let mut table = HandleTable::new();
        let mut cache = OperationCache::new();
        fill(&mut table, &mut cache, 5);

        let outcome = lifecycle.on_run_started(&mut table, &mut cache);

        assert!(!outcome.evicted);
        assert_eq!(outcome.usage, 5);
        assert_eq!(cache.len(), 5);
        assert_eq!(table.len(), 5);
        assert_eq!(lifecycle.runs_started(), 1);
    }

    #[test]
    fn run_start_over_threshold_evicts_everything() {
        let mut lifecycle = LifecycleManager::new(5);
        let mut table = HandleTable::new();
        let mut cache = OperationCache::new();
        fill(&mut table, &mut cache, 6);
        let stale = table.put(&OperationIdentity::compute("make", &json!({ "i": 0 })), 0);

        let outcome = lifecycle.on_run_started(&mut table, &mut cache);

        assert!(outcome.evicted);
        assert_eq!(outcome.dropped_entries, 6);
        assert_eq!(outcome.dropped_handles, 6);
        assert!(cache.is_empty());
        assert!(table.is_empty());
        assert_eq!(cache.usage(), 0);
        assert_eq!(table.get(&stale).unwrap_err(), ResolveError::HandleNotFound(stale));
    }

    #[test]
    fn value_results_count_toward_usage() {
        let mut lifecycle = LifecycleManager::new(2);
        let mut table: HandleTable<u64> = HandleTable::new();
        let mut cache = OperationCache::new();
        fill(&mut table, &mut cache, 1);
        for i in 0..2 {
            let identity = OperationIdentity::compute("volume", &json!({ "i": i }));
            cache
                .compute_or_fetch(&mut table, identity, || Ok::<_, ()>(KernelOutput::Value(json!(i))))
                .unwrap();
        }
        assert_eq!(table.len(), 1);

        let outcome = lifecycle.on_run_started(&mut table, &mut cache);
        assert!(outcome.evicted);
        assert_eq!(outcome.usage, 3);
        assert_eq!(outcome.dropped_entries, 3);
        assert_eq!(outcome.dropped_handles, 1);
    }

    #[test]
    fn explicit_clear_always_evicts() {
        let mut lifecycle = LifecycleManager::default();
        let mut table = HandleTable::new();
        let mut cache = OperationCache::new();
        fill(&mut table, &mut cache, 1);

        let outcome = lifecycle.on_explicit_clear(&mut table, &mut cache);

        assert!(outcome.evicted);
        assert!(cache.is_empty());
        assert!(table.is_empty());
        assert_eq!(lifecycle.evictions(), 1);
        assert_eq!(lifecycle.threshold(), DEFAULT_EVICTION_THRESHOLD);
    }
}
