use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::handle::{Handle, HandleTable};
use crate::identity::OperationIdentity;
use crate::kernel::KernelOutput;

/// What a cache entry holds: a handle to a stored object, or a plain value.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedOutput {
    Handle(Handle),
    Value(serde_json::Value),
}

impl CachedOutput {
    /// The JSON sent back to the host. Handles go out in their wire form.
    pub fn to_wire(&self) -> serde_json::Value {
        match self {
            CachedOutput::Handle(handle) => handle.to_wire(),
            CachedOutput::Value(value) => value.clone(),
        }
    }

    pub fn as_handle(&self) -> Option<&Handle> {
        match self {
            CachedOutput::Handle(handle) => Some(handle),
            CachedOutput::Value(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

/// Lifetime hit/miss totals. Not reset by eviction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Memoizes kernel calls by [`OperationIdentity`].
///
/// Kernel operations are pure functions of their resolved inputs, so a stored
/// output is interchangeable with a fresh computation. Failed computations are
/// never stored.
pub struct OperationCache {
    entries: HashMap<OperationIdentity, CachedOutput>,
    /// Misses since the last eviction; the Lifecycle Manager's growth signal.
    usage: usize,
    stats: CacheStats,
}

impl OperationCache {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            usage: 0,
            stats: CacheStats::default(),
        }
    }

    /// Return the stored output for `identity`, or run `compute` and store
    /// its result.
    ///
    /// Objects produced by `compute` are registered in `table`; the entry
    /// records only their handle.
    pub fn compute_or_fetch<T, E, F>(
        &mut self,
        table: &mut HandleTable<T>,
        identity: OperationIdentity,
        compute: F,
    ) -> Result<(CachedOutput, CacheStatus), E>
    where
        F: FnOnce() -> Result<KernelOutput<T>, E>,
    {
        if let Some(cached) = self.entries.get(&identity) {
            self.stats.hits += 1;
            tracing::debug!(identity = %identity, "Cache hit");
            return Ok((cached.clone(), CacheStatus::Hit));
        }

        let output = match compute()? {
            KernelOutput::Object(object) => CachedOutput::Handle(table.put(&identity, object)),
            KernelOutput::Value(value) => CachedOutput::Value(value),
        };

        self.stats.misses += 1;
        self.usage += 1;
        tracing::debug!(identity = %identity, usage = self.usage, "Cache miss, stored result");
        self.entries.insert(identity, output.clone());
        Ok((output, CacheStatus::Miss))
    }

    pub fn get(&self, identity: &OperationIdentity) -> Option<&CachedOutput> {
        self.entries.get(identity)
    }

    /// Misses since the last eviction.
    pub fn usage(&self) -> usize {
        self.usage
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry and reset the usage counter. Returns the entry count.
    pub fn clear(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        self.usage = 0;
        dropped
    }
}

impl Default for OperationCache {
    fn default() -> Self {
        Self::new()
    }
}
