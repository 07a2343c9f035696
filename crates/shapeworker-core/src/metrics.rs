use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Sink for counter and gauge updates, e.g. a log stream or an exporter.
pub trait MetricsBackend: Send + Sync {
    fn record_counter(&self, name: &str, value: u64);
    fn record_gauge(&self, name: &str, value: f64);
}

/// Proxy counters, written by the worker thread and readable from the host.
pub struct ProxyMetrics {
    pub requests: AtomicU64,
    pub errors: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub bypassed: AtomicU64,
    pub runs_started: AtomicU64,
    pub evictions: AtomicU64,
    backend: Option<Arc<dyn MetricsBackend>>,
}

impl std::fmt::Debug for ProxyMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyMetrics")
            .field("requests", &self.requests)
            .field("errors", &self.errors)
            .field("cache_hits", &self.cache_hits)
            .field("cache_misses", &self.cache_misses)
            .field("bypassed", &self.bypassed)
            .field("runs_started", &self.runs_started)
            .field("evictions", &self.evictions)
            .finish()
    }
}

impl Default for ProxyMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxyMetrics {
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            bypassed: AtomicU64::new(0),
            runs_started: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            backend: None,
        }
    }

    pub fn with_backend(backend: Arc<dyn MetricsBackend>) -> Self {
        Self {
            backend: Some(backend),
            ..Self::new()
        }
    }

    fn bump(&self, counter: &AtomicU64, name: &str) {
        let val = counter.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(backend) = &self.backend {
            backend.record_counter(name, val);
        }
    }

    pub fn record_request(&self) {
        self.bump(&self.requests, "shapeworker.proxy.requests");
    }

    pub fn record_error(&self) {
        self.bump(&self.errors, "shapeworker.proxy.errors");
    }

    pub fn record_cache_hit(&self) {
        self.bump(&self.cache_hits, "shapeworker.cache.hits");
    }

    pub fn record_cache_miss(&self) {
        self.bump(&self.cache_misses, "shapeworker.cache.misses");
    }

    pub fn record_bypass(&self) {
        self.bump(&self.bypassed, "shapeworker.proxy.bypassed");
    }

    pub fn record_run_started(&self) {
        self.bump(&self.runs_started, "shapeworker.lifecycle.runs_started");
    }

    pub fn record_eviction(&self, dropped_handles: usize) {
        self.bump(&self.evictions, "shapeworker.lifecycle.evictions");
        if let Some(backend) = &self.backend {
            backend.record_gauge("shapeworker.lifecycle.dropped_handles", dropped_handles as f64);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            bypassed: self.bypassed.load(Ordering::Relaxed),
            runs_started: self.runs_started.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// Counter values at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub errors: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub bypassed: u64,
    pub runs_started: u64,
    pub evictions: u64,
}

/// Emits every update as a `debug` event with `metric`, `value` and `kind` fields.
pub struct LoggingMetricsBackend;

impl MetricsBackend for LoggingMetricsBackend {
    fn record_counter(&self, name: &str, value: u64) {
        tracing::debug!(metric = name, value = value, kind = "counter", "metric");
    }

    fn record_gauge(&self, name: &str, value: f64) {
        tracing::debug!(metric = name, value = value, kind = "gauge", "metric");
    }
}
