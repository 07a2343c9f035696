use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::Value;
use shapeworker_core::{
    CacheStatus, Handle, HandleTable, Kernel, KernelError, LifecycleManager, MetricsSnapshot, OperationCache,
    OperationHandler, OperationIdentity, OperationRegistry, ProxyMetrics, Request, ReservedOperation,
    Response, RunOutcome, cache::CacheStats, lifecycle::DEFAULT_EVICTION_THRESHOLD, resolve,
};

use crate::error::ProxyError;

/// Tunables for one [`ProxyService`].
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub eviction_threshold: usize,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            eviction_threshold: DEFAULT_EVICTION_THRESHOLD,
        }
    }
}

/// How a request will be served, decided before any work is done.
enum Route<K: Kernel> {
    Reserved(ReservedOperation),
    Cached(OperationHandler<K>),
}

/// The dispatcher: owns the kernel and every piece of proxy state.
///
/// One instance per worker. All mutation happens through `&mut self` on the
/// worker thread, so the handle table and cache need no locking.
pub struct ProxyService<K: Kernel> {
    kernel: K,
    registry: OperationRegistry<K>,
    table: HandleTable<K::Object>,
    cache: OperationCache,
    lifecycle: LifecycleManager,
    metrics: Arc<ProxyMetrics>,
}

impl<K: Kernel> ProxyService<K> {
    pub fn new(kernel: K, options: ServiceOptions) -> Result<Self, ProxyError> {
        Self::with_metrics(kernel, options, Arc::new(ProxyMetrics::new()))
    }

    pub fn with_metrics(
        kernel: K,
        options: ServiceOptions,
        metrics: Arc<ProxyMetrics>,
    ) -> Result<Self, ProxyError> {
        let registry = OperationRegistry::for_kernel()?;
        tracing::info!(
            operations = registry.len(),
            eviction_threshold = options.eviction_threshold,
            "Proxy service ready"
        );
        Ok(Self {
            kernel,
            registry,
            table: HandleTable::new(),
            cache: OperationCache::new(),
            lifecycle: LifecycleManager::new(options.eviction_threshold),
            metrics,
        })
    }

    /// Serve one request to completion. Always returns a response carrying
    /// the request's `uid`.
    pub fn dispatch(&mut self, request: &Request) -> Response {
        self.metrics.record_request();
        let function_name = request.function_name();
        tracing::debug!(uid = %request.uid, operation = function_name, "Dispatching request");

        match self.execute(request) {
            Ok(result) => Response::success(&request.uid, result),
            Err(e) => {
                self.metrics.record_error();
                tracing::warn!(
                    uid = %request.uid,
                    operation = function_name,
                    error = %e,
                    "Request failed"
                );
                Response::failure(
                    &request.uid,
                    format!("{function_name} failed: {e}. Inputs: {}", request.input_summary()),
                )
            }
        }
    }

    fn route(&self, function_name: &str) -> Result<Route<K>, ProxyError> {
        if let Ok(reserved) = function_name.parse::<ReservedOperation>() {
            return Ok(Route::Reserved(reserved));
        }
        self.registry
            .get(function_name)
            .map(Route::Cached)
            .ok_or_else(|| ProxyError::UnsupportedOperation(function_name.to_string()))
    }

    fn execute(&mut self, request: &Request) -> Result<Value, ProxyError> {
        let function_name = request.function_name();
        let inputs = &request.action.inputs;
        match self.route(function_name)? {
            Route::Reserved(op) => {
                self.metrics.record_bypass();
                self.execute_reserved(op, inputs)
            }
            Route::Cached(handler) => self.execute_cached(function_name, handler, inputs),
        }
    }

    fn execute_cached(
        &mut self,
        function_name: &str,
        handler: OperationHandler<K>,
        inputs: &Value,
    ) -> Result<Value, ProxyError> {
        // Identity comes from the request as sent; resolution builds a separate value.
        let identity = OperationIdentity::compute(function_name, inputs);
        let resolved = resolve(&self.table, inputs)?;

        let kernel = &self.kernel;
        let (output, status) = self
            .cache
            .compute_or_fetch(&mut self.table, identity, || {
                contain_panic(function_name, || handler(kernel, resolved))
            })?;

        match status {
            CacheStatus::Hit => self.metrics.record_cache_hit(),
            CacheStatus::Miss => self.metrics.record_cache_miss(),
        }
        tracing::debug!(operation = function_name, status = ?status, "Operation served");
        Ok(output.to_wire())
    }

    fn execute_reserved(&mut self, op: ReservedOperation, inputs: &Value) -> Result<Value, ProxyError> {
        let name = op.name();
        match op {
            ReservedOperation::ShapeToMesh => {
                let resolved = resolve(&self.table, inputs)?;
                let shape = resolved.subject()?;
                Ok(contain_panic(name, || self.kernel.tessellate(shape, &resolved.params))?)
            }
            ReservedOperation::ShapesToMeshes => {
                let resolved = resolve(&self.table, inputs)?;
                let meshes = resolved
                    .shapes
                    .iter()
                    .map(|shape| contain_panic(name, || self.kernel.tessellate(shape, &resolved.params)))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Array(meshes))
            }
            ReservedOperation::SaveShapeStl => {
                let resolved = resolve(&self.table, inputs)?;
                let shape = resolved.subject()?;
                Ok(contain_panic(name, || self.kernel.export(shape, &resolved.params))?)
            }
            ReservedOperation::StartedTheRun => {
                let outcome = self.lifecycle.on_run_started(&mut self.table, &mut self.cache);
                self.metrics.record_run_started();
                self.record_outcome(&outcome);
                Ok(serde_json::to_value(outcome)?)
            }
            ReservedOperation::CleanAllCache => {
                let outcome = self.lifecycle.on_explicit_clear(&mut self.table, &mut self.cache);
                self.record_outcome(&outcome);
                Ok(serde_json::to_value(outcome)?)
            }
        }
    }

    fn record_outcome(&self, outcome: &RunOutcome) {
        if outcome.evicted {
            self.metrics.record_eviction(outcome.dropped_handles);
        }
    }

    /// Look up the live object behind a handle.
    pub fn object(&self, handle: &Handle) -> Result<Arc<K::Object>, ProxyError> {
        Ok(self.table.get(handle)?)
    }

    pub fn operation_names(&self) -> impl Iterator<Item = &str> {
        self.registry.names()
    }

    pub fn handle_count(&self) -> usize {
        self.table.len()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Usage counter since the last eviction.
    pub fn usage(&self) -> usize {
        self.cache.usage()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn metrics(&self) -> Arc<ProxyMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

/// Run kernel code so that a panic fails the request instead of the worker.
///
/// Nothing is stored before kernel code returns, so the table and cache are
/// untouched by a panicking call.
fn contain_panic<T>(
    operation: &str,
    compute: impl FnOnce() -> Result<T, KernelError>,
) -> Result<T, KernelError> {
    panic::catch_unwind(AssertUnwindSafe(compute)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        tracing::error!(operation, panic = %message, "Kernel panicked");
        Err(KernelError::Panicked(message))
    })
}
