use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use shapeworker_core::{Handle, Kernel, Request, Response, RunOutcome, WorkerMessage};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::ProxyError;
use crate::service::ProxyService;
use crate::worker::{Worker, WorkerThread};

type Pending = Arc<Mutex<HashMap<String, oneshot::Sender<Response>>>>;

/// In-process host side of the proxy.
///
/// Each call gets a fresh `uid` and awaits the response carrying it, so any
/// number of calls may be in flight from concurrent tasks. The worker still
/// serves them one at a time.
pub struct ProxyClient {
    worker: Worker,
    thread: WorkerThread,
    pending: Pending,
    busy_signals: Arc<AtomicU64>,
    router: JoinHandle<()>,
}

impl ProxyClient {
    /// Start a worker for `service` and the task routing its responses.
    /// Must be called inside a tokio runtime.
    pub fn spawn<K>(service: ProxyService<K>) -> Result<Self, ProxyError>
    where
        K: Kernel + Send + 'static,
    {
        let (worker, outbound, thread) = Worker::spawn(service)?;
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let busy_signals = Arc::new(AtomicU64::new(0));
        let router = tokio::spawn(route_responses(
            outbound,
            Arc::clone(&pending),
            Arc::clone(&busy_signals),
        ));

        Ok(Self {
            worker,
            thread,
            pending,
            busy_signals,
            router,
        })
    }

    /// Send one request and wait for its response, error or not.
    pub async fn request(&self, function_name: &str, inputs: Value) -> Result<Response, ProxyError> {
        let uid = uuid::Uuid::new_v4().simple().to_string();
        let (tx, rx) = oneshot::channel();
        // Registered before submission so the router can never miss it.
        self.pending.lock().await.insert(uid.clone(), tx);

        if let Err(e) = self.worker.submit(Request::new(uid.clone(), function_name, inputs)) {
            self.pending.lock().await.remove(&uid);
            return Err(e);
        }
        rx.await.map_err(|_| ProxyError::WorkerUnavailable)
    }

    /// Call an operation and return its result payload.
    ///
    /// An error response becomes [`ProxyError::OperationFailed`] carrying the
    /// worker's message.
    pub async fn call(&self, function_name: &str, inputs: Value) -> Result<Value, ProxyError> {
        let response = self.request(function_name, inputs).await?;
        match response.error {
            Some(message) => Err(ProxyError::OperationFailed(message)),
            None => Ok(response.result.unwrap_or(Value::Null)),
        }
    }

    /// Call an operation that is expected to produce a kernel object.
    pub async fn call_for_handle(&self, function_name: &str, inputs: Value) -> Result<Handle, ProxyError> {
        let result = self.call(function_name, inputs).await?;
        Handle::from_reference(&result).ok_or_else(|| {
            ProxyError::MalformedRequest(format!("{function_name} did not return a handle: {result}"))
        })
    }

    pub async fn start_run(&self) -> Result<RunOutcome, ProxyError> {
        let value = self.call("startedTheRun", Value::Null).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn clear_cache(&self) -> Result<RunOutcome, ProxyError> {
        let value = self.call("cleanAllCache", Value::Null).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Number of `busy` statuses received so far.
    pub fn busy_signals(&self) -> u64 {
        self.busy_signals.load(Ordering::Relaxed)
    }

    /// Close the queue, let the worker drain it, and wait for both sides to stop.
    pub async fn shutdown(self) -> Result<(), ProxyError> {
        let Self {
            worker,
            thread,
            router,
            ..
        } = self;
        drop(worker);
        router.await.map_err(|_| ProxyError::WorkerUnavailable)?;
        tokio::task::spawn_blocking(move || thread.join())
            .await
            .map_err(|_| ProxyError::WorkerUnavailable)?
    }
}

async fn route_responses(
    mut outbound: mpsc::UnboundedReceiver<WorkerMessage>,
    pending: Pending,
    busy_signals: Arc<AtomicU64>,
) {
    while let Some(message) = outbound.recv().await {
        match message {
            WorkerMessage::Status(_) => {
                busy_signals.fetch_add(1, Ordering::Relaxed);
            }
            WorkerMessage::Response(response) => {
                let Some(tx) = pending.lock().await.remove(&response.uid) else {
                    tracing::warn!(uid = %response.uid, "Response for unknown uid dropped");
                    continue;
                };
                // Caller may have given up waiting.
                let _ = tx.send(response);
            }
        }
    }
    // Worker gone: wake every remaining caller with an error.
    pending.lock().await.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::ServiceOptions;
    use serde_json::json;
    use shapeworker_kernel::ShapeKernel;

    fn client() -> ProxyClient {
        let service = ProxyService::new(ShapeKernel::default(), ServiceOptions::default()).unwrap();
        ProxyClient::spawn(service).unwrap()
    }

    #[tokio::test]
    async fn call_returns_handle_and_values() {
        let client = client();
        let cube = client
            .call_for_handle("shapes.solid.createCube", json!({ "size": 2 }))
            .await
            .unwrap();

        let volume = client
            .call("shapes.solid.getSolidVolume", json!({ "shape": cube.as_str() }))
            .await
            .unwrap();
        assert!((volume.as_f64().unwrap() - 8.0).abs() < 1e-9);
        assert_eq!(client.busy_signals(), 2);

        client.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn error_response_becomes_operation_failed() {
        let client = client();
        let err = client
            .call("transforms.translate", json!({ "shape": "deadbeef", "translation": [1, 0, 0] }))
            .await
            .unwrap_err();

        match err {
            ProxyError::OperationFailed(message) => {
                assert!(message.starts_with("transforms.translate failed: handle not found"));
            }
            other => panic!("unexpected error: {other}"),
        }
        client.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn run_lifecycle_helpers_decode_outcome() {
        let client = client();
        client
            .call("shapes.solid.createSphere", json!({ "radius": 1 }))
            .await
            .unwrap();

        let outcome = client.start_run().await.unwrap();
        assert!(!outcome.evicted);
        assert_eq!(outcome.usage, 1);

        let outcome = client.clear_cache().await.unwrap();
        assert!(outcome.evicted);
        assert_eq!(outcome.dropped_handles, 1);

        client.shutdown().await.unwrap();
    }
}
