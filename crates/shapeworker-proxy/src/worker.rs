use std::thread::JoinHandle;

use shapeworker_core::{Kernel, Request, Response, WorkerMessage, WorkerStatus};
use tokio::sync::mpsc;

use crate::error::ProxyError;
use crate::service::ProxyService;

/// What the host can put on the worker's inbound queue.
#[derive(Debug)]
enum Envelope {
    Dispatch(Request),
    /// A response decided before dispatch (e.g. an undecodable request).
    /// Goes out in queue order like any other.
    Reject(Response),
}

/// Sending side of a worker thread that owns a [`ProxyService`].
///
/// Requests are served strictly in arrival order, one at a time. Dropping
/// every `Worker` clone closes the queue; the thread drains what is left and
/// exits, which in turn closes the outbound stream.
#[derive(Clone)]
pub struct Worker {
    inbound: mpsc::UnboundedSender<Envelope>,
}

/// Join handle for the worker thread.
pub struct WorkerThread {
    handle: JoinHandle<()>,
}

impl WorkerThread {
    /// Block until the worker has drained its queue and exited.
    pub fn join(self) -> Result<(), ProxyError> {
        self.handle.join().map_err(|_| ProxyError::WorkerUnavailable)
    }
}

impl Worker {
    /// Move `service` onto a dedicated thread.
    ///
    /// Returns the sending side, the outbound message stream (statuses and
    /// responses in emission order) and the thread handle.
    pub fn spawn<K>(
        mut service: ProxyService<K>,
    ) -> Result<(Worker, mpsc::UnboundedReceiver<WorkerMessage>, WorkerThread), ProxyError>
    where
        K: Kernel + Send + 'static,
    {
        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel::<Envelope>();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let handle = std::thread::Builder::new()
            .name("shapeworker-kernel".into())
            .spawn(move || {
                tracing::debug!("Worker thread started");
                while let Some(envelope) = inbound_rx.blocking_recv() {
                    let response = match envelope {
                        Envelope::Dispatch(request) => {
                            // Advisory, sent before the (possibly long) computation.
                            if outbound_tx.send(WorkerMessage::Status(WorkerStatus::Busy)).is_err() {
                                break;
                            }
                            service.dispatch(&request)
                        }
                        Envelope::Reject(response) => response,
                    };
                    if outbound_tx.send(WorkerMessage::Response(response)).is_err() {
                        tracing::warn!("Outbound stream closed, stopping worker");
                        break;
                    }
                }
                tracing::debug!("Worker thread exiting");
            })?;

        Ok((
            Worker {
                inbound: inbound_tx,
            },
            outbound_rx,
            WorkerThread { handle },
        ))
    }

    /// Queue a request for dispatch.
    pub fn submit(&self, request: Request) -> Result<(), ProxyError> {
        self.inbound
            .send(Envelope::Dispatch(request))
            .map_err(|_| ProxyError::WorkerUnavailable)
    }

    /// Queue a ready-made response so it is emitted in order with the rest.
    pub fn reject(&self, response: Response) -> Result<(), ProxyError> {
        self.inbound
            .send(Envelope::Reject(response))
            .map_err(|_| ProxyError::WorkerUnavailable)
    }
}
