//! Worker-side proxy between a host process and a geometry kernel.
//!
//! [`ProxyService`] dispatches requests through the operation cache,
//! [`Worker`] runs it on a dedicated thread, and the host reaches it either
//! in-process through [`ProxyClient`] or over newline-delimited JSON through
//! [`transport::serve`].

pub mod client;
pub mod config;
pub mod error;
pub mod service;
pub mod transport;
pub mod worker;

pub use client::ProxyClient;
pub use config::{LogFormat, ShapeworkerConfig};
pub use error::ProxyError;
pub use service::{ProxyService, ServiceOptions};
pub use worker::{Worker, WorkerThread};
