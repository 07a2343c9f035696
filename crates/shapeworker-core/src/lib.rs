//! Building blocks of the shapeworker kernel proxy.
//!
//! Kernel objects never leave the worker. The host holds [`Handle`]s, every
//! cacheable call is memoized by its [`OperationIdentity`], and the
//! [`LifecycleManager`] bounds growth by evicting the whole cache at run
//! boundaries.

pub mod cache;
pub mod error;
pub mod handle;
pub mod identity;
pub mod kernel;
pub mod lifecycle;
pub mod metrics;
pub mod protocol;
pub mod resolver;

pub use cache::{CacheStatus, CachedOutput, OperationCache};
pub use error::{KernelError, RegistryError, ResolveError};
pub use handle::{Handle, HandleTable};
pub use identity::OperationIdentity;
pub use kernel::{Kernel, KernelOutput, OperationHandler, OperationRegistry};
pub use lifecycle::{LifecycleManager, RunOutcome};
pub use metrics::{MetricsSnapshot, ProxyMetrics};
pub use protocol::{Request, ReservedOperation, Response, WorkerMessage, WorkerStatus};
pub use resolver::{ResolvedInputs, resolve};
