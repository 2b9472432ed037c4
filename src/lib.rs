//! Core library for the Gantry resource and job engine.
//!
//! Gantry provisions and tears down externally-managed compute and data
//! services and drives asynchronous remote jobs against them, uniformly
//! across heterogeneous backends. The crate exposes the generic lifecycle
//! state machine ([`Resource`]), the job submission and polling engine
//! ([`JobExecutor`]), the bounded retry protocol ([`RetryPolicy`]), and the
//! ordered fan-out primitive ([`ConcurrentRunner`]) that backend drivers
//! plug into, plus one concrete driver: an unmanaged cluster reached over a
//! command transport.

pub mod backend;
pub mod config;
pub mod job;
pub mod metadata;
pub mod resource;
pub mod retry;
pub mod runner;
pub mod test_support;
pub mod transport;
pub mod unmanaged;

pub use backend::{
    BackendFuture, Deletion, JobBackend, JobId, JobPoll, ProvisioningBackend, ResourceId,
    Submission,
};
pub use config::{ConfigError, EngineConfig};
pub use job::{
    DISTCP_CLASSNAME, JobError, JobExecutor, JobKind, JobResult, JobSpec, JobSpecBuilder,
};
pub use metadata::ServiceMetadata;
pub use resource::{LifecycleError, Resource, ResourceState};
pub use retry::{Clock, Probe, RetryError, RetryPolicy, SystemClock};
pub use runner::ConcurrentRunner;
pub use transport::{
    CommandOutput, CommandRunner, LocalTransport, ProcessCommandRunner, SshEndpoint, SshTransport,
    Transport, TransportError,
};
pub use unmanaged::{StagingDir, UnmanagedClusterError, UnmanagedClusterService, UnmanagedClusterSpec};
