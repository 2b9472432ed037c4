//! Backend abstraction for provisioning managed services and driving jobs.
//!
//! A backend driver supplies two collaborator contracts: a
//! [`ProvisioningBackend`] that knows how to create and destroy the service
//! (plus its dependency resources, such as a staging store), and a
//! [`JobBackend`] that submits units of remote work against the live service.
//! The engine in [`crate::resource`] and [`crate::job`] owns all retry,
//! fan-out, and state-machine logic; drivers only translate hooks into the
//! provider's control plane.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::job::{JobError, JobResult, JobSpec};

/// Future returned by backend operations.
pub type BackendFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

macro_rules! id_newtype {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Debug, Eq, Hash, PartialEq)]
        pub struct $name(String);

        impl $name {
            /// Wraps a raw identifier string.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub const fn as_str(&self) -> &str {
                self.0.as_str()
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

id_newtype!(ResourceId, "Identity of one externally provisioned service.");
id_newtype!(JobId, "Identifier assigned by a backend to a queued job.");

/// Outcome of a deletion hook.
///
/// Deletion is idempotent: the postcondition "resource does not exist" holds
/// either way, so the engine treats both variants as success.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Deletion {
    /// The backend removed an existing resource.
    Deleted,
    /// The resource was already gone when the hook ran.
    AlreadyAbsent,
}

/// Result of a submission hook.
///
/// The backend, not the caller, decides the execution mode: a synchronous
/// backend blocks inside `submit_job` and returns [`Submission::Completed`];
/// a polled backend returns [`Submission::Queued`] and resolves completion
/// through [`JobBackend::completed_job`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Submission {
    /// The submission call itself ran the job to completion.
    Completed(JobResult),
    /// The job was accepted and must be observed via polling.
    Queued(JobId),
}

/// Poll outcome for a queued job.
///
/// `Pending` is the only retryable signal in the engine; a backend that
/// observed the job fail must return an error instead.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum JobPoll {
    /// The job reached a terminal successful state.
    Finished(JobResult),
    /// The job has not finished yet.
    Pending,
}

/// Hooks for creating and destroying one externally managed service.
///
/// Implementations must make `delete_resource` and `delete_dependency`
/// idempotent: deleting something already absent reports
/// [`Deletion::AlreadyAbsent`] rather than an error.
pub trait ProvisioningBackend {
    /// Provider specific error type returned by the hooks.
    type Error: std::error::Error + Send + Sync + 'static;
    /// Desired-state description of the service, owned by the driver.
    type Spec: Send + Sync;
    /// Desired-state description of one dependency resource.
    type DependencySpec: Clone + Send + Sync;
    /// Handle returned once a dependency has been provisioned.
    type DependencyHandle: Send + Sync;

    /// Creates the service described by `spec` under the given identity.
    fn create_resource<'a>(
        &'a self,
        id: &'a ResourceId,
        spec: &'a Self::Spec,
    ) -> BackendFuture<'a, (), Self::Error>;

    /// Destroys the service, reporting [`Deletion::AlreadyAbsent`] when it
    /// no longer exists.
    fn delete_resource<'a>(&'a self, id: &'a ResourceId)
    -> BackendFuture<'a, Deletion, Self::Error>;

    /// Verifies a pre-existing (user-managed) service is reachable without
    /// mutating it.
    fn probe_resource<'a>(&'a self, id: &'a ResourceId) -> BackendFuture<'a, (), Self::Error>;

    /// Provisions one dependency resource and returns its handle.
    fn create_dependency<'a>(
        &'a self,
        spec: &'a Self::DependencySpec,
    ) -> BackendFuture<'a, Self::DependencyHandle, Self::Error>;

    /// Removes one dependency resource.
    fn delete_dependency<'a>(
        &'a self,
        handle: &'a Self::DependencyHandle,
    ) -> BackendFuture<'a, Deletion, Self::Error>;
}

/// Hooks for submitting remote work against a live service.
///
/// Hook failures are reported as [`JobError`] directly; drivers wrap their
/// transport or control-plane errors with [`JobError::submission`] so the
/// underlying error type never crosses this boundary.
pub trait JobBackend {
    /// Submits a job, either running it to completion or queueing it.
    fn submit_job<'a>(&'a self, spec: &'a JobSpec) -> BackendFuture<'a, Submission, JobError>;

    /// Returns the result of a queued job if it has finished.
    ///
    /// Required only for backends that return [`Submission::Queued`]. The
    /// default body fails fast: polling a synchronous backend is a
    /// programming error, not a retryable condition.
    fn completed_job<'a>(&'a self, id: &'a JobId) -> BackendFuture<'a, JobPoll, JobError> {
        let message = format!("job {id} was submitted synchronously and cannot be polled");
        Box::pin(async move { Err(JobError::Contract { message }) })
    }
}

impl<B: JobBackend> JobBackend for &B {
    fn submit_job<'a>(&'a self, spec: &'a JobSpec) -> BackendFuture<'a, Submission, JobError> {
        (**self).submit_job(spec)
    }

    // Forwarded so a polled backend keeps its own hook behind a reference.
    fn completed_job<'a>(&'a self, id: &'a JobId) -> BackendFuture<'a, JobPoll, JobError> {
        (**self).completed_job(id)
    }
}
