//! Lifecycle state machine for one externally provisioned service.
//!
//! A [`Resource`] owns its backend driver, its desired spec, and the
//! ordered list of dependency resources that must exist before the service
//! and be removed after it. `create` stages dependencies in parallel and
//! then runs the creation hook exactly once; `delete` is idempotent from
//! every state, including after a failed or partial creation, so callers
//! always unwind with the same call.

use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tracing::info;

use crate::backend::{Deletion, ProvisioningBackend, ResourceId};
use crate::runner::ConcurrentRunner;

/// Lifecycle states of a [`Resource`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResourceState {
    /// Constructed but not yet created.
    Uninitialized,
    /// Creation is in progress.
    Creating,
    /// The service (and its dependencies) exist.
    Created,
    /// Creation failed; dependencies may exist partially.
    CreateFailed,
    /// The service no longer exists.
    Deleted,
}

/// Errors surfaced while driving a resource's lifecycle.
#[derive(Debug, Error)]
pub enum LifecycleError<E>
where
    E: std::error::Error + 'static,
{
    /// The requested transition is not legal from the current state.
    #[error("cannot {operation} a resource in state {state:?}")]
    InvalidState {
        /// Operation that was attempted.
        operation: &'static str,
        /// State the resource was in.
        state: ResourceState,
    },
    /// A user-managed resource could not be reached.
    #[error("user-managed resource is not reachable: {0}")]
    Probe(#[source] E),
    /// Provisioning a dependency resource failed.
    #[error("failed to create dependency resource: {0}")]
    DependencyCreation(#[source] E),
    /// The backend's creation hook failed.
    #[error("failed to create resource: {0}")]
    Creation(#[source] E),
    /// The backend's deletion hook failed.
    #[error("failed to delete resource: {0}")]
    Deletion(#[source] E),
    /// Removing a dependency resource failed.
    #[error("failed to delete dependency resource: {0}")]
    DependencyDeletion(#[source] E),
}

/// One dependency slot: the desired spec plus the handle once provisioned.
struct DependencySlot<B: ProvisioningBackend> {
    spec: B::DependencySpec,
    handle: Option<B::DependencyHandle>,
}

/// One externally provisioned service and its dependency resources.
///
/// Dependency slots are owned exclusively by this resource and are touched
/// only inside [`Resource::create`] and [`Resource::delete`].
pub struct Resource<B: ProvisioningBackend> {
    backend: B,
    id: ResourceId,
    spec: B::Spec,
    user_managed: bool,
    state: ResourceState,
    dependencies: Vec<DependencySlot<B>>,
    runner: ConcurrentRunner,
}

impl<B: ProvisioningBackend> Resource<B> {
    /// Constructs an engine-managed resource in the `Uninitialized` state.
    #[must_use]
    pub fn new(backend: B, id: ResourceId, spec: B::Spec) -> Self {
        Self {
            backend,
            id,
            spec,
            user_managed: false,
            state: ResourceState::Uninitialized,
            dependencies: Vec::new(),
            runner: ConcurrentRunner::default(),
        }
    }

    /// Marks the resource as pre-existing: creation and deletion become
    /// observational no-ops that never run backend hooks.
    #[must_use]
    pub const fn user_managed(mut self, value: bool) -> Self {
        self.user_managed = value;
        self
    }

    /// Declares a dependency resource created before and removed after the
    /// service itself.
    #[must_use]
    pub fn with_dependency(mut self, spec: B::DependencySpec) -> Self {
        self.dependencies.push(DependencySlot { spec, handle: None });
        self
    }

    /// Overrides the fan-out runner used for dependency staging.
    #[must_use]
    pub const fn with_runner(mut self, runner: ConcurrentRunner) -> Self {
        self.runner = runner;
        self
    }

    /// Returns the resource identity.
    #[must_use]
    pub const fn id(&self) -> &ResourceId {
        &self.id
    }

    /// Returns the desired specification.
    #[must_use]
    pub const fn spec(&self) -> &B::Spec {
        &self.spec
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ResourceState {
        self.state
    }

    /// Returns whether the resource is user-managed.
    #[must_use]
    pub const fn is_user_managed(&self) -> bool {
        self.user_managed
    }

    /// Returns the backend driving this resource.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Provisions the resource and its dependencies.
    ///
    /// Dependencies are created in parallel first, then the creation hook
    /// runs exactly once. On any failure the state becomes `CreateFailed`
    /// and no automatic cleanup happens here; the caller unwinds partially
    /// created dependencies by invoking [`Resource::delete`]. For a
    /// user-managed resource only the reachability probe runs.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidState`] when called twice,
    /// [`LifecycleError::Probe`] when a user-managed resource is
    /// unreachable, or a creation error from the backend hooks.
    pub async fn create(&mut self) -> Result<(), LifecycleError<B::Error>> {
        if self.state != ResourceState::Uninitialized {
            return Err(LifecycleError::InvalidState {
                operation: "create",
                state: self.state,
            });
        }

        if self.user_managed {
            self.backend
                .probe_resource(&self.id)
                .await
                .map_err(LifecycleError::Probe)?;
            self.state = ResourceState::Created;
            info!(id = %self.id, "user-managed resource verified");
            return Ok(());
        }

        self.state = ResourceState::Creating;
        if let Err(err) = self.create_dependencies().await {
            self.state = ResourceState::CreateFailed;
            return Err(LifecycleError::DependencyCreation(err));
        }

        if let Err(err) = self.backend.create_resource(&self.id, &self.spec).await {
            self.state = ResourceState::CreateFailed;
            return Err(LifecycleError::Creation(err));
        }

        self.state = ResourceState::Created;
        info!(id = %self.id, "resource created");
        Ok(())
    }

    /// Tears the resource down.
    ///
    /// Safe to call whether the resource was never created, partially
    /// created, or already deleted; "already absent" reports from the
    /// backend count as success. The deletion hook runs first, then
    /// dependency resources are removed in parallel. A failure leaves
    /// handles in place so a retry can finish the unwind. For a
    /// user-managed resource no hooks run.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Deletion`] or
    /// [`LifecycleError::DependencyDeletion`] when a backend hook fails.
    pub async fn delete(&mut self) -> Result<(), LifecycleError<B::Error>> {
        if self.state == ResourceState::Deleted {
            return Ok(());
        }

        if self.user_managed {
            self.state = ResourceState::Deleted;
            return Ok(());
        }

        self.backend
            .delete_resource(&self.id)
            .await
            .map_err(LifecycleError::Deletion)?;

        self.delete_dependencies()
            .await
            .map_err(LifecycleError::DependencyDeletion)?;

        for slot in &mut self.dependencies {
            slot.handle = None;
        }
        self.state = ResourceState::Deleted;
        info!(id = %self.id, "resource deleted");
        Ok(())
    }

    /// Stages every declared dependency in parallel, recording handles for
    /// the ones that succeed even when a sibling fails, so a later delete
    /// can unwind exactly what was created.
    async fn create_dependencies(&mut self) -> Result<(), B::Error> {
        if self.dependencies.is_empty() {
            return Ok(());
        }

        let specs: Vec<(usize, B::DependencySpec)> = self
            .dependencies
            .iter()
            .enumerate()
            .map(|(index, slot)| (index, slot.spec.clone()))
            .collect();

        let backend = &self.backend;
        let created: Mutex<Vec<(usize, B::DependencyHandle)>> = Mutex::new(Vec::new());
        let outcome = self
            .runner
            .run_all(specs, |(index, spec)| {
                let sink = &created;
                async move {
                    let handle = backend.create_dependency(&spec).await?;
                    sink.lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push((index, handle));
                    Ok(())
                }
            })
            .await;

        let handles = created.into_inner().unwrap_or_else(PoisonError::into_inner);
        for (index, handle) in handles {
            if let Some(slot) = self.dependencies.get_mut(index) {
                slot.handle = Some(handle);
            }
        }

        outcome.map(|_: Vec<()>| ())
    }

    /// Removes every dependency that holds a handle. Slots that never
    /// produced one (creation failed or never ran) have nothing to delete.
    async fn delete_dependencies(&self) -> Result<(), B::Error> {
        let handles: Vec<&B::DependencyHandle> = self
            .dependencies
            .iter()
            .filter_map(|slot| slot.handle.as_ref())
            .collect();
        if handles.is_empty() {
            return Ok(());
        }

        let backend = &self.backend;
        self.runner
            .run_all(handles, |handle| async move {
                backend.delete_dependency(handle).await.map(|_: Deletion| ())
            })
            .await
            .map(|_: Vec<()>| ())
    }
}
