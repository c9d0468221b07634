//! Lifecycle operations that only return once the machine has converged.
//!
//! Every mutating operation is one control-plane call followed by a
//! convergence wait and a final read, so the caller always receives the
//! freshest snapshot. Mutating calls are issued at most once; only the
//! read-only wait loops. Operations on the same machine are expected to be
//! serialised by the caller.

mod error;

use std::fmt;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::VmApi;
use crate::model::{Observation, Target, VirtualMachine, VmId, VmStatus};
use crate::poller::{ConvergencePoller, WaitPolicy};
use crate::request::{VmSpec, VmUpdate};

pub use error::LifecycleError;

/// Closed set of lifecycle operations.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Operation {
    /// Provision a new machine.
    Create,
    /// Read a machine once.
    Read,
    /// Resize a machine in place.
    Update,
    /// Power a machine on.
    Start,
    /// Power a machine off.
    Stop,
    /// Tear a machine down.
    Delete,
}

impl Operation {
    /// Lower-case name used in logs and errors.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Delete => "delete",
        }
    }

    /// State the operation waits for once its call has been accepted.
    ///
    /// `prior` is the status observed just before the call was issued. An
    /// update passes through `updating` and settles back on that status, so
    /// it is the only operation whose target depends on it. Reads never
    /// wait.
    #[must_use]
    pub fn convergence_target(self, prior: Option<&VmStatus>) -> Option<Target> {
        match self {
            Self::Create | Self::Start => Some(Target::Status(VmStatus::Running)),
            Self::Stop => Some(Target::Status(VmStatus::Stopped)),
            Self::Delete => Some(Target::Deleted),
            Self::Update => prior.cloned().map(Target::Status),
            Self::Read => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Power state requested for an existing machine.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PowerState {
    /// The machine should be running.
    Running,
    /// The machine should be stopped.
    Stopped,
}

impl PowerState {
    /// Operation that drives a machine into this state.
    #[must_use]
    pub const fn operation(self) -> Operation {
        match self {
            Self::Running => Operation::Start,
            Self::Stopped => Operation::Stop,
        }
    }

    /// Status a machine reports once it is in this state.
    #[must_use]
    pub const fn status(self) -> VmStatus {
        match self {
            Self::Running => VmStatus::Running,
            Self::Stopped => VmStatus::Stopped,
        }
    }
}

/// Runs lifecycle operations against a control plane.
///
/// The service holds no per-machine state; one instance can serve
/// concurrent operations on different machines.
#[derive(Clone, Debug)]
pub struct LifecycleService<C> {
    api: C,
    poller: ConvergencePoller,
}

impl<C: VmApi> LifecycleService<C> {
    /// Creates a service that waits according to `policy`.
    #[must_use]
    pub const fn new(api: C, policy: WaitPolicy) -> Self {
        Self {
            api,
            poller: ConvergencePoller::new(policy),
        }
    }

    /// Client used for control-plane calls.
    #[must_use]
    pub const fn api(&self) -> &C {
        &self.api
    }

    /// Creates a machine and waits until it is running.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Validation`] for an incomplete spec,
    /// [`LifecycleError::Request`] when the create call is rejected (no wait
    /// is attempted), and [`LifecycleError::Timeout`] or
    /// [`LifecycleError::Cancelled`] when the wait does not succeed.
    pub async fn create(
        &self,
        spec: &VmSpec,
        cancel: &CancellationToken,
    ) -> Result<VirtualMachine, LifecycleError> {
        let operation = Operation::Create;
        spec.validate()
            .map_err(|err| LifecycleError::Validation {
                operation,
                message: err.to_string(),
            })?;
        let subject = format!("new vm '{}'", spec.name);
        if cancel.is_cancelled() {
            return Err(LifecycleError::Aborted { operation, subject });
        }

        let created = self
            .api
            .create_vm(spec)
            .await
            .map_err(|source| LifecycleError::Request {
                operation,
                subject,
                source,
            })?;
        info!(vm_id = %created.id, name = %created.name, status = %created.status, "vm created");

        self.converge(operation, created.id, None, cancel).await
    }

    /// Reads a machine once, without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Request`] when the read fails, including
    /// when the machine does not exist, and [`LifecycleError::Aborted`] when
    /// `cancel` fires first.
    pub async fn read(
        &self,
        id: VmId,
        cancel: &CancellationToken,
    ) -> Result<VirtualMachine, LifecycleError> {
        let operation = Operation::Read;
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(LifecycleError::Aborted {
                operation,
                subject: error::subject(id),
            }),
            result = self.fetch(operation, id) => result,
        }
    }

    /// Applies new mutable fields and waits for the machine to settle back
    /// on the status it had before the call.
    ///
    /// The call is issued even when nothing changes.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Validation`] for zero sizes,
    /// [`LifecycleError::Request`] when a call fails, and
    /// [`LifecycleError::Timeout`] or [`LifecycleError::Cancelled`] when the
    /// wait does not succeed.
    pub async fn update(
        &self,
        id: VmId,
        update: &VmUpdate,
        cancel: &CancellationToken,
    ) -> Result<VirtualMachine, LifecycleError> {
        update
            .validate()
            .map_err(|err| LifecycleError::Validation {
                operation: Operation::Update,
                message: err.to_string(),
            })?;
        let current = self.fetch(Operation::Update, id).await?;
        self.apply_update(&current, update, cancel).await
    }

    /// Brings an existing machine in line with `desired`.
    ///
    /// Fixed fields (name, image, host, root volume) cannot change in place;
    /// any difference is refused so the caller can recreate the machine.
    /// Otherwise the mutable fields are sent as an update.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::ImmutableField`] naming the first fixed
    /// field that differs, and the errors of [`Self::update`] otherwise.
    pub async fn reconcile(
        &self,
        id: VmId,
        desired: &VmSpec,
        cancel: &CancellationToken,
    ) -> Result<VirtualMachine, LifecycleError> {
        desired
            .validate()
            .map_err(|err| LifecycleError::Validation {
                operation: Operation::Update,
                message: err.to_string(),
            })?;
        let current = self.fetch(Operation::Update, id).await?;
        if let Some(field) = desired.immutable_changes(&current).into_iter().next() {
            return Err(LifecycleError::ImmutableField { vm_id: id, field });
        }
        self.apply_update(&current, &desired.mutable_fields(), cancel)
            .await
    }

    /// Powers a machine on unless it is already running.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Request`] when a call fails, and
    /// [`LifecycleError::Timeout`] or [`LifecycleError::Cancelled`] when the
    /// wait does not succeed.
    pub async fn start(
        &self,
        id: VmId,
        cancel: &CancellationToken,
    ) -> Result<VirtualMachine, LifecycleError> {
        self.transition(PowerState::Running, id, cancel).await
    }

    /// Powers a machine off unless it is already stopped.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Request`] when a call fails, and
    /// [`LifecycleError::Timeout`] or [`LifecycleError::Cancelled`] when the
    /// wait does not succeed.
    pub async fn stop(
        &self,
        id: VmId,
        cancel: &CancellationToken,
    ) -> Result<VirtualMachine, LifecycleError> {
        self.transition(PowerState::Stopped, id, cancel).await
    }

    /// Drives a machine to the requested power state.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Self::start`] or [`Self::stop`].
    pub async fn set_power_state(
        &self,
        id: VmId,
        state: PowerState,
        cancel: &CancellationToken,
    ) -> Result<VirtualMachine, LifecycleError> {
        self.transition(state, id, cancel).await
    }

    /// Deletes a machine and waits until the control plane no longer knows
    /// it.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Request`] when a call fails, and
    /// [`LifecycleError::Timeout`] or [`LifecycleError::Cancelled`] when the
    /// wait does not succeed.
    pub async fn delete(&self, id: VmId, cancel: &CancellationToken) -> Result<(), LifecycleError> {
        let operation = Operation::Delete;
        Self::ensure_not_cancelled(operation, id, cancel)?;
        self.api
            .delete_vm(id)
            .await
            .map_err(|source| LifecycleError::request(operation, id, source))?;
        info!(vm_id = %id, "vm deletion requested");

        self.wait(operation, id, Target::Deleted, cancel).await?;
        info!(vm_id = %id, "vm deleted");
        Ok(())
    }

    async fn transition(
        &self,
        state: PowerState,
        id: VmId,
        cancel: &CancellationToken,
    ) -> Result<VirtualMachine, LifecycleError> {
        let operation = state.operation();
        let current = self.fetch(operation, id).await?;
        if current.status == state.status() {
            debug!(vm_id = %id, status = %current.status, %operation, "vm already settled; skipping call");
            return Ok(current);
        }

        Self::ensure_not_cancelled(operation, id, cancel)?;
        let issued = match state {
            PowerState::Running => self.api.start_vm(id).await,
            PowerState::Stopped => self.api.stop_vm(id).await,
        };
        issued.map_err(|source| LifecycleError::request(operation, id, source))?;
        info!(vm_id = %id, %operation, from = %current.status, "power change requested");

        self.converge(operation, id, None, cancel).await
    }

    async fn apply_update(
        &self,
        current: &VirtualMachine,
        update: &VmUpdate,
        cancel: &CancellationToken,
    ) -> Result<VirtualMachine, LifecycleError> {
        let operation = Operation::Update;
        let id = current.id;
        Self::ensure_not_cancelled(operation, id, cancel)?;
        self.api
            .update_vm(id, update)
            .await
            .map_err(|source| LifecycleError::request(operation, id, source))?;
        info!(vm_id = %id, settle_on = %current.status, "vm update requested");

        self.converge(operation, id, Some(&current.status), cancel)
            .await
    }

    /// Waits for the operation's target, then reads the machine once more.
    async fn converge(
        &self,
        operation: Operation,
        id: VmId,
        prior: Option<&VmStatus>,
        cancel: &CancellationToken,
    ) -> Result<VirtualMachine, LifecycleError> {
        if let Some(target) = operation.convergence_target(prior) {
            self.wait(operation, id, target, cancel).await?;
        }
        self.fetch(operation, id).await
    }

    async fn wait(
        &self,
        operation: Operation,
        id: VmId,
        target: Target,
        cancel: &CancellationToken,
    ) -> Result<(), LifecycleError> {
        let resource = error::subject(id);
        let outcome = self
            .poller
            .wait_until(
                &resource,
                || self.api.get_vm(id),
                |observation| {
                    if let Observation::Present(vm) = observation {
                        debug!(vm_id = %id, status = %vm.status, %target, "polled vm");
                    }
                    target.is_satisfied_by(observation)
                },
                cancel,
            )
            .await;

        match outcome {
            Ok(_) => {
                debug!(vm_id = %id, %target, %operation, "vm converged");
                Ok(())
            }
            Err(err) => {
                warn!(vm_id = %id, %target, %operation, error = %err, "vm did not converge");
                Err(LifecycleError::from_poll(operation, id, target, err))
            }
        }
    }

    async fn fetch(&self, operation: Operation, id: VmId) -> Result<VirtualMachine, LifecycleError> {
        self.api
            .get_vm(id)
            .await
            .map_err(|source| LifecycleError::request(operation, id, source))
    }

    fn ensure_not_cancelled(
        operation: Operation,
        id: VmId,
        cancel: &CancellationToken,
    ) -> Result<(), LifecycleError> {
        if cancel.is_cancelled() {
            return Err(LifecycleError::Aborted {
                operation,
                subject: error::subject(id),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
