//! Errors surfaced by lifecycle operations.

use std::time::Duration;

use thiserror::Error;

use super::Operation;
use crate::client::ClientError;
use crate::model::{Target, VmId};
use crate::poller::PollError;

/// Failure of a lifecycle operation, with enough context to tell a rejected
/// request apart from one that was accepted but never converged.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum LifecycleError {
    /// A control-plane call failed or was rejected.
    #[error("{operation} {subject} failed: {source}")]
    Request {
        /// Operation that issued the call.
        operation: Operation,
        /// Machine the call addressed (`vm 42`, or `new vm 'web-1'`).
        subject: String,
        /// Underlying client failure, response body included.
        #[source]
        source: ClientError,
    },
    /// The machine did not reach the awaited state in time.
    #[error("timed out after {waited:?} waiting for vm {vm_id} to become {target} during {operation}")]
    Timeout {
        /// Operation whose wait expired.
        operation: Operation,
        /// Machine being waited on.
        vm_id: VmId,
        /// State that was awaited.
        target: Target,
        /// Time limit that was exhausted.
        waited: Duration,
    },
    /// The caller cancelled the wait. The mutating call was already issued.
    #[error("cancelled while waiting for vm {vm_id} to become {target} during {operation}")]
    Cancelled {
        /// Operation whose wait was cancelled.
        operation: Operation,
        /// Machine being waited on.
        vm_id: VmId,
        /// State that was awaited.
        target: Target,
    },
    /// The caller cancelled before the mutating call was issued.
    #[error("{operation} {subject} cancelled before the request was issued")]
    Aborted {
        /// Operation that was abandoned.
        operation: Operation,
        /// Machine the operation addressed.
        subject: String,
    },
    /// A fixed field differs from the machine; recreate it instead.
    #[error("vm {vm_id} cannot change {field} in place; it must be recreated")]
    ImmutableField {
        /// Machine being reconciled.
        vm_id: VmId,
        /// First fixed field that differs.
        field: &'static str,
    },
    /// The request payload is incomplete.
    #[error("invalid {operation} request: {message}")]
    Validation {
        /// Operation that received the payload.
        operation: Operation,
        /// Description of the problem.
        message: String,
    },
}

impl LifecycleError {
    pub(super) fn request(operation: Operation, vm_id: VmId, source: ClientError) -> Self {
        Self::Request {
            operation,
            subject: subject(vm_id),
            source,
        }
    }

    pub(super) fn from_poll(
        operation: Operation,
        vm_id: VmId,
        target: Target,
        err: PollError,
    ) -> Self {
        match err {
            PollError::Timeout { waited } => Self::Timeout {
                operation,
                vm_id,
                target,
                waited,
            },
            PollError::Cancelled { .. } => Self::Cancelled {
                operation,
                vm_id,
                target,
            },
            PollError::Fetch(source) => Self::request(operation, vm_id, source),
        }
    }

    /// Returns `true` when the wait ran out of time.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` when the caller cancelled, before or during the wait.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. } | Self::Aborted { .. })
    }

    /// Underlying client failure, if the operation failed on a call.
    #[must_use]
    pub const fn client_error(&self) -> Option<&ClientError> {
        match self {
            Self::Request { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub(super) fn subject(vm_id: VmId) -> String {
    format!("vm {vm_id}")
}
