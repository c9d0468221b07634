//! Boundary to the remote control plane.
//!
//! Each method issues exactly one request and never retries. Callers decide
//! what to do with a failure.

mod error;
mod http;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::model::{Host, Image, VirtualMachine, VmId};
use crate::request::{VmSpec, VmUpdate};

pub use error::ClientError;
pub use http::HttpVmApi;

/// Future returned by control-plane calls.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ClientError>> + Send + 'a>>;

/// Single request/response operations exposed by the control plane.
///
/// Implementations hold no per-call state and may be shared between
/// concurrent lifecycle operations.
pub trait VmApi: Send + Sync {
    /// Submits a new machine. The returned snapshot is usually `creating`.
    fn create_vm<'a>(&'a self, spec: &'a VmSpec) -> ApiFuture<'a, VirtualMachine>;

    /// Reads a machine. A missing machine yields [`ClientError::NotFound`].
    fn get_vm(&self, id: VmId) -> ApiFuture<'_, VirtualMachine>;

    /// Changes the mutable fields of a machine.
    fn update_vm<'a>(&'a self, id: VmId, update: &'a VmUpdate) -> ApiFuture<'a, VirtualMachine>;

    /// Requests power on. The acknowledgement carries no usable status.
    fn start_vm(&self, id: VmId) -> ApiFuture<'_, ()>;

    /// Requests power off. The acknowledgement carries no usable status.
    fn stop_vm(&self, id: VmId) -> ApiFuture<'_, ()>;

    /// Requests teardown.
    fn delete_vm(&self, id: VmId) -> ApiFuture<'_, ()>;

    /// Lists hypervisor hosts.
    fn list_hosts(&self) -> ApiFuture<'_, Vec<Host>>;

    /// Lists bootable images.
    fn list_images(&self) -> ApiFuture<'_, Vec<Image>>;
}

impl<T: VmApi + ?Sized> VmApi for Arc<T> {
    fn create_vm<'a>(&'a self, spec: &'a VmSpec) -> ApiFuture<'a, VirtualMachine> {
        (**self).create_vm(spec)
    }

    fn get_vm(&self, id: VmId) -> ApiFuture<'_, VirtualMachine> {
        (**self).get_vm(id)
    }

    fn update_vm<'a>(&'a self, id: VmId, update: &'a VmUpdate) -> ApiFuture<'a, VirtualMachine> {
        (**self).update_vm(id, update)
    }

    fn start_vm(&self, id: VmId) -> ApiFuture<'_, ()> {
        (**self).start_vm(id)
    }

    fn stop_vm(&self, id: VmId) -> ApiFuture<'_, ()> {
        (**self).stop_vm(id)
    }

    fn delete_vm(&self, id: VmId) -> ApiFuture<'_, ()> {
        (**self).delete_vm(id)
    }

    fn list_hosts(&self) -> ApiFuture<'_, Vec<Host>> {
        (**self).list_hosts()
    }

    fn list_images(&self) -> ApiFuture<'_, Vec<Image>> {
        (**self).list_images()
    }
}
