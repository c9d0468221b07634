//! Lifecycle management for virtual machines on a Crunchloop control plane.
//!
//! The control plane accepts mutating calls immediately and applies them in
//! the background. This crate wraps each call in a convergence wait so that
//! create, update, power changes, and delete only return once the machine has
//! reached the state the operation implies.

pub mod catalog;
pub mod client;
pub mod config;
pub mod lifecycle;
pub mod model;
pub mod poller;
pub mod request;
pub mod test_support;

pub use catalog::{CatalogError, find_host, find_image};
pub use client::{ApiFuture, ClientError, HttpVmApi, VmApi};
pub use config::{ConfigError, CrunchloopConfig};
pub use lifecycle::{LifecycleError, LifecycleService, Operation, PowerState};
pub use model::{
    Host, HostId, HostRef, Image, ImageId, ImageRef, Observation, RootVolume, Target,
    VirtualMachine, VmId, VmStatus,
};
pub use poller::{ConvergencePoller, PollError, WaitPolicy};
pub use request::{RequestError, VmSpec, VmSpecBuilder, VmUpdate};
