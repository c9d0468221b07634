//! Shared vocabulary for virtual machines and their observed status.
//!
//! The control plane owns every status transition; this module only gives
//! names to what it reports and to what a lifecycle operation waits for.

mod ids;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use ids::{HostId, ImageId, VmId};

const MEBIBYTE_SHIFT: u32 = 20;
const GIBIBYTE_SHIFT: u32 = 30;

/// Status reported by the control plane for a virtual machine.
///
/// Unknown values are preserved verbatim so that a newer control plane does
/// not break snapshot decoding.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(from = "String", into = "String")]
pub enum VmStatus {
    /// The machine is being provisioned.
    Creating,
    /// The machine is powered on.
    Running,
    /// The machine is powered off.
    Stopped,
    /// A resize is in progress.
    Updating,
    /// Teardown is in progress.
    Deleting,
    /// The control plane gave up on the machine.
    Error,
    /// Any status this crate does not know about.
    Other(String),
}

impl VmStatus {
    /// Returns the wire representation of the status.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Creating => "creating",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Updating => "updating",
            Self::Deleting => "deleting",
            Self::Error => "error",
            Self::Other(value) => value.as_str(),
        }
    }
}

impl From<&str> for VmStatus {
    fn from(value: &str) -> Self {
        match value {
            "creating" => Self::Creating,
            "running" => Self::Running,
            "stopped" => Self::Stopped,
            "updating" => Self::Updating,
            "deleting" => Self::Deleting,
            "error" => Self::Error,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl From<String> for VmStatus {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<VmStatus> for String {
    fn from(value: VmStatus) -> Self {
        match value {
            VmStatus::Other(raw) => raw,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for VmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to the host a machine was scheduled on.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct HostRef {
    /// Host identifier.
    pub id: HostId,
    /// Host name, when the control plane includes it.
    #[serde(default)]
    pub name: String,
}

/// Reference to the image a machine was booted from.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ImageRef {
    /// Image identifier.
    pub id: ImageId,
    /// Image name, when the control plane includes it.
    #[serde(default)]
    pub name: String,
}

/// Root disk attached at creation.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RootVolume {
    /// Size in bytes.
    pub size_bytes: u64,
}

/// Point-in-time snapshot of a virtual machine.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct VirtualMachine {
    /// Identifier assigned at creation.
    pub id: VmId,
    /// Name chosen at creation; changing it requires recreation.
    pub name: String,
    /// Memory in bytes.
    pub memory_bytes: u64,
    /// Virtual CPU cores.
    pub cores: u32,
    /// Current status.
    pub status: VmStatus,
    /// Host the machine runs on. Scheduling may fill this in after creation.
    #[serde(default)]
    pub host: Option<HostRef>,
    /// Image the machine was booted from.
    pub vmi: ImageRef,
    /// Root disk.
    pub root_volume: RootVolume,
}

impl VirtualMachine {
    /// Memory rounded down to whole mebibytes.
    #[must_use]
    pub const fn memory_megabytes(&self) -> u64 {
        bytes_to_megabytes(self.memory_bytes)
    }

    /// Root volume size rounded down to whole gibibytes.
    #[must_use]
    pub const fn root_volume_size_gigabytes(&self) -> u64 {
        bytes_to_gigabytes(self.root_volume.size_bytes)
    }

    /// Host identifier, if the machine has been scheduled.
    #[must_use]
    pub fn host_id(&self) -> Option<HostId> {
        self.host.as_ref().map(|host| host.id)
    }
}

/// Converts bytes to whole mebibytes.
#[must_use]
pub const fn bytes_to_megabytes(bytes: u64) -> u64 {
    bytes >> MEBIBYTE_SHIFT
}

/// Converts bytes to whole gibibytes.
#[must_use]
pub const fn bytes_to_gigabytes(bytes: u64) -> u64 {
    bytes >> GIBIBYTE_SHIFT
}

/// Hypervisor host listed in the catalog.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Host {
    /// Host identifier.
    pub id: HostId,
    /// Unique host name.
    pub name: String,
    /// Status string reported by the control plane.
    #[serde(default)]
    pub status: Option<String>,
}

/// Bootable image listed in the catalog.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Image {
    /// Image identifier.
    pub id: ImageId,
    /// Unique image name.
    pub name: String,
}

/// Result of a single fetch, as seen by a convergence condition.
///
/// `Gone` is only produced for a "not found" response; transport failures
/// and other rejections never reach a condition.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Observation<'a, T> {
    /// The resource exists and this is its latest snapshot.
    Present(&'a T),
    /// The control plane reported the resource as not found.
    Gone,
}

/// Terminal state an operation waits for.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Target {
    /// The machine reports exactly this status.
    Status(VmStatus),
    /// The machine is no longer known to the control plane.
    Deleted,
}

impl Target {
    /// Returns `true` when the observation means the wait is over.
    #[must_use]
    pub fn is_satisfied_by(&self, observation: Observation<'_, VirtualMachine>) -> bool {
        match (self, observation) {
            (Self::Status(status), Observation::Present(vm)) => vm.status == *status,
            (Self::Deleted, Observation::Gone) => true,
            (Self::Status(_), Observation::Gone) | (Self::Deleted, Observation::Present(_)) => {
                false
            }
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(status) => status.fmt(f),
            Self::Deleted => f.write_str("deleted"),
        }
    }
}
