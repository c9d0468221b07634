//! Desired-state payloads for creating and resizing virtual machines.

use serde::Serialize;
use thiserror::Error;

use crate::model::{HostId, ImageId, VirtualMachine};

/// Parameters required to create a new virtual machine.
///
/// Only `memory_megabytes` and `cores` may change after creation; every
/// other field is fixed for the lifetime of the machine.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct VmSpec {
    /// Machine name.
    pub name: String,
    /// Memory in mebibytes.
    pub memory_megabytes: u32,
    /// Virtual CPU cores.
    pub cores: u32,
    /// Image to boot from.
    pub vmi_id: ImageId,
    /// Host to place the machine on. The control plane picks one when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_id: Option<HostId>,
    /// Root volume size in gibibytes.
    pub root_volume_size_gigabytes: u32,
    /// Base64 encoded cloud-init user data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
    /// SSH public key installed for the default user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_key: Option<String>,
}

impl VmSpec {
    /// Starts a builder for a [`VmSpec`].
    #[must_use]
    pub fn builder() -> VmSpecBuilder {
        VmSpecBuilder::new()
    }

    /// Validates the payload, naming the first offending field.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Validation`] when the name is blank or a size
    /// is zero.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.name.trim().is_empty() {
            return Err(RequestError::Validation("name".to_owned()));
        }
        if self.memory_megabytes == 0 {
            return Err(RequestError::Validation("memory_megabytes".to_owned()));
        }
        if self.cores == 0 {
            return Err(RequestError::Validation("cores".to_owned()));
        }
        if self.root_volume_size_gigabytes == 0 {
            return Err(RequestError::Validation(
                "root_volume_size_gigabytes".to_owned(),
            ));
        }
        Ok(())
    }

    /// Lists the fixed fields whose desired value differs from the machine.
    ///
    /// A missing `host_id` means "any host" and never counts as a change.
    #[must_use]
    pub fn immutable_changes(&self, current: &VirtualMachine) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.name != current.name {
            changed.push("name");
        }
        if self.vmi_id != current.vmi.id {
            changed.push("vmi_id");
        }
        if self
            .host_id
            .is_some_and(|host_id| current.host_id() != Some(host_id))
        {
            changed.push("host_id");
        }
        if u64::from(self.root_volume_size_gigabytes) != current.root_volume_size_gigabytes() {
            changed.push("root_volume_size_gigabytes");
        }
        changed
    }

    /// Extracts the fields the update call is allowed to carry.
    #[must_use]
    pub const fn mutable_fields(&self) -> VmUpdate {
        VmUpdate {
            memory_megabytes: Some(self.memory_megabytes),
            cores: Some(self.cores),
        }
    }
}

/// Builder for [`VmSpec`] that trims text inputs and drops blank optionals.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct VmSpecBuilder {
    name: String,
    memory_megabytes: u32,
    cores: u32,
    vmi_id: Option<ImageId>,
    host_id: Option<HostId>,
    root_volume_size_gigabytes: u32,
    user_data: Option<String>,
    ssh_key: Option<String>,
}

impl VmSpecBuilder {
    /// Creates an empty builder; fields must be populated before build.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the machine name.
    #[must_use]
    pub fn name(mut self, value: impl Into<String>) -> Self {
        self.name = value.into();
        self
    }

    /// Sets the memory in mebibytes.
    #[must_use]
    pub const fn memory_megabytes(mut self, value: u32) -> Self {
        self.memory_megabytes = value;
        self
    }

    /// Sets the core count.
    #[must_use]
    pub const fn cores(mut self, value: u32) -> Self {
        self.cores = value;
        self
    }

    /// Sets the image.
    #[must_use]
    pub const fn vmi_id(mut self, value: ImageId) -> Self {
        self.vmi_id = Some(value);
        self
    }

    /// Pins the machine to a host.
    #[must_use]
    pub const fn host_id(mut self, value: Option<HostId>) -> Self {
        self.host_id = value;
        self
    }

    /// Sets the root volume size in gibibytes.
    #[must_use]
    pub const fn root_volume_size_gigabytes(mut self, value: u32) -> Self {
        self.root_volume_size_gigabytes = value;
        self
    }

    /// Sets base64 encoded cloud-init user data.
    #[must_use]
    pub fn user_data(mut self, value: Option<String>) -> Self {
        self.user_data = value;
        self
    }

    /// Sets the SSH public key.
    #[must_use]
    pub fn ssh_key(mut self, value: Option<String>) -> Self {
        self.ssh_key = value;
        self
    }

    /// Builds and validates the [`VmSpec`].
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Validation`] when the image is unset or any
    /// required field is empty.
    pub fn build(self) -> Result<VmSpec, RequestError> {
        let vmi_id = self
            .vmi_id
            .ok_or_else(|| RequestError::Validation("vmi_id".to_owned()))?;
        let spec = VmSpec {
            name: self.name.trim().to_owned(),
            memory_megabytes: self.memory_megabytes,
            cores: self.cores,
            vmi_id,
            host_id: self.host_id,
            root_volume_size_gigabytes: self.root_volume_size_gigabytes,
            user_data: non_blank(self.user_data),
            ssh_key: non_blank(self.ssh_key),
        };
        spec.validate()?;
        Ok(spec)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_owned())
        .filter(|text| !text.is_empty())
}

/// Fields accepted by the update call. Absent fields are left unchanged.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct VmUpdate {
    /// New memory size in mebibytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_megabytes: Option<u32>,
    /// New core count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cores: Option<u32>,
}

impl VmUpdate {
    /// Returns `true` when the update carries no fields.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.memory_megabytes.is_none() && self.cores.is_none()
    }

    /// Validates that provided sizes are non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Validation`] naming the zero-valued field.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.memory_megabytes == Some(0) {
            return Err(RequestError::Validation("memory_megabytes".to_owned()));
        }
        if self.cores == Some(0) {
            return Err(RequestError::Validation("cores".to_owned()));
        }
        Ok(())
    }
}

/// Errors raised while assembling a request.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RequestError {
    /// Raised when a field is missing, blank, or zero.
    #[error("missing or empty field: {0}")]
    Validation(String),
}
