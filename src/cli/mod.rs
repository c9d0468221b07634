//! Command-line interface definitions for the `crunchvm` binary.
//!
//! The parser only uses clap and primitive types so the build script can
//! include this file to render the manual page.

use clap::{Parser, ValueEnum};

/// Top-level CLI for the `crunchvm` binary.
#[derive(Debug, Parser)]
#[command(
    name = "crunchvm",
    about = "Manage virtual machines on a Crunchloop control plane",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Create a machine and wait until it is running.
    #[command(name = "create")]
    Create(CreateCommand),
    /// Print a machine.
    #[command(name = "get")]
    Get(VmArgs),
    /// Resize a machine and wait for it to settle.
    #[command(name = "update")]
    Update(UpdateCommand),
    /// Power a machine on and wait until it is running.
    #[command(name = "start")]
    Start(VmArgs),
    /// Power a machine off and wait until it is stopped.
    #[command(name = "stop")]
    Stop(VmArgs),
    /// Drive a machine to the given power state.
    #[command(name = "power")]
    Power(PowerCommand),
    /// Delete a machine and wait until it is gone.
    #[command(name = "delete")]
    Delete(VmArgs),
    /// Look up a hypervisor host by name.
    #[command(name = "host")]
    Host(LookupArgs),
    /// Look up a bootable image by name.
    #[command(name = "image")]
    Image(LookupArgs),
}

/// Identifies an existing machine.
#[derive(Debug, Parser)]
pub(crate) struct VmArgs {
    /// Numeric machine identifier.
    #[arg(value_name = "VM_ID")]
    pub(crate) id: i64,
}

/// Arguments for `crunchvm create`.
#[derive(Debug, Parser)]
pub(crate) struct CreateCommand {
    /// Machine name.
    #[arg(long)]
    pub(crate) name: String,
    /// Memory in mebibytes.
    #[arg(long, value_name = "MB")]
    pub(crate) memory_mb: u32,
    /// Virtual CPU cores.
    #[arg(long)]
    pub(crate) cores: u32,
    /// Root volume size in gibibytes.
    #[arg(long, value_name = "GB")]
    pub(crate) root_volume_gb: u32,
    /// Image identifier to boot from.
    #[arg(long, value_name = "ID", conflicts_with = "image", required_unless_present = "image")]
    pub(crate) image_id: Option<i64>,
    /// Image name to boot from, resolved through the image list.
    #[arg(long, value_name = "NAME")]
    pub(crate) image: Option<String>,
    /// Host identifier to place the machine on.
    #[arg(long, value_name = "ID", conflicts_with = "host")]
    pub(crate) host_id: Option<i64>,
    /// Host name to place the machine on, resolved through the host list.
    #[arg(long, value_name = "NAME")]
    pub(crate) host: Option<String>,
    /// Base64 encoded cloud-init user data.
    #[arg(long, value_name = "DATA")]
    pub(crate) user_data: Option<String>,
    /// SSH public key installed for the default user.
    #[arg(long, value_name = "KEY")]
    pub(crate) ssh_key: Option<String>,
}

/// Arguments for `crunchvm update`.
#[derive(Debug, Parser)]
pub(crate) struct UpdateCommand {
    /// Numeric machine identifier.
    #[arg(value_name = "VM_ID")]
    pub(crate) id: i64,
    /// New memory size in mebibytes.
    #[arg(long, value_name = "MB")]
    pub(crate) memory_mb: Option<u32>,
    /// New core count.
    #[arg(long)]
    pub(crate) cores: Option<u32>,
}

/// Arguments for `crunchvm power`.
#[derive(Debug, Parser)]
pub(crate) struct PowerCommand {
    /// Numeric machine identifier.
    #[arg(value_name = "VM_ID")]
    pub(crate) id: i64,
    /// Desired power state.
    #[arg(value_enum)]
    pub(crate) state: PowerArg,
}

/// Power states accepted on the command line.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum PowerArg {
    /// The machine should be running.
    Running,
    /// The machine should be stopped.
    Stopped,
}

/// Arguments for the catalog lookups.
#[derive(Debug, Parser)]
pub(crate) struct LookupArgs {
    /// Exact name to look up.
    pub(crate) name: String,
}
