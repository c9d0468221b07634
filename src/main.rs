//! Binary entry point for the `crunchvm` CLI.

use std::io::{self, Write};
use std::process;

use clap::Parser;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crunchvm::{
    CatalogError, ClientError, ConfigError, CrunchloopConfig, HostId, HttpVmApi, ImageId,
    LifecycleError, LifecycleService, PowerState, RequestError, VmApi, VmId, VmSpec, VmUpdate,
    find_host, find_image,
};

mod cli;

use cli::{Cli, CreateCommand, PowerArg};

const EXIT_FAILURE: i32 = 1;
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to set up the control-plane client: {0}")]
    Client(#[from] ClientError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("invalid request: {0}")]
    Request(#[from] RequestError),
    #[error("failed to write output: {0}")]
    Output(String),
}

impl CliError {
    const fn exit_code(&self) -> i32 {
        match self {
            Self::Lifecycle(err) if err.is_cancelled() => EXIT_INTERRUPTED,
            _ => EXIT_FAILURE,
        }
    }
}

#[derive(Debug, Serialize)]
struct Deleted {
    id: VmId,
    status: &'static str,
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone());

    let exit_code = match run(cli, &cancel).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            err.exit_code()
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .init();
}

fn cancel_on_interrupt(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling in-flight operation");
            cancel.cancel();
        }
    });
}

async fn run(cli: Cli, cancel: &CancellationToken) -> Result<(), CliError> {
    let config = CrunchloopConfig::load_without_cli_args()?;
    config.validate()?;
    let api = HttpVmApi::from_config(&config)?;
    let service = LifecycleService::new(api, config.wait_policy());
    dispatch(cli, &service, cancel, &mut io::stdout()).await
}

async fn dispatch<C: VmApi>(
    cli: Cli,
    service: &LifecycleService<C>,
    cancel: &CancellationToken,
    out: &mut impl Write,
) -> Result<(), CliError> {
    match cli {
        Cli::Create(args) => {
            let spec = build_spec(args, service.api()).await?;
            write_json(out, &service.create(&spec, cancel).await?)
        }
        Cli::Get(args) => write_json(out, &service.read(VmId::new(args.id), cancel).await?),
        Cli::Update(args) => {
            let update = VmUpdate {
                memory_megabytes: args.memory_mb,
                cores: args.cores,
            };
            write_json(
                out,
                &service.update(VmId::new(args.id), &update, cancel).await?,
            )
        }
        Cli::Start(args) => write_json(out, &service.start(VmId::new(args.id), cancel).await?),
        Cli::Stop(args) => write_json(out, &service.stop(VmId::new(args.id), cancel).await?),
        Cli::Power(args) => {
            let state = match args.state {
                PowerArg::Running => PowerState::Running,
                PowerArg::Stopped => PowerState::Stopped,
            };
            write_json(
                out,
                &service
                    .set_power_state(VmId::new(args.id), state, cancel)
                    .await?,
            )
        }
        Cli::Delete(args) => {
            let id = VmId::new(args.id);
            service.delete(id, cancel).await?;
            write_json(
                out,
                &Deleted {
                    id,
                    status: "deleted",
                },
            )
        }
        Cli::Host(args) => write_json(out, &find_host(service.api(), &args.name).await?),
        Cli::Image(args) => write_json(out, &find_image(service.api(), &args.name).await?),
    }
}

/// Resolves image and host names, then assembles the create payload.
async fn build_spec<C: VmApi>(args: CreateCommand, api: &C) -> Result<VmSpec, CliError> {
    let vmi_id = match (args.image_id, args.image.as_deref()) {
        (Some(id), _) => Some(ImageId::new(id)),
        (None, Some(name)) => Some(find_image(api, name).await?.id),
        (None, None) => None,
    };
    let host_id = match (args.host_id, args.host.as_deref()) {
        (Some(id), _) => Some(HostId::new(id)),
        (None, Some(name)) => Some(find_host(api, name).await?.id),
        (None, None) => None,
    };

    let mut builder = VmSpec::builder()
        .name(args.name)
        .memory_megabytes(args.memory_mb)
        .cores(args.cores)
        .root_volume_size_gigabytes(args.root_volume_gb)
        .host_id(host_id)
        .user_data(args.user_data)
        .ssh_key(args.ssh_key);
    if let Some(id) = vmi_id {
        builder = builder.vmi_id(id);
    }
    Ok(builder.build()?)
}

fn write_json(out: &mut impl Write, value: &impl Serialize) -> Result<(), CliError> {
    let rendered =
        serde_json::to_string_pretty(value).map_err(|err| CliError::Output(err.to_string()))?;
    writeln!(out, "{rendered}").map_err(|err| CliError::Output(err.to_string()))
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
