// DM Bridge - Main Entry Point
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! DM Bridge - A privileged local bridge for device-management operations.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod attestation;
mod autostart;
mod config;
mod context;
mod error;
mod interfaces;
mod lifecycle;
mod security;
mod server;
mod storage;
mod systemd;
mod validate;

use attestation::DEFAULT_ATTESTATION_HELPER;
use autostart::DEFAULT_AUTOSTART_DIR;
use config::{BridgeConfig, DEFAULT_CONFIG_PATH};
use context::{BridgeContext, EndpointConfig, Platform, PlatformPaths, DEFAULT_MAX_CONNECTIONS};
use lifecycle::{
    BridgeService, ControlRequest, InstallOptions, StartType, SystemdNotifier, SYSTEMD_UNIT_DIR,
    UNINSTALL_STOP_TIMEOUT,
};
use security::{Capability, SystemGroups, DEFAULT_CAPABILITY};
use storage::DEFAULT_STATE_DIR;
use systemd::{SystemBus, SystemdClient};

#[derive(Debug, Parser)]
#[command(name = "dm-bridge", version, about = "Privileged local device-management bridge")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the bridge service (default).
    Run,
    /// Install the bridge as a systemd unit.
    Install(InstallArgs),
    /// Stop and remove the systemd unit.
    Uninstall(UninstallArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Configuration document.
    #[arg(long, global = true, env = "DM_BRIDGE_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Endpoint socket path.
    #[arg(long, global = true, env = "DM_BRIDGE_SOCKET", default_value_os_t = server::default_socket_path())]
    socket: PathBuf,

    /// Capability callers must hold.
    #[arg(long, global = true, default_value = DEFAULT_CAPABILITY)]
    capability: String,

    #[arg(long, global = true, default_value = DEFAULT_STATE_DIR)]
    state_dir: PathBuf,

    #[arg(long, global = true, default_value = DEFAULT_AUTOSTART_DIR)]
    autostart_dir: PathBuf,

    #[arg(long, global = true, default_value = DEFAULT_ATTESTATION_HELPER)]
    attestation_helper: PathBuf,

    /// Connections served at once.
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_CONNECTIONS)]
    max_connections: usize,
}

#[derive(Debug, Args)]
struct InstallArgs {
    #[arg(long, default_value = "dm-bridge")]
    name: String,

    #[arg(long, default_value = "Device Management Bridge")]
    display_name: String,

    #[arg(long, value_enum, default_value_t = StartType::Auto)]
    start_type: StartType,

    /// Units the bridge needs, comma separated.
    #[arg(long, value_delimiter = ',')]
    dependencies: Vec<String>,

    /// Account the service runs as. Empty or `root` keeps the default.
    #[arg(long)]
    account: Option<String>,

    /// Accepted for compatibility and ignored.
    #[arg(long)]
    password: Option<String>,

    #[arg(long, default_value = SYSTEMD_UNIT_DIR)]
    unit_dir: PathBuf,
}

#[derive(Debug, Args)]
struct UninstallArgs {
    #[arg(long, default_value = "dm-bridge")]
    name: String,

    #[arg(long, default_value = SYSTEMD_UNIT_DIR)]
    unit_dir: PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let result = match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_service(&cli.run),
        Command::Install(args) => install_service(args).map(|()| ExitCode::SUCCESS),
        Command::Uninstall(args) => {
            uninstall_service(args);
            Ok(ExitCode::SUCCESS)
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn build_context(args: &RunArgs) -> BridgeContext {
    let paths = PlatformPaths {
        state_dir: args.state_dir.clone(),
        autostart_dir: args.autostart_dir.clone(),
        attestation_helper: args.attestation_helper.clone(),
    };

    BridgeContext {
        config: Some(BridgeConfig::load(&args.config)),
        capability: Capability::new(args.capability.clone()),
        endpoint: EndpointConfig {
            socket_path: args.socket.clone(),
            max_connections: args.max_connections.max(1),
        },
        principals: Arc::new(SystemGroups),
        platform: Platform::system(&paths),
    }
}

fn run_service(args: &RunArgs) -> Result<ExitCode> {
    info!("Starting DM Bridge {}", env!("CARGO_PKG_VERSION"));
    let ctx = Arc::new(build_context(args));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let status = runtime.block_on(async move {
        let (control, requests) = mpsc::channel(8);
        let signals = tokio::spawn(forward_signals(control)?);

        let service = BridgeService::new(ctx, Arc::new(SystemdNotifier::from_env()));
        let status = service.run(requests).await;
        signals.abort();
        Ok::<_, anyhow::Error>(status)
    })?;

    info!("DM Bridge exited with status {}", status.exit_code);
    Ok(match u8::try_from(status.exit_code) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(code) => ExitCode::from(code),
        Err(_) => ExitCode::FAILURE,
    })
}

/// SIGTERM stops, SIGINT shuts down, SIGHUP interrogates.
fn forward_signals(
    control: mpsc::Sender<ControlRequest>,
) -> Result<impl std::future::Future<Output = ()>> {
    let mut terminate = signal(SignalKind::terminate()).context("Failed to watch SIGTERM")?;
    let mut interrupt = signal(SignalKind::interrupt()).context("Failed to watch SIGINT")?;
    let mut hangup = signal(SignalKind::hangup()).context("Failed to watch SIGHUP")?;

    Ok(async move {
        loop {
            let request = tokio::select! {
                _ = terminate.recv() => ControlRequest::Stop,
                _ = interrupt.recv() => ControlRequest::Shutdown,
                _ = hangup.recv() => ControlRequest::Interrogate,
            };
            if control.send(request).await.is_err() {
                return;
            }
        }
    })
}

fn install_service(args: InstallArgs) -> Result<()> {
    let executable = std::env::current_exe().context("Failed to locate the dm-bridge executable")?;
    let options = InstallOptions {
        name: args.name,
        display_name: args.display_name,
        start_type: args.start_type,
        dependencies: args
            .dependencies
            .into_iter()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect(),
        account: args.account,
        password: args.password,
        executable,
    };

    let manager = SystemdClient::new(Arc::new(SystemBus::new()));
    let path = lifecycle::install(&manager, &args.unit_dir, &options)?;
    info!("Service {} installed at {}", options.name, path.display());
    Ok(())
}

fn uninstall_service(args: UninstallArgs) {
    let manager = SystemdClient::new(Arc::new(SystemBus::new()));
    lifecycle::uninstall(&manager, &args.unit_dir, &args.name, UNINSTALL_STOP_TIMEOUT);
}
