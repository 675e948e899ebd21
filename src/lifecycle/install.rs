// DM Bridge - Service Installation
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Registering the bridge as a systemd unit and removing it again.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::ValueEnum;
use tracing::{info, warn};

use crate::interfaces::{wait_for_state, ServiceControl, ServiceState, STATE_POLL_INTERVAL};
use crate::server::{RUNTIME_DIRECTORY, RUNTIME_DIRECTORY_MODE};
use crate::systemd::unit_name;

/// Where installed unit files go.
pub const SYSTEMD_UNIT_DIR: &str = "/etc/systemd/system";

/// How long uninstall waits for a running unit to stop.
pub const UNINSTALL_STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// Unit file management on top of service control.
pub trait UnitManager: ServiceControl {
    fn reload(&self) -> Result<()>;
    fn enable(&self, unit: &str) -> Result<()>;
    fn disable(&self, unit: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StartType {
    /// Enabled at boot.
    Auto,
    /// Started only on request.
    Demand,
    Disabled,
}

#[derive(Debug, Clone)]
pub struct InstallOptions {
    pub name: String,
    pub display_name: String,
    pub start_type: StartType,
    pub dependencies: Vec<String>,
    pub account: Option<String>,
    pub password: Option<String>,
    pub executable: PathBuf,
}

fn quote_exec(path: &Path) -> String {
    let path = path.display().to_string();
    if path.contains(char::is_whitespace) {
        format!("\"{}\"", path)
    } else {
        path
    }
}

/// Unit file text for `options`.
pub fn render_unit(options: &InstallOptions) -> String {
    let mut unit = String::from("[Unit]\n");
    unit.push_str(&format!("Description={}\n", options.display_name));

    if !options.dependencies.is_empty() {
        let units: Vec<String> = options.dependencies.iter().map(|d| unit_name(d)).collect();
        let units = units.join(" ");
        unit.push_str(&format!("After={}\n", units));
        unit.push_str(&format!("Requires={}\n", units));
    }

    unit.push_str("\n[Service]\nType=notify\n");
    unit.push_str(&format!("ExecStart={} run\n", quote_exec(&options.executable)));
    // Clients traverse the runtime directory to reach the socket.
    unit.push_str(&format!(
        "RuntimeDirectory={}\nRuntimeDirectoryMode={:04o}\n",
        RUNTIME_DIRECTORY, RUNTIME_DIRECTORY_MODE
    ));

    match options.account.as_deref().map(str::trim) {
        None | Some("") | Some("root") => {}
        Some(account) => unit.push_str(&format!("User={}\n", account)),
    }

    unit.push_str("\n[Install]\nWantedBy=multi-user.target\n");
    unit
}

/// Write the unit file, reload systemd and enable the unit for [`StartType::Auto`].
pub fn install<M: UnitManager>(manager: &M, unit_dir: &Path, options: &InstallOptions) -> Result<PathBuf> {
    if options.password.as_deref().is_some_and(|p| !p.is_empty()) {
        warn!("Service account passwords are not supported by systemd, ignoring it");
    }

    let unit = unit_name(&options.name);
    let path = unit_dir.join(&unit);

    fs::create_dir_all(unit_dir)
        .with_context(|| format!("Failed to create {}", unit_dir.display()))?;
    fs::write(&path, render_unit(options))
        .with_context(|| format!("Failed to write unit file {}", path.display()))?;
    info!("Wrote unit file: {}", path.display());

    manager.reload().context("Failed to reload systemd")?;

    if options.start_type == StartType::Auto {
        manager
            .enable(&unit)
            .with_context(|| format!("Failed to enable {}", unit))?;
    }

    info!("Installed service: {}", unit);
    Ok(path)
}

/// Stop, disable and remove the unit. Failures are logged, never returned.
pub fn uninstall<M: UnitManager>(manager: &M, unit_dir: &Path, name: &str, stop_timeout: Duration) {
    let unit = unit_name(name);

    match manager.stop(&unit) {
        Ok(()) => {
            match wait_for_state(manager, &unit, ServiceState::Stopped, stop_timeout, STATE_POLL_INTERVAL) {
                Ok(ServiceState::Stopped) => info!("Service {} stopped", unit),
                Ok(state) => warn!("Service {} still {:?}, removing anyway", unit, state),
                Err(e) => warn!("Failed to query {}: {:#}", unit, e),
            }
        }
        Err(e) => warn!("Failed to stop {}: {:#}", unit, e),
    }

    if let Err(e) = manager.disable(&unit) {
        warn!("Failed to disable {}: {:#}", unit, e);
    }

    let path = unit_dir.join(&unit);
    match fs::remove_file(&path) {
        Ok(()) => info!("Removed unit file: {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }

    if let Err(e) = manager.reload() {
        warn!("Failed to reload systemd: {:#}", e);
    }
    info!("Uninstalled service: {}", unit);
}
