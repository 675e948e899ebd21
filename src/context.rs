// DM Bridge - Context
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Everything the bridge needs at runtime, built once in `main`.

use std::path::PathBuf;
use std::sync::Arc;

use crate::attestation::ProcessAttestationHelper;
use crate::autostart::AutostartEntries;
use crate::config::BridgeConfig;
use crate::interfaces::{
    AppStartup, AttestationHelper, ComputerNameOps, PowerControl, ServiceControl, TelemetryStore,
};
use crate::security::{Capability, PrincipalResolver};
use crate::storage::FileTelemetryStore;
use crate::systemd::{HostnameClient, LoginClient, SystemBus, SystemdClient};

/// Default cap on concurrently served connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub socket_path: PathBuf,
    pub max_connections: usize,
}

/// The OS collaborators behind each command group.
#[derive(Clone)]
pub struct Platform {
    pub computer_name: Arc<dyn ComputerNameOps>,
    pub services: Arc<dyn ServiceControl>,
    pub telemetry: Arc<dyn TelemetryStore>,
    pub power: Arc<dyn PowerControl>,
    pub app_startup: Arc<dyn AppStartup>,
    pub attestation: Arc<dyn AttestationHelper>,
}

/// Locations used by the file and process backed collaborators.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    pub state_dir: PathBuf,
    pub autostart_dir: PathBuf,
    pub attestation_helper: PathBuf,
}

impl Platform {
    /// Collaborators backed by the running system. D-Bus clients share one
    /// lazily opened system bus connection.
    pub fn system(paths: &PlatformPaths) -> Self {
        let bus = Arc::new(SystemBus::new());

        Self {
            computer_name: Arc::new(HostnameClient::new(bus.clone())),
            services: Arc::new(SystemdClient::new(bus.clone())),
            telemetry: Arc::new(FileTelemetryStore::new(&paths.state_dir)),
            power: Arc::new(LoginClient::new(bus)),
            app_startup: Arc::new(AutostartEntries::new(&paths.autostart_dir)),
            attestation: Arc::new(ProcessAttestationHelper::new(&paths.attestation_helper)),
        }
    }
}

/// Explicit replacement for process-wide state.
#[derive(Clone)]
pub struct BridgeContext {
    /// `None` when no configuration was loaded; the server refuses to start.
    pub config: Option<BridgeConfig>,
    pub capability: Capability,
    pub endpoint: EndpointConfig,
    pub principals: Arc<dyn PrincipalResolver>,
    pub platform: Platform,
}
