// DM Bridge - Lifecycle Module
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

mod install;
mod service;
mod status;

pub use install::{
    install, uninstall, InstallOptions, StartType, UnitManager, SYSTEMD_UNIT_DIR,
    UNINSTALL_STOP_TIMEOUT,
};
pub use service::{BridgeService, ControlRequest};
pub use status::SystemdNotifier;
