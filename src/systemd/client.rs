// DM Bridge - Systemd D-Bus Client
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Systemd D-Bus client implementation for service management.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};
use zbus::blocking::Connection;
use zbus::zvariant::{DynamicType, OwnedObjectPath};

use super::SystemBus;
use crate::error::{errno, OsError};
use crate::interfaces::{ServiceControl, ServiceState};
use crate::lifecycle::UnitManager;

const SYSTEMD_BUS: &str = "org.freedesktop.systemd1";
const SYSTEMD_PATH: &str = "/org/freedesktop/systemd1";
const MANAGER_INTERFACE: &str = "org.freedesktop.systemd1.Manager";
const UNIT_INTERFACE: &str = "org.freedesktop.systemd1.Unit";

/// Job mode for start and stop requests.
const JOB_MODE: &str = "replace";

const UNIT_SUFFIXES: &[&str] = &[
    ".service", ".socket", ".target", ".timer", ".path", ".mount", ".device", ".scope", ".slice",
];

/// Plain service names get `.service` appended.
pub fn unit_name(name: &str) -> String {
    if UNIT_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
        name.to_string()
    } else {
        format!("{}.service", name)
    }
}

/// Client for interacting with systemd via D-Bus.
pub struct SystemdClient {
    bus: Arc<SystemBus>,
}

impl SystemdClient {
    pub fn new(bus: Arc<SystemBus>) -> Self {
        Self { bus }
    }

    fn call<B>(&self, method: &str, body: &B) -> Result<()>
    where
        B: Serialize + DynamicType,
    {
        let conn = self.bus.connection()?;
        conn.call_method(Some(SYSTEMD_BUS), SYSTEMD_PATH, Some(MANAGER_INTERFACE), method, body)
            .with_context(|| format!("systemd {} failed", method))?;
        Ok(())
    }

    /// Object path of a unit, loading it if systemd does not have it in memory.
    fn unit_path(&self, conn: &Connection, unit: &str) -> Result<OwnedObjectPath> {
        let unit_path: OwnedObjectPath = conn
            .call_method(
                Some(SYSTEMD_BUS),
                SYSTEMD_PATH,
                Some(MANAGER_INTERFACE),
                "GetUnit",
                &(unit,),
            )
            .or_else(|_| {
                // Try LoadUnit if GetUnit fails (unit not loaded)
                conn.call_method(
                    Some(SYSTEMD_BUS),
                    SYSTEMD_PATH,
                    Some(MANAGER_INTERFACE),
                    "LoadUnit",
                    &(unit,),
                )
            })
            .with_context(|| format!("Failed to look up unit {}", unit))?
            .body()
            .deserialize()?;

        Ok(unit_path)
    }

    fn unit_property(&self, unit_path: &OwnedObjectPath, property: &str) -> Result<String> {
        self.bus
            .string_property(SYSTEMD_BUS, unit_path, UNIT_INTERFACE, property)
    }
}

impl ServiceControl for SystemdClient {
    fn start(&self, name: &str) -> Result<()> {
        let unit = unit_name(name);
        self.call("StartUnit", &(unit.as_str(), JOB_MODE))?;
        info!("Queued start of unit: {}", unit);
        Ok(())
    }

    fn stop(&self, name: &str) -> Result<()> {
        let unit = unit_name(name);
        self.call("StopUnit", &(unit.as_str(), JOB_MODE))?;
        info!("Queued stop of unit: {}", unit);
        Ok(())
    }

    fn query(&self, name: &str) -> Result<ServiceState> {
        let unit = unit_name(name);
        let conn = self.bus.connection()?;
        let unit_path = self.unit_path(&conn, &unit)?;

        // LoadUnit hands back a path even for units that do not exist.
        let load_state = self.unit_property(&unit_path, "LoadState")?;
        if load_state == "not-found" {
            return Err(OsError::new(errno::ENOENT, format!("unit {} not found", unit)).into());
        }

        let active_state = self.unit_property(&unit_path, "ActiveState")?;
        debug!("Unit {} is {}", unit, active_state);
        Ok(ServiceState::from_active_state(&active_state))
    }
}

impl UnitManager for SystemdClient {
    fn reload(&self) -> Result<()> {
        self.call("Reload", &())?;
        info!("Reloaded systemd manager configuration");
        Ok(())
    }

    fn enable(&self, unit: &str) -> Result<()> {
        // runtime = false, force = true
        self.call("EnableUnitFiles", &(vec![unit], false, true))?;
        info!("Enabled unit: {}", unit);
        Ok(())
    }

    fn disable(&self, unit: &str) -> Result<()> {
        self.call("DisableUnitFiles", &(vec![unit], false))?;
        info!("Disabled unit: {}", unit);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_name() {
        assert_eq!(unit_name("w32time"), "w32time.service");
        assert_eq!(unit_name("sshd.service"), "sshd.service");
        assert_eq!(unit_name("cups.socket"), "cups.socket");
        assert_eq!(unit_name("org.example.agent"), "org.example.agent.service");
    }
}
