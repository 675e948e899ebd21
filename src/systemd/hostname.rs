// DM Bridge - Hostname Client
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! `systemd-hostnamed` client.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use zbus::zvariant::ObjectPath;

use super::SystemBus;
use crate::interfaces::ComputerNameOps;

const HOSTNAME_BUS: &str = "org.freedesktop.hostname1";
const HOSTNAME_PATH: &str = "/org/freedesktop/hostname1";
const HOSTNAME_INTERFACE: &str = "org.freedesktop.hostname1";

pub struct HostnameClient {
    bus: Arc<SystemBus>,
}

impl HostnameClient {
    pub fn new(bus: Arc<SystemBus>) -> Self {
        Self { bus }
    }

    fn name_property(&self, property: &str) -> Result<String> {
        let path = ObjectPath::from_static_str_unchecked(HOSTNAME_PATH);
        self.bus
            .string_property(HOSTNAME_BUS, &path, HOSTNAME_INTERFACE, property)
    }
}

impl ComputerNameOps for HostnameClient {
    fn set_static_name(&self, name: &str) -> Result<()> {
        let conn = self.bus.connection()?;
        // interactive = false: never wait for a polkit prompt.
        conn.call_method(
            Some(HOSTNAME_BUS),
            HOSTNAME_PATH,
            Some(HOSTNAME_INTERFACE),
            "SetStaticHostname",
            &(name, false),
        )
        .with_context(|| format!("Failed to set static hostname to {}", name))?;

        info!("Static hostname set to: {}", name);
        Ok(())
    }

    fn static_name(&self) -> Result<String> {
        self.name_property("StaticHostname")
    }

    fn running_name(&self) -> Result<String> {
        self.name_property("Hostname")
    }
}
