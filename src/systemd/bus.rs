// DM Bridge - System Bus
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Lazily opened system D-Bus connection shared by the D-Bus clients.
//!
//! Blocking calls only. Callers are on the blocking pool or outside any
//! runtime.

use std::sync::{Mutex, PoisonError};

use anyhow::{anyhow, Context, Result};
use tracing::{debug, info};
use zbus::blocking::Connection;
use zbus::zvariant::{ObjectPath, OwnedValue};

const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

#[derive(Default)]
pub struct SystemBus {
    connection: Mutex<Option<Connection>>,
}

impl SystemBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect on first use, then hand out clones of the same connection.
    pub fn connection(&self) -> Result<Connection> {
        let mut guard = self.connection.lock().unwrap_or_else(PoisonError::into_inner);

        if guard.is_none() {
            info!("Connecting to system D-Bus...");
            let conn = Connection::system().context("Failed to connect to system D-Bus")?;
            *guard = Some(conn);
        }

        guard.clone().ok_or_else(|| anyhow!("Not connected"))
    }

    /// Read one property through `org.freedesktop.DBus.Properties.Get`.
    pub fn property(
        &self,
        destination: &str,
        path: &ObjectPath<'_>,
        interface: &str,
        property: &str,
    ) -> Result<OwnedValue> {
        let conn = self.connection()?;
        debug!("Reading {}.{} from {}", interface, property, path);

        let value: OwnedValue = conn
            .call_method(
                Some(destination),
                path.clone(),
                Some(PROPERTIES_INTERFACE),
                "Get",
                &(interface, property),
            )
            .with_context(|| format!("Failed to read property {}.{}", interface, property))?
            .body()
            .deserialize()
            .with_context(|| format!("Malformed reply for property {}", property))?;

        Ok(value)
    }

    pub fn string_property(
        &self,
        destination: &str,
        path: &ObjectPath<'_>,
        interface: &str,
        property: &str,
    ) -> Result<String> {
        let value = self.property(destination, path, interface, property)?;
        String::try_from(value).map_err(|_| anyhow!("Property {} is not a string", property))
    }
}
