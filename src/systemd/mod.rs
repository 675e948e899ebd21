// DM Bridge - Systemd Module
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! D-Bus clients for systemd, hostnamed and logind.

mod bus;
mod client;
mod hostname;
mod login;

pub use bus::SystemBus;
pub use client::{unit_name, SystemdClient};
pub use hostname::HostnameClient;
pub use login::LoginClient;
