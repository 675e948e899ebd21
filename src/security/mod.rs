// DM Bridge - Security Module
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Endpoint access control.
//!
//! A connecting process must hold the bridge capability. On Linux a
//! capability is a group in the system group database, and a caller holds it
//! when the group is its primary or one of its supplementary groups.
//!
//! ```text
//! Capability → PrincipalResolver → SecurityDescriptor ← CallerIdentity (SO_PEERCRED)
//! ```

mod descriptor;
mod peer;
mod principal;

use std::fmt;

pub use descriptor::SecurityDescriptor;
pub use peer::CallerIdentity;
pub use principal::{Principal, PrincipalResolver, SystemGroups};

/// Capability clients must hold to bind the endpoint.
pub const DEFAULT_CAPABILITY: &str = "systemManagement";

/// Name of the permission a connecting process must hold.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Capability(String);

impl Capability {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Capability {
    fn default() -> Self {
        Self::new(DEFAULT_CAPABILITY)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
