// DM Bridge - Principals
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Capability to principal resolution via the system group database.

use std::fmt;

use anyhow::{Context, Result};
use nix::unistd::Group;
use tracing::debug;

use super::Capability;

/// An identity an access entry can name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Principal {
    /// Every local process.
    Everyone,
    /// Members of a system group.
    Group { name: String, gid: u32 },
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Everyone => f.write_str("everyone"),
            Self::Group { name, gid } => write!(f, "group {} ({})", name, gid),
        }
    }
}

/// Resolves a capability name to the principals that carry it.
pub trait PrincipalResolver: Send + Sync {
    fn resolve(&self, capability: &Capability) -> Result<Vec<Principal>>;
}

/// Looks capabilities up as groups through NSS, so groups served by sssd,
/// LDAP or systemd-userdb resolve the same as `/etc/group` entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemGroups;

impl PrincipalResolver for SystemGroups {
    fn resolve(&self, capability: &Capability) -> Result<Vec<Principal>> {
        let group = Group::from_name(capability.as_str())
            .with_context(|| format!("Failed to look up group {}", capability))?;

        let principals: Vec<Principal> = group
            .into_iter()
            .map(|group| Principal::Group {
                name: group.name,
                gid: group.gid.as_raw(),
            })
            .collect();
        debug!(
            "Capability {} resolved to {} principal(s)",
            capability,
            principals.len()
        );
        Ok(principals)
    }
}
