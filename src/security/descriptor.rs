// DM Bridge - Security Descriptor
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Access-control structure attached to the endpoint and every interface.
//!
//! The descriptor always holds exactly two entries: generic access for
//! everyone, then generic access for the capability principal. A caller is
//! admitted only when it matches every entry, so in practice it must hold
//! the capability.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tracing::{debug, info};

use super::{CallerIdentity, Capability, Principal, PrincipalResolver};
use crate::error::{BridgeError, BridgeResult};

const GENERIC_ALL: u32 = 0x1000_0000;

/// Socket mode once the descriptor is applied: owner and capability group.
const ENDPOINT_SOCKET_MODE: u32 = 0o660;

#[derive(Debug, Clone, PartialEq, Eq)]
struct AccessEntry {
    principal: Principal,
    access_mask: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityDescriptor {
    capability: Capability,
    entries: [AccessEntry; 2],
}

impl SecurityDescriptor {
    /// Build the descriptor for `capability`.
    ///
    /// The capability must resolve to exactly one principal. Zero or several
    /// matches are a configuration error rather than something to guess at.
    pub fn build(capability: &Capability, resolver: &dyn PrincipalResolver) -> BridgeResult<Self> {
        info!("Requiring capability: {}", capability);

        let principals = resolver.resolve(capability).map_err(|e| {
            BridgeError::AuthSetup(format!(
                "failed to derive principals for capability {}: {:#}",
                capability, e
            ))
        })?;

        let principal = match principals.as_slice() {
            [Principal::Everyone] => {
                return Err(BridgeError::AuthSetup(format!(
                    "capability {} resolved to everyone",
                    capability
                )))
            }
            [principal] => principal.clone(),
            other => {
                return Err(BridgeError::AuthSetup(format!(
                    "capability {} resolved to {} principals, expected exactly one",
                    capability,
                    other.len()
                )))
            }
        };

        debug!("Capability {} maps to {}", capability, principal);

        Ok(Self {
            capability: capability.clone(),
            entries: [
                AccessEntry {
                    principal: Principal::Everyone,
                    access_mask: GENERIC_ALL,
                },
                AccessEntry {
                    principal,
                    access_mask: GENERIC_ALL,
                },
            ],
        })
    }

    #[cfg(test)]
    fn entries(&self) -> &[AccessEntry] {
        &self.entries
    }

    pub fn capability_principal(&self) -> &Principal {
        &self.entries[1].principal
    }

    /// Admit `caller` only if it matches every entry.
    pub fn authorize(&self, caller: &CallerIdentity) -> BridgeResult<()> {
        let denied = |entry: &&AccessEntry| {
            entry.access_mask & GENERIC_ALL == 0 || !caller.holds(&entry.principal)
        };
        match self.entries.iter().find(denied) {
            None => Ok(()),
            Some(entry) => Err(BridgeError::AccessDenied(format!(
                "caller uid {} does not hold capability {} ({})",
                caller.uid, self.capability, entry.principal
            ))),
        }
    }

    /// Restrict the socket file to its owner and the capability group.
    pub fn apply_to_socket(&self, path: &Path) -> BridgeResult<()> {
        if let Principal::Group { gid, .. } = self.capability_principal() {
            std::os::unix::fs::chown(path, None, Some(*gid)).map_err(|e| {
                BridgeError::AuthSetup(format!(
                    "failed to hand {} to group {}: {}",
                    path.display(),
                    gid,
                    e
                ))
            })?;
        }

        fs::set_permissions(path, fs::Permissions::from_mode(ENDPOINT_SOCKET_MODE)).map_err(|e| {
            BridgeError::AuthSetup(format!(
                "failed to set permissions on {}: {}",
                path.display(),
                e
            ))
        })
    }
}
