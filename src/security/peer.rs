// DM Bridge - Peer Identity
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Identity of the process on the other end of a connection.

use std::ffi::CString;
use std::io;

use nix::unistd::{getgrouplist, Gid, Uid, User};
use tokio::net::UnixStream;
use tracing::debug;

use super::Principal;

/// Credentials of a connected client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub uid: u32,
    pub gid: u32,
    pub pid: Option<i32>,
    /// Group memberships of the caller's account, from NSS.
    pub groups: Vec<u32>,
}

impl CallerIdentity {
    /// Read the peer's credentials (`SO_PEERCRED`) from a connected stream.
    pub async fn from_stream(stream: &UnixStream) -> io::Result<Self> {
        let cred = stream.peer_cred()?;
        let (uid, gid) = (cred.uid(), cred.gid());

        // NSS may go to the network.
        let groups = tokio::task::spawn_blocking(move || account_groups(uid, gid))
            .await
            .unwrap_or_default();

        Ok(Self {
            uid,
            gid,
            pid: cred.pid(),
            groups,
        })
    }

    /// Whether the caller matches `principal`.
    pub fn holds(&self, principal: &Principal) -> bool {
        match principal {
            Principal::Everyone => true,
            Principal::Group { gid, .. } => self.gid == *gid || self.groups.contains(gid),
        }
    }
}

// Looked up per connection and never cached.
fn account_groups(uid: u32, gid: u32) -> Vec<u32> {
    let user = match User::from_uid(Uid::from_raw(uid)) {
        Ok(Some(user)) => user,
        Ok(None) => {
            debug!("uid {} has no account entry", uid);
            return Vec::new();
        }
        Err(e) => {
            debug!("Account lookup for uid {} failed: {}", uid, e);
            return Vec::new();
        }
    };

    let Ok(name) = CString::new(user.name) else {
        return Vec::new();
    };
    match getgrouplist(&name, Gid::from_raw(gid)) {
        Ok(groups) => groups.into_iter().map(Gid::as_raw).collect(),
        Err(e) => {
            debug!("Group list for uid {} failed: {}", uid, e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller(gid: u32, groups: Vec<u32>) -> CallerIdentity {
        CallerIdentity {
            uid: 1000,
            gid,
            pid: None,
            groups,
        }
    }

    fn group(gid: u32) -> Principal {
        Principal::Group {
            name: "systemManagement".to_string(),
            gid,
        }
    }

    #[test]
    fn test_account_groups_include_primary_group() {
        let uid = nix::unistd::geteuid();
        let gid = nix::unistd::getegid();
        if User::from_uid(uid).unwrap().is_none() {
            return;
        }
        assert!(account_groups(uid.as_raw(), gid.as_raw()).contains(&gid.as_raw()));
    }

    #[test]
    fn test_unknown_uid_has_no_groups() {
        assert!(account_groups(u32::MAX - 7, 0).is_empty());
    }

    #[test]
    fn test_holds() {
        assert!(caller(100, vec![]).holds(&Principal::Everyone));
        assert!(caller(975, vec![]).holds(&group(975)));
        assert!(caller(100, vec![4, 975]).holds(&group(975)));
        assert!(!caller(100, vec![4]).holds(&group(975)));
    }

    #[tokio::test]
    async fn test_from_stream_reads_own_credentials() {
        let (a, _b) = UnixStream::pair().unwrap();
        let identity = CallerIdentity::from_stream(&a).await.unwrap();
        assert_eq!(identity.pid, Some(std::process::id() as i32));
        assert_eq!(identity.uid, nix::unistd::geteuid().as_raw());
        assert_eq!(identity.gid, nix::unistd::getegid().as_raw());
    }
}
