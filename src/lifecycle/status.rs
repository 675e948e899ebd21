// DM Bridge - Status Reporting
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Lifecycle status and its delivery to the process supervisor.

use std::env;
use std::ffi::OsString;
use std::fmt;
use std::io;
use std::os::unix::net::UnixDatagram;

use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    StartPending,
    Running,
    StopPending,
    Stopped,
}

impl LifecycleState {
    pub fn is_pending(self) -> bool {
        matches!(self, LifecycleState::StartPending | LifecycleState::StopPending)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LifecycleState::StartPending => "start pending",
            LifecycleState::Running => "running",
            LifecycleState::StopPending => "stop pending",
            LifecycleState::Stopped => "stopped",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceStatus {
    pub state: LifecycleState,
    /// Grows while pending, 0 in `Running` and `Stopped`.
    pub checkpoint: u32,
    pub exit_code: i32,
}

/// Receives every lifecycle transition.
pub trait StatusReporter: Send + Sync {
    fn report(&self, status: &ServiceStatus);
}

/// `sd_notify` payload for `status`.
pub fn notify_message(status: &ServiceStatus) -> String {
    let mut message = String::new();
    match status.state {
        LifecycleState::Running => message.push_str("READY=1\n"),
        LifecycleState::StopPending => message.push_str("STOPPING=1\n"),
        LifecycleState::StartPending | LifecycleState::Stopped => {}
    }
    if status.exit_code != 0 {
        message.push_str(&format!("ERRNO={}\n", status.exit_code));
    }
    message.push_str(&format!("STATUS={}", status.state));
    if status.checkpoint != 0 {
        message.push_str(&format!(" ({})", status.checkpoint));
    }
    message.push('\n');
    message
}

/// Reports to systemd through `$NOTIFY_SOCKET`. Without it, reports are only logged.
pub struct SystemdNotifier {
    socket: Option<OsString>,
}

impl SystemdNotifier {
    pub fn from_env() -> Self {
        Self::new(env::var_os("NOTIFY_SOCKET"))
    }

    pub fn new(socket: Option<OsString>) -> Self {
        Self {
            socket: socket.filter(|s| !s.is_empty()),
        }
    }

    fn send(socket: &OsString, message: &str) -> io::Result<()> {
        use std::os::unix::ffi::OsStrExt;

        let datagram = UnixDatagram::unbound()?;
        let bytes = socket.as_bytes();

        // A leading '@' names a socket in the abstract namespace.
        if let Some(name) = bytes.strip_prefix(b"@") {
            use std::os::linux::net::SocketAddrExt;
            let addr = std::os::unix::net::SocketAddr::from_abstract_name(name)?;
            datagram.send_to_addr(message.as_bytes(), &addr)?;
        } else {
            datagram.send_to(message.as_bytes(), socket)?;
        }
        Ok(())
    }
}

impl StatusReporter for SystemdNotifier {
    fn report(&self, status: &ServiceStatus) {
        debug!(
            "Service status: {} (checkpoint {}, exit code {})",
            status.state, status.checkpoint, status.exit_code
        );

        let Some(socket) = &self.socket else {
            return;
        };
        if let Err(e) = Self::send(socket, &notify_message(status)) {
            warn!(target: "eventlog", "Could not report service status: {}", e);
        }
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Keeps every reported status for inspection.
    #[derive(Default)]
    pub struct RecordingReporter {
        reports: Mutex<Vec<ServiceStatus>>,
    }

    impl RecordingReporter {
        pub fn reports(&self) -> Vec<ServiceStatus> {
            self.reports.lock().unwrap().clone()
        }

        pub fn states(&self) -> Vec<LifecycleState> {
            self.reports().iter().map(|status| status.state).collect()
        }
    }

    impl StatusReporter for RecordingReporter {
        fn report(&self, status: &ServiceStatus) {
            self.reports.lock().unwrap().push(*status);
        }
    }
}
