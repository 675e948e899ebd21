// DM Bridge - Error Taxonomy
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Unified error taxonomy for the dispatch boundary.
//!
//! Collaborators report failures as `anyhow::Error`, optionally carrying an
//! [`OsError`]. Handlers translate those into [`BridgeError`], which is the
//! only error shape that ever crosses the endpoint.

use thiserror::Error;

/// Errno values used when mapping D-Bus and helper failures.
pub mod errno {
    pub const EPERM: i32 = 1;
    pub const ENOENT: i32 = 2;
    pub const EIO: i32 = 5;
    pub const EACCES: i32 = 13;
    pub const EBUSY: i32 = 16;
    pub const EINVAL: i32 = 22;
    pub const EPROTO: i32 = 71;
    pub const ETIMEDOUT: i32 = 110;
}

/// A failure reported by an OS primitive, with its numeric code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (os error {code})")]
pub struct OsError {
    pub code: i32,
    pub message: String,
}

impl OsError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Map a D-Bus failure onto an errno-style code.
    ///
    /// Errors that are not method replies (broken connection, marshalling)
    /// carry no code and end up as `Unknown` at the boundary.
    pub fn from_dbus(err: &zbus::Error) -> Self {
        match err {
            zbus::Error::MethodError(name, description, _) => {
                let message = description.clone().unwrap_or_else(|| name.to_string());
                Self::new(errno_for_dbus_error(name.as_str()), message)
            }
            zbus::Error::InputOutput(io) => Self::new(io.raw_os_error().unwrap_or(0), io.to_string()),
            other => Self::new(0, other.to_string()),
        }
    }
}

fn errno_for_dbus_error(name: &str) -> i32 {
    match name {
        "org.freedesktop.DBus.Error.AccessDenied"
        | "org.freedesktop.DBus.Error.InteractiveAuthorizationRequired" => errno::EACCES,
        "org.freedesktop.systemd1.NoSuchUnit"
        | "org.freedesktop.DBus.Error.UnknownObject"
        | "org.freedesktop.DBus.Error.ServiceUnknown"
        | "org.freedesktop.DBus.Error.FileNotFound" => errno::ENOENT,
        "org.freedesktop.DBus.Error.InvalidArgs" => errno::EINVAL,
        "org.freedesktop.systemd1.UnitMasked" => errno::EPERM,
        "org.freedesktop.DBus.Error.NoReply" | "org.freedesktop.DBus.Error.Timeout" => errno::ETIMEDOUT,
        "org.freedesktop.systemd1.TransactionIsDestructive"
        | "org.freedesktop.systemd1.JobTypeNotApplicable"
        | "org.freedesktop.login1.ShutdownAlreadyInProgress" => errno::EBUSY,
        _ => errno::EIO,
    }
}

/// Every failure a client can observe, with a stable wire status code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("bridge is not configured")]
    NotConfigured,

    #[error("failed to set up endpoint security: {0}")]
    AuthSetup(String),

    #[error("endpoint error: {0}")]
    Listen(String),

    #[error("operation failed: {message} (os error {code})")]
    OperationFailed { code: i32, message: String },

    #[error("unknown failure: {0}")]
    Unknown(String),

    #[error("interface not registered: {0}")]
    InterfaceNotRegistered(String),

    #[error("unknown method {method} on interface {interface}")]
    UnknownMethod { interface: String, method: String },
}

pub type BridgeResult<T> = Result<T, BridgeError>;

impl BridgeError {
    /// Numeric status reported on the wire. Zero is reserved for success.
    pub fn status(&self) -> i32 {
        match self {
            Self::InvalidArgument(_) => 1,
            Self::AccessDenied(_) => 2,
            Self::NotConfigured => 3,
            Self::AuthSetup(_) => 4,
            Self::Listen(_) => 5,
            Self::OperationFailed { .. } => 6,
            Self::Unknown(_) => 7,
            Self::InterfaceNotRegistered(_) => 8,
            Self::UnknownMethod { .. } => 9,
        }
    }

    /// Symbolic name reported on the wire next to the status.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::AccessDenied(_) => "AccessDenied",
            Self::NotConfigured => "NotConfigured",
            Self::AuthSetup(_) => "AuthSetupError",
            Self::Listen(_) => "ListenError",
            Self::OperationFailed { .. } => "OperationFailed",
            Self::Unknown(_) => "Unknown",
            Self::InterfaceNotRegistered(_) => "InterfaceNotRegistered",
            Self::UnknownMethod { .. } => "UnknownMethod",
        }
    }

    /// Translate an OS code. A zero code is never allowed to look like success.
    pub fn from_os_code(code: i32, message: impl Into<String>) -> Self {
        if code == 0 {
            Self::Unknown(message.into())
        } else {
            Self::OperationFailed {
                code,
                message: message.into(),
            }
        }
    }

    /// Translate a collaborator failure by looking for an OS code in its chain.
    pub fn from_operation(err: &anyhow::Error) -> Self {
        let code = err.chain().find_map(|cause| {
            if let Some(os) = cause.downcast_ref::<OsError>() {
                return Some(os.code);
            }
            if let Some(io) = cause.downcast_ref::<std::io::Error>() {
                return io.raw_os_error();
            }
            cause
                .downcast_ref::<zbus::Error>()
                .map(|dbus| OsError::from_dbus(dbus).code)
        });

        Self::from_os_code(code.unwrap_or(0), format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_zero_code_is_never_success() {
        assert_eq!(
            BridgeError::from_os_code(0, "nothing"),
            BridgeError::Unknown("nothing".to_string())
        );
        assert_eq!(BridgeError::from_os_code(5, "io").status(), 6);
    }

    #[test]
    fn test_from_operation_finds_os_error_in_chain() {
        let err = Err::<(), _>(OsError::new(errno::EACCES, "denied"))
            .context("Failed to start unit")
            .unwrap_err();
        match BridgeError::from_operation(&err) {
            BridgeError::OperationFailed { code, message } => {
                assert_eq!(code, errno::EACCES);
                assert!(message.contains("Failed to start unit"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_from_operation_uses_io_raw_code() {
        let err = anyhow::Error::new(std::io::Error::from_raw_os_error(errno::ENOENT));
        assert!(matches!(
            BridgeError::from_operation(&err),
            BridgeError::OperationFailed { code: errno::ENOENT, .. }
        ));
    }

    #[test]
    fn test_from_operation_without_code_is_unknown() {
        let err = anyhow::anyhow!("helper produced garbage");
        assert!(matches!(BridgeError::from_operation(&err), BridgeError::Unknown(_)));

        let zero = anyhow::Error::new(OsError::new(0, "uninitialised"));
        assert!(matches!(BridgeError::from_operation(&zero), BridgeError::Unknown(_)));
    }

    #[test]
    fn test_status_codes_are_distinct_and_nonzero() {
        let errors = [
            BridgeError::InvalidArgument(String::new()),
            BridgeError::AccessDenied(String::new()),
            BridgeError::NotConfigured,
            BridgeError::AuthSetup(String::new()),
            BridgeError::Listen(String::new()),
            BridgeError::OperationFailed { code: 1, message: String::new() },
            BridgeError::Unknown(String::new()),
            BridgeError::InterfaceNotRegistered(String::new()),
            BridgeError::UnknownMethod { interface: String::new(), method: String::new() },
        ];
        let mut codes: Vec<i32> = errors.iter().map(BridgeError::status).collect();
        assert!(codes.iter().all(|c| *c != 0));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_dbus_error_names() {
        assert_eq!(errno_for_dbus_error("org.freedesktop.systemd1.NoSuchUnit"), errno::ENOENT);
        assert_eq!(errno_for_dbus_error("org.freedesktop.DBus.Error.AccessDenied"), errno::EACCES);
        assert_eq!(errno_for_dbus_error("com.example.Whatever"), errno::EIO);
    }
}
