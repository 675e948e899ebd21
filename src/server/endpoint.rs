// DM Bridge - Endpoint Socket
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Unix socket file handling for the endpoint.

use std::fs;
use std::io;
use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{BridgeError, BridgeResult};

/// Name of the socket directory under the runtime directory.
pub const RUNTIME_DIRECTORY: &str = "dm-bridge";

/// Mode of a socket directory we create. Others may traverse it to reach the
/// socket, which carries its own group check, but may not list it. Existing
/// directories are left alone.
pub const RUNTIME_DIRECTORY_MODE: u32 = 0o711;

/// Default socket location: the runtime directory when there is one, else `/run`.
pub fn default_socket_path() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(|| PathBuf::from("/run"))
        .join(RUNTIME_DIRECTORY)
        .join("bridge.sock")
}

/// Create the socket directory if needed and bind a listener on `path`.
pub fn bind(path: &Path) -> BridgeResult<UnixListener> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }
    remove_stale_socket(path)?;

    let listener = UnixListener::bind(path)
        .map_err(|e| BridgeError::Listen(format!("failed to bind {}: {}", path.display(), e)))?;
    debug!("Bound endpoint socket: {}", path.display());
    Ok(listener)
}

/// Remove the socket file, logging rather than failing.
pub fn remove_socket(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed socket file: {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove socket file {}: {}", path.display(), e),
    }
}

fn ensure_directory(path: &Path) -> BridgeResult<()> {
    match fs::symlink_metadata(path) {
        Ok(metadata) => {
            if metadata.file_type().is_symlink() {
                return Err(BridgeError::Listen(format!(
                    "{} is a symlink, refusing to use it as socket directory",
                    path.display()
                )));
            }
            if !metadata.is_dir() {
                return Err(BridgeError::Listen(format!(
                    "{} exists but is not a directory",
                    path.display()
                )));
            }
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(path).map_err(|e| {
                BridgeError::Listen(format!("failed to create directory {}: {}", path.display(), e))
            })?;
            fs::set_permissions(path, fs::Permissions::from_mode(RUNTIME_DIRECTORY_MODE)).map_err(|e| {
                BridgeError::Listen(format!(
                    "failed to set permissions on {}: {}",
                    path.display(),
                    e
                ))
            })
        }
        Err(e) => Err(BridgeError::Listen(format!(
            "failed to stat {}: {}",
            path.display(),
            e
        ))),
    }
}

fn remove_stale_socket(path: &Path) -> BridgeResult<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(BridgeError::Listen(format!(
                "failed to stat {}: {}",
                path.display(),
                e
            )))
        }
    };

    if !metadata.file_type().is_socket() {
        return Err(BridgeError::Listen(format!(
            "{} exists but is not a socket",
            path.display()
        )));
    }

    fs::remove_file(path).map_err(|e| {
        BridgeError::Listen(format!(
            "failed to remove stale socket {}: {}",
            path.display(),
            e
        ))
    })?;
    debug!("Removed stale socket file: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn socket_path(dir: &TempDir) -> PathBuf {
        dir.path().join("run").join("bridge.sock")
    }

    #[test]
    fn test_bind_creates_traversable_directory() {
        let dir = TempDir::new().unwrap();
        let path = socket_path(&dir);
        let _listener = bind(&path).unwrap();

        let mode = fs::metadata(path.parent().unwrap()).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o711);
        assert!(fs::symlink_metadata(&path).unwrap().file_type().is_socket());

        remove_socket(&path);
        assert!(!path.exists());
    }

    #[test]
    fn test_bind_keeps_existing_directory_mode() {
        let dir = TempDir::new().unwrap();
        let path = socket_path(&dir);
        fs::create_dir(path.parent().unwrap()).unwrap();
        fs::set_permissions(path.parent().unwrap(), fs::Permissions::from_mode(0o755)).unwrap();

        let _listener = bind(&path).unwrap();
        let mode = fs::metadata(path.parent().unwrap()).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);
    }

    #[test]
    fn test_bind_replaces_stale_socket() {
        let dir = TempDir::new().unwrap();
        let path = socket_path(&dir);
        drop(bind(&path).unwrap());
        assert!(path.exists());

        let _listener = bind(&path).unwrap();
        remove_socket(&path);
    }

    #[test]
    fn test_bind_refuses_regular_file() {
        let dir = TempDir::new().unwrap();
        let path = socket_path(&dir);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "not a socket").unwrap();

        assert!(matches!(bind(&path), Err(BridgeError::Listen(_))));
        assert!(path.exists());
    }

    #[test]
    fn test_bind_refuses_symlinked_directory() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("elsewhere");
        fs::create_dir(&target).unwrap();
        std::os::unix::fs::symlink(&target, dir.path().join("run")).unwrap();

        assert!(matches!(bind(&socket_path(&dir)), Err(BridgeError::Listen(_))));
    }

    #[test]
    fn test_remove_missing_socket_is_quiet() {
        let dir = TempDir::new().unwrap();
        remove_socket(&socket_path(&dir));
    }
}
