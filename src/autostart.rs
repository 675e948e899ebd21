// DM Bridge - Autostart Management
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Manages autostart .desktop files that launch applications at session start.

use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::error::errno;
use crate::interfaces::{AppStartup, StartupType};

/// System-wide autostart directory.
pub const DEFAULT_AUTOSTART_DIR: &str = "/etc/xdg/autostart";

/// Key that marks an entry as written by the bridge.
const OWNER_KEY: &str = "X-DM-Bridge-Startup=";

/// Desktop entries in one autostart directory.
#[derive(Debug, Clone)]
pub struct AutostartEntries {
    dir: PathBuf,
}

impl AutostartEntries {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    /// Get the path to the autostart .desktop file of `pkg_id`.
    pub fn entry_path(&self, pkg_id: &str) -> PathBuf {
        self.dir.join(format!("{}.desktop", pkg_id))
    }

    /// `None` when there is no entry, else whether the bridge wrote it.
    fn owned_entry(&self, path: &Path) -> Result<Option<bool>> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Some(content.lines().any(|line| line.starts_with(OWNER_KEY)))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read autostart file {}", path.display())),
        }
    }

    fn refuse_foreign(path: &Path) -> anyhow::Error {
        warn!("Autostart file {} was not written by the bridge, leaving it alone", path.display());
        anyhow::Error::new(io::Error::from_raw_os_error(errno::EPERM))
            .context(format!("{} is owned by another package", path.display()))
    }

    fn write_entry(&self, pkg_id: &str, startup: StartupType) -> Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir).with_context(|| {
                format!("Failed to create autostart directory {}", self.dir.display())
            })?;
        }

        let path = self.entry_path(pkg_id);
        if self.owned_entry(&path)? == Some(false) {
            return Err(Self::refuse_foreign(&path));
        }

        let mut file = fs::File::create(&path)
            .with_context(|| format!("Failed to create autostart file {}", path.display()))?;
        file.write_all(desktop_entry(pkg_id, startup).as_bytes())
            .with_context(|| format!("Failed to write autostart file {}", path.display()))?;

        info!("Autostart enabled: {}", path.display());
        Ok(())
    }

    fn remove_entry(&self, pkg_id: &str) -> Result<()> {
        let path = self.entry_path(pkg_id);
        match self.owned_entry(&path)? {
            // Nothing registered is the state we wanted.
            None => return Ok(()),
            Some(false) => return Err(Self::refuse_foreign(&path)),
            Some(true) => {}
        }

        match fs::remove_file(&path) {
            Ok(()) => {
                info!("Autostart disabled: {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to remove autostart file {}", path.display())),
        }
    }
}

fn desktop_entry(pkg_id: &str, startup: StartupType) -> String {
    let no_display = startup == StartupType::Background;
    format!(
        r#"[Desktop Entry]
Name={pkg_id}
Exec=gtk-launch {pkg_id}
Terminal=false
Type=Application
X-GNOME-Autostart-enabled=true
{OWNER_KEY}{startup}
NoDisplay={no_display}
"#
    )
}

impl AppStartup for AutostartEntries {
    fn set_startup(&self, pkg_id: &str, startup: StartupType) -> Result<()> {
        match startup {
            StartupType::None => self.remove_entry(pkg_id),
            StartupType::Foreground | StartupType::Background => self.write_entry(pkg_id, startup),
        }
    }
}
