// DM Bridge - Storage
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Persistent storage for the telemetry level.

use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::interfaces::TelemetryStore;

/// Default directory for state owned by the bridge.
pub const DEFAULT_STATE_DIR: &str = "/var/lib/dm-bridge";

const TELEMETRY_FILE: &str = "telemetry.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TelemetryRecord {
    level: i32,
    #[serde(default)]
    updated_at: Option<String>,
}

/// Telemetry level stored as `<state_dir>/telemetry.json`.
#[derive(Debug)]
pub struct FileTelemetryStore {
    path: PathBuf,
}

impl FileTelemetryStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(TELEMETRY_FILE),
        }
    }
}

impl TelemetryStore for FileTelemetryStore {
    fn level(&self) -> Result<i32> {
        if !self.path.exists() {
            debug!("No telemetry file at {}, level is 0", self.path.display());
            return Ok(0);
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let record: TelemetryRecord = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;
        Ok(record.level)
    }

    fn set_level(&self, level: i32) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let record = TelemetryRecord {
            level,
            updated_at: Some(chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()),
        };
        let content = serde_json::to_string_pretty(&record)?;

        // Write beside the target and rename so readers never see a partial file.
        let tmp = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp)
            .with_context(|| format!("Failed to create {}", tmp.display()))?;
        file.set_permissions(fs::Permissions::from_mode(0o644))?;
        file.write_all(content.as_bytes())
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        file.sync_all()?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        debug!("Stored telemetry level {} in {}", level, self.path.display());
        Ok(())
    }
}
