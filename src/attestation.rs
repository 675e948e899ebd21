// DM Bridge - Attestation Helper
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! TPM identity through the `limpet` command-line helper.
//!
//! The helper prints enrollment information as JSON, the service URI inside a
//! `<ServiceURI>` element and SAS tokens as plain text. Output that does not
//! have the expected shape fails with `EPROTO`.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::error::{errno, OsError};
use crate::interfaces::AttestationHelper;

pub const DEFAULT_ATTESTATION_HELPER: &str = "/usr/bin/limpet";

static SERVICE_URI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<ServiceURI>\s*(\S+)\s*</ServiceURI>").expect("ServiceURI regex is valid")
});

static SAS_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(SharedAccessSignature sr.*)").expect("SharedAccessSignature regex is valid")
});

#[derive(Debug, Clone)]
pub struct ProcessAttestationHelper {
    program: PathBuf,
}

impl ProcessAttestationHelper {
    pub fn new(program: &Path) -> Self {
        Self {
            program: program.to_path_buf(),
        }
    }

    /// Run the helper and return its standard output.
    fn run(&self, args: &[&str]) -> Result<String> {
        debug!("Running {} {}", self.program.display(), args.join(" "));

        let output = Command::new(&self.program)
            .args(args)
            .output()
            .with_context(|| format!("Failed to execute {}", self.program.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OsError::new(
                output.status.code().unwrap_or(0),
                format!(
                    "{} {} failed: {}",
                    self.program.display(),
                    args.join(" "),
                    stderr.trim()
                ),
            )
            .into());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn enrollment_info(&self) -> Result<Value> {
        let output = self.run(&["-azuredps", "-enrollmentinfo", "-json"])?;
        serde_json::from_str(&output)
            .map_err(|e| protocol_error(format!("enrollment info is not JSON: {}", e)))
    }
}

fn protocol_error(message: String) -> anyhow::Error {
    OsError::new(errno::EPROTO, message).into()
}

fn enrollment_field<'a>(info: &'a Value, pointer: &str) -> Result<&'a str> {
    info.get(0)
        .and_then(|first| first.pointer(pointer))
        .and_then(Value::as_str)
        .ok_or_else(|| protocol_error(format!("enrollment info has no {}", pointer)))
}

/// Split `<ServiceURI>host/device</ServiceURI>` into host and device id.
fn parse_service_uri(output: &str) -> Result<(String, String)> {
    let uri = SERVICE_URI
        .captures(output)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| protocol_error("no ServiceURI in helper output".to_string()))?;

    let parts: Vec<&str> = uri.split('/').collect();
    match parts.as_slice() {
        [host, device] if !host.is_empty() && !device.is_empty() => {
            Ok((host.to_string(), device.to_string()))
        }
        _ => Err(protocol_error(format!("malformed ServiceURI {:?}", uri))),
    }
}

fn parse_sas_token(output: &str) -> Result<String> {
    SAS_TOKEN
        .captures(output)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().trim_end().to_string())
        .ok_or_else(|| protocol_error("no SharedAccessSignature in helper output".to_string()))
}

impl AttestationHelper for ProcessAttestationHelper {
    fn endorsement_key(&self) -> Result<String> {
        let info = self.enrollment_info()?;
        enrollment_field(&info, "/attestation/tpm/endorsementKey").map(str::to_string)
    }

    fn registration_id(&self) -> Result<String> {
        let info = self.enrollment_info()?;
        enrollment_field(&info, "/registrationId").map(str::to_string)
    }

    fn connection_string(&self, slot: i32, expiry_secs: i32) -> Result<String> {
        let slot = slot.to_string();
        let expiry = expiry_secs.to_string();

        let (host, device) = parse_service_uri(&self.run(&[&slot, "-rur"])?)?;
        let token = parse_sas_token(&self.run(&[&slot, "-ast", &expiry])?)?;

        Ok(format!(
            "HostName={};DeviceId={};SharedAccessSignature={}",
            host, device, token
        ))
    }
}
