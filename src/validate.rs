// DM Bridge - Argument Validation
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Syntactic checks applied before any command reaches the system.

use crate::error::{BridgeError, BridgeResult};

/// NetBIOS-style limit kept for compatibility with existing clients.
pub const MAX_COMPUTER_NAME_LENGTH: usize = 15;
pub const MAX_SERVICE_NAME_LENGTH: usize = 256;
pub const MAX_PACKAGE_ID_LENGTH: usize = 255;

pub const MIN_TELEMETRY_LEVEL: i32 = 0;
pub const MAX_TELEMETRY_LEVEL: i32 = 3;

/// Ten years, the longest delay a shutdown can be scheduled for.
pub const MAX_SHUTDOWN_DELAY_SECS: i32 = 315_360_000;

pub const MAX_ATTESTATION_SLOT: i32 = 9;

/// Computer names: 1..=15 characters of `[A-Za-z0-9-.]`, not all digits.
pub fn computer_name(name: &str) -> BridgeResult<()> {
    let length = name.chars().count();
    if length == 0 || length > MAX_COMPUTER_NAME_LENGTH {
        return Err(BridgeError::InvalidArgument(format!(
            "computer name must be 1 to {} characters, got {}",
            MAX_COMPUTER_NAME_LENGTH, length
        )));
    }

    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.') {
        return Err(BridgeError::InvalidArgument(format!(
            "computer name {:?} contains characters outside [A-Za-z0-9-.]",
            name
        )));
    }

    if name.chars().all(|c| c.is_ascii_digit()) {
        return Err(BridgeError::InvalidArgument(format!(
            "computer name {:?} cannot be only digits",
            name
        )));
    }

    Ok(())
}

/// Service names: 1..=256 characters, no control characters, no slashes.
pub fn service_name(name: &str) -> BridgeResult<()> {
    let length = name.chars().count();
    if length == 0 || length > MAX_SERVICE_NAME_LENGTH {
        return Err(BridgeError::InvalidArgument(format!(
            "service name must be 1 to {} characters, got {}",
            MAX_SERVICE_NAME_LENGTH, length
        )));
    }

    // NUL never reaches the bus either, so it is rejected with the other controls.
    if name
        .chars()
        .any(|c| c <= '\u{1f}' || c == '/' || c == '\\')
    {
        return Err(BridgeError::InvalidArgument(format!(
            "service name {:?} contains a control character or slash",
            name
        )));
    }

    Ok(())
}

pub fn telemetry_level(level: i32) -> BridgeResult<()> {
    if !(MIN_TELEMETRY_LEVEL..=MAX_TELEMETRY_LEVEL).contains(&level) {
        return Err(BridgeError::InvalidArgument(format!(
            "telemetry level must be between {} and {}, got {}",
            MIN_TELEMETRY_LEVEL, MAX_TELEMETRY_LEVEL, level
        )));
    }
    Ok(())
}

pub fn shutdown_delay(seconds: i32) -> BridgeResult<()> {
    if !(0..=MAX_SHUTDOWN_DELAY_SECS).contains(&seconds) {
        return Err(BridgeError::InvalidArgument(format!(
            "shutdown delay must be between 0 and {} seconds, got {}",
            MAX_SHUTDOWN_DELAY_SECS, seconds
        )));
    }
    Ok(())
}

/// Package ids become desktop-entry file names: `[A-Za-z0-9._-]`, no leading dot.
pub fn package_id(id: &str) -> BridgeResult<()> {
    let length = id.chars().count();
    if length == 0 || length > MAX_PACKAGE_ID_LENGTH {
        return Err(BridgeError::InvalidArgument(format!(
            "package id must be 1 to {} characters, got {}",
            MAX_PACKAGE_ID_LENGTH, length
        )));
    }

    if id.starts_with('.')
        || !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(BridgeError::InvalidArgument(format!(
            "package id {:?} is not a valid application id",
            id
        )));
    }

    Ok(())
}

pub fn attestation_slot(slot: i32) -> BridgeResult<()> {
    if !(0..=MAX_ATTESTATION_SLOT).contains(&slot) {
        return Err(BridgeError::InvalidArgument(format!(
            "attestation slot must be between 0 and {}, got {}",
            MAX_ATTESTATION_SLOT, slot
        )));
    }
    Ok(())
}

pub fn token_expiry(seconds: i32) -> BridgeResult<()> {
    if seconds <= 0 {
        return Err(BridgeError::InvalidArgument(format!(
            "token expiry must be positive, got {}",
            seconds
        )));
    }
    Ok(())
}
