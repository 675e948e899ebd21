// DM Bridge - Login Manager Client
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! `systemd-logind` client for power-off and reboot.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::info;

use super::SystemBus;
use crate::interfaces::{PowerAction, PowerControl};

const LOGIN_BUS: &str = "org.freedesktop.login1";
const LOGIN_PATH: &str = "/org/freedesktop/login1";
const MANAGER_INTERFACE: &str = "org.freedesktop.login1.Manager";

const MICROS_PER_SECOND: u64 = 1_000_000;

pub struct LoginClient {
    bus: Arc<SystemBus>,
}

impl LoginClient {
    pub fn new(bus: Arc<SystemBus>) -> Self {
        Self { bus }
    }
}

/// Wall-clock deadline in microseconds, as `ScheduleShutdown` expects.
fn shutdown_deadline(now_micros: i64, delay_secs: u32) -> Result<u64> {
    let now = u64::try_from(now_micros).map_err(|_| anyhow!("System clock is before the epoch"))?;
    Ok(now + u64::from(delay_secs) * MICROS_PER_SECOND)
}

impl PowerControl for LoginClient {
    fn schedule(&self, action: PowerAction, delay_secs: u32) -> Result<()> {
        let conn = self.bus.connection()?;

        if delay_secs == 0 {
            let method = match action {
                PowerAction::PowerOff => "PowerOff",
                PowerAction::Reboot => "Reboot",
            };
            // interactive = false
            conn.call_method(Some(LOGIN_BUS), LOGIN_PATH, Some(MANAGER_INTERFACE), method, &(false,))
                .with_context(|| format!("logind {} failed", method))?;
            info!("Requested immediate {}", action);
            return Ok(());
        }

        let deadline = shutdown_deadline(chrono::Utc::now().timestamp_micros(), delay_secs)?;
        conn.call_method(
            Some(LOGIN_BUS),
            LOGIN_PATH,
            Some(MANAGER_INTERFACE),
            "ScheduleShutdown",
            &(action.as_str(), deadline),
        )
        .with_context(|| format!("Failed to schedule {}", action))?;

        info!("Scheduled {} at {} us", action, deadline);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_deadline() {
        assert_eq!(shutdown_deadline(1_000, 0).unwrap(), 1_000);
        assert_eq!(shutdown_deadline(1_000, 2).unwrap(), 2_001_000);
        assert!(shutdown_deadline(-1, 5).is_err());
    }
}
