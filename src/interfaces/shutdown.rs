// DM Bridge - Shutdown Interface
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Power off or restart the device, optionally after a delay.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::{operation_failed, parse_params, unknown_method, CommandGroup, Interface};
use crate::error::{BridgeError, BridgeResult};
use crate::validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    PowerOff,
    Reboot,
}

impl PowerAction {
    /// Shutdown type understood by logind's `ScheduleShutdown`.
    pub fn as_str(self) -> &'static str {
        match self {
            PowerAction::PowerOff => "poweroff",
            PowerAction::Reboot => "reboot",
        }
    }
}

impl fmt::Display for PowerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Power management primitives of the host.
pub trait PowerControl: Send + Sync {
    /// Perform `action` now when `delay_secs` is 0, otherwise schedule it.
    fn schedule(&self, action: PowerAction, delay_secs: u32) -> Result<()>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShutdownParams {
    delay_seconds: i32,
    #[serde(default)]
    restart: bool,
}

pub struct ShutdownInterface {
    power: Arc<dyn PowerControl>,
}

impl ShutdownInterface {
    pub fn new(power: Arc<dyn PowerControl>) -> Self {
        Self { power }
    }

    pub fn shutdown(&self, delay_seconds: i32, restart: bool) -> BridgeResult<()> {
        validate::shutdown_delay(delay_seconds)?;
        let delay = u32::try_from(delay_seconds)
            .map_err(|e| BridgeError::InvalidArgument(format!("invalid delay: {}", e)))?;

        let action = if restart {
            PowerAction::Reboot
        } else {
            PowerAction::PowerOff
        };

        self.power
            .schedule(action, delay)
            .map_err(|e| operation_failed(&format!("schedule {}", action), e))?;

        info!("Scheduled {} in {} seconds", action, delay);
        Ok(())
    }
}

impl Interface for ShutdownInterface {
    fn group(&self) -> CommandGroup {
        CommandGroup::Shutdown
    }

    fn dispatch(&self, method: &str, params: Value) -> BridgeResult<Value> {
        match method {
            "Shutdown" => {
                let params: ShutdownParams = parse_params(method, params)?;
                self.shutdown(params.delay_seconds, params.restart)?;
                Ok(Value::Null)
            }
            _ => Err(unknown_method(self.group(), method)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::FakePower;
    use serde_json::json;

    #[test]
    fn test_shutdown_picks_action() {
        let power = Arc::new(FakePower::default());
        let shutdown = ShutdownInterface::new(power.clone());

        shutdown.shutdown(0, false).unwrap();
        shutdown.shutdown(60, true).unwrap();
        assert_eq!(
            power.calls(),
            vec![(PowerAction::PowerOff, 0), (PowerAction::Reboot, 60)]
        );
    }

    #[test]
    fn test_invalid_delay_never_reaches_system() {
        let power = Arc::new(FakePower::default());
        let shutdown = ShutdownInterface::new(power.clone());

        assert!(matches!(shutdown.shutdown(-1, false), Err(BridgeError::InvalidArgument(_))));
        assert!(matches!(
            shutdown.shutdown(validate::MAX_SHUTDOWN_DELAY_SECS + 1, true),
            Err(BridgeError::InvalidArgument(_))
        ));
        assert!(power.calls().is_empty());
    }

    #[test]
    fn test_dispatch_uses_camel_case_params() {
        let power = Arc::new(FakePower::default());
        let shutdown = ShutdownInterface::new(power.clone());

        shutdown
            .dispatch("Shutdown", json!({"delaySeconds": 30, "restart": true}))
            .unwrap();
        assert_eq!(power.calls(), vec![(PowerAction::Reboot, 30)]);

        assert!(matches!(
            shutdown.dispatch("Shutdown", json!({"delay_seconds": 30})),
            Err(BridgeError::InvalidArgument(_))
        ));
    }
}
