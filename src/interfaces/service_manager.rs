// DM Bridge - Service Manager Interface
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Start, stop and query whitelisted system services.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{operation_failed, parse_params, to_value, unknown_method, CommandGroup, Interface};
use crate::config::Whitelist;
use crate::error::{BridgeError, BridgeResult};
use crate::validate;

/// Poll interval used when waiting for a service to settle.
pub const STATE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Service status codes as reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Stopped = 1,
    StartPending = 2,
    StopPending = 3,
    Running = 4,
}

impl ServiceState {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map a systemd `ActiveState` value.
    pub fn from_active_state(state: &str) -> Self {
        match state {
            "active" | "reloading" | "refreshing" => ServiceState::Running,
            "activating" => ServiceState::StartPending,
            "deactivating" => ServiceState::StopPending,
            "inactive" | "failed" | "maintenance" => ServiceState::Stopped,
            other => {
                debug!("Treating unexpected ActiveState {:?} as stopped", other);
                ServiceState::Stopped
            }
        }
    }
}

/// Service control primitives of the host.
pub trait ServiceControl: Send + Sync {
    fn start(&self, name: &str) -> Result<()>;
    fn stop(&self, name: &str) -> Result<()>;
    fn query(&self, name: &str) -> Result<ServiceState>;
}

/// Poll `name` until it reaches `target` or `max_wait` runs out.
///
/// Returns the last observed state on timeout. Query failures propagate.
pub fn wait_for_state(
    control: &dyn ServiceControl,
    name: &str,
    target: ServiceState,
    max_wait: Duration,
    interval: Duration,
) -> Result<ServiceState> {
    let deadline = Instant::now() + max_wait;

    loop {
        let state = control.query(name)?;
        if state == target {
            return Ok(state);
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            warn!("Service {} did not reach {:?} in time, last state {:?}", name, target, state);
            return Ok(state);
        }

        debug!("Waiting for service: {}", name);
        thread::sleep(interval.min(remaining));
    }
}

#[derive(Debug, Deserialize)]
struct ServiceParams {
    name: String,
}

pub struct ServiceManagerInterface {
    control: Arc<dyn ServiceControl>,
    whitelist: Whitelist,
}

impl ServiceManagerInterface {
    pub fn new(control: Arc<dyn ServiceControl>, whitelist: Whitelist) -> Self {
        Self { control, whitelist }
    }

    /// The whitelisted spelling of `name`. systemd unit names are
    /// case-sensitive, so only that spelling is passed on.
    fn whitelisted<'a>(&'a self, name: &str) -> BridgeResult<&'a str> {
        self.whitelist.canonical(name).ok_or_else(|| {
            BridgeError::AccessDenied(format!("service {} is not on the whitelist", name))
        })
    }

    fn state(&self, name: &str) -> BridgeResult<ServiceState> {
        self.control
            .query(name)
            .map_err(|e| operation_failed(&format!("query service {}", name), e))
    }

    pub fn start(&self, name: &str) -> BridgeResult<()> {
        validate::service_name(name)?;
        let name = self.whitelisted(name)?;

        if self.state(name)? == ServiceState::Running {
            debug!("Service {} is already running", name);
            return Ok(());
        }

        self.control
            .start(name)
            .map_err(|e| operation_failed(&format!("start service {}", name), e))?;
        info!("Started service: {}", name);
        Ok(())
    }

    pub fn stop(&self, name: &str) -> BridgeResult<()> {
        validate::service_name(name)?;
        let name = self.whitelisted(name)?;

        if self.state(name)? == ServiceState::Stopped {
            debug!("Service {} is already stopped", name);
            return Ok(());
        }

        self.control
            .stop(name)
            .map_err(|e| operation_failed(&format!("stop service {}", name), e))?;
        info!("Stopped service: {}", name);
        Ok(())
    }

    /// Querying is not restricted by the whitelist.
    pub fn query(&self, name: &str) -> BridgeResult<ServiceState> {
        validate::service_name(name)?;
        self.state(name)
    }
}

impl Interface for ServiceManagerInterface {
    fn group(&self) -> CommandGroup {
        CommandGroup::ServiceManager
    }

    fn dispatch(&self, method: &str, params: Value) -> BridgeResult<Value> {
        match method {
            "Start" => {
                let params: ServiceParams = parse_params(method, params)?;
                self.start(&params.name)?;
                Ok(Value::Null)
            }
            "Stop" => {
                let params: ServiceParams = parse_params(method, params)?;
                self.stop(&params.name)?;
                Ok(Value::Null)
            }
            "Query" => {
                let params: ServiceParams = parse_params(method, params)?;
                to_value(self.query(&params.name)?.code())
            }
            _ => Err(unknown_method(self.group(), method)),
        }
    }
}
