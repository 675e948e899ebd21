// DM Bridge - App Management Interface
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::{operation_failed, parse_params, unknown_method, CommandGroup, Interface};
use crate::error::BridgeResult;
use crate::validate;

/// How an application is launched at session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartupType {
    None,
    Foreground,
    Background,
}

impl fmt::Display for StartupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StartupType::None => "none",
            StartupType::Foreground => "foreground",
            StartupType::Background => "background",
        })
    }
}

/// Application auto-start registration.
pub trait AppStartup: Send + Sync {
    /// Register `pkg_id` for `startup`. `StartupType::None` removes any
    /// registration and succeeds when there is none.
    fn set_startup(&self, pkg_id: &str, startup: StartupType) -> Result<()>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetAppStartupParams {
    pkg_id: String,
    startup_type: StartupType,
}

pub struct AppMgmtInterface {
    startup: Arc<dyn AppStartup>,
}

impl AppMgmtInterface {
    pub fn new(startup: Arc<dyn AppStartup>) -> Self {
        Self { startup }
    }

    pub fn set_app_startup(&self, pkg_id: &str, startup: StartupType) -> BridgeResult<()> {
        validate::package_id(pkg_id)?;

        self.startup
            .set_startup(pkg_id, startup)
            .map_err(|e| operation_failed(&format!("set startup for {}", pkg_id), e))?;

        info!("Startup type of {} set to {}", pkg_id, startup);
        Ok(())
    }
}

impl Interface for AppMgmtInterface {
    fn group(&self) -> CommandGroup {
        CommandGroup::AppMgmt
    }

    fn dispatch(&self, method: &str, params: Value) -> BridgeResult<Value> {
        match method {
            "SetAppStartup" => {
                let params: SetAppStartupParams = parse_params(method, params)?;
                self.set_app_startup(&params.pkg_id, params.startup_type)?;
                Ok(Value::Null)
            }
            _ => Err(unknown_method(self.group(), method)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::FakeAppStartup;
    use crate::error::BridgeError;
    use serde_json::json;

    #[test]
    fn test_set_and_clear_startup() {
        let fake = Arc::new(FakeAppStartup::default());
        let apps = AppMgmtInterface::new(fake.clone());

        apps.set_app_startup("org.example.Kiosk", StartupType::Foreground).unwrap();
        assert_eq!(fake.entry("org.example.Kiosk"), Some(StartupType::Foreground));

        apps.set_app_startup("org.example.Kiosk", StartupType::None).unwrap();
        assert_eq!(fake.entry("org.example.Kiosk"), None);

        // Clearing an unregistered app is not an error.
        apps.set_app_startup("org.example.Other", StartupType::None).unwrap();
    }

    #[test]
    fn test_invalid_package_id() {
        let fake = Arc::new(FakeAppStartup::default());
        let apps = AppMgmtInterface::new(fake.clone());

        assert!(matches!(
            apps.set_app_startup("../../etc/passwd", StartupType::Background),
            Err(BridgeError::InvalidArgument(_))
        ));
        assert_eq!(fake.entry("../../etc/passwd"), None);
    }

    #[test]
    fn test_dispatch_parses_startup_type() {
        let fake = Arc::new(FakeAppStartup::default());
        let apps = AppMgmtInterface::new(fake.clone());

        apps.dispatch(
            "SetAppStartup",
            json!({"pkgId": "org.example.Agent", "startupType": "background"}),
        )
        .unwrap();
        assert_eq!(fake.entry("org.example.Agent"), Some(StartupType::Background));

        assert!(matches!(
            apps.dispatch(
                "SetAppStartup",
                json!({"pkgId": "org.example.Agent", "startupType": "sometimes"}),
            ),
            Err(BridgeError::InvalidArgument(_))
        ));
    }
}
