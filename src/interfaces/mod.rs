// DM Bridge - Interface Registry
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Command groups exposed over the endpoint and their dispatch tables.
//!
//! The catalog is closed. Configuration only chooses a subset of it.

mod app_mgmt;
mod computer_name;
mod identity;
mod service_manager;
mod shutdown;
mod telemetry;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{ApiSelection, BridgeConfig, Whitelist};
use crate::context::BridgeContext;
use crate::error::{BridgeError, BridgeResult};

pub use app_mgmt::{AppMgmtInterface, AppStartup, StartupType};
pub use computer_name::{ComputerNameInterface, ComputerNameOps};
pub use identity::{AttestationHelper, IdentityInterface};
pub use service_manager::{
    wait_for_state, ServiceControl, ServiceManagerInterface, ServiceState, STATE_POLL_INTERVAL,
};
pub use shutdown::{PowerAction, PowerControl, ShutdownInterface};
pub use telemetry::{TelemetryInterface, TelemetryStore};

/// A named group of related privileged commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CommandGroup {
    ComputerName,
    ServiceManager,
    Telemetry,
    Shutdown,
    AppMgmt,
    Identity,
}

impl CommandGroup {
    /// Every group the bridge knows how to serve.
    pub const ALL: [CommandGroup; 6] = [
        CommandGroup::ComputerName,
        CommandGroup::ServiceManager,
        CommandGroup::Telemetry,
        CommandGroup::Shutdown,
        CommandGroup::AppMgmt,
        CommandGroup::Identity,
    ];

    /// Wire and configuration name.
    pub fn name(self) -> &'static str {
        match self {
            CommandGroup::ComputerName => "computername",
            CommandGroup::ServiceManager => "servicemanager",
            CommandGroup::Telemetry => "telemetry",
            CommandGroup::Shutdown => "shutdown",
            CommandGroup::AppMgmt => "appmgmt",
            CommandGroup::Identity => "identity",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|group| group.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for CommandGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A dispatch table for one command group.
pub trait Interface: Send + Sync {
    fn group(&self) -> CommandGroup;

    /// Run `method` with its JSON parameters. Blocks on the OS primitive.
    fn dispatch(&self, method: &str, params: Value) -> BridgeResult<Value>;
}

/// Intersect the configured group names with the catalog.
pub fn resolve_enabled(config: &BridgeConfig) -> BTreeSet<CommandGroup> {
    match config.api() {
        ApiSelection::All => CommandGroup::ALL.into_iter().collect(),
        ApiSelection::Named(names) => names
            .iter()
            .filter_map(|name| {
                let group = CommandGroup::from_name(name);
                if group.is_none() {
                    warn!("Ignoring unknown interface in API list: {}", name);
                }
                group
            })
            .collect(),
    }
}

/// Build the dispatch table for `group` from the context's collaborators.
pub fn build_interface(group: CommandGroup, ctx: &BridgeContext) -> Arc<dyn Interface> {
    let platform = &ctx.platform;
    debug!("Building interface: {}", group);

    match group {
        CommandGroup::ComputerName => {
            Arc::new(ComputerNameInterface::new(platform.computer_name.clone()))
        }
        CommandGroup::ServiceManager => {
            // Without configuration nothing is whitelisted.
            let whitelist = ctx
                .config
                .as_ref()
                .map(|config| config.service_whitelist().clone())
                .unwrap_or_else(Whitelist::default);
            Arc::new(ServiceManagerInterface::new(platform.services.clone(), whitelist))
        }
        CommandGroup::Telemetry => Arc::new(TelemetryInterface::new(platform.telemetry.clone())),
        CommandGroup::Shutdown => Arc::new(ShutdownInterface::new(platform.power.clone())),
        CommandGroup::AppMgmt => Arc::new(AppMgmtInterface::new(platform.app_startup.clone())),
        CommandGroup::Identity => Arc::new(IdentityInterface::new(platform.attestation.clone())),
    }
}

/// Decode method parameters. A missing params object counts as empty.
pub(crate) fn parse_params<T: DeserializeOwned>(method: &str, params: Value) -> BridgeResult<T> {
    let params = if params.is_null() {
        Value::Object(Default::default())
    } else {
        params
    };

    serde_json::from_value(params).map_err(|e| {
        BridgeError::InvalidArgument(format!("invalid parameters for {}: {}", method, e))
    })
}

pub(crate) fn to_value<T: Serialize>(value: T) -> BridgeResult<Value> {
    serde_json::to_value(value)
        .map_err(|e| BridgeError::Unknown(format!("failed to encode result: {}", e)))
}

pub(crate) fn unknown_method(group: CommandGroup, method: &str) -> BridgeError {
    BridgeError::UnknownMethod {
        interface: group.name().to_string(),
        method: method.to_string(),
    }
}

/// Translate a collaborator failure and log it.
pub(crate) fn operation_failed(action: &str, err: anyhow::Error) -> BridgeError {
    warn!("Failed to {}: {:#}", action, err);
    BridgeError::from_operation(&err)
}

/// Per-resource locks guard no data, so a poisoned lock is still usable.
pub(crate) fn lock(mutex: &Mutex<()>) -> MutexGuard<'_, ()> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::FakePlatform;
    use crate::error::BridgeError;
    use serde_json::json;

    fn enabled(document: &str) -> BTreeSet<CommandGroup> {
        resolve_enabled(&BridgeConfig::from_document(Some(document)))
    }

    #[test]
    fn test_from_name_is_case_insensitive() {
        assert_eq!(CommandGroup::from_name("ServiceManager"), Some(CommandGroup::ServiceManager));
        assert_eq!(CommandGroup::from_name("TELEMETRY"), Some(CommandGroup::Telemetry));
        assert_eq!(CommandGroup::from_name("tpm"), None);
        for group in CommandGroup::ALL {
            assert_eq!(CommandGroup::from_name(group.name()), Some(group));
        }
    }

    #[test]
    fn test_resolve_enabled_defaults_to_catalog() {
        let all: BTreeSet<_> = CommandGroup::ALL.into_iter().collect();
        assert_eq!(resolve_enabled(&BridgeConfig::default()), all);
        assert_eq!(enabled("not json"), all);
        assert_eq!(enabled(r#"{"api": 7}"#), all);
    }

    #[test]
    fn test_resolve_enabled_drops_unknown_names() {
        let groups = enabled(r#"{"api": ["servicemanager", "Shutdown", "bogus"]}"#);
        assert_eq!(
            groups.into_iter().collect::<Vec<_>>(),
            vec![CommandGroup::ServiceManager, CommandGroup::Shutdown]
        );
    }

    #[test]
    fn test_resolve_enabled_empty_list() {
        assert!(enabled(r#"{"api": []}"#).is_empty());
        assert!(enabled(r#"{"api": ["unknown"]}"#).is_empty());
    }

    #[test]
    fn test_build_interface_matches_group() {
        let fakes = FakePlatform::default();
        let ctx = fakes.context(Some(BridgeConfig::default()));
        for group in CommandGroup::ALL {
            assert_eq!(build_interface(group, &ctx).group(), group);
        }
    }

    #[test]
    fn test_build_interface_without_config_whitelists_nothing() {
        let fakes = FakePlatform::default();
        let ctx = fakes.context(None);
        let services = build_interface(CommandGroup::ServiceManager, &ctx);
        let result = services.dispatch("Start", json!({"name": "w32time"}));
        assert!(matches!(result, Err(BridgeError::AccessDenied(_))));
    }

    #[test]
    fn test_parse_params() {
        #[derive(serde::Deserialize)]
        struct Params {
            name: String,
        }

        let params: Params = parse_params("SetName", json!({"name": "kiosk"})).unwrap();
        assert_eq!(params.name, "kiosk");

        assert!(matches!(
            parse_params::<Params>("SetName", Value::Null),
            Err(BridgeError::InvalidArgument(_))
        ));
        assert!(matches!(
            parse_params::<Params>("SetName", json!({"name": 5})),
            Err(BridgeError::InvalidArgument(_))
        ));
    }
}
