// DM Bridge - Configuration
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Bridge configuration loaded once from a local JSON file.
//!
//! The document looks like:
//!
//! ```json
//! { "api": ["servicemanager", "telemetry"],
//!   "servicemanager": { "whitelist": ["systemd-timesyncd"] } }
//! ```
//!
//! Loading never fails. A missing or broken document, or a missing section,
//! falls back to the defaults for that section and logs a warning.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, warn};

/// Default location of the configuration document.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/dm-bridge/config.json";

const API_KEY: &str = "api";
const SERVICE_MANAGER_SECTION: &str = "servicemanager";
const WHITELIST_KEY: &str = "whitelist";

/// Services that may be started and stopped when no whitelist is configured.
const DEFAULT_SERVICE_WHITELIST: &[&str] = &["w32time"];

/// Which command groups the configuration asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiSelection {
    /// No usable `api` array: every known group is exposed.
    All,
    /// The names listed in the `api` array, not yet checked against the catalog.
    Named(BTreeSet<String>),
}

/// Case-insensitive allow-list that remembers the configured spelling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Whitelist {
    /// Lowercased key to the spelling found in the configuration.
    entries: BTreeMap<String, String>,
}

impl Whitelist {
    /// Entries differing only in case collapse onto the first spelling seen.
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut map = BTreeMap::new();
        for entry in entries {
            let entry = entry.as_ref();
            map.entry(entry.to_lowercase())
                .or_insert_with(|| entry.to_string());
        }
        Self { entries: map }
    }

    pub fn default_services() -> Self {
        Self::new(DEFAULT_SERVICE_WHITELIST)
    }

    /// The configured spelling of `value`, if it is listed in any case.
    pub fn canonical(&self, value: &str) -> Option<&str> {
        self.entries.get(&value.to_lowercase()).map(String::as_str)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parsed bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    api: ApiSelection,
    service_whitelist: Whitelist,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            api: ApiSelection::All,
            service_whitelist: Whitelist::default_services(),
        }
    }
}

impl BridgeConfig {
    /// Load the configuration from disk, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        debug!("Loading config file: {}", path.display());

        if !path.exists() {
            warn!("Config file {} not found, applying defaults", path.display());
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => Self::from_document(Some(&content)),
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Parse a configuration document. `None` stands for an absent document.
    pub fn from_document(document: Option<&str>) -> Self {
        let Some(content) = document else {
            warn!("Configuration is absent, applying defaults");
            return Self::default();
        };

        match serde_json::from_str::<Value>(content) {
            Ok(root) => Self::from_value(&root),
            Err(e) => {
                warn!("Failed to parse config: {}", e);
                Self::default()
            }
        }
    }

    pub fn from_value(root: &Value) -> Self {
        if !root.is_object() {
            warn!("Configuration is empty or not an object, applying defaults");
            return Self::default();
        }

        Self {
            api: parse_api(root),
            service_whitelist: parse_service_whitelist(root),
        }
    }

    pub fn api(&self) -> &ApiSelection {
        &self.api
    }

    pub fn service_whitelist(&self) -> &Whitelist {
        &self.service_whitelist
    }
}

fn parse_api(root: &Value) -> ApiSelection {
    match root.get(API_KEY).and_then(Value::as_array) {
        Some(entries) => ApiSelection::Named(string_entries(entries, "API list").collect()),
        None => {
            warn!("API list not defined, enabling every interface");
            ApiSelection::All
        }
    }
}

fn parse_service_whitelist(root: &Value) -> Whitelist {
    let section = match root.get(SERVICE_MANAGER_SECTION) {
        Some(section) if section.is_object() => section,
        _ => {
            warn!("Service manager section not defined, using default whitelist");
            return Whitelist::default_services();
        }
    };

    match section.get(WHITELIST_KEY).and_then(Value::as_array) {
        Some(entries) => Whitelist::new(string_entries(entries, "whitelist")),
        None => {
            warn!("Whitelist not defined, using default whitelist");
            Whitelist::default_services()
        }
    }
}

/// Non-empty strings of a JSON array. Anything else is skipped with a warning.
fn string_entries<'a>(entries: &'a [Value], list: &'static str) -> impl Iterator<Item = String> + 'a {
    entries.iter().filter_map(move |entry| match entry.as_str() {
        Some("") => {
            warn!("Empty string in {}", list);
            None
        }
        Some(value) => Some(value.to_string()),
        None => {
            warn!("Non-string in {}: {}", list, entry);
            None
        }
    })
}
