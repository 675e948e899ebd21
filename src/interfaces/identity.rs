// DM Bridge - Identity Interface
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Hardware-rooted device identity.
//!
//! Calls go straight to the attestation helper without a lock; the helper is
//! a separate process and may take a while.

use std::sync::Arc;

use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{operation_failed, parse_params, to_value, unknown_method, CommandGroup, Interface};
use crate::error::BridgeResult;
use crate::validate;

/// Source of TPM-backed identity material.
pub trait AttestationHelper: Send + Sync {
    fn endorsement_key(&self) -> Result<String>;
    fn registration_id(&self) -> Result<String>;

    /// Cloud connection string for the identity stored in `slot`, carrying a
    /// token valid for `expiry_secs`.
    fn connection_string(&self, slot: i32, expiry_secs: i32) -> Result<String>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionStringParams {
    slot: i32,
    expiry_seconds: i32,
}

pub struct IdentityInterface {
    helper: Arc<dyn AttestationHelper>,
}

impl IdentityInterface {
    pub fn new(helper: Arc<dyn AttestationHelper>) -> Self {
        Self { helper }
    }

    pub fn endorsement_key(&self) -> BridgeResult<String> {
        self.helper
            .endorsement_key()
            .map_err(|e| operation_failed("read endorsement key", e))
    }

    pub fn registration_id(&self) -> BridgeResult<String> {
        self.helper
            .registration_id()
            .map_err(|e| operation_failed("read registration id", e))
    }

    pub fn connection_string(&self, slot: i32, expiry_secs: i32) -> BridgeResult<String> {
        validate::attestation_slot(slot)?;
        validate::token_expiry(expiry_secs)?;

        debug!("Requesting connection string for slot {}", slot);
        self.helper
            .connection_string(slot, expiry_secs)
            .map_err(|e| operation_failed(&format!("build connection string for slot {}", slot), e))
    }
}

impl Interface for IdentityInterface {
    fn group(&self) -> CommandGroup {
        CommandGroup::Identity
    }

    fn dispatch(&self, method: &str, params: Value) -> BridgeResult<Value> {
        match method {
            "GetEndorsementKey" => to_value(self.endorsement_key()?),
            "GetRegistrationId" => to_value(self.registration_id()?),
            "GetConnectionString" => {
                let params: ConnectionStringParams = parse_params(method, params)?;
                to_value(self.connection_string(params.slot, params.expiry_seconds)?)
            }
            _ => Err(unknown_method(self.group(), method)),
        }
    }
}
