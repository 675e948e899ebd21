// DM Bridge - Computer Name Interface
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Rename the device and query its name.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::{lock, operation_failed, parse_params, to_value, unknown_method, CommandGroup, Interface};
use crate::error::BridgeResult;
use crate::validate;

/// Hostname primitives of the host.
pub trait ComputerNameOps: Send + Sync {
    /// Persist `name` as the configured hostname.
    fn set_static_name(&self, name: &str) -> Result<()>;

    /// The configured hostname, which takes effect at the next boot.
    fn static_name(&self) -> Result<String>;

    /// The hostname the system is currently running with.
    fn running_name(&self) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct SetNameParams {
    name: String,
}

pub struct ComputerNameInterface {
    ops: Arc<dyn ComputerNameOps>,
    // Set and IsRenamePending must not interleave.
    name_lock: Mutex<()>,
}

impl ComputerNameInterface {
    pub fn new(ops: Arc<dyn ComputerNameOps>) -> Self {
        Self {
            ops,
            name_lock: Mutex::new(()),
        }
    }

    pub fn set_name(&self, name: &str) -> BridgeResult<()> {
        validate::computer_name(name)?;

        let _guard = lock(&self.name_lock);
        self.ops
            .set_static_name(name)
            .map_err(|e| operation_failed("set computer name", e))?;

        info!("Computer name set to: {}", name);
        Ok(())
    }

    pub fn get_name(&self) -> BridgeResult<String> {
        self.ops
            .running_name()
            .map_err(|e| operation_failed("read computer name", e))
    }

    /// A rename is pending while the configured name differs from the running one.
    pub fn is_rename_pending(&self) -> BridgeResult<bool> {
        let _guard = lock(&self.name_lock);
        let configured = self
            .ops
            .static_name()
            .map_err(|e| operation_failed("read configured computer name", e))?;
        let running = self
            .ops
            .running_name()
            .map_err(|e| operation_failed("read computer name", e))?;

        Ok(!configured.eq_ignore_ascii_case(&running))
    }
}

impl Interface for ComputerNameInterface {
    fn group(&self) -> CommandGroup {
        CommandGroup::ComputerName
    }

    fn dispatch(&self, method: &str, params: Value) -> BridgeResult<Value> {
        match method {
            "SetName" => {
                let params: SetNameParams = parse_params(method, params)?;
                self.set_name(&params.name)?;
                Ok(Value::Null)
            }
            "GetName" => to_value(self.get_name()?),
            "IsRenamePending" => to_value(self.is_rename_pending()?),
            _ => Err(unknown_method(self.group(), method)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::FakeComputerName;
    use crate::error::{errno, BridgeError};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    /// Hostname backend that notices when two calls are in flight at once.
    #[derive(Default)]
    struct OverlapDetector {
        busy: AtomicBool,
        overlapped: AtomicBool,
        name: Mutex<String>,
    }

    impl OverlapDetector {
        fn enter(&self) {
            if self.busy.swap(true, Ordering::SeqCst) {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            thread::sleep(Duration::from_millis(2));
            self.busy.store(false, Ordering::SeqCst);
        }
    }

    impl ComputerNameOps for OverlapDetector {
        fn set_static_name(&self, name: &str) -> Result<()> {
            self.enter();
            *self.name.lock().unwrap() = name.to_string();
            Ok(())
        }

        fn static_name(&self) -> Result<String> {
            self.enter();
            Ok(self.name.lock().unwrap().clone())
        }

        fn running_name(&self) -> Result<String> {
            self.enter();
            Ok("kiosk-01".to_string())
        }
    }

    fn interface(fake: &Arc<FakeComputerName>) -> ComputerNameInterface {
        ComputerNameInterface::new(fake.clone())
    }

    #[test]
    fn test_set_name_then_pending() {
        let fake = Arc::new(FakeComputerName::new("kiosk-01"));
        let names = interface(&fake);

        assert!(!names.is_rename_pending().unwrap());
        names.set_name("kiosk-02").unwrap();
        assert_eq!(fake.static_name().unwrap(), "kiosk-02");
        assert_eq!(names.get_name().unwrap(), "kiosk-01");
        assert!(names.is_rename_pending().unwrap());
    }

    #[test]
    fn test_pending_ignores_case() {
        let fake = Arc::new(FakeComputerName::new("kiosk-01"));
        let names = interface(&fake);

        names.set_name("KIOSK-01").unwrap();
        assert!(!names.is_rename_pending().unwrap());
    }

    #[test]
    fn test_set_name_validates_before_calling_out() {
        let fake = Arc::new(FakeComputerName::new("kiosk-01"));
        let names = interface(&fake);

        for bad in ["", "12345", "name with space", "ABCDEFGHIJKLMNOP"] {
            assert!(matches!(names.set_name(bad), Err(BridgeError::InvalidArgument(_))));
        }
        assert_eq!(fake.static_name().unwrap(), "kiosk-01");
    }

    #[test]
    fn test_collaborator_failure_is_translated() {
        let fake = Arc::new(FakeComputerName::new("kiosk-01"));
        fake.fail_with(errno::EACCES);
        assert!(matches!(
            interface(&fake).set_name("kiosk-02"),
            Err(BridgeError::OperationFailed { code: errno::EACCES, .. })
        ));

        fake.fail_with(0);
        assert!(matches!(interface(&fake).get_name(), Err(BridgeError::Unknown(_))));
    }

    #[test]
    fn test_dispatch() {
        let fake = Arc::new(FakeComputerName::new("kiosk-01"));
        let names = interface(&fake);

        assert_eq!(names.dispatch("GetName", Value::Null).unwrap(), json!("kiosk-01"));
        assert_eq!(
            names.dispatch("SetName", json!({"name": "lobby"})).unwrap(),
            Value::Null
        );
        assert_eq!(names.dispatch("IsRenamePending", json!({})).unwrap(), json!(true));
        assert!(matches!(
            names.dispatch("SetName", json!({})),
            Err(BridgeError::InvalidArgument(_))
        ));
        assert!(matches!(
            names.dispatch("Rename", Value::Null),
            Err(BridgeError::UnknownMethod { .. })
        ));
    }

    #[test]
    fn test_set_name_and_pending_check_never_interleave() {
        let backend = Arc::new(OverlapDetector::default());
        let names = ComputerNameInterface::new(backend.clone());

        thread::scope(|scope| {
            for worker in 0..4 {
                let names = &names;
                scope.spawn(move || {
                    for i in 0..10 {
                        if worker % 2 == 0 {
                            names.set_name(&format!("kiosk-{}{}", worker, i)).unwrap();
                        } else {
                            names.is_rename_pending().unwrap();
                        }
                    }
                });
            }
        });

        assert!(!backend.overlapped.load(Ordering::SeqCst));
    }
}
