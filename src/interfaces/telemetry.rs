// DM Bridge - Telemetry Interface
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

use std::sync::{Arc, Mutex};

use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::{lock, operation_failed, parse_params, to_value, unknown_method, CommandGroup, Interface};
use crate::error::BridgeResult;
use crate::validate;

/// Where the diagnostic data level is persisted.
pub trait TelemetryStore: Send + Sync {
    fn level(&self) -> Result<i32>;
    fn set_level(&self, level: i32) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct SetLevelParams {
    level: i32,
}

pub struct TelemetryInterface {
    store: Arc<dyn TelemetryStore>,
    level_lock: Mutex<()>,
}

impl TelemetryInterface {
    pub fn new(store: Arc<dyn TelemetryStore>) -> Self {
        Self {
            store,
            level_lock: Mutex::new(()),
        }
    }

    pub fn set_level(&self, level: i32) -> BridgeResult<()> {
        validate::telemetry_level(level)?;

        let _guard = lock(&self.level_lock);
        self.store
            .set_level(level)
            .map_err(|e| operation_failed("set telemetry level", e))?;

        info!("Telemetry level set to: {}", level);
        Ok(())
    }

    pub fn level(&self) -> BridgeResult<i32> {
        self.store
            .level()
            .map_err(|e| operation_failed("read telemetry level", e))
    }
}

impl Interface for TelemetryInterface {
    fn group(&self) -> CommandGroup {
        CommandGroup::Telemetry
    }

    fn dispatch(&self, method: &str, params: Value) -> BridgeResult<Value> {
        match method {
            "SetLevel" => {
                let params: SetLevelParams = parse_params(method, params)?;
                self.set_level(params.level)?;
                Ok(Value::Null)
            }
            "GetLevel" => to_value(self.level()?),
            _ => Err(unknown_method(self.group(), method)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::FakeTelemetry;
    use crate::error::BridgeError;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
    use std::thread;
    use std::time::Duration;

    /// Store that notices overlapping writes.
    #[derive(Default)]
    struct OverlapDetector {
        writing: AtomicBool,
        overlapped: AtomicBool,
        level: AtomicI32,
    }

    impl TelemetryStore for OverlapDetector {
        fn level(&self) -> Result<i32> {
            Ok(self.level.load(Ordering::SeqCst))
        }

        fn set_level(&self, level: i32) -> Result<()> {
            if self.writing.swap(true, Ordering::SeqCst) {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            thread::sleep(Duration::from_millis(2));
            self.level.store(level, Ordering::SeqCst);
            self.writing.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_get_returns_last_set_value() {
        let telemetry = TelemetryInterface::new(Arc::new(FakeTelemetry::default()));

        assert_eq!(telemetry.level().unwrap(), 0);
        for level in [3, 1, 2] {
            telemetry.set_level(level).unwrap();
            assert_eq!(telemetry.level().unwrap(), level);
        }
    }

    #[test]
    fn test_out_of_range_levels_leave_store_untouched() {
        let telemetry = TelemetryInterface::new(Arc::new(FakeTelemetry::default()));
        telemetry.set_level(2).unwrap();

        for level in [-1, 4, i32::MAX] {
            assert!(matches!(
                telemetry.set_level(level),
                Err(BridgeError::InvalidArgument(_))
            ));
        }
        assert_eq!(telemetry.level().unwrap(), 2);
    }

    #[test]
    fn test_dispatch() {
        let telemetry = TelemetryInterface::new(Arc::new(FakeTelemetry::default()));

        assert_eq!(telemetry.dispatch("SetLevel", json!({"level": 1})).unwrap(), Value::Null);
        assert_eq!(telemetry.dispatch("GetLevel", Value::Null).unwrap(), json!(1));
        assert!(matches!(
            telemetry.dispatch("SetLevel", json!({"level": "high"})),
            Err(BridgeError::InvalidArgument(_))
        ));
        assert!(matches!(
            telemetry.dispatch("Reset", Value::Null),
            Err(BridgeError::UnknownMethod { .. })
        ));
    }

    #[test]
    fn test_concurrent_set_level_is_serialized() {
        let store = Arc::new(OverlapDetector::default());
        let telemetry = TelemetryInterface::new(store.clone());

        thread::scope(|scope| {
            for level in 0..4 {
                let telemetry = &telemetry;
                scope.spawn(move || {
                    for _ in 0..10 {
                        telemetry.set_level(level).unwrap();
                    }
                });
            }
        });

        assert!(!store.overlapped.load(Ordering::SeqCst));
        assert!((0..4).contains(&telemetry.level().unwrap()));
    }
}
