// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Dry-run launcher: records every unit instead of starting it. Every unit
// "exits" successfully as soon as it is waited on, so a full sequence runs
// through and the recorded order is the order a real launch would use.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;

use crate::domain::launcher::{LaunchError, ProcessLauncher, ProcessSpec, UnitExit, UnitHandle};

#[derive(Default)]
pub struct DryRunLauncher {
    launched: Mutex<Vec<ProcessSpec>>,
    handles: Mutex<HashSet<UnitHandle>>,
}

impl DryRunLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Units in the order they were launched.
    pub fn launched(&self) -> Vec<ProcessSpec> {
        self.launched.lock().clone()
    }

    pub fn launched_names(&self) -> Vec<String> {
        self.launched.lock().iter().map(|s| s.name.clone()).collect()
    }
}

#[async_trait]
impl ProcessLauncher for DryRunLauncher {
    async fn launch(&self, spec: &ProcessSpec) -> Result<UnitHandle, LaunchError> {
        let handle = {
            let mut launched = self.launched.lock();
            launched.push(spec.clone());
            UnitHandle::new(format!("{}#{}", spec.name, launched.len()))
        };
        self.handles.lock().insert(handle.clone());
        Ok(handle)
    }

    async fn wait_exit(&self, handle: &UnitHandle) -> Result<UnitExit, LaunchError> {
        if self.handles.lock().contains(handle) {
            Ok(UnitExit::success())
        } else {
            Err(LaunchError::UnitNotFound(handle.to_string()))
        }
    }

    async fn shutdown(&self) -> Result<(), LaunchError> {
        Ok(())
    }
}
