// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Fleet Launch Service
//!
//! Entry point of a bring-up: turns launch arguments into a robot plan and a
//! sequence plan, starts the shared environment, then hands the robot groups to
//! the [`FleetSequencer`].

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::application::bringup::{BringupCatalog, LaunchSettings};
use crate::application::sequencer::{FleetSequencer, SequenceError, SequenceReport};
use crate::domain::events::{LaunchEvent, LaunchId};
use crate::domain::fleet::{FleetError, LaunchArguments, RobotCount, RobotSpawnPlan};
use crate::domain::launch_config::FleetLaunchConfig;
use crate::domain::launcher::{LaunchError, ProcessLauncher, UnitHandle};
use crate::domain::sequence::{PlanError, SequencePlan};
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, Error)]
pub enum FleetLaunchError {
    #[error(transparent)]
    Fleet(#[from] FleetError),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error("Failed to start environment: {0}")]
    Environment(#[source] LaunchError),
    #[error(transparent)]
    Sequence(#[from] SequenceError),
    #[error(transparent)]
    Shutdown(LaunchError),
}

/// Everything decided before the first process starts.
#[derive(Debug, Clone)]
pub struct PreparedLaunch {
    pub launch_id: LaunchId,
    pub fleet: RobotSpawnPlan,
    pub sequence: SequencePlan,
    pub catalog: BringupCatalog,
}

#[derive(Debug, Clone)]
pub struct LaunchOutcome {
    pub environment: Vec<UnitHandle>,
    pub report: SequenceReport,
}

pub struct FleetLaunchService {
    launcher: Arc<dyn ProcessLauncher>,
    event_bus: Arc<EventBus>,
    config: FleetLaunchConfig,
}

impl FleetLaunchService {
    pub fn new(launcher: Arc<dyn ProcessLauncher>, event_bus: Arc<EventBus>, config: FleetLaunchConfig) -> Self {
        Self {
            launcher,
            event_bus,
            config,
        }
    }

    pub fn config(&self) -> &FleetLaunchConfig {
        &self.config
    }

    /// Build both plans for `args` without starting anything.
    pub fn prepare(&self, args: &LaunchArguments) -> Result<PreparedLaunch, FleetLaunchError> {
        let launch_id = LaunchId::new();
        let fleet = RobotSpawnPlan::from_request(RobotCount::from_launch_args(args))?;
        let settings = LaunchSettings::resolve(&self.config, args);
        let sequence = SequencePlan::build(&fleet, settings.plan_options())?;
        sequence.validate()?;

        for diagnostic in fleet.diagnostics() {
            self.event_bus.publish(LaunchEvent::CountClamped {
                launch_id,
                diagnostic: diagnostic.clone(),
                clamped_at: Utc::now(),
            });
        }
        self.event_bus.publish(LaunchEvent::FleetPlanned {
            launch_id,
            robots: fleet.slots().iter().map(|s| s.name.clone()).collect(),
            groups: sequence.groups().len(),
            planned_at: Utc::now(),
        });

        Ok(PreparedLaunch {
            launch_id,
            fleet,
            sequence,
            catalog: BringupCatalog::new(settings),
        })
    }

    /// Start the environment units, then run the robot sequence.
    pub async fn launch(&self, prepared: &PreparedLaunch) -> Result<LaunchOutcome, FleetLaunchError> {
        info!("Launch {}: starting environment", prepared.launch_id);

        let mut environment = Vec::new();
        for spec in prepared.catalog.environment_units() {
            let handle = self
                .launcher
                .launch(&spec)
                .await
                .map_err(FleetLaunchError::Environment)?;
            metrics::counter!("fleet_units_launched_total").increment(1);
            self.event_bus.publish(LaunchEvent::UnitStarted {
                launch_id: prepared.launch_id,
                unit: spec.name.clone(),
                handle: handle.clone(),
                command: spec.shell_line(),
                started_at: Utc::now(),
            });
            environment.push(handle);
        }

        let sequencer = FleetSequencer::new(
            Arc::clone(&self.launcher),
            Arc::clone(&self.event_bus),
            prepared.catalog.settings().deadlines.clone(),
        );
        let report = sequencer
            .run(prepared.launch_id, &prepared.sequence, &prepared.catalog)
            .await?;

        Ok(LaunchOutcome { environment, report })
    }

    /// Stop every unit this service started.
    pub async fn shutdown(&self) -> Result<(), FleetLaunchError> {
        info!("Stopping all launched units");
        self.launcher.shutdown().await.map_err(FleetLaunchError::Shutdown)
    }
}
