// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Fleet Sequencer
//!
//! Executes a [`SequencePlan`] against a [`ProcessLauncher`]. Groups with an
//! `Immediate` trigger start right away; every other group starts when the
//! action it waits for exits. A unit's exit code does not matter, only that
//! it exited.
//!
//! One watcher task per gating unit waits for its exit (bounded by the stage
//! deadline) and reports back over a channel. The sequencer loop itself is the
//! only place that launches units, so pipeline order is decided in one place.
//!
//! ## Failure Table
//!
//! | Situation | Result |
//! |-----------|--------|
//! | Unit fails to start | `SequenceError::Launch` |
//! | Gating unit exceeds its deadline | `SequenceError::ExitTimeout` |
//! | Waiting on a unit fails | `SequenceError::Launch` |
//! | Unit exits non-zero | warning, dependents still start |
//!
//! ## Metrics
//!
//! Counters go through the `metrics` facade and are no-ops until the host
//! process installs a recorder. The `fleet` CLI does not install one.

use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::domain::events::{LaunchEvent, LaunchId};
use crate::domain::launch_config::DeadlineConfig;
use crate::domain::launcher::{LaunchError, ProcessLauncher, ProcessSpec, UnitExit, UnitHandle};
use crate::domain::sequence::{ActionId, GroupId, PlanError, PlannedAction, SequencePlan};
use crate::infrastructure::event_bus::EventBus;

/// Resolves a planned action to the unit that realises it.
pub trait UnitSource: Send + Sync {
    fn unit_for(&self, action: &PlannedAction) -> ProcessSpec;
}

#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("Invalid sequence plan: {0}")]
    InvalidPlan(#[from] PlanError),
    #[error(transparent)]
    Launch(#[from] LaunchError),
    #[error("{unit} did not exit within {waited:?}; dependent stages were not started")]
    ExitTimeout { unit: String, waited: Duration },
    #[error("No unit left to wait for but {pending} group(s) never started")]
    Stalled { pending: usize },
}

#[derive(Debug, Clone, Serialize)]
pub struct StartedUnit {
    pub action: ActionId,
    pub unit: String,
    pub handle: UnitHandle,
}

/// What the sequencer did, in order.
#[derive(Debug, Clone, Serialize)]
pub struct SequenceReport {
    pub launch_id: LaunchId,
    pub started: Vec<StartedUnit>,
    pub triggered: Vec<GroupId>,
    pub exits: Vec<(ActionId, UnitExit)>,
}

impl SequenceReport {
    fn new(launch_id: LaunchId) -> Self {
        Self {
            launch_id,
            started: Vec::new(),
            triggered: Vec::new(),
            exits: Vec::new(),
        }
    }

    /// Position of an action in the launch order.
    pub fn start_position(&self, action: ActionId) -> Option<usize> {
        self.started.iter().position(|u| u.action == action)
    }
}

enum ExitNotice {
    Exited { action: ActionId, exit: UnitExit },
    DeadlineExceeded { action: ActionId, waited: Duration },
    WaitFailed { error: LaunchError },
}

pub struct FleetSequencer {
    launcher: Arc<dyn ProcessLauncher>,
    event_bus: Arc<EventBus>,
    deadlines: DeadlineConfig,
}

impl FleetSequencer {
    pub fn new(
        launcher: Arc<dyn ProcessLauncher>,
        event_bus: Arc<EventBus>,
        deadlines: DeadlineConfig,
    ) -> Self {
        Self {
            launcher,
            event_bus,
            deadlines,
        }
    }

    /// Start every group of `plan`, honouring its triggers. Returns once the
    /// last group has been started; units keep running afterwards.
    pub async fn run(
        &self,
        launch_id: LaunchId,
        plan: &SequencePlan,
        units: &dyn UnitSource,
    ) -> Result<SequenceReport, SequenceError> {
        let result = self.drive(launch_id, plan, units).await;

        match &result {
            Ok(report) => {
                info!("Sequence complete: {} units started", report.started.len());
                self.event_bus.publish(LaunchEvent::SequenceCompleted {
                    launch_id,
                    units_started: report.started.len(),
                    completed_at: Utc::now(),
                });
            }
            Err(e) => {
                warn!("Sequence aborted: {}", e);
                self.event_bus.publish(LaunchEvent::SequenceFailed {
                    launch_id,
                    reason: e.to_string(),
                    failed_at: Utc::now(),
                });
            }
        }

        result
    }

    async fn drive(
        &self,
        launch_id: LaunchId,
        plan: &SequencePlan,
        units: &dyn UnitSource,
    ) -> Result<SequenceReport, SequenceError> {
        plan.validate()?;

        let gating = plan.gating_actions();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut report = SequenceReport::new(launch_id);
        let mut pending = plan.groups().len();
        let mut watching = 0usize;

        for group in plan.immediate_groups() {
            watching += self
                .start_group(launch_id, plan, group.id, None, units, &gating, &tx, &mut report)
                .await?;
            pending -= 1;
        }

        while pending > 0 {
            if watching == 0 {
                return Err(SequenceError::Stalled { pending });
            }
            let Some(notice) = rx.recv().await else {
                return Err(SequenceError::Stalled { pending });
            };
            watching -= 1;

            match notice {
                ExitNotice::Exited { action, exit } => {
                    let label = action_label(plan, action);
                    if exit.success {
                        debug!("{} exited", label);
                    } else {
                        warn!("{} exited with code {:?}; continuing", label, exit.code);
                    }
                    self.event_bus.publish(LaunchEvent::UnitExited {
                        launch_id,
                        unit: label.clone(),
                        code: exit.code,
                        success: exit.success,
                        exited_at: Utc::now(),
                    });
                    report.exits.push((action, exit));

                    for group in plan.dependents_of(action) {
                        watching += self
                            .start_group(launch_id, plan, group, Some(&label), units, &gating, &tx, &mut report)
                            .await?;
                        pending -= 1;
                    }
                }
                ExitNotice::DeadlineExceeded { action, waited } => {
                    let unit = action_label(plan, action);
                    metrics::counter!("fleet_exit_timeouts_total").increment(1);
                    self.event_bus.publish(LaunchEvent::ExitDeadlineExceeded {
                        launch_id,
                        unit: unit.clone(),
                        waited,
                        exceeded_at: Utc::now(),
                    });
                    return Err(SequenceError::ExitTimeout { unit, waited });
                }
                ExitNotice::WaitFailed { error } => return Err(error.into()),
            }
        }

        Ok(report)
    }

    /// Launch every action of a group. Returns how many exit watchers were
    /// started for it.
    #[allow(clippy::too_many_arguments)]
    async fn start_group(
        &self,
        launch_id: LaunchId,
        plan: &SequencePlan,
        group_id: GroupId,
        after: Option<&str>,
        units: &dyn UnitSource,
        gating: &BTreeSet<ActionId>,
        tx: &mpsc::UnboundedSender<ExitNotice>,
        report: &mut SequenceReport,
    ) -> Result<usize, SequenceError> {
        let group = plan.group(group_id).ok_or(PlanError::Empty)?;

        info!(
            "Starting {} stage of {}{}",
            group.pipeline,
            group.robot,
            after.map(|a| format!(" after {} exited", a)).unwrap_or_default()
        );
        metrics::counter!("fleet_groups_triggered_total").increment(1);
        self.event_bus.publish(LaunchEvent::GroupTriggered {
            launch_id,
            group: group.id,
            pipeline: group.pipeline,
            robot: group.robot.clone(),
            after: after.map(str::to_string),
            triggered_at: Utc::now(),
        });
        report.triggered.push(group.id);

        let mut watchers = 0;
        for &action_id in &group.actions {
            let action = plan.action(action_id).ok_or(PlanError::DanglingTrigger {
                group: group.id,
                action: action_id,
            })?;
            let spec = units.unit_for(action);
            let handle = self.launcher.launch(&spec).await?;

            metrics::counter!("fleet_units_launched_total").increment(1);
            self.event_bus.publish(LaunchEvent::UnitStarted {
                launch_id,
                unit: spec.name.clone(),
                handle: handle.clone(),
                command: spec.shell_line(),
                started_at: Utc::now(),
            });
            report.started.push(StartedUnit {
                action: action_id,
                unit: spec.name.clone(),
                handle: handle.clone(),
            });

            if gating.contains(&action_id) {
                self.watch_exit(action_id, handle, self.deadlines.for_stage(action.stage), tx.clone());
                watchers += 1;
            }
        }

        Ok(watchers)
    }

    fn watch_exit(
        &self,
        action: ActionId,
        handle: UnitHandle,
        deadline: Option<Duration>,
        tx: mpsc::UnboundedSender<ExitNotice>,
    ) {
        let launcher = Arc::clone(&self.launcher);
        tokio::spawn(async move {
            let waited = match deadline {
                Some(limit) => tokio::time::timeout(limit, launcher.wait_exit(&handle))
                    .await
                    .map_err(|_| limit),
                None => Ok(launcher.wait_exit(&handle).await),
            };
            let notice = match waited {
                Ok(Ok(exit)) => ExitNotice::Exited { action, exit },
                Ok(Err(error)) => ExitNotice::WaitFailed { error },
                Err(limit) => ExitNotice::DeadlineExceeded { action, waited: limit },
            };
            // The sequencer may already have stopped listening after a failure.
            let _ = tx.send(notice);
        });
    }
}

fn action_label(plan: &SequencePlan, action: ActionId) -> String {
    plan.action(action)
        .map(PlannedAction::label)
        .unwrap_or_else(|| action.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fleet::RobotSpawnPlan;
    use crate::domain::sequence::PlanOptions;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    // Launcher whose units exit as soon as they are waited on, except the
    // ones listed in `hang`, which never exit.
    #[derive(Default)]
    struct MockLauncher {
        log: Mutex<Vec<String>>,
        hang: Vec<String>,
        fail_launch: Option<String>,
        exit_code: Option<i32>,
    }

    #[async_trait]
    impl ProcessLauncher for MockLauncher {
        async fn launch(&self, spec: &ProcessSpec) -> Result<UnitHandle, LaunchError> {
            if self.fail_launch.as_deref() == Some(spec.name.as_str()) {
                return Err(LaunchError::SpawnFailed {
                    unit: spec.name.clone(),
                    reason: "no such executable".to_string(),
                });
            }
            self.log.lock().push(format!("start {}", spec.name));
            Ok(UnitHandle::new(spec.name.clone()))
        }

        async fn wait_exit(&self, handle: &UnitHandle) -> Result<UnitExit, LaunchError> {
            if self.hang.iter().any(|h| h == handle.as_str()) {
                std::future::pending::<()>().await;
            }
            tokio::task::yield_now().await;
            self.log.lock().push(format!("exit {}", handle));
            Ok(match self.exit_code {
                Some(code) => UnitExit::failure(Some(code)),
                None => UnitExit::success(),
            })
        }

        async fn shutdown(&self) -> Result<(), LaunchError> {
            Ok(())
        }
    }

    struct Labels;

    impl UnitSource for Labels {
        fn unit_for(&self, action: &PlannedAction) -> ProcessSpec {
            ProcessSpec::command(action.label(), "true")
        }
    }

    fn sequencer(launcher: Arc<MockLauncher>, deadline: Option<Duration>) -> FleetSequencer {
        FleetSequencer::new(launcher, Arc::new(EventBus::new(256)), DeadlineConfig::uniform(deadline))
    }

    fn plan(n: i64) -> SequencePlan {
        SequencePlan::build(&RobotSpawnPlan::build(n).unwrap(), PlanOptions { visualize: false }).unwrap()
    }

    fn index_of(log: &[String], entry: &str) -> usize {
        log.iter()
            .position(|l| l == entry)
            .unwrap_or_else(|| panic!("{} not in {:?}", entry, log))
    }

    #[tokio::test]
    async fn test_every_group_starts_once() {
        let launcher = Arc::new(MockLauncher::default());
        let plan = plan(3);

        let report = sequencer(launcher.clone(), Some(Duration::from_secs(5)))
            .run(LaunchId::new(), &plan, &Labels)
            .await
            .unwrap();

        assert_eq!(report.triggered.len(), plan.groups().len());
        assert_eq!(report.started.len(), plan.actions().len());
        let triggered: BTreeSet<_> = report.triggered.iter().collect();
        assert_eq!(triggered.len(), plan.groups().len());
    }

    #[tokio::test]
    async fn test_spawn_waits_for_previous_spawn_exit() {
        let launcher = Arc::new(MockLauncher::default());
        sequencer(launcher.clone(), None)
            .run(LaunchId::new(), &plan(3), &Labels)
            .await
            .unwrap();

        let log = launcher.log.lock().clone();
        assert!(index_of(&log, "exit tb1/spawn") < index_of(&log, "start tb2/state_publish"));
        assert!(index_of(&log, "exit tb2/spawn") < index_of(&log, "start tb3/spawn"));
        assert!(index_of(&log, "exit tb3/spawn") < index_of(&log, "start tb1/initial_pose"));
        assert!(index_of(&log, "exit tb1/initial_pose") < index_of(&log, "start tb2/initial_pose"));
        assert!(index_of(&log, "exit tb3/initial_pose") < index_of(&log, "start tb1/run_application"));
        assert!(index_of(&log, "exit tb2/run_application") < index_of(&log, "start tb3/run_application"));
    }

    #[tokio::test]
    async fn test_hung_spawn_times_out() {
        let launcher = Arc::new(MockLauncher {
            hang: vec!["tb2/spawn".to_string()],
            ..Default::default()
        });

        let err = sequencer(launcher.clone(), Some(Duration::from_millis(50)))
            .run(LaunchId::new(), &plan(3), &Labels)
            .await
            .unwrap_err();

        match err {
            SequenceError::ExitTimeout { unit, waited } => {
                assert_eq!(unit, "tb2/spawn");
                assert_eq!(waited, Duration::from_millis(50));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        let log = launcher.log.lock().clone();
        assert!(!log.iter().any(|l| l.starts_with("start tb3/")));
    }

    #[tokio::test]
    async fn test_failed_exit_still_releases_dependents() {
        let launcher = Arc::new(MockLauncher {
            exit_code: Some(1),
            ..Default::default()
        });

        let report = sequencer(launcher, None)
            .run(LaunchId::new(), &plan(2), &Labels)
            .await
            .unwrap();

        assert_eq!(report.triggered.len(), 6);
        assert!(report.exits.iter().all(|(_, exit)| !exit.success));
    }

    #[tokio::test]
    async fn test_launch_failure_aborts_and_reports() {
        let launcher = Arc::new(MockLauncher {
            fail_launch: Some("tb2/bringup_nav".to_string()),
            ..Default::default()
        });
        let event_bus = Arc::new(EventBus::new(256));
        let mut events = event_bus.subscribe();
        let sequencer = FleetSequencer::new(launcher, event_bus, DeadlineConfig::uniform(None));

        let err = sequencer.run(LaunchId::new(), &plan(2), &Labels).await.unwrap_err();
        assert!(matches!(err, SequenceError::Launch(LaunchError::SpawnFailed { .. })));

        let mut saw_failure = false;
        while let Ok(event) = events.try_recv() {
            if let LaunchEvent::SequenceFailed { reason, .. } = event {
                assert!(reason.contains("tb2/bringup_nav"));
                saw_failure = true;
            }
        }
        assert!(saw_failure);
    }
}
