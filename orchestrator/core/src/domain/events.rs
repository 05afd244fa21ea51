// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::fleet::PlanDiagnostic;
use crate::domain::launcher::UnitHandle;
use crate::domain::sequence::{GroupId, Pipeline};

/// Identifies one fleet launch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LaunchId(pub Uuid);

impl LaunchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LaunchId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LaunchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LaunchEvent {
    FleetPlanned {
        launch_id: LaunchId,
        robots: Vec<String>,
        groups: usize,
        planned_at: DateTime<Utc>,
    },
    CountClamped {
        launch_id: LaunchId,
        diagnostic: PlanDiagnostic,
        clamped_at: DateTime<Utc>,
    },
    UnitStarted {
        launch_id: LaunchId,
        unit: String,
        handle: UnitHandle,
        command: String,
        started_at: DateTime<Utc>,
    },
    UnitExited {
        launch_id: LaunchId,
        unit: String,
        code: Option<i32>,
        success: bool,
        exited_at: DateTime<Utc>,
    },
    GroupTriggered {
        launch_id: LaunchId,
        group: GroupId,
        pipeline: Pipeline,
        robot: String,
        /// Unit whose exit released the group; `None` for immediate groups.
        after: Option<String>,
        triggered_at: DateTime<Utc>,
    },
    ExitDeadlineExceeded {
        launch_id: LaunchId,
        unit: String,
        #[serde(with = "humantime_serde")]
        waited: Duration,
        exceeded_at: DateTime<Utc>,
    },
    SequenceCompleted {
        launch_id: LaunchId,
        units_started: usize,
        completed_at: DateTime<Utc>,
    },
    SequenceFailed {
        launch_id: LaunchId,
        reason: String,
        failed_at: DateTime<Utc>,
    },
}

impl LaunchEvent {
    pub fn launch_id(&self) -> LaunchId {
        match self {
            LaunchEvent::FleetPlanned { launch_id, .. }
            | LaunchEvent::CountClamped { launch_id, .. }
            | LaunchEvent::UnitStarted { launch_id, .. }
            | LaunchEvent::UnitExited { launch_id, .. }
            | LaunchEvent::GroupTriggered { launch_id, .. }
            | LaunchEvent::ExitDeadlineExceeded { launch_id, .. }
            | LaunchEvent::SequenceCompleted { launch_id, .. }
            | LaunchEvent::SequenceFailed { launch_id, .. } => *launch_id,
        }
    }
}
