// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Fleet Planning Domain
//!
//! Turns a requested robot count into an immutable [`RobotSpawnPlan`]: one
//! [`RobotSlot`] per robot, named `tb1..tbN`, each pinned to a fixed spawn pose.
//!
//! ## Count Policy
//!
//! | Request | Result |
//! |---------|--------|
//! | absent / not an integer | 2 robots (default) |
//! | `1..=6` | as requested |
//! | `> 6` | clamped to 6, one [`PlanDiagnostic::Clamped`] recorded |
//! | `<= 0` | rejected with [`FleetError::NonPositiveCount`] |
//!
//! The pose table bounds the fleet size: the simulated map only has six
//! collision-free spawn points.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Robot count used when no usable `num:=` token is given.
pub const DEFAULT_ROBOT_COUNT: usize = 2;

/// Height every robot is dropped from, in metres.
pub const SPAWN_HEIGHT: f64 = 0.01;

/// Launch argument carrying the requested robot count.
pub const COUNT_ARGUMENT: &str = "num";

/// Spawn coordinates of a robot in the `map` frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Pose {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: SPAWN_HEIGHT }
    }
}

/// Fixed, ordered spawn positions. Slot `i` always takes entry `i`.
pub const POSE_TABLE: [Pose; 6] = [
    Pose::new(-1.5, -0.4),
    Pose::new(-1.5, 0.4),
    Pose::new(-1.5, 0.9),
    Pose::new(-1.5, -0.9),
    Pose::new(-1.5, 0.0),
    Pose::new(-2.1, 0.0),
];

/// Largest fleet the pose table can place.
pub const MAX_ROBOTS: usize = POSE_TABLE.len();

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FleetError {
    #[error("Robot count must be at least 1, got {0}")]
    NonPositiveCount(i64),
}

/// `key:=value` launch arguments, as typed after the launch command.
///
/// Later tokens override earlier ones. Tokens without `:=` are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchArguments {
    values: BTreeMap<String, String>,
}

impl LaunchArguments {
    pub fn parse<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut values = BTreeMap::new();
        for token in tokens {
            let token = token.as_ref();
            if let Some((key, value)) = token.split_once(":=") {
                let key = key.trim();
                if key.is_empty() {
                    debug!("Ignoring launch argument without a name: '{}'", token);
                    continue;
                }
                values.insert(key.to_string(), value.trim().to_string());
            }
        }
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Interpret an argument as a ROS-style boolean (`true`/`false`, any case).
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)?.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            other => {
                warn!("Launch argument {}:={} is not a boolean. Ignoring.", key, other);
                None
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Requested fleet size as read from the command line, before clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotCount {
    /// No token, or a token that is not an integer.
    Default,
    Requested(i64),
}

impl RobotCount {
    pub fn from_launch_args(args: &LaunchArguments) -> Self {
        match args.get(COUNT_ARGUMENT) {
            None => Self::Default,
            Some(raw) => match raw.parse::<i64>() {
                Ok(n) => Self::Requested(n),
                Err(_) => {
                    debug!("Unparsable robot count '{}', using default of {}", raw, DEFAULT_ROBOT_COUNT);
                    Self::Default
                }
            },
        }
    }
}

/// One robot of the fleet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotSlot {
    pub index: usize,
    pub name: String,
    pub pose: Pose,
}

impl RobotSlot {
    fn new(index: usize) -> Self {
        Self {
            index,
            name: robot_name(index),
            pose: POSE_TABLE[index],
        }
    }

    /// Absolute ROS namespace of the robot, e.g. `/tb1`.
    pub fn namespace(&self) -> String {
        format!("/{}", self.name)
    }
}

/// Deterministic robot name for a slot index.
pub fn robot_name(index: usize) -> String {
    format!("tb{}", index + 1)
}

/// Something worth telling the operator about while planning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanDiagnostic {
    Clamped { requested: i64, limit: usize },
}

impl std::fmt::Display for PlanDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanDiagnostic::Clamped { requested, limit } => write!(
                f,
                "Requested {} robots but the map only has {} spawn points; launching {}",
                requested, limit, limit
            ),
        }
    }
}

/// Ordered, immutable list of robots to bring up.
///
/// # Invariants
///
/// - `1 <= len() <= MAX_ROBOTS`
/// - slot `i` has index `i`, name `tb{i+1}` and pose `POSE_TABLE[i]`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RobotSpawnPlan {
    slots: Vec<RobotSlot>,
    diagnostics: Vec<PlanDiagnostic>,
}

impl RobotSpawnPlan {
    pub fn from_request(count: RobotCount) -> Result<Self, FleetError> {
        match count {
            RobotCount::Default => Self::build(DEFAULT_ROBOT_COUNT as i64),
            RobotCount::Requested(n) => Self::build(n),
        }
    }

    pub fn build(requested: i64) -> Result<Self, FleetError> {
        if requested <= 0 {
            return Err(FleetError::NonPositiveCount(requested));
        }

        let mut diagnostics = Vec::new();
        let count = if requested > MAX_ROBOTS as i64 {
            let diagnostic = PlanDiagnostic::Clamped { requested, limit: MAX_ROBOTS };
            debug!("{}", diagnostic);
            diagnostics.push(diagnostic);
            MAX_ROBOTS
        } else {
            requested as usize
        };

        info!("Launching {} robots", count);

        Ok(Self {
            slots: (0..count).map(RobotSlot::new).collect(),
            diagnostics,
        })
    }

    pub fn slots(&self) -> &[RobotSlot] {
        &self.slots
    }

    pub fn diagnostics(&self) -> &[PlanDiagnostic] {
        &self.diagnostics
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn last(&self) -> Option<&RobotSlot> {
        self.slots.last()
    }

    pub fn was_clamped(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| matches!(d, PlanDiagnostic::Clamped { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn plan_for(tokens: &[&str]) -> Result<RobotSpawnPlan, FleetError> {
        let args = LaunchArguments::parse(tokens);
        RobotSpawnPlan::from_request(RobotCount::from_launch_args(&args))
    }

    #[test]
    fn test_missing_count_defaults_to_two() {
        let plan = plan_for(&["use_rviz:=false"]).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.slots()[0].pose, POSE_TABLE[0]);
        assert_eq!(plan.slots()[1].pose, POSE_TABLE[1]);
        assert!(plan.diagnostics().is_empty());
    }

    #[test]
    fn test_unparsable_count_defaults_to_two() {
        for raw in ["num:=three", "num:=", "num:=2.5", "num:=0x3"] {
            let plan = plan_for(&[raw]).unwrap();
            assert_eq!(plan.len(), 2, "input {}", raw);
        }
    }

    #[test]
    fn test_non_positive_count_is_rejected() {
        assert_eq!(plan_for(&["num:=0"]).unwrap_err(), FleetError::NonPositiveCount(0));
        assert_eq!(plan_for(&["num:=-4"]).unwrap_err(), FleetError::NonPositiveCount(-4));
    }

    #[test]
    fn test_counts_within_table_are_honoured() {
        for n in 1..=MAX_ROBOTS as i64 {
            let plan = RobotSpawnPlan::build(n).unwrap();
            assert_eq!(plan.len(), n as usize);
            assert!(!plan.was_clamped());
            for (i, slot) in plan.slots().iter().enumerate() {
                assert_eq!(slot.index, i);
                assert_eq!(slot.pose, POSE_TABLE[i]);
            }
        }
    }

    #[test]
    fn test_oversized_request_is_clamped_once() {
        let plan = plan_for(&["num:=9"]).unwrap();
        assert_eq!(plan.len(), MAX_ROBOTS);
        assert_eq!(
            plan.diagnostics(),
            &[PlanDiagnostic::Clamped { requested: 9, limit: MAX_ROBOTS }]
        );

        let huge = RobotSpawnPlan::build(i64::MAX).unwrap();
        assert_eq!(huge.len(), MAX_ROBOTS);
        assert_eq!(huge.diagnostics().len(), 1);
    }

    #[test]
    fn test_names_are_unique_and_deterministic() {
        let plan = RobotSpawnPlan::build(6).unwrap();
        let names: HashSet<_> = plan.slots().iter().map(|s| s.name.clone()).collect();
        assert_eq!(names.len(), 6);
        for slot in plan.slots() {
            assert_eq!(slot.name, format!("tb{}", slot.index + 1));
            assert_eq!(slot.namespace(), format!("/tb{}", slot.index + 1));
        }
    }

    #[test]
    fn test_three_robot_scenario() {
        let plan = plan_for(&["num:=3"]).unwrap();
        let got: Vec<_> = plan
            .slots()
            .iter()
            .map(|s| (s.name.as_str(), s.pose.x, s.pose.y, s.pose.z))
            .collect();
        assert_eq!(
            got,
            vec![
                ("tb1", -1.5, -0.4, 0.01),
                ("tb2", -1.5, 0.4, 0.01),
                ("tb3", -1.5, 0.9, 0.01),
            ]
        );
    }

    #[test]
    fn test_last_count_token_wins() {
        let plan = plan_for(&["num:=1", "gui:=true", "num:=4"]).unwrap();
        assert_eq!(plan.len(), 4);
    }

    #[test]
    fn test_launch_argument_booleans() {
        let args = LaunchArguments::parse(["use_rviz:=False", "use_sim_time:=TRUE", "gui:=maybe", "stray"]);
        assert_eq!(args.get_bool("use_rviz"), Some(false));
        assert_eq!(args.get_bool("use_sim_time"), Some(true));
        assert_eq!(args.get_bool("gui"), None);
        assert_eq!(args.get("stray"), None);
        assert_eq!(args.iter().count(), 3);
    }
}
