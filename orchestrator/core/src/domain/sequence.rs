// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Bring-up Sequence Domain
//!
//! A [`SequencePlan`] is the explicit dependency graph of a fleet bring-up.
//! Every robot contributes one stage-group to each of three pipelines:
//!
//! | Pipeline | Stages | First group waits for | Next group waits for |
//! |----------|--------|-----------------------|----------------------|
//! | `Spawn` | StatePublish, Spawn, BringupNav | nothing | previous robot's Spawn exit |
//! | `Pose` | InitialPose, Visualize | last robot's Spawn exit | previous robot's InitialPose exit |
//! | `App` | RunApplication | last robot's InitialPose exit | previous robot's RunApplication exit |
//!
//! Spawning several entities into Gazebo at once is unreliable, so each
//! pipeline is strictly linear. Edges always point at an action of an earlier
//! group, which keeps the graph acyclic.

use crate::domain::fleet::{RobotSlot, RobotSpawnPlan};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionId(pub usize);

impl std::fmt::Display for ActionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "a{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub usize);

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "g{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchStage {
    StatePublish,
    Spawn,
    BringupNav,
    InitialPose,
    Visualize,
    RunApplication,
}

impl LaunchStage {
    pub const ALL: [LaunchStage; 6] = [
        LaunchStage::StatePublish,
        LaunchStage::Spawn,
        LaunchStage::BringupNav,
        LaunchStage::InitialPose,
        LaunchStage::Visualize,
        LaunchStage::RunApplication,
    ];

    pub fn pipeline(&self) -> Pipeline {
        match self {
            LaunchStage::StatePublish | LaunchStage::Spawn | LaunchStage::BringupNav => Pipeline::Spawn,
            LaunchStage::InitialPose | LaunchStage::Visualize => Pipeline::Pose,
            LaunchStage::RunApplication => Pipeline::App,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LaunchStage::StatePublish => "state_publish",
            LaunchStage::Spawn => "spawn",
            LaunchStage::BringupNav => "bringup_nav",
            LaunchStage::InitialPose => "initial_pose",
            LaunchStage::Visualize => "visualize",
            LaunchStage::RunApplication => "run_application",
        }
    }
}

impl std::fmt::Display for LaunchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pipeline {
    Spawn,
    Pose,
    App,
}

impl Pipeline {
    pub const ALL: [Pipeline; 3] = [Pipeline::Spawn, Pipeline::Pose, Pipeline::App];

    /// The stage whose exit releases the next group of this pipeline.
    pub fn gate_stage(&self) -> LaunchStage {
        match self {
            Pipeline::Spawn => LaunchStage::Spawn,
            Pipeline::Pose => LaunchStage::InitialPose,
            Pipeline::App => LaunchStage::RunApplication,
        }
    }

    /// Stages of one group, in launch order.
    pub fn stages(&self, options: &PlanOptions) -> Vec<LaunchStage> {
        match self {
            Pipeline::Spawn => vec![LaunchStage::StatePublish, LaunchStage::Spawn, LaunchStage::BringupNav],
            Pipeline::Pose if options.visualize => vec![LaunchStage::InitialPose, LaunchStage::Visualize],
            Pipeline::Pose => vec![LaunchStage::InitialPose],
            Pipeline::App => vec![LaunchStage::RunApplication],
        }
    }
}

impl std::fmt::Display for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pipeline::Spawn => f.write_str("spawn"),
            Pipeline::Pose => f.write_str("pose"),
            Pipeline::App => f.write_str("app"),
        }
    }
}

/// What a stage-group waits for before its actions are launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "on", content = "action", rename_all = "snake_case")]
pub enum Trigger {
    Immediate,
    OnExit(ActionId),
}

impl Trigger {
    fn after(last: Option<ActionId>) -> Self {
        last.map_or(Trigger::Immediate, Trigger::OnExit)
    }

    pub fn awaited(&self) -> Option<ActionId> {
        match self {
            Trigger::Immediate => None,
            Trigger::OnExit(id) => Some(*id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanOptions {
    /// Include the RViz stage in every pose group.
    pub visualize: bool,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self { visualize: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedAction {
    pub id: ActionId,
    pub group: GroupId,
    pub slot: RobotSlot,
    pub stage: LaunchStage,
}

impl PlannedAction {
    /// Human-readable unit label, e.g. `tb2/spawn`.
    pub fn label(&self) -> String {
        format!("{}/{}", self.slot.name, self.stage)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageGroup {
    pub id: GroupId,
    pub pipeline: Pipeline,
    pub slot_index: usize,
    pub robot: String,
    pub actions: Vec<ActionId>,
    /// Action of this group whose exit releases the next group of the pipeline.
    pub gate: ActionId,
    pub trigger: Trigger,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("Group {group} for {robot} has no {stage} action")]
    MissingGate { group: GroupId, robot: String, stage: LaunchStage },
    #[error("Group {group} waits for unknown action {action}")]
    DanglingTrigger { group: GroupId, action: ActionId },
    #[error("Group {group} waits for action {action} of a later group; the sequence would never start")]
    ForwardTrigger { group: GroupId, action: ActionId },
    #[error("{robot} has more than one {stage} action")]
    DuplicateStage { robot: String, stage: LaunchStage },
    #[error("Sequence plan has no groups")]
    Empty,
}

/// Accumulates groups while walking the fleet; owned by a single build call.
struct SequencePlanBuilder {
    options: PlanOptions,
    actions: Vec<PlannedAction>,
    groups: Vec<StageGroup>,
}

impl SequencePlanBuilder {
    fn new(options: PlanOptions) -> Self {
        Self {
            options,
            actions: Vec::new(),
            groups: Vec::new(),
        }
    }

    /// Append one stage-group and return the id of its gate action.
    fn push_group(
        &mut self,
        pipeline: Pipeline,
        slot: &RobotSlot,
        trigger: Trigger,
    ) -> Result<ActionId, PlanError> {
        let group = GroupId(self.groups.len());
        let gate_stage = pipeline.gate_stage();
        let mut gate = None;
        let mut ids = Vec::new();

        for stage in pipeline.stages(&self.options) {
            let id = ActionId(self.actions.len());
            if stage == gate_stage {
                gate = Some(id);
            }
            self.actions.push(PlannedAction {
                id,
                group,
                slot: slot.clone(),
                stage,
            });
            ids.push(id);
        }

        let gate = gate.ok_or_else(|| PlanError::MissingGate {
            group,
            robot: slot.name.clone(),
            stage: gate_stage,
        })?;

        self.groups.push(StageGroup {
            id: group,
            pipeline,
            slot_index: slot.index,
            robot: slot.name.clone(),
            actions: ids,
            gate,
            trigger,
        });

        Ok(gate)
    }

    fn finish(self) -> SequencePlan {
        SequencePlan {
            options: self.options,
            actions: self.actions,
            groups: self.groups,
        }
    }
}

/// Explicit, inspectable bring-up graph for a [`RobotSpawnPlan`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequencePlan {
    options: PlanOptions,
    actions: Vec<PlannedAction>,
    groups: Vec<StageGroup>,
}

impl SequencePlan {
    /// Chain the three pipelines one after another. Each pipeline carries its
    /// own "last gate" pointer forward, seeded with the previous pipeline's
    /// final gate.
    pub fn build(fleet: &RobotSpawnPlan, options: PlanOptions) -> Result<Self, PlanError> {
        let mut builder = SequencePlanBuilder::new(options);
        let mut last: Option<ActionId> = None;

        for pipeline in Pipeline::ALL {
            for slot in fleet.slots() {
                let gate = builder.push_group(pipeline, slot, Trigger::after(last))?;
                last = Some(gate);
            }
        }

        Ok(builder.finish())
    }

    pub fn options(&self) -> &PlanOptions {
        &self.options
    }

    pub fn actions(&self) -> &[PlannedAction] {
        &self.actions
    }

    pub fn groups(&self) -> &[StageGroup] {
        &self.groups
    }

    pub fn action(&self, id: ActionId) -> Option<&PlannedAction> {
        self.actions.get(id.0)
    }

    pub fn group(&self, id: GroupId) -> Option<&StageGroup> {
        self.groups.get(id.0)
    }

    pub fn group_of(&self, action: ActionId) -> Option<&StageGroup> {
        self.action(action).and_then(|a| self.group(a.group))
    }

    /// Groups released by the exit of `action`.
    pub fn dependents_of(&self, action: ActionId) -> Vec<GroupId> {
        self.groups
            .iter()
            .filter(|g| g.trigger == Trigger::OnExit(action))
            .map(|g| g.id)
            .collect()
    }

    /// Actions whose exit some group is waiting for.
    pub fn gating_actions(&self) -> BTreeSet<ActionId> {
        self.groups.iter().filter_map(|g| g.trigger.awaited()).collect()
    }

    pub fn immediate_groups(&self) -> impl Iterator<Item = &StageGroup> {
        self.groups.iter().filter(|g| g.trigger == Trigger::Immediate)
    }

    pub fn pipeline_groups(&self, pipeline: Pipeline) -> impl Iterator<Item = &StageGroup> {
        self.groups.iter().filter(move |g| g.pipeline == pipeline)
    }

    /// Stages planned for one robot, in plan order.
    pub fn stages_for(&self, slot_index: usize) -> Vec<LaunchStage> {
        self.actions
            .iter()
            .filter(|a| a.slot.index == slot_index)
            .map(|a| a.stage)
            .collect()
    }

    /// Find the action for a robot stage.
    pub fn find(&self, slot_index: usize, stage: LaunchStage) -> Option<&PlannedAction> {
        self.actions
            .iter()
            .find(|a| a.slot.index == slot_index && a.stage == stage)
    }

    /// Check the graph invariants: known targets, backward-only edges and one
    /// action per robot stage.
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.groups.is_empty() {
            return Err(PlanError::Empty);
        }

        for group in &self.groups {
            if !group.actions.contains(&group.gate) {
                return Err(PlanError::MissingGate {
                    group: group.id,
                    robot: group.robot.clone(),
                    stage: group.pipeline.gate_stage(),
                });
            }

            if let Some(awaited) = group.trigger.awaited() {
                let target = self.action(awaited).ok_or(PlanError::DanglingTrigger {
                    group: group.id,
                    action: awaited,
                })?;
                if target.group >= group.id {
                    return Err(PlanError::ForwardTrigger {
                        group: group.id,
                        action: awaited,
                    });
                }
            }
        }

        let mut seen = HashSet::new();
        for action in &self.actions {
            if !seen.insert((action.slot.index, action.stage)) {
                return Err(PlanError::DuplicateStage {
                    robot: action.slot.name.clone(),
                    stage: action.stage,
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(n: i64, visualize: bool) -> SequencePlan {
        let fleet = RobotSpawnPlan::build(n).unwrap();
        SequencePlan::build(&fleet, PlanOptions { visualize }).unwrap()
    }

    fn gate(plan: &SequencePlan, slot: usize, stage: LaunchStage) -> ActionId {
        plan.find(slot, stage).unwrap().id
    }

    #[test]
    fn test_first_spawn_group_is_immediate_and_only_one() {
        let plan = plan(4, true);
        let immediate: Vec<_> = plan.immediate_groups().collect();
        assert_eq!(immediate.len(), 1);
        assert_eq!(immediate[0].robot, "tb1");
        assert_eq!(immediate[0].pipeline, Pipeline::Spawn);
    }

    #[test]
    fn test_spawn_chain_is_linear() {
        let plan = plan(5, true);
        let groups: Vec<_> = plan.pipeline_groups(Pipeline::Spawn).collect();
        assert_eq!(groups.len(), 5);
        for pair in groups.windows(2) {
            let previous_spawn = gate(&plan, pair[0].slot_index, LaunchStage::Spawn);
            assert_eq!(pair[1].trigger, Trigger::OnExit(previous_spawn));
            assert_eq!(pair[1].slot_index, pair[0].slot_index + 1);
        }
    }

    #[test]
    fn test_pose_chain_waits_for_terminal_spawn() {
        let plan = plan(3, true);
        let poses: Vec<_> = plan.pipeline_groups(Pipeline::Pose).collect();
        assert_eq!(poses[0].trigger, Trigger::OnExit(gate(&plan, 2, LaunchStage::Spawn)));
        assert_eq!(poses[1].trigger, Trigger::OnExit(gate(&plan, 0, LaunchStage::InitialPose)));
        assert_eq!(poses[2].trigger, Trigger::OnExit(gate(&plan, 1, LaunchStage::InitialPose)));
    }

    #[test]
    fn test_app_chain_waits_for_terminal_pose() {
        let plan = plan(3, true);
        let apps: Vec<_> = plan.pipeline_groups(Pipeline::App).collect();
        assert_eq!(apps[0].trigger, Trigger::OnExit(gate(&plan, 2, LaunchStage::InitialPose)));
        assert_eq!(apps[1].trigger, Trigger::OnExit(gate(&plan, 0, LaunchStage::RunApplication)));
        assert_eq!(apps[2].trigger, Trigger::OnExit(gate(&plan, 1, LaunchStage::RunApplication)));
    }

    #[test]
    fn test_single_robot_chains_through_its_own_gates() {
        let plan = plan(1, true);
        assert_eq!(plan.groups().len(), 3);
        assert_eq!(plan.groups()[1].trigger, Trigger::OnExit(gate(&plan, 0, LaunchStage::Spawn)));
        assert_eq!(plan.groups()[2].trigger, Trigger::OnExit(gate(&plan, 0, LaunchStage::InitialPose)));
    }

    #[test]
    fn test_robot_stages_in_order() {
        let plan = plan(2, true);
        assert_eq!(plan.stages_for(1), LaunchStage::ALL.to_vec());
        for action in plan.actions() {
            assert_eq!(action.stage.pipeline(), plan.group(action.group).unwrap().pipeline);
        }
    }

    #[test]
    fn test_visualize_can_be_dropped() {
        let plan = plan(2, false);
        assert!(plan.actions().iter().all(|a| a.stage != LaunchStage::Visualize));
        assert_eq!(plan.actions().len(), 2 * 5);
        plan.validate().unwrap();
    }

    #[test]
    fn test_gating_actions_and_dependents() {
        let plan = plan(3, true);
        let gating = plan.gating_actions();
        // three spawns, three initial poses, first two applications
        assert_eq!(gating.len(), 8);
        let last_app = gate(&plan, 2, LaunchStage::RunApplication);
        assert!(!gating.contains(&last_app));
        assert!(plan.dependents_of(last_app).is_empty());

        let last_spawn = gate(&plan, 2, LaunchStage::Spawn);
        let released = plan.dependents_of(last_spawn);
        assert_eq!(released.len(), 1);
        let group = plan.group(released[0]).unwrap();
        assert_eq!((group.pipeline, group.robot.as_str()), (Pipeline::Pose, "tb1"));
    }

    #[test]
    fn test_built_plans_validate() {
        for n in 1..=6 {
            plan(n, true).validate().unwrap();
        }
    }

    #[test]
    fn test_validation_rejects_broken_edges() {
        let mut broken = plan(2, true);
        broken.groups[1].trigger = Trigger::OnExit(ActionId(999));
        assert!(matches!(broken.validate(), Err(PlanError::DanglingTrigger { .. })));

        let mut cyclic = plan(2, true);
        let own_gate = cyclic.groups[1].gate;
        cyclic.groups[1].trigger = Trigger::OnExit(own_gate);
        assert!(matches!(cyclic.validate(), Err(PlanError::ForwardTrigger { .. })));

        let mut duplicated = plan(2, true);
        duplicated.actions[4].slot = duplicated.actions[1].slot.clone();
        duplicated.actions[4].stage = duplicated.actions[1].stage;
        assert!(matches!(duplicated.validate(), Err(PlanError::DuplicateStage { .. })));
    }
}
