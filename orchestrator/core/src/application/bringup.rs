// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Bring-up Catalog
//!
//! Maps every `(robot, stage)` of a [`SequencePlan`](crate::domain::sequence::SequencePlan)
//! to the concrete ROS2 unit that realises it, plus the shared environment
//! (Gazebo, map server, map-server lifecycle manager) that runs before any robot.
//!
//! | Stage | Unit |
//! |-------|------|
//! | StatePublish | `robot_state_publisher` in `/tbN` |
//! | Spawn | `gazebo_ros spawn_entity.py` at the slot pose |
//! | BringupNav | namespaced Nav2 bring-up launch file |
//! | InitialPose | `ros2 topic pub -t 3 /tbN/initialpose` |
//! | Visualize | RViz launch file in `/tbN` |
//! | RunApplication | scouting executable with the robot name |

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::application::sequencer::UnitSource;
use crate::domain::fleet::{LaunchArguments, RobotSlot};
use crate::domain::launch_config::{find_package_share, ApplicationConfig, DeadlineConfig, FleetLaunchConfig};
use crate::domain::launcher::{OutputPolicy, ProcessSpec};
use crate::domain::sequence::{LaunchStage, PlanOptions, PlannedAction};

/// Launch arguments that override configuration values.
pub const USE_RVIZ_ARGUMENT: &str = "use_rviz";
pub const USE_SIM_TIME_ARGUMENT: &str = "use_sim_time";
pub const RVIZ_CONFIG_ARGUMENT: &str = "rviz_config_file";
pub const PARAMS_FILE_ARGUMENT: &str = "params_file";

/// Configuration with every path resolved and every launch argument applied.
#[derive(Debug, Clone)]
pub struct LaunchSettings {
    pub package: String,
    pub share_dir: PathBuf,
    pub world: PathBuf,
    pub map: PathBuf,
    pub urdf: PathBuf,
    pub model: PathBuf,
    pub params_file: PathBuf,
    pub rviz_config: PathBuf,
    pub behavior_tree: PathBuf,
    pub bringup_launch: String,
    pub rviz_launch: String,
    pub nav_log_level: String,
    pub publish_frequency: f64,
    pub use_sim_time: bool,
    pub use_rviz: bool,
    pub gui: bool,
    pub application: ApplicationConfig,
    pub deadlines: DeadlineConfig,
}

impl LaunchSettings {
    pub fn resolve(config: &FleetLaunchConfig, args: &LaunchArguments) -> Self {
        let spec = &config.spec;
        let share_dir = spec
            .share_dir
            .clone()
            .unwrap_or_else(|| share_or_placeholder(&spec.package));
        let bt_share = share_or_placeholder(&spec.navigation.bt_package);

        let params_file = args
            .get(PARAMS_FILE_ARGUMENT)
            .map(PathBuf::from)
            .unwrap_or_else(|| share_dir.join(&spec.navigation.params_file));
        let rviz_config = args
            .get(RVIZ_CONFIG_ARGUMENT)
            .map(PathBuf::from)
            .unwrap_or_else(|| share_dir.join(&spec.visualization.rviz_config));

        Self {
            package: spec.package.clone(),
            world: share_dir.join(&spec.simulation.world),
            map: share_dir.join(&spec.navigation.map),
            urdf: share_dir.join(&spec.robot.urdf),
            model: share_dir.join(&spec.robot.model),
            behavior_tree: bt_share.join(&spec.navigation.behavior_tree),
            params_file,
            rviz_config,
            share_dir,
            bringup_launch: spec.navigation.bringup_launch.clone(),
            rviz_launch: spec.visualization.launch_file.clone(),
            nav_log_level: spec.navigation.log_level.clone(),
            publish_frequency: spec.robot.publish_frequency,
            use_sim_time: args
                .get_bool(USE_SIM_TIME_ARGUMENT)
                .unwrap_or(spec.simulation.use_sim_time),
            use_rviz: args
                .get_bool(USE_RVIZ_ARGUMENT)
                .unwrap_or(spec.visualization.enabled),
            gui: spec.simulation.gui,
            application: spec.application.clone(),
            deadlines: spec.deadlines.clone(),
        }
    }

    pub fn plan_options(&self) -> PlanOptions {
        PlanOptions {
            visualize: self.use_rviz,
        }
    }

    /// How long the sequencer waits for a unit of `stage` to exit.
    pub fn deadline_for(&self, stage: LaunchStage) -> Option<Duration> {
        self.deadlines.for_stage(stage)
    }
}

fn share_or_placeholder(package: &str) -> PathBuf {
    find_package_share(package).unwrap_or_else(|| {
        warn!(
            "Package '{}' not found on AMENT_PREFIX_PATH; using relative share/{}",
            package, package
        );
        Path::new("share").join(package)
    })
}

fn flag(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

fn coord(value: f64) -> String {
    format!("{:?}", value)
}

fn path(value: &Path) -> String {
    value.display().to_string()
}

/// Builds the [`ProcessSpec`]s of a fleet bring-up.
#[derive(Debug, Clone)]
pub struct BringupCatalog {
    settings: LaunchSettings,
}

impl BringupCatalog {
    pub fn new(settings: LaunchSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &LaunchSettings {
        &self.settings
    }

    /// Shared simulation units, started once before the first robot.
    pub fn environment_units(&self) -> Vec<ProcessSpec> {
        let s = &self.settings;
        vec![
            ProcessSpec::include("gazebo", "gazebo_ros", "gazebo.launch.py")
                .launch_arg("world", path(&s.world))
                .launch_arg("gui", flag(s.gui)),
            ProcessSpec::node("map_server", "nav2_map_server", "map_server")
                .node_name("map_server")
                .param("yaml_filename", path(&s.map))
                .remap("/tf", "tf")
                .remap("/tf_static", "tf_static"),
            ProcessSpec::node(
                "lifecycle_manager_map_server",
                "nav2_lifecycle_manager",
                "lifecycle_manager",
            )
            .node_name("lifecycle_manager_map_server")
            .param("use_sim_time", flag(s.use_sim_time))
            .param("autostart", "true")
            .param("node_names", "['map_server']"),
        ]
    }

    pub fn unit(&self, slot: &RobotSlot, stage: LaunchStage) -> ProcessSpec {
        let s = &self.settings;
        let label = format!("{}/{}", slot.name, stage);
        let namespace = slot.namespace();

        match stage {
            LaunchStage::StatePublish => {
                ProcessSpec::node(label, "robot_state_publisher", "robot_state_publisher")
                    .namespace(namespace)
                    .arg(path(&s.urdf))
                    .param("use_sim_time", flag(s.use_sim_time))
                    .param("publish_frequency", coord(s.publish_frequency))
                    .remap("/tf", "tf")
                    .remap("/tf_static", "tf_static")
            }
            LaunchStage::Spawn => ProcessSpec::node(label, "gazebo_ros", "spawn_entity.py").args([
                "-file".to_string(),
                path(&s.model),
                "-entity".to_string(),
                slot.name.clone(),
                "-robot_namespace".to_string(),
                namespace,
                "-x".to_string(),
                coord(slot.pose.x),
                "-y".to_string(),
                coord(slot.pose.y),
                "-z".to_string(),
                coord(slot.pose.z),
                "-Y".to_string(),
                "0.0".to_string(),
                "-unpause".to_string(),
            ]),
            LaunchStage::BringupNav => ProcessSpec::include(label, s.package.clone(), s.bringup_launch.clone())
                .launch_arg("slam", "False")
                .launch_arg("namespace", namespace)
                .launch_arg("use_namespace", "True")
                .launch_arg("map", "")
                .launch_arg("map_server", "False")
                .launch_arg("params_file", path(&s.params_file))
                .launch_arg("default_bt_xml_filename", path(&s.behavior_tree))
                .launch_arg("autostart", "true")
                .launch_arg("use_sim_time", flag(s.use_sim_time))
                .launch_arg("log_level", s.nav_log_level.clone()),
            LaunchStage::InitialPose => ProcessSpec::command(label, "ros2").args([
                "topic".to_string(),
                "pub".to_string(),
                "-t".to_string(),
                "3".to_string(),
                "--qos-reliability".to_string(),
                "reliable".to_string(),
                format!("{}/initialpose", namespace),
                "geometry_msgs/PoseWithCovarianceStamped".to_string(),
                initial_pose_message(slot),
            ]),
            LaunchStage::Visualize => ProcessSpec::include(label, s.package.clone(), s.rviz_launch.clone())
                .launch_arg("use_sim_time", flag(s.use_sim_time))
                .launch_arg("namespace", namespace)
                .launch_arg("use_namespace", "True")
                .launch_arg("rviz_config", path(&s.rviz_config))
                .launch_arg("log_level", s.nav_log_level.clone()),
            LaunchStage::RunApplication => ProcessSpec::node(
                label,
                s.application.package.clone(),
                s.application.executable.clone(),
            )
            .arg(slot.name.clone())
            .output(OutputPolicy::Log)
            .shell(true),
        }
    }
}

impl UnitSource for BringupCatalog {
    fn unit_for(&self, action: &PlannedAction) -> ProcessSpec {
        self.unit(&action.slot, action.stage)
    }
}

/// `PoseWithCovarianceStamped` in YAML flow style, published 10 cm above the
/// spawn point so AMCL starts from where the robot was dropped.
fn initial_pose_message(slot: &RobotSlot) -> String {
    format!(
        "{{header: {{frame_id: map}}, pose: {{pose: {{position: {{x: {}, y: {}, z: 0.1}}, \
         orientation: {{x: 0.0, y: 0.0, z: 0.0, w: 1.0000000}}}}, }}}}",
        coord(slot.pose.x),
        coord(slot.pose.y)
    )
}
