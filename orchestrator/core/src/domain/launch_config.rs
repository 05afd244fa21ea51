// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Fleet Launch Configuration
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) describing where the
// simulation assets live and how long the sequencer waits for gating units:
// - Package share directory and asset paths (world, map, URDF, model, params, RViz)
// - Simulation switches (sim time, Gazebo GUI, RViz)
// - Application executable run once per robot
// - Exit deadlines for the spawn, initial-pose and application stages

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::sequence::LaunchStage;

pub const API_VERSION: &str = "fleet.swift-scout/v1";
pub const KIND: &str = "FleetLaunchConfig";

/// Environment variable naming an explicit configuration file.
pub const CONFIG_PATH_ENV: &str = "FLEET_CONFIG_PATH";

/// Top-level configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetLaunchConfig {
    /// API version (must be "fleet.swift-scout/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "FleetLaunchConfig")
    pub kind: String,

    pub metadata: ConfigMetadata,

    pub spec: FleetLaunchSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetLaunchSpec {
    /// ROS package holding the launch files and assets
    #[serde(default = "default_package")]
    pub package: String,

    /// Share directory of `package`; looked up in AMENT_PREFIX_PATH when unset.
    /// Relative asset paths below are resolved against it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_dir: Option<PathBuf>,

    #[serde(default)]
    pub simulation: SimulationConfig,

    #[serde(default)]
    pub robot: RobotConfig,

    #[serde(default)]
    pub navigation: NavigationConfig,

    #[serde(default)]
    pub visualization: VisualizationConfig,

    #[serde(default)]
    pub application: ApplicationConfig,

    #[serde(default)]
    pub deadlines: DeadlineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_world")]
    pub world: PathBuf,

    /// Show the Gazebo client window
    #[serde(default = "default_true")]
    pub gui: bool,

    #[serde(default = "default_true")]
    pub use_sim_time: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotConfig {
    #[serde(default = "default_urdf")]
    pub urdf: PathBuf,

    /// SDF model handed to `spawn_entity.py`
    #[serde(default = "default_model")]
    pub model: PathBuf,

    /// robot_state_publisher publish frequency in Hz
    #[serde(default = "default_publish_frequency")]
    pub publish_frequency: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationConfig {
    #[serde(default = "default_params_file")]
    pub params_file: PathBuf,

    #[serde(default = "default_map")]
    pub map: PathBuf,

    /// Launch file (inside `package`) bringing up one namespaced Nav2 stack
    #[serde(default = "default_bringup_launch")]
    pub bringup_launch: String,

    /// Package providing the behavior tree XML
    #[serde(default = "default_bt_package")]
    pub bt_package: String,

    /// Behavior tree path relative to `bt_package`'s share directory
    #[serde(default = "default_behavior_tree")]
    pub behavior_tree: PathBuf,

    #[serde(default = "default_nav_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualizationConfig {
    /// Start one RViz per robot (`use_rviz`)
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_rviz_config")]
    pub rviz_config: PathBuf,

    #[serde(default = "default_rviz_launch")]
    pub launch_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    #[serde(default = "default_package")]
    pub package: String,

    #[serde(default = "default_application")]
    pub executable: String,
}

/// How long the sequencer waits for a gating unit to exit.
/// `null` waits forever.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadlineConfig {
    #[serde(default = "default_spawn_deadline", with = "humantime_serde")]
    pub spawn: Option<Duration>,

    #[serde(default = "default_initial_pose_deadline", with = "humantime_serde")]
    pub initial_pose: Option<Duration>,

    #[serde(default, with = "humantime_serde")]
    pub application: Option<Duration>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            world: default_world(),
            gui: true,
            use_sim_time: true,
        }
    }
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            urdf: default_urdf(),
            model: default_model(),
            publish_frequency: default_publish_frequency(),
        }
    }
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            params_file: default_params_file(),
            map: default_map(),
            bringup_launch: default_bringup_launch(),
            bt_package: default_bt_package(),
            behavior_tree: default_behavior_tree(),
            log_level: default_nav_log_level(),
        }
    }
}

impl Default for VisualizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rviz_config: default_rviz_config(),
            launch_file: default_rviz_launch(),
        }
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            package: default_package(),
            executable: default_application(),
        }
    }
}

impl DeadlineConfig {
    /// Exit deadline for a unit of `stage`. Only stages that gate another
    /// group carry one.
    pub fn for_stage(&self, stage: LaunchStage) -> Option<Duration> {
        match stage {
            LaunchStage::Spawn => self.spawn,
            LaunchStage::InitialPose => self.initial_pose,
            LaunchStage::RunApplication => self.application,
            LaunchStage::StatePublish | LaunchStage::BringupNav | LaunchStage::Visualize => None,
        }
    }

    /// The same deadline for every gating stage.
    pub fn uniform(limit: Option<Duration>) -> Self {
        Self {
            spawn: limit,
            initial_pose: limit,
            application: limit,
        }
    }
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self {
            spawn: default_spawn_deadline(),
            initial_pose: default_initial_pose_deadline(),
            application: None,
        }
    }
}

impl Default for FleetLaunchSpec {
    fn default() -> Self {
        Self {
            package: default_package(),
            share_dir: None,
            simulation: SimulationConfig::default(),
            robot: RobotConfig::default(),
            navigation: NavigationConfig::default(),
            visualization: VisualizationConfig::default(),
            application: ApplicationConfig::default(),
            deadlines: DeadlineConfig::default(),
        }
    }
}

impl Default for FleetLaunchConfig {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ConfigMetadata {
                name: "swift-scout".to_string(),
                version: None,
            },
            spec: FleetLaunchSpec::default(),
        }
    }
}

impl FleetLaunchConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Candidate configuration files, highest precedence first
    /// 1. FLEET_CONFIG_PATH environment variable
    /// 2. ./fleet-launch.yaml (working directory)
    /// 3. ~/.fleet-launch/config.yaml (user home)
    /// 4. /etc/fleet-launch/config.yaml
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            paths.push(PathBuf::from(path));
        }
        paths.push(PathBuf::from("./fleet-launch.yaml"));
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".fleet-launch").join("config.yaml"));
        }
        paths.push(PathBuf::from("/etc/fleet-launch/config.yaml"));
        paths
    }

    pub fn discover_config() -> Option<PathBuf> {
        Self::search_paths().into_iter().find(|p| p.exists())
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::debug!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Some(value) = env_flag("FLEET_USE_RVIZ") {
            self.spec.visualization.enabled = value;
        }
        if let Some(value) = env_flag("FLEET_USE_SIM_TIME") {
            self.spec.simulation.use_sim_time = value;
        }
        if let Some(value) = env_flag("FLEET_GAZEBO_GUI") {
            self.spec.simulation.gui = value;
        }
        if let Ok(dir) = std::env::var("FLEET_SHARE_DIR") {
            tracing::info!("Environment override: FLEET_SHARE_DIR={}", dir);
            self.spec.share_dir = Some(PathBuf::from(dir));
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let spec = &self.spec;
        if spec.package.is_empty() {
            anyhow::bail!("spec.package cannot be empty");
        }
        if spec.application.package.is_empty() || spec.application.executable.is_empty() {
            anyhow::bail!("spec.application must name a package and an executable");
        }
        if !(spec.robot.publish_frequency > 0.0) {
            anyhow::bail!(
                "spec.robot.publish_frequency must be positive, got {}",
                spec.robot.publish_frequency
            );
        }
        if spec.navigation.bringup_launch.is_empty() || spec.visualization.launch_file.is_empty() {
            anyhow::bail!("Launch file names cannot be empty");
        }

        for (name, deadline) in [
            ("spawn", spec.deadlines.spawn),
            ("initial_pose", spec.deadlines.initial_pose),
            ("application", spec.deadlines.application),
        ] {
            if deadline == Some(Duration::ZERO) {
                anyhow::bail!("spec.deadlines.{} must be longer than zero", name);
            }
        }

        Ok(())
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => {
            tracing::info!("Environment override: {}=true", name);
            Some(true)
        }
        "false" | "0" | "no" | "off" => {
            tracing::info!("Environment override: {}=false", name);
            Some(false)
        }
        _ => {
            tracing::warn!(
                "Invalid value for {}: '{}'. Expected true/false. Ignoring.",
                name,
                val
            );
            None
        }
    }
}

/// Locate `<prefix>/share/<package>` on AMENT_PREFIX_PATH.
pub fn find_package_share(package: &str) -> Option<PathBuf> {
    let prefixes = std::env::var_os("AMENT_PREFIX_PATH")?;
    std::env::split_paths(&prefixes)
        .map(|prefix| prefix.join("share").join(package))
        .find(|candidate| candidate.is_dir())
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_package() -> String {
    "swift_scout".to_string()
}

fn default_world() -> PathBuf {
    PathBuf::from("worlds/person.world")
}

fn default_urdf() -> PathBuf {
    PathBuf::from("urdf/turtlebot3_waffle.urdf")
}

fn default_model() -> PathBuf {
    PathBuf::from("model/turtlebot3_waffle/model.sdf")
}

fn default_publish_frequency() -> f64 {
    10.0
}

fn default_params_file() -> PathBuf {
    PathBuf::from("param/nav2_params.yaml")
}

fn default_map() -> PathBuf {
    PathBuf::from("map/map.yaml")
}

fn default_bringup_launch() -> String {
    "bringup_launch.py".to_string()
}

fn default_bt_package() -> String {
    "nav2_bt_navigator".to_string()
}

fn default_behavior_tree() -> PathBuf {
    PathBuf::from("behavior_trees/navigate_w_replanning_and_recovery.xml")
}

fn default_nav_log_level() -> String {
    "warn".to_string()
}

fn default_rviz_config() -> PathBuf {
    PathBuf::from("rviz/multi_nav2_default_view.rviz")
}

fn default_rviz_launch() -> String {
    "rviz_launch.py".to_string()
}

fn default_application() -> String {
    "scout".to_string()
}

fn default_spawn_deadline() -> Option<Duration> {
    Some(Duration::from_secs(120))
}

fn default_initial_pose_deadline() -> Option<Duration> {
    Some(Duration::from_secs(60))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest() {
        let config = FleetLaunchConfig::default();
        assert_eq!(config.api_version, API_VERSION);
        assert_eq!(config.kind, KIND);
        assert_eq!(config.spec.package, "swift_scout");
        assert!(config.spec.visualization.enabled);
        assert_eq!(config.spec.deadlines.spawn, Some(Duration::from_secs(120)));
        assert_eq!(config.spec.deadlines.application, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_minimal_yaml_fills_defaults() {
        let yaml = r#"
apiVersion: fleet.swift-scout/v1
kind: FleetLaunchConfig
metadata:
  name: lab
spec:
  share_dir: /opt/ws/install/swift_scout/share/swift_scout
  visualization:
    enabled: false
  deadlines:
    spawn: 45s
    application: 10m
"#;
        let config = FleetLaunchConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(
            config.spec.share_dir.as_deref(),
            Some(Path::new("/opt/ws/install/swift_scout/share/swift_scout"))
        );
        assert!(!config.spec.visualization.enabled);
        assert_eq!(config.spec.visualization.launch_file, "rviz_launch.py");
        assert_eq!(config.spec.deadlines.spawn, Some(Duration::from_secs(45)));
        assert_eq!(config.spec.deadlines.initial_pose, Some(Duration::from_secs(60)));
        assert_eq!(config.spec.deadlines.application, Some(Duration::from_secs(600)));
        assert_eq!(config.spec.robot.publish_frequency, 10.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleet-launch.yaml");

        let mut config = FleetLaunchConfig::default();
        config.metadata.name = "warehouse".to_string();
        config.spec.deadlines.initial_pose = None;
        config.to_yaml_file(&path).unwrap();

        let loaded = FleetLaunchConfig::load_or_default(Some(path)).unwrap();
        assert_eq!(loaded.metadata.name, "warehouse");
        assert_eq!(loaded.spec.deadlines.initial_pose, None);
        assert_eq!(loaded.spec.navigation.map, PathBuf::from("map/map.yaml"));
    }

    #[test]
    fn test_explicit_missing_path_fails() {
        let result = FleetLaunchConfig::load_or_default(Some(PathBuf::from("/nonexistent/fleet.yaml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_validation() {
        let mut config = FleetLaunchConfig::default();

        config.api_version = "wrong/v1".to_string();
        assert!(config.validate().is_err());
        config.api_version = API_VERSION.to_string();

        config.kind = "NodeConfig".to_string();
        assert!(config.validate().is_err());
        config.kind = KIND.to_string();

        config.metadata.name = "".to_string();
        assert!(config.validate().is_err());
        config.metadata.name = "lab".to_string();

        config.spec.robot.publish_frequency = 0.0;
        assert!(config.validate().is_err());
        config.spec.robot.publish_frequency = 10.0;

        config.spec.deadlines.spawn = Some(Duration::ZERO);
        assert!(config.validate().is_err());
        config.spec.deadlines.spawn = None;
        assert!(config.validate().is_ok());
    }
}
