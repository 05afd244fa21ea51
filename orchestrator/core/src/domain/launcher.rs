// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// What kind of ROS2 unit a [`ProcessSpec`] describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UnitKind {
    /// `ros2 run <package> <executable>`
    Node { package: String, executable: String },
    /// `ros2 launch <package> <launch_file>`
    Include { package: String, launch_file: String },
    /// Any other program, run as-is.
    Command { program: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputPolicy {
    /// Inherit the launcher's stdout/stderr.
    #[default]
    Screen,
    /// Capture output and forward it to the log.
    Log,
}

/// Launcher-neutral description of one unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSpec {
    /// Unique label within a launch, e.g. `tb1/spawn` or `map_server`.
    pub name: String,
    pub kind: UnitKind,
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    #[serde(default)]
    pub remappings: Vec<(String, String)>,
    #[serde(default)]
    pub launch_arguments: BTreeMap<String, String>,
    #[serde(default)]
    pub output: OutputPolicy,
    /// Run through `sh -c` instead of executing the argv directly.
    #[serde(default)]
    pub shell: bool,
}

impl ProcessSpec {
    pub fn node(name: impl Into<String>, package: impl Into<String>, executable: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            UnitKind::Node {
                package: package.into(),
                executable: executable.into(),
            },
        )
    }

    pub fn include(name: impl Into<String>, package: impl Into<String>, launch_file: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            UnitKind::Include {
                package: package.into(),
                launch_file: launch_file.into(),
            },
        )
    }

    pub fn command(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self::with_kind(name, UnitKind::Command { program: program.into() })
    }

    fn with_kind(name: impl Into<String>, kind: UnitKind) -> Self {
        Self {
            name: name.into(),
            kind,
            arguments: Vec::new(),
            namespace: None,
            node_name: None,
            parameters: BTreeMap::new(),
            remappings: Vec::new(),
            launch_arguments: BTreeMap::new(),
            output: OutputPolicy::Screen,
            shell: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.arguments.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn node_name(mut self, node_name: impl Into<String>) -> Self {
        self.node_name = Some(node_name.into());
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn remap(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.remappings.push((from.into(), to.into()));
        self
    }

    pub fn launch_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.launch_arguments.insert(key.into(), value.into());
        self
    }

    pub fn output(mut self, output: OutputPolicy) -> Self {
        self.output = output;
        self
    }

    pub fn shell(mut self, shell: bool) -> Self {
        self.shell = shell;
        self
    }

    /// Render the unit as a `ros2` command line.
    pub fn command_line(&self) -> Vec<String> {
        let mut argv = Vec::new();
        match &self.kind {
            UnitKind::Node { package, executable } => {
                argv.extend(["ros2".to_string(), "run".to_string(), package.clone(), executable.clone()]);
                argv.extend(self.arguments.iter().cloned());

                let mut ros_args = Vec::new();
                if let Some(namespace) = &self.namespace {
                    ros_args.extend(["-r".to_string(), format!("__ns:={}", namespace)]);
                }
                if let Some(node_name) = &self.node_name {
                    ros_args.extend(["-r".to_string(), format!("__node:={}", node_name)]);
                }
                for (key, value) in &self.parameters {
                    ros_args.extend(["-p".to_string(), format!("{}:={}", key, value)]);
                }
                for (from, to) in &self.remappings {
                    ros_args.extend(["-r".to_string(), format!("{}:={}", from, to)]);
                }
                if !ros_args.is_empty() {
                    argv.push("--ros-args".to_string());
                    argv.extend(ros_args);
                }
            }
            UnitKind::Include { package, launch_file } => {
                argv.extend(["ros2".to_string(), "launch".to_string(), package.clone(), launch_file.clone()]);
                argv.extend(self.arguments.iter().cloned());
                for (key, value) in &self.launch_arguments {
                    argv.push(format!("{}:={}", key, value));
                }
            }
            UnitKind::Command { program } => {
                argv.push(program.clone());
                argv.extend(self.arguments.iter().cloned());
            }
        }
        argv
    }

    /// Single shell-safe string, used for `sh -c` and for display.
    pub fn shell_line(&self) -> String {
        self.command_line()
            .iter()
            .map(|part| shell_quote(part))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn shell_quote(part: &str) -> String {
    let plain = !part.is_empty()
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=,+@%".contains(c));
    if plain {
        part.to_string()
    } else {
        format!("'{}'", part.replace('\'', r"'\''"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitHandle(pub String);

impl UnitHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UnitHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitExit {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub success: bool,
}

impl UnitExit {
    pub fn success() -> Self {
        Self { code: Some(0), success: true }
    }

    pub fn failure(code: Option<i32>) -> Self {
        Self { code, success: false }
    }
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Failed to start unit {unit}: {reason}")]
    SpawnFailed { unit: String, reason: String },
    #[error("Unit not found: {0}")]
    UnitNotFound(String),
    #[error("Failed to wait for unit {unit}: {reason}")]
    WaitFailed { unit: String, reason: String },
    #[error("Failed to stop units: {0}")]
    ShutdownFailed(String),
}

/// Starts units and reports when they exit.
///
/// Implementations own the processes they start; `shutdown` must stop every
/// unit that is still running.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    async fn launch(&self, spec: &ProcessSpec) -> Result<UnitHandle, LaunchError>;
    async fn wait_exit(&self, handle: &UnitHandle) -> Result<UnitExit, LaunchError>;
    async fn shutdown(&self) -> Result<(), LaunchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_command_line() {
        let spec = ProcessSpec::node("tb1/state_publish", "robot_state_publisher", "robot_state_publisher")
            .arg("/share/urdf/turtlebot3_waffle.urdf")
            .namespace("/tb1")
            .param("use_sim_time", "true")
            .remap("/tf", "tf");

        assert_eq!(
            spec.command_line(),
            vec![
                "ros2", "run", "robot_state_publisher", "robot_state_publisher",
                "/share/urdf/turtlebot3_waffle.urdf",
                "--ros-args", "-r", "__ns:=/tb1", "-p", "use_sim_time:=true", "-r", "/tf:=tf",
            ]
        );
    }

    #[test]
    fn test_node_without_ros_args() {
        let spec = ProcessSpec::node("scout", "swift_scout", "scout").arg("tb1");
        assert_eq!(spec.command_line(), vec!["ros2", "run", "swift_scout", "scout", "tb1"]);
    }

    #[test]
    fn test_include_command_line_sorts_arguments() {
        let spec = ProcessSpec::include("gazebo", "gazebo_ros", "gazebo.launch.py")
            .launch_arg("world", "/w/person.world")
            .launch_arg("gui", "true");
        assert_eq!(
            spec.command_line(),
            vec!["ros2", "launch", "gazebo_ros", "gazebo.launch.py", "gui:=true", "world:=/w/person.world"]
        );
    }

    #[test]
    fn test_shell_line_quotes_messages() {
        let spec = ProcessSpec::command("pose", "ros2").args(["topic", "pub", "{x: 1.0}"]);
        assert_eq!(spec.shell_line(), "ros2 topic pub '{x: 1.0}'");

        let tricky = ProcessSpec::command("q", "echo").arg("it's");
        assert_eq!(tricky.shell_line(), r"echo 'it'\''s'");
    }
}
