// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Launch graph inspection
//!
//! Builds the robot plan and the stage graph for a set of launch arguments and
//! prints them. Nothing is started.

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use fleet_core::application::{FleetLaunchService, PreparedLaunch, UnitSource};
use fleet_core::domain::fleet::{LaunchArguments, PlanDiagnostic, RobotSlot};
use fleet_core::domain::launch_config::FleetLaunchConfig;
use fleet_core::domain::sequence::Trigger;
use fleet_core::infrastructure::event_bus::EventBus;
use fleet_core::infrastructure::DryRunLauncher;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Yaml,
}

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,

    /// Also print the command line of every unit (table format)
    #[arg(long)]
    pub commands: bool,

    /// Launch arguments as NAME:=VALUE (e.g. num:=3 use_rviz:=false)
    #[arg(value_name = "NAME:=VALUE", trailing_var_arg = true)]
    pub arguments: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PlanView {
    pub robots: Vec<RobotSlot>,
    pub diagnostics: Vec<PlanDiagnostic>,
    pub environment: Vec<UnitView>,
    pub groups: Vec<GroupView>,
}

#[derive(Debug, Serialize)]
pub struct GroupView {
    pub id: String,
    pub pipeline: String,
    pub robot: String,
    /// Unit whose exit starts this group; `None` starts immediately.
    pub after: Option<String>,
    pub units: Vec<UnitView>,
}

#[derive(Debug, Serialize)]
pub struct UnitView {
    pub name: String,
    pub command: String,
}

pub async fn handle_command(args: PlanArgs, config_override: Option<PathBuf>) -> Result<()> {
    let config = FleetLaunchConfig::load_or_default(config_override)
        .context("Failed to load configuration")?;

    let prepared = prepare_plan(config, &LaunchArguments::parse(&args.arguments))?;
    let view = plan_view(&prepared);

    match args.format {
        OutputFormat::Table => print!("{}", render_table(&view, args.commands)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&view)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&view)?),
    }

    Ok(())
}

/// Validates the manifest and plans the fleet without a real launcher.
pub fn prepare_plan(config: FleetLaunchConfig, args: &LaunchArguments) -> Result<PreparedLaunch> {
    config
        .validate()
        .context("Configuration validation failed")?;

    let service = FleetLaunchService::new(
        Arc::new(DryRunLauncher::new()),
        Arc::new(EventBus::with_default_capacity()),
        config,
    );
    Ok(service.prepare(args)?)
}

pub fn plan_view(prepared: &PreparedLaunch) -> PlanView {
    let plan = &prepared.sequence;

    let groups = plan
        .groups()
        .iter()
        .map(|group| GroupView {
            id: group.id.to_string(),
            pipeline: group.pipeline.to_string(),
            robot: group.robot.clone(),
            after: match group.trigger {
                Trigger::Immediate => None,
                Trigger::OnExit(action) => plan.action(action).map(|a| a.label()),
            },
            units: group
                .actions
                .iter()
                .filter_map(|id| plan.action(*id))
                .map(|action| {
                    let spec = prepared.catalog.unit_for(action);
                    UnitView {
                        name: spec.name.clone(),
                        command: spec.shell_line(),
                    }
                })
                .collect(),
        })
        .collect();

    PlanView {
        robots: prepared.fleet.slots().to_vec(),
        diagnostics: prepared.fleet.diagnostics().to_vec(),
        environment: prepared
            .catalog
            .environment_units()
            .iter()
            .map(|spec| UnitView {
                name: spec.name.clone(),
                command: spec.shell_line(),
            })
            .collect(),
        groups,
    }
}

pub fn render_table(view: &PlanView, with_commands: bool) -> String {
    let mut out = String::new();

    for diagnostic in &view.diagnostics {
        out.push_str(&format!("{}\n", format!("! {}", diagnostic).yellow()));
    }
    if !view.diagnostics.is_empty() {
        out.push('\n');
    }

    out.push_str("Robots:\n");
    for slot in &view.robots {
        out.push_str(&format!(
            "  {:<5}{:>6.2} {:>6.2} {:>5.2}\n",
            slot.name, slot.pose.x, slot.pose.y, slot.pose.z
        ));
    }

    out.push_str("\nEnvironment:\n");
    for unit in &view.environment {
        out.push_str(&format!("  {}\n", unit.name));
        if with_commands {
            out.push_str(&format!("      {}\n", unit.command));
        }
    }

    out.push_str(&format!(
        "\n{:<6}{:<10}{:<7}{:<22}{}\n",
        "GROUP", "PIPELINE", "ROBOT", "WAITS FOR", "UNITS"
    ));
    for group in &view.groups {
        let units: Vec<&str> = group
            .units
            .iter()
            .map(|u| u.name.rsplit('/').next().unwrap_or(u.name.as_str()))
            .collect();
        out.push_str(&format!(
            "{:<6}{:<10}{:<7}{:<22}{}\n",
            group.id,
            group.pipeline,
            group.robot,
            group.after.as_deref().unwrap_or("-"),
            units.join(", ")
        ));
        if with_commands {
            for unit in &group.units {
                out.push_str(&format!("      {}\n", unit.command));
            }
        }
    }

    out
}
