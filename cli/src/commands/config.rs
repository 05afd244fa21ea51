// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use fleet_core::application::LaunchSettings;
use fleet_core::domain::fleet::LaunchArguments;
use fleet_core::domain::launch_config::{FleetLaunchConfig, CONFIG_PATH_ENV};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./fleet-launch.yaml)
        #[arg(short, long, default_value = "./fleet-launch.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  --config flag: {}", path.display());
        } else {
            println!("  --config flag: {}", "(not set)".dimmed());
        }
        for (i, path) in FleetLaunchConfig::search_paths().iter().enumerate() {
            let marker = if path.exists() { "✓".green() } else { "-".dimmed() };
            println!("  {}. {} {}", i + 1, marker, path.display());
        }
        println!(
            "  {}: {}",
            CONFIG_PATH_ENV,
            std::env::var(CONFIG_PATH_ENV)
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!();
    }

    let config = FleetLaunchConfig::load_or_default(config_override)
        .context("Failed to load configuration")?;
    let settings = LaunchSettings::resolve(&config, &LaunchArguments::default());

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Package:".bold());
    println!("  Name: {}", settings.package);
    println!("  Share: {}", settings.share_dir.display());
    println!();

    println!("{}", "Simulation:".bold());
    println!("  World: {}", settings.world.display());
    println!("  Gazebo GUI: {}", settings.gui);
    println!("  Sim time: {}", settings.use_sim_time);
    println!();

    println!("{}", "Robots:".bold());
    println!("  URDF: {}", settings.urdf.display());
    println!("  Model: {}", settings.model.display());
    println!("  Publish frequency: {} Hz", settings.publish_frequency);
    println!();

    println!("{}", "Navigation:".bold());
    println!("  Map: {}", settings.map.display());
    println!("  Params: {}", settings.params_file.display());
    println!("  Behavior tree: {}", settings.behavior_tree.display());
    println!("  Log level: {}", settings.nav_log_level);
    println!();

    println!("{}", "Visualization:".bold());
    println!("  RViz: {}", settings.use_rviz);
    println!("  Config: {}", settings.rviz_config.display());
    println!();

    println!("{}", "Application:".bold());
    println!(
        "  {} {}",
        settings.application.package, settings.application.executable
    );
    println!();

    println!("{}", "Exit deadlines:".bold());
    for (stage, deadline) in [
        ("spawn", settings.deadlines.spawn),
        ("initial_pose", settings.deadlines.initial_pose),
        ("application", settings.deadlines.application),
    ] {
        match deadline {
            Some(d) => println!("  {}: {:?}", stage, d),
            None => println!("  {}: {}", stage, "(none)".dimmed()),
        }
    }
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = FleetLaunchConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = if with_examples {
        include_str!("../../templates/fleet-launch-with-examples.yaml")
    } else {
        include_str!("../../templates/fleet-launch-minimal.yaml")
    };

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_are_valid_configs() {
        for template in [
            include_str!("../../templates/fleet-launch-minimal.yaml"),
            include_str!("../../templates/fleet-launch-with-examples.yaml"),
        ] {
            let config = FleetLaunchConfig::from_yaml_str(template).unwrap();
            config.validate().unwrap();
        }
    }

    #[test]
    fn test_example_template_matches_defaults() {
        let config = FleetLaunchConfig::from_yaml_str(include_str!(
            "../../templates/fleet-launch-with-examples.yaml"
        ))
        .unwrap();
        let defaults = FleetLaunchConfig::default();

        assert_eq!(config.spec.deadlines.spawn, defaults.spec.deadlines.spawn);
        assert_eq!(config.spec.deadlines.application, None);
        assert_eq!(config.spec.navigation.map, defaults.spec.navigation.map);
    }

    #[tokio::test]
    async fn test_generate_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("fleet-launch.yaml");

        generate(output.clone(), false).await.unwrap();

        let config = FleetLaunchConfig::from_yaml_file(&output).unwrap();
        assert_eq!(config.metadata.name, "swift-scout");
    }
}
