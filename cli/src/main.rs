// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Fleet Launch CLI
//!
//! The `fleet` binary brings up a simulated TurtleBot fleet: Gazebo and the
//! map server first, then each robot's spawn, pose and application stages in
//! a fixed order.
//!
//! ## Commands
//!
//! - `fleet launch [num:=N] [use_rviz:=false] ...` - Run the bring-up
//! - `fleet plan [num:=N] ...` - Print the stage graph without starting anything
//! - `fleet config show|validate|generate` - Configuration management

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::util::SubscriberInitExt;

use fleet_launch::commands::{self, ConfigCommand, LaunchArgs, PlanArgs};
use fleet_launch::logging;

/// Fleet Launch - deterministic multi-robot bring-up
#[derive(Parser)]
#[command(name = "fleet")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "FLEET_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "FLEET_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring up the fleet
    #[command(name = "launch")]
    Launch(LaunchArgs),

    /// Show the launch graph for a fleet
    #[command(name = "plan")]
    Plan(PlanArgs),

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    match cli.command {
        Some(Commands::Launch(args)) => commands::launch::handle_command(args, cli.config).await,
        Some(Commands::Plan(args)) => commands::plan::handle_command(args, cli.config).await,
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    logging::subscriber(logging::filter(level)?, std::io::stdout).init();
    Ok(())
}
