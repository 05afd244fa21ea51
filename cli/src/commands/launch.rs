// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Fleet bring-up command
//!
//! Runs the whole sequence, streams launch events to the terminal, then keeps
//! the fleet up until Ctrl+C or SIGTERM.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

use fleet_core::application::FleetLaunchService;
use fleet_core::domain::events::LaunchEvent;
use fleet_core::domain::fleet::LaunchArguments;
use fleet_core::domain::launch_config::FleetLaunchConfig;
use fleet_core::domain::launcher::ProcessLauncher;
use fleet_core::infrastructure::event_bus::{EventBus, EventBusError};
use fleet_core::infrastructure::{DryRunLauncher, TokioProcessLauncher};

#[derive(Args, Debug)]
pub struct LaunchArgs {
    /// Print every unit in launch order without starting anything
    #[arg(long)]
    pub dry_run: bool,

    /// Print launch events as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Launch arguments as NAME:=VALUE (e.g. num:=3 use_rviz:=false)
    #[arg(value_name = "NAME:=VALUE", trailing_var_arg = true)]
    pub arguments: Vec<String>,
}

pub async fn handle_command(args: LaunchArgs, config_override: Option<PathBuf>) -> Result<()> {
    let config = FleetLaunchConfig::load_or_default(config_override)
        .context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;

    let launcher: Arc<dyn ProcessLauncher> = if args.dry_run {
        Arc::new(DryRunLauncher::new())
    } else {
        Arc::new(TokioProcessLauncher::new())
    };
    let event_bus = Arc::new(EventBus::with_default_capacity());

    let mut events = event_bus.subscribe();
    let json = args.json;
    let renderer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event, json),
                Err(EventBusError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
    });

    let service = FleetLaunchService::new(launcher, Arc::clone(&event_bus), config);
    let prepared = service.prepare(&LaunchArguments::parse(&args.arguments))?;

    let outcome = tokio::select! {
        result = service.launch(&prepared) => Some(result),
        _ = shutdown_signal() => None,
    };

    let result: Result<()> = match outcome {
        None => {
            warn!("Interrupted during bring-up");
            service.shutdown().await.map_err(Into::into)
        }
        Some(Err(e)) => {
            if let Err(stop) = service.shutdown().await {
                warn!("{}", stop);
            }
            Err(e.into())
        }
        Some(Ok(outcome)) => {
            let total = outcome.environment.len() + outcome.report.started.len();
            if args.dry_run {
                println!("{}", format!("✓ Dry run: {} units would be started", total).green());
                Ok(())
            } else {
                println!(
                    "{}",
                    format!("✓ Fleet is up: {} units running. Press Ctrl+C to stop.", total).green()
                );
                shutdown_signal().await;
                service.shutdown().await.map_err(Into::into)
            }
        }
    };

    drop(service);
    drop(event_bus);
    let _ = renderer.await;

    result
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

fn print_event(event: &LaunchEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("Failed to encode event: {}", e),
        }
        return;
    }

    let line = render_event(event);
    match event {
        LaunchEvent::FleetPlanned { .. } | LaunchEvent::GroupTriggered { .. } => {
            println!("{}", line.bold())
        }
        LaunchEvent::CountClamped { .. } => println!("{}", line.yellow()),
        LaunchEvent::UnitExited { success: false, .. } => println!("{}", line.yellow()),
        LaunchEvent::ExitDeadlineExceeded { .. } | LaunchEvent::SequenceFailed { .. } => {
            println!("{}", line.red())
        }
        LaunchEvent::SequenceCompleted { .. } => println!("{}", line.green()),
        LaunchEvent::UnitStarted { .. } | LaunchEvent::UnitExited { .. } => {
            println!("{}", line.dimmed())
        }
    }
}

/// One uncoloured terminal line per event.
pub fn render_event(event: &LaunchEvent) -> String {
    match event {
        LaunchEvent::FleetPlanned { robots, groups, .. } => format!(
            "Planned {} robot(s) [{}] in {} stage groups",
            robots.len(),
            robots.join(", "),
            groups
        ),
        LaunchEvent::CountClamped { diagnostic, .. } => format!("! {}", diagnostic),
        LaunchEvent::UnitStarted { unit, command, .. } => format!("  + {}: {}", unit, command),
        LaunchEvent::UnitExited { unit, code, .. } => match code {
            Some(code) => format!("  - {} exited with code {}", unit, code),
            None => format!("  - {} terminated by signal", unit),
        },
        LaunchEvent::GroupTriggered {
            pipeline,
            robot,
            after,
            ..
        } => match after {
            Some(after) => format!("» {} stage for {} (after {})", pipeline, robot, after),
            None => format!("» {} stage for {}", pipeline, robot),
        },
        LaunchEvent::ExitDeadlineExceeded { unit, waited, .. } => {
            format!("✗ {} did not exit within {:?}", unit, waited)
        }
        LaunchEvent::SequenceCompleted { units_started, .. } => {
            format!("Sequence complete: {} robot units started", units_started)
        }
        LaunchEvent::SequenceFailed { reason, .. } => format!("✗ Sequence failed: {}", reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging;
    use chrono::Utc;
    use fleet_core::domain::events::LaunchId;
    use fleet_core::domain::sequence::{GroupId, Pipeline};
    use std::time::Duration;

    #[test]
    fn test_render_group_triggered() {
        let event = LaunchEvent::GroupTriggered {
            launch_id: LaunchId::new(),
            group: GroupId(3),
            pipeline: Pipeline::Pose,
            robot: "tb1".to_string(),
            after: Some("tb3/spawn".to_string()),
            triggered_at: Utc::now(),
        };
        assert_eq!(render_event(&event), "» pose stage for tb1 (after tb3/spawn)");
    }

    #[test]
    fn test_render_deadline() {
        let event = LaunchEvent::ExitDeadlineExceeded {
            launch_id: LaunchId::new(),
            unit: "tb2/spawn".to_string(),
            waited: Duration::from_secs(120),
            exceeded_at: Utc::now(),
        };
        assert_eq!(render_event(&event), "✗ tb2/spawn did not exit within 120s");
    }

    #[test]
    fn test_render_signal_exit() {
        let event = LaunchEvent::UnitExited {
            launch_id: LaunchId::new(),
            unit: "tb1/initial_pose".to_string(),
            code: None,
            success: false,
            exited_at: Utc::now(),
        };
        assert_eq!(render_event(&event), "  - tb1/initial_pose terminated by signal");
    }

    #[test]
    fn test_clamp_message_printed_once() {
        let mut config = FleetLaunchConfig::default();
        config.spec.share_dir = Some("/opt/swift_scout/share/swift_scout".into());
        let event_bus = Arc::new(EventBus::new(64));
        let mut events = event_bus.subscribe();
        let service = FleetLaunchService::new(Arc::new(DryRunLauncher::new()), event_bus, config);

        let (prepared, logged) = logging::capture("info", || {
            service.prepare(&LaunchArguments::parse(["num:=9"]))
        });
        assert_eq!(prepared.unwrap().fleet.len(), 6);

        let mut output = logged;
        while let Ok(event) = events.try_recv() {
            output.push_str(&render_event(&event));
            output.push('\n');
        }
        assert_eq!(output.matches("only has 6 spawn points").count(), 1);
        assert!(output.contains("! Requested 9 robots"));
    }
}
