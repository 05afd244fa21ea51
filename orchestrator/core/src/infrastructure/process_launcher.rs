// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Process Launcher
//!
//! Runs units as child processes with `tokio::process`.
//!
//! Every child is owned by one task that waits for either its exit or a stop
//! request, then publishes the exit on a `watch` channel. `wait_exit` callers
//! only ever read that channel, so any number of them can wait on one unit.
//!
//! On Unix each unit gets its own process group. Stopping a unit interrupts
//! the whole group first (so `ros2 launch` can tear its children down). After
//! the grace period, or once the leader is gone, the group gets SIGKILL so no
//! node outlives its unit.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use crate::domain::launcher::{LaunchError, OutputPolicy, ProcessLauncher, ProcessSpec, UnitExit, UnitHandle};

const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(10);

struct RunningUnit {
    name: String,
    exit: watch::Receiver<Option<UnitExit>>,
    stop: Option<oneshot::Sender<()>>,
}

pub struct TokioProcessLauncher {
    units: Mutex<HashMap<UnitHandle, RunningUnit>>,
    next_id: AtomicU64,
    stop_grace: Duration,
}

impl TokioProcessLauncher {
    pub fn new() -> Self {
        Self::with_stop_grace(DEFAULT_STOP_GRACE)
    }

    pub fn with_stop_grace(stop_grace: Duration) -> Self {
        Self {
            units: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            stop_grace,
        }
    }

    /// Number of units started and not yet exited.
    pub fn running(&self) -> usize {
        self.units
            .lock()
            .values()
            .filter(|u| u.exit.borrow().is_none())
            .count()
    }

    fn command_for(spec: &ProcessSpec) -> Result<Command, LaunchError> {
        let mut command = if spec.shell {
            let mut command = Command::new("sh");
            command.arg("-c").arg(spec.shell_line());
            command
        } else {
            let argv = spec.command_line();
            let (program, args) = argv.split_first().ok_or_else(|| LaunchError::SpawnFailed {
                unit: spec.name.clone(),
                reason: "empty command line".to_string(),
            })?;
            let mut command = Command::new(program);
            command.args(args);
            command
        };

        command.stdin(Stdio::null()).kill_on_drop(true);
        match spec.output {
            OutputPolicy::Screen => {
                command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
            OutputPolicy::Log => {
                command.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
        }
        #[cfg(unix)]
        command.process_group(0);

        Ok(command)
    }
}

impl Default for TokioProcessLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessLauncher for TokioProcessLauncher {
    async fn launch(&self, spec: &ProcessSpec) -> Result<UnitHandle, LaunchError> {
        let mut child = Self::command_for(spec)?
            .spawn()
            .map_err(|e| LaunchError::SpawnFailed {
                unit: spec.name.clone(),
                reason: e.to_string(),
            })?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = UnitHandle::new(format!("{}#{}", spec.name, id));
        info!("Started {} (pid {:?}): {}", spec.name, child.id(), spec.shell_line());

        if let Some(stdout) = child.stdout.take() {
            forward_output(spec.name.clone(), stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            forward_output(spec.name.clone(), stderr);
        }

        let (exit_tx, exit_rx) = watch::channel(None);
        let (stop_tx, stop_rx) = oneshot::channel();
        tokio::spawn(supervise(spec.name.clone(), child, stop_rx, exit_tx, self.stop_grace));

        self.units.lock().insert(
            handle.clone(),
            RunningUnit {
                name: spec.name.clone(),
                exit: exit_rx,
                stop: Some(stop_tx),
            },
        );

        Ok(handle)
    }

    async fn wait_exit(&self, handle: &UnitHandle) -> Result<UnitExit, LaunchError> {
        let (name, mut exit) = {
            let units = self.units.lock();
            let unit = units
                .get(handle)
                .ok_or_else(|| LaunchError::UnitNotFound(handle.to_string()))?;
            (unit.name.clone(), unit.exit.clone())
        };

        let observed = exit
            .wait_for(Option::is_some)
            .await
            .map_err(|e| LaunchError::WaitFailed {
                unit: name.clone(),
                reason: e.to_string(),
            })?;

        observed.clone().ok_or(LaunchError::WaitFailed {
            unit: name,
            reason: "exit status missing".to_string(),
        })
    }

    async fn shutdown(&self) -> Result<(), LaunchError> {
        let pending: Vec<(String, watch::Receiver<Option<UnitExit>>)> = {
            let mut units = self.units.lock();
            units
                .values_mut()
                .filter(|u| u.exit.borrow().is_none())
                .map(|u| {
                    if let Some(stop) = u.stop.take() {
                        let _ = stop.send(());
                    }
                    (u.name.clone(), u.exit.clone())
                })
                .collect()
        };

        info!("Stopping {} running unit(s)", pending.len());

        let mut failed = Vec::new();
        for (name, mut exit) in pending {
            if exit.wait_for(Option::is_some).await.is_err() {
                failed.push(name);
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(LaunchError::ShutdownFailed(failed.join(", ")))
        }
    }
}

async fn supervise(
    name: String,
    mut child: Child,
    stop: oneshot::Receiver<()>,
    exit_tx: watch::Sender<Option<UnitExit>>,
    grace: Duration,
) {
    let exited = tokio::select! {
        status = child.wait() => Some(status),
        _ = stop => None,
    };
    let status = match exited {
        Some(status) => status,
        None => stop_child(&name, &mut child, grace).await,
    };

    let exit = match status {
        Ok(status) => unit_exit(status),
        Err(e) => {
            warn!("Lost track of {}: {}", name, e);
            UnitExit::failure(None)
        }
    };
    debug!("{} exited with {:?}", name, exit.code);
    let _ = exit_tx.send(Some(exit));
}

async fn stop_child(name: &str, child: &mut Child, grace: Duration) -> std::io::Result<ExitStatus> {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        let pgid = pid as i32;
        if let Err(e) = signal_group(pgid, libc::SIGINT) {
            warn!("Failed to interrupt {}: {}", name, e);
        }
        let status = match tokio::time::timeout(grace, child.wait()).await {
            Ok(status) => status,
            Err(_) => {
                warn!("{} still running after {:?}; killing its process group", name, grace);
                if let Err(e) = signal_group(pgid, libc::SIGKILL) {
                    warn!("Failed to kill {}: {}", name, e);
                }
                child.wait().await
            }
        };
        // The leader may exit on SIGINT while group members ignored it.
        if let Err(e) = signal_group(pgid, libc::SIGKILL) {
            if e.raw_os_error() != Some(libc::ESRCH) {
                warn!("Failed to reap the process group of {}: {}", name, e);
            }
        }
        return status;
    }

    child.kill().await?;
    child.wait().await
}

#[cfg(unix)]
fn signal_group(pgid: i32, signal: i32) -> std::io::Result<()> {
    // SAFETY: kill(2) takes plain integers; a negative pid addresses the group.
    if unsafe { libc::kill(-pgid, signal) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

fn unit_exit(status: ExitStatus) -> UnitExit {
    if status.success() {
        UnitExit::success()
    } else {
        UnitExit::failure(status.code())
    }
}

fn forward_output<R>(unit: String, stream: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            info!(target: "fleet::unit", unit = %unit, "{}", line);
        }
    });
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_exit_reports_exit_code() {
        let launcher = TokioProcessLauncher::new();
        let ok = launcher
            .launch(&ProcessSpec::command("ok", "true"))
            .await
            .unwrap();
        let failed = launcher
            .launch(&ProcessSpec::command("failed", "sh").args(["-c", "exit 3"]))
            .await
            .unwrap();

        assert_eq!(launcher.wait_exit(&ok).await.unwrap(), UnitExit::success());
        assert_eq!(launcher.wait_exit(&failed).await.unwrap(), UnitExit::failure(Some(3)));
    }

    #[tokio::test]
    async fn test_shell_unit_runs_through_sh() {
        let launcher = TokioProcessLauncher::new();
        let handle = launcher
            .launch(
                &ProcessSpec::command("piped", "echo")
                    .arg("hello")
                    .output(OutputPolicy::Log)
                    .shell(true),
            )
            .await
            .unwrap();

        assert!(launcher.wait_exit(&handle).await.unwrap().success);
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_spawn() {
        let launcher = TokioProcessLauncher::new();
        let err = launcher
            .launch(&ProcessSpec::command("ghost", "definitely-not-a-real-program-7f3a"))
            .await
            .unwrap_err();
        assert!(matches!(err, LaunchError::SpawnFailed { unit, .. } if unit == "ghost"));
    }

    #[tokio::test]
    async fn test_unknown_handle() {
        let launcher = TokioProcessLauncher::new();
        let err = launcher.wait_exit(&UnitHandle::new("nope#1")).await.unwrap_err();
        assert!(matches!(err, LaunchError::UnitNotFound(_)));
    }

    #[tokio::test]
    async fn test_shutdown_stops_running_units() {
        let launcher = TokioProcessLauncher::with_stop_grace(Duration::from_secs(2));
        let handle = launcher
            .launch(&ProcessSpec::command("sleeper", "sleep").arg("30"))
            .await
            .unwrap();
        assert_eq!(launcher.running(), 1);

        tokio::time::timeout(Duration::from_secs(5), launcher.shutdown())
            .await
            .unwrap()
            .unwrap();

        assert!(!launcher.wait_exit(&handle).await.unwrap().success);
        assert_eq!(launcher.running(), 0);
    }

    /// Alive and not a zombie waiting to be reaped by its new parent.
    fn is_alive(pid: i32) -> bool {
        if unsafe { libc::kill(pid, 0) } != 0 {
            return false;
        }
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .and_then(|rest| rest.split_whitespace().next())
                .map_or(true, |state| state != "Z"),
            Err(_) => true,
        }
    }

    #[tokio::test]
    async fn test_shutdown_kills_children_that_ignore_sigint() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("child.pid");
        let script = format!(
            "trap '' INT; sleep 300 & echo $! > {}; wait",
            pid_file.display()
        );

        let launcher = TokioProcessLauncher::with_stop_grace(Duration::from_millis(500));
        let handle = launcher
            .launch(&ProcessSpec::command("stubborn", "sh").args(["-c", script.as_str()]))
            .await
            .unwrap();

        let child_pid: i32 = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(raw) = tokio::fs::read_to_string(&pid_file).await {
                    if let Ok(pid) = raw.trim().parse() {
                        return pid;
                    }
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();
        assert!(is_alive(child_pid));

        tokio::time::timeout(Duration::from_secs(5), launcher.shutdown())
            .await
            .unwrap()
            .unwrap();
        assert!(!launcher.wait_exit(&handle).await.unwrap().success);

        let gone = tokio::time::timeout(Duration::from_secs(2), async {
            while is_alive(child_pid) {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        assert!(gone.is_ok(), "sleep {} outlived its unit", child_pid);
    }
}
