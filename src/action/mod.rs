//! External actions: leaving the meeting and driving a recorder.
//!
//! Both are narrow collaborators behind traits so the engine and app never
//! depend on how the commands are actually delivered.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{LeaveConfig, RecordingConfig};

/// Makes the conferencing client leave the current meeting.
#[async_trait]
pub trait LeaveAction: Send + Sync {
    async fn request_leave(&self) -> Result<()>;
}

/// Start/stop control over an external recorder.
#[async_trait]
pub trait RecordingControl: Send + Sync {
    async fn start(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
}

/// Leave by closing the meeting window through the compositor.
pub struct HyprctlLeave {
    hyprctl: PathBuf,
    window_class: String,
    timeout: Duration,
}

impl HyprctlLeave {
    pub fn new(window_class: &str, timeout_seconds: u64) -> Result<Self> {
        let hyprctl = which::which("hyprctl")
            .map_err(|e| anyhow::anyhow!("hyprctl not found in PATH: {e}"))?;
        Ok(Self {
            hyprctl,
            window_class: window_class.to_string(),
            timeout: Duration::from_secs(timeout_seconds),
        })
    }
}

#[async_trait]
impl LeaveAction for HyprctlLeave {
    async fn request_leave(&self) -> Result<()> {
        let target = format!("class:{}", self.window_class);
        info!("Closing meeting window via hyprctl ({target})");

        let command = tokio::process::Command::new(&self.hyprctl)
            .args(["dispatch", "closewindow", &target])
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, command)
            .await
            .context("hyprctl dispatch timed out")?
            .context("Failed to run hyprctl dispatch")?;

        if !output.status.success() {
            bail!(
                "hyprctl dispatch exited with status {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

/// Leave via a user-configured shell command.
pub struct ShellLeave {
    command: String,
    timeout: Duration,
}

impl ShellLeave {
    pub fn new(config: &LeaveConfig) -> Self {
        Self {
            command: config.command.clone(),
            timeout: Duration::from_secs(config.command_timeout_seconds),
        }
    }
}

#[async_trait]
impl LeaveAction for ShellLeave {
    async fn request_leave(&self) -> Result<()> {
        info!("Running leave command: {}", self.command);
        run_shell(&self.command, self.timeout).await
    }
}

/// Drives an external recorder through configured shell commands.
/// An empty command disables the corresponding call.
pub struct ShellRecorder {
    start_command: String,
    stop_command: String,
    timeout: Duration,
}

impl ShellRecorder {
    pub fn new(config: &RecordingConfig) -> Self {
        Self {
            start_command: config.start_command.clone(),
            stop_command: config.stop_command.clone(),
            timeout: Duration::from_secs(config.command_timeout_seconds),
        }
    }
}

#[async_trait]
impl RecordingControl for ShellRecorder {
    async fn start(&self) -> Result<()> {
        if self.start_command.is_empty() {
            debug!("No recorder start command configured");
            return Ok(());
        }
        info!("Starting recorder: {}", self.start_command);
        run_shell(&self.start_command, self.timeout).await
    }

    async fn stop(&self) -> Result<()> {
        if self.stop_command.is_empty() {
            debug!("No recorder stop command configured");
            return Ok(());
        }
        info!("Stopping recorder: {}", self.stop_command);
        run_shell(&self.stop_command, self.timeout).await
    }
}

async fn run_shell(command: &str, timeout: Duration) -> Result<()> {
    let child = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .output();

    // kill_on_drop cleans the process up on timeout
    let output = match tokio::time::timeout(timeout, child).await {
        Ok(result) => result.context("Failed to spawn shell command")?,
        Err(_) => bail!("Command timed out after {}s", timeout.as_secs()),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "Command exited with status {}: {}",
            output.status,
            stderr.trim()
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        debug!("Command stdout: {}", stdout.trim());
    }
    Ok(())
}

/// Pick the leave implementation from configuration: a custom command when
/// one is set, otherwise closing the window through the compositor.
pub fn build_leave_action(
    leave: &LeaveConfig,
    window_class: &str,
) -> Result<Box<dyn LeaveAction>> {
    if leave.command.is_empty() {
        match HyprctlLeave::new(window_class, leave.command_timeout_seconds) {
            Ok(action) => Ok(Box::new(action)),
            Err(e) => {
                warn!("{e:#}; configure leave.command to use a custom leave command");
                Err(e)
            }
        }
    } else {
        Ok(Box::new(ShellLeave::new(leave)))
    }
}
