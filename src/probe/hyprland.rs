//! Hyprland-backed probe implementation.
//!
//! Process presence is checked through sysinfo; window state comes from
//! `hyprctl clients -j`. Participant counts are read off the client's
//! window titles.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use sysinfo::{ProcessRefreshKind, RefreshKind, System};
use tracing::debug;

use super::parse::TitleParser;
use super::{MeetingProbe, ProbeError};
use crate::config::ClientConfig;
use crate::engine::counter::ParticipantCounts;
use crate::engine::lifecycle::LifecycleState;

/// Upper bound on a single hyprctl invocation, so a wedged compositor
/// cannot stall the probe cycle indefinitely.
const HYPRCTL_TIMEOUT: Duration = Duration::from_secs(5);

/// One window as reported by `hyprctl clients -j`.
#[derive(Debug, Deserialize)]
struct HyprClient {
    #[serde(default)]
    class: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    mapped: bool,
    #[serde(default)]
    hidden: bool,
}

impl HyprClient {
    fn visible(&self) -> bool {
        self.mapped && !self.hidden
    }
}

pub struct HyprlandProbe {
    system: System,
    hyprctl: PathBuf,
    process_names: Vec<String>,
    window_class: String,
    parser: TitleParser,
}

impl HyprlandProbe {
    pub fn new(config: &ClientConfig) -> anyhow::Result<Self> {
        let hyprctl = which::which("hyprctl")
            .map_err(|e| anyhow::anyhow!("hyprctl not found in PATH: {e}"))?;

        let system = System::new_with_specifics(
            RefreshKind::new().with_processes(ProcessRefreshKind::new()),
        );

        Ok(Self {
            system,
            hyprctl,
            process_names: config
                .process_names
                .iter()
                .map(|n| n.to_lowercase())
                .collect(),
            window_class: config.window_class.to_lowercase(),
            parser: TitleParser::new(&config.title_pattern)?,
        })
    }

    fn client_process_running(&mut self) -> bool {
        self.system.refresh_processes_specifics(
            sysinfo::ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::new(),
        );

        self.system.processes().values().any(|process| {
            let name = process.name().to_string_lossy().to_lowercase();
            self.process_names.iter().any(|n| name.contains(n))
        })
    }

    async fn list_client_windows(&self) -> Result<Vec<HyprClient>, ProbeError> {
        let command = tokio::process::Command::new(&self.hyprctl)
            .args(["clients", "-j"])
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(HYPRCTL_TIMEOUT, command)
            .await
            .map_err(|_| ProbeError::Transient("hyprctl timed out".to_string()))?
            .map_err(|e| ProbeError::Transient(format!("failed to run hyprctl: {e}")))?;

        if !output.status.success() {
            return Err(ProbeError::Transient(format!(
                "hyprctl exited with status {}",
                output.status
            )));
        }

        let windows: Vec<HyprClient> = serde_json::from_slice(&output.stdout)
            .map_err(|e| ProbeError::Structural(format!("unexpected hyprctl output: {e}")))?;

        Ok(windows
            .into_iter()
            .filter(|w| w.class.to_lowercase().contains(&self.window_class))
            .collect())
    }
}

#[async_trait]
impl MeetingProbe for HyprlandProbe {
    async fn classify(&mut self) -> Result<LifecycleState, ProbeError> {
        if !self.client_process_running() {
            return Ok(LifecycleState::NotRunning);
        }

        let windows = self.list_client_windows().await?;
        if windows.is_empty() {
            // Client idling in the tray without a meeting window.
            return Ok(LifecycleState::NotRunning);
        }

        if windows.iter().any(|w| w.visible()) {
            Ok(LifecycleState::Normal)
        } else {
            Ok(LifecycleState::Minimized)
        }
    }

    async fn read_participants(&mut self) -> Result<ParticipantCounts, ProbeError> {
        let windows = self.list_client_windows().await?;

        for window in &windows {
            if let Some(counts) = self.parser.parse(&window.title) {
                debug!(
                    "Parsed participant counts {}/{} from {:?}",
                    counts.current, counts.maximum, window.title
                );
                return Ok(counts);
            }
        }

        // The participant panel may simply not be visible yet; the counter's
        // retry budget decides when this becomes a structural failure.
        Err(ProbeError::Transient(
            "no window title matched the participant pattern".to_string(),
        ))
    }
}
