use crate::global;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub threshold: ThresholdConfig,
    pub monitor: MonitorConfig,
    pub client: ClientConfig,
    pub leave: LeaveConfig,
    pub recording: RecordingConfig,
    pub ui: UiConfig,
}

/// Exit decision thresholds. Replaceable at runtime through the API;
/// the engine swaps the whole struct between ticks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Occupancy ratio above which auto-exit is inhibited.
    pub activation_threshold: f64,
    /// Never auto-exit while more than this many participants remain.
    pub max_count_to_exit: u32,
    /// Consecutive qualifying ticks required before the exit fires.
    pub debounce_ticks: u32,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            activation_threshold: 0.5,
            max_count_to_exit: 5,
            debounce_ticks: 3,
        }
    }
}

impl ThresholdConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.activation_threshold) {
            bail!(
                "activation_threshold must be within [0, 1], got {}",
                self.activation_threshold
            );
        }
        if self.debounce_ticks == 0 {
            bail!("debounce_ticks must be at least 1");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Seconds between probe cycles.
    pub poll_interval_seconds: u64,
    /// Seconds a leave request may wait for the client to disappear before
    /// it is reported as a failed attempt.
    pub confirmation_window_seconds: u64,
    /// Transient participant-read failures tolerated before the client is
    /// declared unsupported.
    pub read_retry_budget: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 2,
            confirmation_window_seconds: 10,
            read_retry_budget: 5,
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_seconds == 0 {
            bail!("poll_interval_seconds must be at least 1");
        }
        if self.confirmation_window_seconds == 0 {
            bail!("confirmation_window_seconds must be at least 1");
        }
        Ok(())
    }
}

/// How to find the conferencing client on this machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Process name fragments identifying the client (matched lowercase).
    pub process_names: Vec<String>,
    /// Window class of the client's windows, as reported by the compositor.
    pub window_class: String,
    /// Regex extracting participant counts from a window title.
    /// Group 1 is the current count, optional group 2 the room capacity.
    pub title_pattern: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            process_names: vec!["zoom".to_string(), "zoom.us".to_string()],
            window_class: "Zoom".to_string(),
            title_pattern: r"\((\d+)/(\d+)\)".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaveConfig {
    /// Shell command that makes the client leave the meeting.
    /// Empty means "close the meeting window through the compositor".
    pub command: String,
    /// Timeout in seconds for the leave command itself.
    pub command_timeout_seconds: u64,
}

impl Default for LeaveConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            command_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Shell command starting an external recorder. Empty disables it.
    pub start_command: String,
    /// Shell command stopping the external recorder. Empty disables it.
    pub stop_command: String,
    /// Timeout in seconds for either recorder command.
    pub command_timeout_seconds: u64,
    /// Start the recorder automatically when a meeting is entered.
    pub auto_record: bool,
    /// Which exits stop the recorder.
    pub stop_on_exit: StopOnExit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopOnExit {
    Always,
    SelfCaused,
    Never,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            start_command: String::new(),
            stop_command: String::new(),
            command_timeout_seconds: 30,
            auto_record: false,
            stop_on_exit: StopOnExit::Always,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub waybar: WaybarConfig,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            waybar: WaybarConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaybarConfig {
    pub not_running_text: String,
    pub meeting_text: String,
    pub minimized_text: String,
    pub unsupported_text: String,
}

impl Default for WaybarConfig {
    fn default() -> Self {
        Self {
            not_running_text: "󰍉".to_string(),    // Nerd Font magnifier (watching)
            meeting_text: "󰍪".to_string(),        // Nerd Font meeting
            minimized_text: "󰖰".to_string(),      // Nerd Font window minimize
            unsupported_text: "".to_string(),    // Nerd Font warning
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let config = Self::load_from(&config_path)?;
        info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).context("Failed to read config file")?;

        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Rejects invalid configuration before any of it reaches the engine.
    pub fn validate(&self) -> Result<()> {
        self.threshold.validate()?;
        self.monitor.validate()?;
        if self.client.process_names.is_empty() {
            bail!("client.process_names must name at least one process");
        }
        regex::Regex::new(&self.client.title_pattern)
            .context("client.title_pattern is not a valid regex")?;
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_load_from_round_trip() {
        let content = toml::to_string_pretty(&Config::default()).unwrap();
        let file = write_config(&content);
        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.threshold.activation_threshold, 0.5);
        assert_eq!(config.threshold.max_count_to_exit, 5);
        assert_eq!(config.threshold.debounce_ticks, 3);
    }

    #[test]
    fn test_rejects_threshold_out_of_range() {
        let file = write_config("[threshold]\nactivation_threshold = 1.5\n");
        let err = Config::load_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("activation_threshold"));
    }

    #[test]
    fn test_rejects_zero_debounce() {
        let file = write_config("[threshold]\ndebounce_ticks = 0\n");
        assert!(Config::load_from(file.path()).is_err());
    }

    #[test]
    fn test_rejects_bad_title_pattern() {
        let file = write_config("[client]\ntitle_pattern = \"(\\\\d+\"\n");
        assert!(Config::load_from(file.path()).is_err());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let file = write_config("[threshold]\nmax_count_to_exit = 2\n");
        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.threshold.max_count_to_exit, 2);
        assert_eq!(config.threshold.activation_threshold, 0.5);
        assert_eq!(config.monitor.poll_interval_seconds, 2);
    }
}
