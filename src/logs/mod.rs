//! Application log retrieval.
//!
//! Used by both the CLI and the REST API.

use anyhow::{Context, Result};
use std::process::Command;

/// Get application logs from the systemd journal.
///
/// Returns a vector of log lines. Returns empty vec if the journal is
/// unavailable.
pub fn get_app_logs(lines: usize) -> Result<Vec<String>> {
    let output = Command::new("journalctl")
        .arg("--user")
        .arg("-u")
        .arg("meetwarden.service")
        .arg("-n")
        .arg(lines.to_string())
        .arg("--output=short-iso")
        .arg("--no-pager")
        .output()
        .context("Failed to execute journalctl. Is the service running?")?;

    if output.status.success() {
        let logs = String::from_utf8_lossy(&output.stdout);
        Ok(logs
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(String::from)
            .collect())
    } else {
        // Journal might not be available on this system.
        Ok(Vec::new())
    }
}
