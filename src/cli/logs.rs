//! CLI handler for viewing logs.

use anyhow::Result;

use super::args::LogsCliArgs;
use crate::logs;

pub fn handle_logs_command(args: LogsCliArgs) -> Result<()> {
    let app_logs = logs::get_app_logs(args.lines)?;

    if app_logs.is_empty() {
        println!("No application logs found.");
        return Ok(());
    }

    for line in &app_logs {
        println!("{}", line);
    }

    Ok(())
}
