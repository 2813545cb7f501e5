//! CLI handler for the status command.
//!
//! Terminal presentation only; the numbers come from the running service.

use anyhow::Result;

use super::args::StatusCliArgs;
use super::client::ServiceClient;

pub async fn handle_status_command(args: StatusCliArgs) -> Result<()> {
    let client = ServiceClient::new();

    if args.json {
        println!("{}", client.status_raw().await?);
        return Ok(());
    }

    let status = client.status().await?;

    match status.lifecycle.as_str() {
        "not-running" => println!("Client not running; watching."),
        "minimized" => println!("Meeting window minimized."),
        "unexpected-behavior" => {
            println!("Client is running but cannot be monitored (unsupported version?).")
        }
        "normal" => {
            println!(
                "{}/{} participants",
                status.current_count, status.maximum_count
            );
            if status.over_threshold {
                println!(
                    "Above activation threshold; will leave once at most {} remain.",
                    status.max_count_to_exit
                );
            } else {
                println!(
                    "At or below activation threshold ({}).",
                    status.activation_threshold
                );
            }
        }
        other => println!("Lifecycle: {other}"),
    }

    if let Some(origin) = &status.pending_exit {
        println!("Leave request pending (origin: {origin}).");
    }
    if let Some(cause) = &status.last_exit {
        println!("Last meeting exit: {cause}.");
    }

    Ok(())
}
