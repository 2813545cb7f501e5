//! CLI handler for the manual leave command.

use anyhow::Result;

use super::client::ServiceClient;

pub async fn handle_leave_command() -> Result<()> {
    let client = ServiceClient::new();
    let response = client.leave().await?;

    match response.outcome.as_str() {
        "requested" => println!("Leave requested."),
        "coalesced" => println!("A leave request is already pending."),
        "not-in-meeting" => println!("No meeting to leave."),
        "failed" => println!("Leave action failed; see the service logs."),
        other => println!("Leave outcome: {other}"),
    }

    Ok(())
}
