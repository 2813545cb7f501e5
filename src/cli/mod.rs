pub mod args;
pub mod client;
pub mod leave;
pub mod logs;
pub mod status;

pub use args::{Cli, CliCommand};
pub use leave::handle_leave_command;
pub use logs::handle_logs_command;
pub use status::handle_status_command;
