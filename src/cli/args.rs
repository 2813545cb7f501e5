use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "meetwarden")]
#[command(about = "Auto-leave daemon for thinning meetings", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Show what the running service currently sees
    Status(StatusCliArgs),
    /// Leave the current meeting now
    Leave,
    /// View application logs
    Logs(LogsCliArgs),
    /// Print version information
    Version,
}

#[derive(ClapArgs, Debug)]
pub struct StatusCliArgs {
    /// Print the raw JSON response instead of a summary
    #[arg(long)]
    pub json: bool,
}

#[derive(ClapArgs, Debug)]
pub struct LogsCliArgs {
    /// Maximum number of log lines to show
    #[arg(short, long, default_value = "100")]
    pub lines: usize,
}
