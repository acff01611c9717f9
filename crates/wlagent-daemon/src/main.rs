use clap::Parser;

use wlagent_daemon::cli::{Cli, Command};
use wlagent_daemon::{configure, daemon};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Startdaemon { config } => daemon::run(config).await,
        Command::Configure(args) => configure::run(&args),
    }
}
