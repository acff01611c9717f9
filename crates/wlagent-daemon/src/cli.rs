use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "wlagent", version, about = "Database workload monitoring agent")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start daemon mode of the agent.
    Startdaemon {
        /// Configuration path for startdaemon mode.
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
    /// Update the on-disk configuration for one workload.
    Configure(ConfigureArgs),
}

#[derive(Debug, Args)]
pub struct ConfigureArgs {
    /// Workload to configure (oracle, mysql, postgres, redis, mongodb, sqlserver).
    pub workload: String,

    /// Configuration path to read and write back.
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Explicitly enable the service.
    #[arg(long, conflicts_with_all = ["disable", "auto"])]
    pub enable: bool,

    /// Explicitly disable the service.
    #[arg(long, conflicts_with = "auto")]
    pub disable: bool,

    /// Clear the explicit flag: enable automatically when the workload is present.
    #[arg(long)]
    pub auto: bool,

    /// Turn database discovery on or off.
    #[arg(long)]
    pub discovery_enabled: Option<bool>,

    /// Turn metric collection on or off.
    #[arg(long)]
    pub metrics_enabled: Option<bool>,

    /// Metric collection frequency in seconds.
    #[arg(long)]
    pub collection_frequency_secs: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startdaemon_accepts_a_config_path() {
        let cli = Cli::parse_from(["wlagent", "startdaemon", "--config", "/tmp/agent.toml"]);
        match cli.command {
            Command::Startdaemon { config } => {
                assert_eq!(config.unwrap(), PathBuf::from("/tmp/agent.toml"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn configure_parses_workload_and_flags() {
        let cli = Cli::parse_from(["wlagent", "configure", "mysql", "--enable"]);
        match cli.command {
            Command::Configure(args) => {
                assert_eq!(args.workload, "mysql");
                assert!(args.enable);
                assert!(!args.disable);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn enable_and_disable_conflict() {
        assert!(Cli::try_parse_from(["wlagent", "configure", "mysql", "--enable", "--disable"])
            .is_err());
    }
}
