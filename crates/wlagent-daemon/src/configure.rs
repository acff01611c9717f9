//! The `configure` subcommand: one-shot edits to the on-disk configuration.

use std::path::PathBuf;

use anyhow::Context;

use wlagent_common::types::WorkloadType;
use wlagent_config::{Configuration, Toggle, DEFAULT_CONFIG_PATH};

use crate::cli::ConfigureArgs;

pub fn run(args: &ConfigureArgs) -> anyhow::Result<()> {
    let path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let mut config = Configuration::load(&path)?;
    apply(&mut config, args)?;
    config.store(&path)?;
    println!("updated {} configuration in {}", args.workload, path.display());
    Ok(())
}

fn apply(config: &mut Configuration, args: &ConfigureArgs) -> anyhow::Result<()> {
    let workload: WorkloadType = args
        .workload
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    let section = config
        .workload_mut(workload)
        .with_context(|| format!("{workload} is not a configurable workload"))?;

    if args.enable {
        section.enabled = Toggle::Enabled;
    } else if args.disable {
        section.enabled = Toggle::Disabled;
    } else if args.auto {
        section.enabled = Toggle::Auto;
    }
    if let Some(enabled) = args.discovery_enabled {
        section.discovery.enabled = enabled;
    }
    if let Some(enabled) = args.metrics_enabled {
        section.metrics.enabled = enabled;
    }
    if let Some(secs) = args.collection_frequency_secs {
        anyhow::ensure!(secs > 0, "collection_frequency_secs must be positive");
        section.metrics.collection_frequency_secs = secs;
    }
    Ok(())
}
