//! Daemon mode: supervisor wiring and process lifecycle.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use wlagent_cloud::{
    AccessTokenProvider, DataWarehouseClient, SecretFetcher, SecretManagerClient, TimeSeriesClient,
};
use wlagent_common::usage::{codes, LogUsageSink, UsageEvent, UsageSink};
use wlagent_common::{AGENT_NAME, AGENT_VERSION};
use wlagent_config::{Configuration, DEFAULT_CONFIG_PATH};
use wlagent_discovery::{DiscoveryFanout, SystemProcessLister};
use wlagent_insights::{
    collect_override_metrics, InsightShipper, TimeSeriesShipper, METRIC_OVERRIDE_PATH,
};

use crate::recovery::RecoverableRoutine;
use crate::services::{self, ServiceDeps, WorkloadService};

/// Capacity of each service's inbound discovery channel. Snapshots dropped on
/// a full channel are fine: presence only needs to latch once.
const DISCOVERY_CHANNEL_CAPACITY: usize = 10;

/// How long the supervisor waits after cancellation before exiting.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(3);

/// How often the override file is re-read and shipped.
const OVERRIDE_COLLECTION_FREQUENCY: Duration = Duration::from_secs(300);

/// Runs the `startdaemon` subcommand until a shutdown signal arrives.
pub async fn run(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = Configuration::load(&path)
        .with_context(|| format!("loading {} configuration file", path.display()))?;
    init_logging(&config)?;

    tracing::info!(
        agent_name = AGENT_NAME,
        agent_version = AGENT_VERSION,
        "starting daemon mode"
    );
    let cp = &config.cloud_properties;
    tracing::info!(
        project_id = %cp.project_id,
        numeric_project_id = %cp.numeric_project_id,
        instance_id = %cp.instance_id,
        instance_name = %cp.instance_name,
        zone = %cp.zone,
        machine_type = %cp.machine_type,
        image = %cp.image,
        "cloud properties"
    );

    let usage: Arc<dyn UsageSink> = Arc::new(LogUsageSink);
    usage.record(UsageEvent::Configured);
    usage.record(UsageEvent::Started);

    let token = CancellationToken::new();
    run_supervisor(&config, usage.clone(), &token).await;

    wait_for_shutdown_signal().await?;
    tracing::info!("shutdown signal observed, the agent will begin shutting down");
    token.cancel();
    usage.record(UsageEvent::Stopped);
    tokio::time::sleep(SHUTDOWN_DRAIN).await;
    tracing::info!("shutting down");
    Ok(())
}

fn init_logging(config: &Configuration) -> anyhow::Result<()> {
    let directive = format!("wlagent={}", config.log_level.as_filter());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive.parse()?))
        .init();
    if config.log_to_cloud {
        // The hosted logging sink picks the stream up from the host; nothing
        // extra to wire here.
        tracing::debug!("cloud logging enabled");
    }
    Ok(())
}

/// Builds the cloud clients, the per-service channels, and spawns every
/// long-lived routine under the recovery wrapper.
async fn run_supervisor(
    config: &Configuration,
    usage: Arc<dyn UsageSink>,
    token: &CancellationToken,
) {
    let shipper = Arc::new(InsightShipper::new(
        Arc::new(DataWarehouseClient::new(
            config.data_warehouse_endpoint.clone(),
            AccessTokenProvider::new(),
        )),
        config.cloud_properties.clone(),
        usage.clone(),
    ));
    let timeseries = Arc::new(TimeSeriesShipper::new(
        Arc::new(TimeSeriesClient::new(AccessTokenProvider::new())),
        config.cloud_properties.project_id.clone(),
        usage.clone(),
    ));
    let secrets: Arc<dyn SecretFetcher> =
        Arc::new(SecretManagerClient::new(AccessTokenProvider::new()));
    let deps = ServiceDeps {
        shipper: shipper.clone(),
        timeseries,
        secrets,
        usage: usage.clone(),
    };

    let mut subscribers = Vec::new();
    let mut workload_services: Vec<Arc<dyn WorkloadService>> = Vec::new();
    macro_rules! wire_service {
        ($module:ident) => {{
            let (tx, rx) = mpsc::channel(DISCOVERY_CHANNEL_CAPACITY);
            subscribers.push(tx);
            workload_services.push(services::$module::service(config, &deps, rx));
        }};
    }
    wire_service!(oracle);
    wire_service!(mysql);
    wire_service!(postgres);
    wire_service!(redis);
    wire_service!(mongodb);
    wire_service!(sqlserver);

    for service in workload_services {
        tracing::info!(service = service.name(), "starting service");
        let routine_service = Arc::clone(&service);
        RecoverableRoutine {
            name: service.name(),
            routine: move |t| {
                let service = Arc::clone(&routine_service);
                async move { service.start(t).await }
            },
            error_code: service.error_code(),
            expected_min_duration: service.expected_min_duration(),
            usage: usage.clone(),
        }
        .start(token.child_token());
    }

    let fanout = Arc::new(DiscoveryFanout::new(
        Arc::new(SystemProcessLister),
        config.common_discovery.collection_frequency(),
        subscribers,
    ));
    RecoverableRoutine {
        name: "Common Discovery",
        routine: move |t| {
            let fanout = Arc::clone(&fanout);
            async move { fanout.run(t).await }
        },
        error_code: codes::COMMON_DISCOVERY_FAILURE,
        expected_min_duration: Duration::ZERO,
        usage: usage.clone(),
    }
    .start(token.child_token());

    let override_shipper = shipper.clone();
    RecoverableRoutine {
        name: "Metric Override",
        routine: move |t| {
            let shipper = override_shipper.clone();
            async move { run_override_metrics(shipper, Path::new(METRIC_OVERRIDE_PATH), t).await }
        },
        error_code: codes::METRIC_OVERRIDE_FAILURE,
        expected_min_duration: Duration::ZERO,
        usage: usage.clone(),
    }
    .start(token.child_token());

    tokio::spawn(run_daily_heartbeat(usage.clone(), token.child_token()));
}

/// Ships synthetic batches from the override file while it exists. The file
/// is diagnostic-only and read anew every tick; live collection is never
/// affected by it.
async fn run_override_metrics(
    shipper: Arc<InsightShipper>,
    path: &Path,
    token: CancellationToken,
) {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            tracing::info!(path = %path.display(), "reading override metrics file");
            for line in content.lines() {
                tracing::debug!(line, "override metric line");
            }
        }
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "could not read the metric override file");
            return;
        }
    }

    let mut ticker = tokio::time::interval(OVERRIDE_COLLECTION_FREQUENCY);
    ticker.tick().await;
    loop {
        let batches = collect_override_metrics(path);
        if !batches.is_empty() {
            shipper.clone().send_metrics(batches).await;
        }
        tokio::select! {
            _ = token.cancelled() => {
                tracing::info!("metric collection override cancellation requested");
                return;
            }
            _ = ticker.tick() => {}
        }
    }
}

/// Records a RUNNING usage metric once a day.
async fn run_daily_heartbeat(usage: Arc<dyn UsageSink>, token: CancellationToken) {
    loop {
        usage.record(UsageEvent::Running);
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(Duration::from_secs(24 * 3600)) => {}
        }
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = interrupt.recv() => {}
        _ = terminate.recv() => {}
        _ = hangup.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
