//! Workload services.
//!
//! Every supported database gets the same supervised state machine: gate on
//! the tri-state enable flag, latch workload presence from discovery
//! snapshots, then run independent discovery and metric-collection loops
//! until the root token cancels. The per-workload modules only supply a
//! parameter block and a collector.

pub mod mongodb;
pub mod mysql;
pub mod oracle;
pub mod postgres;
pub mod redis;
pub mod sqlserver;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use wlagent_cloud::SecretFetcher;
use wlagent_common::types::WorkloadType;
use wlagent_common::usage::{UsageEvent, UsageSink};
use wlagent_config::{Toggle, WorkloadConfig};
use wlagent_discovery::{has_any_prefix, DiscoveryMessage, MessageOrigin, ProcessHandle};
use wlagent_insights::{InsightShipper, TimeSeriesShipper};
use wlagent_metrics::WorkloadCollector;

use crate::recovery::RecoverableRoutine;

/// How long an auto-gated service sleeps between presence checks.
const PRESENCE_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Minimum runtime for a service sub-loop to qualify for restart.
const LOOP_MIN_DURATION: Duration = Duration::from_secs(20);

/// A supervised workload service as the daemon sees it.
#[async_trait::async_trait]
pub trait WorkloadService: Send + Sync {
    fn name(&self) -> &'static str;
    fn error_code(&self) -> i32;
    fn expected_min_duration(&self) -> Duration {
        Duration::from_secs(20)
    }
    async fn start(self: Arc<Self>, token: CancellationToken);
}

/// Derives the database-identity cache from a process snapshot.
pub type IdentityFn = fn(&[Arc<dyn ProcessHandle>]) -> Vec<String>;

/// Everything that distinguishes one workload service from another.
pub struct ServiceParams {
    pub workload: WorkloadType,
    pub name: &'static str,
    pub error_code: i32,
    pub discovery_error_code: i32,
    pub collection_error_code: i32,
    /// Process-name prefixes that mark the workload as present.
    pub prefixes: &'static [&'static str],
    /// The probed client library only exists on Linux.
    pub linux_only: bool,
    /// Override for workloads whose identities are not just process names.
    pub identity: Option<IdentityFn>,
}

/// Shared collaborators handed to every service at construction.
#[derive(Clone)]
pub struct ServiceDeps {
    pub shipper: Arc<InsightShipper>,
    pub timeseries: Arc<TimeSeriesShipper>,
    pub secrets: Arc<dyn SecretFetcher>,
    pub usage: Arc<dyn UsageSink>,
}

/// Process snapshot plus the presence latch, shared between the inbound loop
/// and the gate.
pub struct ServiceCore {
    prefixes: &'static [&'static str],
    processes: Mutex<Option<Vec<Arc<dyn ProcessHandle>>>>,
    is_process_present: AtomicBool,
}

impl ServiceCore {
    pub fn new(prefixes: &'static [&'static str]) -> Self {
        Self {
            prefixes,
            processes: Mutex::new(None),
            is_process_present: AtomicBool::new(false),
        }
    }

    /// Applies one discovery message: replace the snapshot and latch the
    /// presence flag once a matching process name shows up. Unknown origins
    /// are ignored.
    pub fn observe(&self, message: &DiscoveryMessage) {
        match message.origin {
            MessageOrigin::ProcessDiscovery => {
                let processes = message.result.processes.clone();
                if !self.is_process_present.load(Ordering::SeqCst) {
                    for process in &processes {
                        if let Ok(name) = process.name() {
                            if has_any_prefix(&name, self.prefixes) {
                                self.is_process_present.store(true, Ordering::SeqCst);
                                break;
                            }
                        }
                    }
                }
                *self.processes.lock().unwrap() = Some(processes);
            }
            MessageOrigin::DataWarehouseActivation => {}
        }
    }

    pub fn is_process_present(&self) -> bool {
        self.is_process_present.load(Ordering::SeqCst)
    }

    pub fn processes(&self) -> Option<Vec<Arc<dyn ProcessHandle>>> {
        self.processes.lock().unwrap().clone()
    }
}

/// Whether this host can run a service with the given platform constraint.
pub fn platform_supported(linux_only: bool) -> bool {
    !linux_only || cfg!(target_os = "linux")
}

pub struct DatabaseService {
    params: ServiceParams,
    config: WorkloadConfig,
    core: ServiceCore,
    receiver: Mutex<Option<mpsc::Receiver<Arc<DiscoveryMessage>>>>,
    collector: tokio::sync::Mutex<Box<dyn WorkloadCollector>>,
    identities: Mutex<Vec<String>>,
    deps: ServiceDeps,
}

impl DatabaseService {
    pub fn new(
        params: ServiceParams,
        config: WorkloadConfig,
        collector: Box<dyn WorkloadCollector>,
        deps: ServiceDeps,
        receiver: mpsc::Receiver<Arc<DiscoveryMessage>>,
    ) -> Arc<Self> {
        let core = ServiceCore::new(params.prefixes);
        Arc::new(Self {
            params,
            config,
            core,
            receiver: Mutex::new(Some(receiver)),
            collector: tokio::sync::Mutex::new(collector),
            identities: Mutex::new(Vec::new()),
            deps,
        })
    }

    /// The identity cache built by the discovery loop. Read-only elsewhere.
    pub fn database_identities(&self) -> Vec<String> {
        self.identities.lock().unwrap().clone()
    }

    /// Consumes discovery messages until cancellation.
    async fn run_inbound(self: Arc<Self>, token: CancellationToken) {
        let Some(mut receiver) = self.receiver.lock().unwrap().take() else {
            return;
        };
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                message = receiver.recv() => match message {
                    Some(message) => self.core.observe(&message),
                    None => return,
                },
            }
        }
    }

    /// The enable gate. Returns false when the service must not activate.
    /// The decision latches: it is evaluated exactly once.
    async fn wait_until_enabled(&self, token: &CancellationToken) -> bool {
        match self.config.enabled {
            Toggle::Disabled => {
                tracing::info!(service = self.params.name, "service is disabled");
                false
            }
            Toggle::Enabled => true,
            Toggle::Auto => {
                tracing::info!(
                    service = self.params.name,
                    "enabled flag is not set, waiting for workload presence"
                );
                loop {
                    if self.core.is_process_present() {
                        tracing::info!(service = self.params.name, "workload is present, starting service");
                        return true;
                    }
                    tokio::select! {
                        _ = token.cancelled() => return false,
                        _ = tokio::time::sleep(PRESENCE_POLL_INTERVAL) => {}
                    }
                }
            }
        }
    }

    /// Rebuilds the database-identity cache on its own timer. Does not start
    /// until the first process snapshot has arrived.
    async fn run_discovery(self: Arc<Self>, token: CancellationToken) {
        tracing::info!(service = self.params.name, "running database discovery");
        while self.core.processes().is_none() {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(PRESENCE_POLL_INTERVAL) => {}
            }
        }

        let mut ticker = tokio::time::interval(self.config.discovery.update_frequency());
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::info!(service = self.params.name, "database discovery cancellation requested");
                    return;
                }
                _ = ticker.tick() => {}
            }
            let processes = self.core.processes().unwrap_or_default();
            let identities = match self.params.identity {
                Some(identity) => identity(&processes),
                None => matching_process_names(self.params.prefixes, &processes),
            };
            tracing::info!(
                service = self.params.name,
                count = identities.len(),
                "database discovery refreshed"
            );
            *self.identities.lock().unwrap() = identities;
        }
    }

    /// Collects and ships metrics on its own timer. Connection establishment
    /// is lazy and retried every tick after a failure; a tick never overlaps
    /// the previous one because all shipping tasks are joined before the
    /// next select.
    async fn run_metric_collection(self: Arc<Self>, token: CancellationToken) {
        tracing::info!(service = self.params.name, "running metric collection");
        let mut ticker = tokio::time::interval(self.config.metrics.collection_frequency());
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::info!(service = self.params.name, "metric collection cancellation requested");
                    return;
                }
                _ = ticker.tick() => {}
            }
            self.collect_tick().await;
        }
    }

    async fn collect_tick(&self) {
        let mut collector = self.collector.lock().await;
        if let Err(e) = collector.init_db().await {
            tracing::error!(service = self.params.name, error = %e, "failed to initialize database connection, will retry next tick");
            self.deps
                .usage
                .record(UsageEvent::Error(self.params.collection_error_code));
            return;
        }
        let output = match collector.collect_once().await {
            Ok(output) => output,
            Err(e) => {
                tracing::error!(service = self.params.name, error = %e, "metric collection failed");
                self.deps
                    .usage
                    .record(UsageEvent::Error(self.params.collection_error_code));
                return;
            }
        };
        drop(collector);

        let failed = self
            .deps
            .shipper
            .clone()
            .send_metrics(vec![output.metrics])
            .await;
        let series_ok = self.deps.timeseries.send_points(output.points).await;
        if failed > 0 || !series_ok {
            tracing::warn!(service = self.params.name, "tick shipped with errors");
        }
    }
}

fn matching_process_names(
    prefixes: &[&str],
    processes: &[Arc<dyn ProcessHandle>],
) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for process in processes {
        let Ok(name) = process.name() else { continue };
        if has_any_prefix(&name, prefixes) && !names.contains(&name) {
            names.push(name);
        }
    }
    names.sort();
    names
}

#[async_trait::async_trait]
impl WorkloadService for DatabaseService {
    fn name(&self) -> &'static str {
        self.params.name
    }

    fn error_code(&self) -> i32 {
        self.params.error_code
    }

    async fn start(self: Arc<Self>, token: CancellationToken) {
        let inbound = Arc::clone(&self);
        tokio::spawn(inbound.run_inbound(token.clone()));

        if !self.wait_until_enabled(&token).await {
            return;
        }
        if !platform_supported(self.params.linux_only) {
            tracing::error!(
                service = self.params.name,
                "service is only supported on Linux, refusing to start"
            );
            return;
        }

        if self.config.discovery.enabled {
            let service = Arc::clone(&self);
            RecoverableRoutine {
                name: self.params.name,
                routine: move |t| {
                    let service = Arc::clone(&service);
                    async move { service.run_discovery(t).await }
                },
                error_code: self.params.discovery_error_code,
                expected_min_duration: LOOP_MIN_DURATION,
                usage: self.deps.usage.clone(),
            }
            .start(token.clone());
        }

        if self.config.metrics.enabled {
            let service = Arc::clone(&self);
            RecoverableRoutine {
                name: self.params.name,
                routine: move |t| {
                    let service = Arc::clone(&service);
                    async move { service.run_metric_collection(t).await }
                },
                error_code: self.params.collection_error_code,
                expected_min_duration: LOOP_MIN_DURATION,
                usage: self.deps.usage.clone(),
            }
            .start(token.clone());
        }

        token.cancelled().await;
        tracing::info!(service = self.params.name, "service cancellation requested");
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use wlagent_cloud::types::{WriteInsightRequest, WriteInsightResponse};
    use wlagent_cloud::{CloudError, InsightWriter, TimeSeriesWriter};
    use wlagent_common::types::{CloudProperties, WorkloadMetrics};
    use wlagent_common::usage::RecordingUsageSink;
    use wlagent_discovery::process::ProcessSnapshot;
    use wlagent_discovery::DiscoveryResult;
    use wlagent_metrics::{CollectionOutput, MetricsError, WorkloadCollector};

    pub struct CountingWarehouse {
        pub writes: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl InsightWriter for CountingWarehouse {
        async fn write_insight(
            &self,
            _project_id: &str,
            _location: &str,
            _request: &WriteInsightRequest,
        ) -> Result<Option<WriteInsightResponse>, CloudError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }
    }

    pub struct NullMonitoring;

    #[async_trait::async_trait]
    impl TimeSeriesWriter for NullMonitoring {
        async fn write_time_series(
            &self,
            _project_id: &str,
            _request: &wlagent_cloud::types::WriteTimeSeriesRequest,
        ) -> Result<(), CloudError> {
            Ok(())
        }
    }

    pub struct FakeCollector {
        pub workload: WorkloadType,
        pub collects: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl WorkloadCollector for FakeCollector {
        fn workload_type(&self) -> WorkloadType {
            self.workload
        }

        async fn init_db(&mut self) -> Result<(), MetricsError> {
            Ok(())
        }

        async fn collect_once(&mut self) -> Result<CollectionOutput, MetricsError> {
            self.collects.fetch_add(1, Ordering::SeqCst);
            Ok(CollectionOutput {
                metrics: WorkloadMetrics {
                    workload_type: self.workload,
                    metrics: Default::default(),
                },
                points: Vec::new(),
            })
        }
    }

    pub struct Harness {
        pub warehouse: Arc<CountingWarehouse>,
        pub usage: Arc<RecordingUsageSink>,
        pub deps: ServiceDeps,
    }

    pub fn harness() -> Harness {
        let warehouse = Arc::new(CountingWarehouse {
            writes: AtomicUsize::new(0),
        });
        let usage = Arc::new(RecordingUsageSink::default());
        let shipper = Arc::new(InsightShipper::new(
            warehouse.clone(),
            CloudProperties::default(),
            usage.clone(),
        ));
        let timeseries = Arc::new(TimeSeriesShipper::new(
            Arc::new(NullMonitoring),
            "test-project".to_string(),
            usage.clone(),
        ));
        let deps = ServiceDeps {
            shipper,
            timeseries,
            secrets: Arc::new(NullSecrets),
            usage: usage.clone(),
        };
        Harness {
            warehouse,
            usage,
            deps,
        }
    }

    pub struct NullSecrets;

    #[async_trait::async_trait]
    impl wlagent_cloud::SecretFetcher for NullSecrets {
        async fn fetch(
            &self,
            _project_id: &str,
            _secret_name: &str,
        ) -> Result<String, CloudError> {
            Ok(String::new())
        }
    }

    pub fn discovery_message(names: &[&str]) -> Arc<DiscoveryMessage> {
        Arc::new(DiscoveryMessage {
            origin: MessageOrigin::ProcessDiscovery,
            result: DiscoveryResult {
                processes: names
                    .iter()
                    .enumerate()
                    .map(|(i, name)| {
                        Arc::new(ProcessSnapshot {
                            pid: i as u32 + 1,
                            name: Some(name.to_string()),
                            ..Default::default()
                        }) as Arc<dyn ProcessHandle>
                    })
                    .collect(),
            },
        })
    }

    pub fn fast_config(enabled: Toggle) -> WorkloadConfig {
        let mut config = WorkloadConfig::default();
        config.enabled = enabled;
        config.discovery.update_frequency_secs = 1;
        config.metrics.collection_frequency_secs = 1;
        config
    }

    pub fn test_params(workload: WorkloadType, prefixes: &'static [&'static str]) -> ServiceParams {
        ServiceParams {
            workload,
            name: "Test Service",
            error_code: 99,
            discovery_error_code: 98,
            collection_error_code: 97,
            prefixes,
            linux_only: false,
            identity: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use wlagent_metrics::MetricsError;

    #[test]
    fn presence_latches_once_matched() {
        let core = ServiceCore::new(&["mysqld"]);
        assert!(!core.is_process_present());
        core.observe(&discovery_message(&["systemd", "mysqld"]));
        assert!(core.is_process_present());
        // The latch survives the workload disappearing from later snapshots.
        core.observe(&discovery_message(&["systemd"]));
        assert!(core.is_process_present());
        assert_eq!(core.processes().unwrap().len(), 1);
    }

    #[test]
    fn non_matching_snapshot_does_not_latch() {
        let core = ServiceCore::new(&["mysqld"]);
        core.observe(&discovery_message(&["postgres", "redis-server"]));
        assert!(!core.is_process_present());
    }

    #[tokio::test]
    async fn disabled_service_never_collects() {
        let h = harness();
        let collects = Arc::new(AtomicUsize::new(0));
        let (_tx, rx) = mpsc::channel(1);
        let service = DatabaseService::new(
            test_params(WorkloadType::Mysql, &["mysqld"]),
            fast_config(Toggle::Disabled),
            Box::new(FakeCollector {
                workload: WorkloadType::Mysql,
                collects: collects.clone(),
            }),
            h.deps.clone(),
            rx,
        );

        let token = CancellationToken::new();
        // A disabled service returns on its own, without cancellation.
        service.start(token).await;
        assert_eq!(collects.load(Ordering::SeqCst), 0);
        assert_eq!(h.warehouse.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn auto_service_activates_on_process_presence() {
        let h = harness();
        let collects = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel(4);
        let service = DatabaseService::new(
            test_params(WorkloadType::Mysql, &["mysqld"]),
            fast_config(Toggle::Auto),
            Box::new(FakeCollector {
                workload: WorkloadType::Mysql,
                collects: collects.clone(),
            }),
            h.deps.clone(),
            rx,
        );

        let token = CancellationToken::new();
        let run = tokio::spawn(Arc::clone(&service).start(token.clone()));

        tx.send(discovery_message(&["mysqld"])).await.unwrap();
        // Let the gate poll, the metric loop start, and a few ticks fire.
        tokio::time::sleep(Duration::from_secs(12)).await;

        assert!(collects.load(Ordering::SeqCst) >= 1);
        assert!(h.warehouse.writes.load(Ordering::SeqCst) >= 1);

        token.cancel();
        run.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn auto_service_without_workload_stays_idle() {
        let h = harness();
        let collects = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel(4);
        let service = DatabaseService::new(
            test_params(WorkloadType::Mysql, &["mysqld"]),
            fast_config(Toggle::Auto),
            Box::new(FakeCollector {
                workload: WorkloadType::Mysql,
                collects: collects.clone(),
            }),
            h.deps.clone(),
            rx,
        );

        let token = CancellationToken::new();
        let run = tokio::spawn(Arc::clone(&service).start(token.clone()));

        tx.send(discovery_message(&["postgres"])).await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(collects.load(Ordering::SeqCst), 0);
        assert_eq!(h.warehouse.writes.load(Ordering::SeqCst), 0);

        token.cancel();
        run.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn discovery_loop_builds_the_identity_cache() {
        let h = harness();
        let (tx, rx) = mpsc::channel(4);
        let service = DatabaseService::new(
            test_params(WorkloadType::Mysql, &["mysqld"]),
            fast_config(Toggle::Enabled),
            Box::new(FakeCollector {
                workload: WorkloadType::Mysql,
                collects: Arc::new(AtomicUsize::new(0)),
            }),
            h.deps.clone(),
            rx,
        );

        let token = CancellationToken::new();
        let run = tokio::spawn(Arc::clone(&service).start(token.clone()));

        tx.send(discovery_message(&["mysqld", "systemd"])).await.unwrap();
        tokio::time::sleep(Duration::from_secs(12)).await;

        assert_eq!(service.database_identities(), vec!["mysqld".to_string()]);

        token.cancel();
        run.await.unwrap();
    }

    struct FailingCollector {
        attempts: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl WorkloadCollector for FailingCollector {
        fn workload_type(&self) -> WorkloadType {
            WorkloadType::Postgres
        }

        async fn init_db(&mut self) -> Result<(), MetricsError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(MetricsError::Connection("fake-error".to_string()))
        }

        async fn collect_once(
            &mut self,
        ) -> Result<wlagent_metrics::CollectionOutput, MetricsError> {
            unreachable!("collect_once must not run when init_db fails")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_init_db_is_retried_next_tick() {
        let h = harness();
        let attempts = Arc::new(AtomicUsize::new(0));
        let (_tx, rx) = mpsc::channel(1);
        let service = DatabaseService::new(
            test_params(WorkloadType::Postgres, &["postgres"]),
            fast_config(Toggle::Enabled),
            Box::new(FailingCollector {
                attempts: attempts.clone(),
            }),
            h.deps.clone(),
            rx,
        );

        let token = CancellationToken::new();
        let run = tokio::spawn(Arc::clone(&service).start(token.clone()));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(attempts.load(Ordering::SeqCst) >= 2);
        assert_eq!(h.warehouse.writes.load(Ordering::SeqCst), 0);

        token.cancel();
        run.await.unwrap();
    }
}
