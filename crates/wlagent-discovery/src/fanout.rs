//! Process-discovery fan-out.
//!
//! One producer scans the host process table on a slow timer and multicasts
//! the snapshot to every workload service over bounded channels. Sends are
//! non-blocking: a stuck consumer only costs itself a snapshot, never the
//! other services. Dropped sends are counted and logged.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::process::{ProcessHandle, ProcessLister};

/// Which component produced a message on the service channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOrigin {
    ProcessDiscovery,
    DataWarehouseActivation,
}

/// Snapshot of the host process table.
pub struct DiscoveryResult {
    pub processes: Vec<Arc<dyn ProcessHandle>>,
}

/// Message multicast to every workload service.
pub struct DiscoveryMessage {
    pub origin: MessageOrigin,
    pub result: DiscoveryResult,
}

/// Sender half of a workload service's inbound channel.
pub type Subscriber = mpsc::Sender<Arc<DiscoveryMessage>>;

pub struct DiscoveryFanout {
    lister: Arc<dyn ProcessLister>,
    period: Duration,
    subscribers: Vec<Subscriber>,
}

impl DiscoveryFanout {
    pub fn new(lister: Arc<dyn ProcessLister>, period: Duration, subscribers: Vec<Subscriber>) -> Self {
        Self {
            lister,
            period,
            subscribers,
        }
    }

    /// Runs until cancellation or until a process listing fails.
    ///
    /// A listing failure (or an empty process table, which means the listing
    /// itself is broken) terminates the loop; restarting after such a fault
    /// is the recoverable-routine wrapper's decision, not this loop's.
    pub async fn run(&self, token: CancellationToken) {
        tracing::info!(period_secs = self.period.as_secs(), "process discovery started");
        let mut ticker = tokio::time::interval(self.period);
        ticker.tick().await;

        loop {
            let processes = match self.lister.list_processes() {
                Ok(processes) if processes.is_empty() => {
                    tracing::error!("process discovery found no processes, stopping");
                    return;
                }
                Ok(processes) => processes,
                Err(e) => {
                    tracing::error!(error = %e, "process discovery failed, stopping");
                    return;
                }
            };
            tracing::info!(count = processes.len(), "process discovery scan complete");

            let message = Arc::new(DiscoveryMessage {
                origin: MessageOrigin::ProcessDiscovery,
                result: DiscoveryResult { processes },
            });

            let mut full_channels = 0usize;
            for subscriber in &self.subscribers {
                if subscriber.try_send(Arc::clone(&message)).is_err() {
                    full_channels += 1;
                }
            }
            if full_channels > 0 {
                tracing::info!(full_channels, "discovery snapshot dropped on full channels");
            }

            tokio::select! {
                _ = token.cancelled() => {
                    tracing::info!("process discovery cancellation requested");
                    return;
                }
                _ = ticker.tick() => {}
            }
        }
    }
}
