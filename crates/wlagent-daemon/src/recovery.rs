//! Recoverable routines.
//!
//! Long-lived bodies run inside their own task so a panic is caught at the
//! join. A body that panicked after running for at least its expected
//! minimum duration is restarted under the same token; one that crashed
//! sooner is in a crash loop and gets reported as a permanent failure
//! instead of masquerading as a healthy restart.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use wlagent_common::usage::{UsageEvent, UsageSink};

pub struct RecoverableRoutine<F> {
    pub name: &'static str,
    pub routine: F,
    pub error_code: i32,
    pub expected_min_duration: Duration,
    pub usage: Arc<dyn UsageSink>,
}

impl<F, Fut> RecoverableRoutine<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    /// Spawns the supervising task and returns its handle. The routine's
    /// clean return ends supervision; only panics trigger the restart
    /// policy.
    pub fn start(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let started = Instant::now();
                let body = tokio::spawn((self.routine)(token.clone()));
                match body.await {
                    Ok(()) => return,
                    Err(e) if e.is_panic() => {
                        self.usage.record(UsageEvent::Error(self.error_code));
                        if token.is_cancelled() {
                            return;
                        }
                        let lived = started.elapsed();
                        if lived >= self.expected_min_duration {
                            tracing::warn!(
                                routine = self.name,
                                lived_secs = lived.as_secs(),
                                "routine panicked after running long enough, restarting"
                            );
                            continue;
                        }
                        tracing::error!(
                            routine = self.name,
                            lived_ms = lived.as_millis() as u64,
                            min_secs = self.expected_min_duration.as_secs(),
                            "routine crashed too quickly, giving up"
                        );
                        return;
                    }
                    Err(_) => return,
                }
            }
        })
    }
}
