//! Lifecycle reconciler: drives expired sandboxes to their terminal phase.
//!
//! Each tick works on a cache snapshot. For every expired record the pod is
//! fetched, rewritten to the terminal state and pushed back; only a
//! successful push evicts the record. Any store failure leaves the record in
//! place so the next tick retries it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::SandboxCache;
use crate::clock::Clock;
use crate::error::StoreError;
use crate::log_reduction::LogReduction;
use crate::pod::{ContainerState, ContainerStateTerminated, Pod};
use crate::record::{SandboxRecord, TerminationOutcome};
use crate::store::ClusterStore;

pub const DEFAULT_LIFECYCLE_INTERVAL: Duration = Duration::from_secs(1);

/// Per-tick counts, mostly for logs and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Records found past their simulated duration.
    pub expired: usize,
    /// Records whose terminal status was pushed and that left the cache.
    pub terminated: usize,
    /// Records left for the next tick after a store failure.
    pub deferred: usize,
}

#[derive(Debug, thiserror::Error)]
enum TerminateError {
    #[error("get pod: {0}")]
    Fetch(StoreError),
    #[error("update pod status: {0}")]
    Update(StoreError),
}

/// Terminal instant pinned for one incarnation of a sandbox.
#[derive(Debug, Clone, Copy)]
struct Pin {
    record_started_at: DateTime<Utc>,
    at: DateTime<Utc>,
}

pub struct LifecycleReconciler {
    cache: Arc<SandboxCache>,
    store: Arc<dyn ClusterStore>,
    clock: Arc<dyn Clock>,
    pins: HashMap<String, Pin>,
    log_reduction: LogReduction,
}

impl LifecycleReconciler {
    pub fn new(cache: Arc<SandboxCache>, store: Arc<dyn ClusterStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache,
            store,
            clock,
            pins: HashMap::new(),
            log_reduction: LogReduction::default(),
        }
    }

    /// Run one reconciliation pass.
    pub async fn tick(&mut self) -> TickReport {
        let now = self.clock.now();
        let snapshot = self.cache.snapshot();

        // Forget pins for sandboxes that left the cache or were re-created.
        self.pins.retain(|id, pin| {
            snapshot
                .get(id)
                .is_some_and(|r| r.started_at() == pin.record_started_at)
        });
        self.log_reduction.retain(|id| snapshot.contains_key(id));

        let mut expired: Vec<Arc<SandboxRecord>> = snapshot
            .into_values()
            .filter(|r| r.is_expired(now))
            .collect();
        expired.sort_by(|a, b| a.id().cmp(b.id()));

        let mut report = TickReport {
            expired: expired.len(),
            ..Default::default()
        };

        for record in expired {
            let at = self.pin(&record, now);
            match self.terminate(&record, at).await {
                Ok(()) => {
                    report.terminated += 1;
                    self.pins.remove(record.id());
                    self.log_reduction.clear(record.id());
                    if !self.cache.delete_if_current(&record) {
                        debug!(sandbox_id = %record.id(), "sandbox replaced during termination, keeping new entry");
                    }
                    info!(
                        sandbox_id = %record.id(),
                        namespace = %record.config().namespace,
                        pod = %record.config().name,
                        outcome = %record.outcome(),
                        "sandbox reached terminal phase"
                    );
                }
                Err(e) => {
                    report.deferred += 1;
                    let message = e.to_string();
                    if self.log_reduction.should_print(&message, record.id()) {
                        warn!(
                            sandbox_id = %record.id(),
                            namespace = %record.config().namespace,
                            pod = %record.config().name,
                            error = %message,
                            "failed to terminate sandbox, will retry"
                        );
                    }
                }
            }
        }

        if report.expired > 0 {
            debug!(
                expired = report.expired,
                terminated = report.terminated,
                deferred = report.deferred,
                "lifecycle tick"
            );
        }
        report
    }

    /// Tick every `interval` until `shutdown` is cancelled.
    pub async fn run(mut self, interval: Duration, shutdown: CancellationToken) {
        let interval = interval.max(Duration::from_millis(1));
        info!(interval = ?interval, "lifecycle reconciler started");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }

        info!("lifecycle reconciler stopped");
    }

    fn pin(&mut self, record: &SandboxRecord, now: DateTime<Utc>) -> DateTime<Utc> {
        let pin = self
            .pins
            .entry(record.id().to_string())
            .or_insert(Pin {
                record_started_at: record.started_at(),
                at: now,
            });
        if pin.record_started_at != record.started_at() {
            *pin = Pin {
                record_started_at: record.started_at(),
                at: now,
            };
        }
        pin.at
    }

    async fn terminate(&self, record: &SandboxRecord, at: DateTime<Utc>) -> Result<(), TerminateError> {
        let config = record.config();
        let pod = self
            .store
            .get_pod(&config.namespace, &config.name)
            .await
            .map_err(TerminateError::Fetch)?;

        let updated = terminal_pod(&pod, record.outcome(), at);
        self.store
            .update_pod_status(&updated)
            .await
            .map_err(TerminateError::Update)?;
        Ok(())
    }
}

/// Copy of `pod` moved to the terminal state for `outcome`.
///
/// Every container status becomes terminated with the outcome's exit code and
/// reason. Its start time is the prior running start when known, else `at`;
/// its finish time is `at`.
pub fn terminal_pod(pod: &Pod, outcome: TerminationOutcome, at: DateTime<Utc>) -> Pod {
    let mut pod = pod.clone();
    pod.status.phase = Some(outcome.phase());

    for status in &mut pod.status.container_statuses {
        let started_at = status
            .state
            .running
            .as_ref()
            .and_then(|r| r.started_at)
            .unwrap_or(at);

        status.ready = false;
        status.started = Some(false);
        status.state = ContainerState {
            waiting: None,
            running: None,
            terminated: Some(ContainerStateTerminated {
                exit_code: outcome.exit_code(),
                reason: Some(outcome.reason().to_string()),
                message: None,
                started_at: Some(started_at),
                finished_at: Some(at),
            }),
        };
    }
    pod
}
