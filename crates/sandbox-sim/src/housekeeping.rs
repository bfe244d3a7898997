//! Spawns the two periodic housekeeping loops.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::aggregator::ResourceAggregator;
use crate::cache::SandboxCache;
use crate::clock::Clock;
use crate::metrics::MetricsSink;
use crate::reconciler::LifecycleReconciler;
use crate::store::ClusterStore;

fn default_lifecycle_interval_ms() -> u64 {
    1_000
}

fn default_resource_interval_ms() -> u64 {
    15_000
}

/// Loop periods in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HousekeepingConfig {
    #[serde(default = "default_lifecycle_interval_ms")]
    pub lifecycle_interval_ms: u64,
    #[serde(default = "default_resource_interval_ms")]
    pub resource_interval_ms: u64,
}

impl Default for HousekeepingConfig {
    fn default() -> Self {
        Self {
            lifecycle_interval_ms: default_lifecycle_interval_ms(),
            resource_interval_ms: default_resource_interval_ms(),
        }
    }
}

impl HousekeepingConfig {
    pub fn lifecycle_interval(&self) -> Duration {
        Duration::from_millis(self.lifecycle_interval_ms)
    }

    pub fn resource_interval(&self) -> Duration {
        Duration::from_millis(self.resource_interval_ms)
    }
}

/// Handles of the running loops. Both exit once the shared token is cancelled.
pub struct Housekeeping {
    lifecycle: JoinHandle<()>,
    resources: JoinHandle<()>,
}

impl Housekeeping {
    /// Wait for both loops to finish.
    pub async fn join(self) {
        for (name, handle) in [("lifecycle", self.lifecycle), ("resources", self.resources)] {
            if let Err(e) = handle.await {
                tracing::error!(task = name, error = %e, "housekeeping task failed");
            }
        }
    }
}

/// Start the lifecycle reconciler and the resource aggregator on the current
/// runtime.
pub fn spawn(
    config: HousekeepingConfig,
    cache: Arc<SandboxCache>,
    store: Arc<dyn ClusterStore>,
    sink: Arc<dyn MetricsSink>,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
) -> Housekeeping {
    let reconciler = LifecycleReconciler::new(Arc::clone(&cache), store, Arc::clone(&clock));
    let aggregator = ResourceAggregator::new(cache, sink, clock);

    let lifecycle = tokio::spawn(reconciler.run(config.lifecycle_interval(), shutdown.clone()));
    let resources = tokio::spawn(aggregator.run(config.resource_interval(), shutdown));
    Housekeeping {
        lifecycle,
        resources,
    }
}
