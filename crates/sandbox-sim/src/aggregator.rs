//! Resource aggregator: publishes total requested CPU and memory of the
//! live sandboxes.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::SandboxCache;
use crate::clock::Clock;
use crate::metrics::{METRIC_TYPE_REAL, MetricsSink, NodeMetric};
use crate::quantity::Quantity;
use crate::record::{RESOURCE_CPU, RESOURCE_MEMORY};

pub const DEFAULT_RESOURCE_INTERVAL: Duration = Duration::from_secs(15);

pub struct ResourceAggregator {
    cache: Arc<SandboxCache>,
    sink: Arc<dyn MetricsSink>,
    clock: Arc<dyn Clock>,
}

impl ResourceAggregator {
    pub fn new(cache: Arc<SandboxCache>, sink: Arc<dyn MetricsSink>, clock: Arc<dyn Clock>) -> Self {
        Self { cache, sink, clock }
    }

    /// Build the current sample without publishing it.
    pub fn sample(&self) -> NodeMetric {
        let snapshot = self.cache.snapshot();
        let cpu: Quantity = snapshot
            .values()
            .map(|r| r.requested_quantity(RESOURCE_CPU))
            .sum();
        let memory: Quantity = snapshot
            .values()
            .map(|r| r.requested_quantity(RESOURCE_MEMORY))
            .sum();

        NodeMetric {
            metric_type: METRIC_TYPE_REAL.to_string(),
            sample_time: self.clock.now(),
            capacity: BTreeMap::from([
                (RESOURCE_CPU.to_string(), cpu.milli_value().to_string()),
                (RESOURCE_MEMORY.to_string(), memory.value().to_string()),
            ]),
        }
    }

    /// Sample and publish. A publish failure drops the sample.
    pub async fn tick(&self) -> Option<NodeMetric> {
        let sample = self.sample();
        match self.sink.publish_node_metrics(&sample).await {
            Ok(()) => {
                debug!(capacity = ?sample.capacity, "node metrics published");
                Some(sample)
            }
            Err(e) => {
                warn!(error = %e, "failed to publish node metrics");
                None
            }
        }
    }

    pub async fn run(self, interval: Duration, shutdown: CancellationToken) {
        let interval = interval.max(Duration::from_millis(1));
        info!(interval = ?interval, "resource aggregator started");

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

        info!("resource aggregator stopped");
    }
}
