//! Sandbox verbs of the simulated runtime.
//!
//! The runtime proxy calls these instead of a real container runtime:
//! creation records the sandbox in the cache, stop and remove evict it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::cache::SandboxCache;
use crate::devices::DeviceCapacity;
use crate::error::{Result, SimError};
use crate::record::{SandboxConfig, SandboxRecord, TerminationOutcome};
use crate::requests::{UnrecognizedResources, derive_requests, zero_requests};
use crate::store::ClusterStore;

/// How long the sandbox runs before it terminates, in humantime form
/// (`30s`, `2m`). Absent means the sandbox never terminates on its own.
pub const ANNOTATION_RUNNING_DURATION: &str = "sim.sandbox/running-duration";

/// Terminal outcome, `Succeeded` or `Failed`. Absent means `Succeeded`.
pub const ANNOTATION_TERMINATION: &str = "sim.sandbox/termination";

/// Read the simulation parameters from sandbox annotations.
pub fn parse_simulation(annotations: &BTreeMap<String, String>) -> Result<(Duration, TerminationOutcome)> {
    let duration = match annotations.get(ANNOTATION_RUNNING_DURATION) {
        Some(raw) => humantime::parse_duration(raw.trim()).map_err(|e| SimError::InvalidAnnotation {
            key: ANNOTATION_RUNNING_DURATION.to_string(),
            reason: e.to_string(),
        })?,
        None => Duration::ZERO,
    };

    let outcome = match annotations.get(ANNOTATION_TERMINATION) {
        Some(raw) => raw.trim().parse::<TerminationOutcome>()?,
        None => TerminationOutcome::Succeeded,
    };

    Ok((duration, outcome))
}

pub struct SimulatedRuntime {
    cache: Arc<SandboxCache>,
    store: Arc<dyn ClusterStore>,
    policy: UnrecognizedResources,
    devices: DeviceCapacity,
}

impl SimulatedRuntime {
    pub fn new(cache: Arc<SandboxCache>, store: Arc<dyn ClusterStore>) -> Self {
        Self {
            cache,
            store,
            policy: UnrecognizedResources::default(),
            devices: DeviceCapacity::default(),
        }
    }

    pub fn with_policy(mut self, policy: UnrecognizedResources) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_devices(mut self, devices: DeviceCapacity) -> Self {
        self.devices = devices;
        self
    }

    pub fn cache(&self) -> &Arc<SandboxCache> {
        &self.cache
    }

    /// Record a new sandbox.
    ///
    /// Requests come from the pod in the store. If the pod cannot be fetched
    /// the sandbox is still created with zero requests; only invalid
    /// simulation annotations fail the call.
    pub async fn run_pod_sandbox(&self, id: &str, config: SandboxConfig) -> Result<Arc<SandboxRecord>> {
        let (duration, outcome) = parse_simulation(&config.annotations)?;

        let requested = match self.store.get_pod(&config.namespace, &config.name).await {
            Ok(pod) => derive_requests(&pod, self.policy),
            Err(e) => {
                warn!(
                    sandbox_id = %id,
                    namespace = %config.namespace,
                    pod = %config.name,
                    error = %e,
                    "failed to fetch pod, recording zero requests"
                );
                zero_requests()
            }
        };

        let record = self.cache.insert(id, config, requested, duration, outcome);
        info!(
            sandbox_id = %id,
            namespace = %record.config().namespace,
            pod = %record.config().name,
            duration = %humantime::format_duration(duration),
            outcome = %outcome,
            "sandbox created"
        );
        Ok(record)
    }

    pub fn stop_pod_sandbox(&self, id: &str) {
        if self.cache.delete(id) {
            info!(sandbox_id = %id, "sandbox stopped");
        }
    }

    pub fn remove_pod_sandbox(&self, id: &str) {
        if self.cache.delete(id) {
            info!(sandbox_id = %id, "sandbox removed");
        }
    }

    /// Live sandboxes ordered by id.
    pub fn list_pod_sandboxes(&self) -> Vec<Arc<SandboxRecord>> {
        let mut records: Vec<_> = self.cache.snapshot().into_values().collect();
        records.sort_by(|a, b| a.id().cmp(b.id()));
        records
    }

    pub fn device_capacity(&self) -> &DeviceCapacity {
        &self.devices
    }
}
