//! Simulated pod sandbox lifecycle.
//!
//! A [`SandboxCache`] holds the live sandboxes created through
//! [`SimulatedRuntime`]. Two housekeeping loops read it by snapshot: the
//! [`LifecycleReconciler`] moves expired sandboxes to their terminal phase in
//! the [`ClusterStore`], and the [`ResourceAggregator`] publishes the summed
//! requests to a [`MetricsSink`].

mod aggregator;
mod cache;
mod clock;
mod devices;
mod error;
mod housekeeping;
mod log_reduction;
mod metrics;
pub mod pod;
mod quantity;
mod reconciler;
mod record;
mod requests;
mod runtime;
mod store;

pub use aggregator::{DEFAULT_RESOURCE_INTERVAL, ResourceAggregator};
pub use cache::{SandboxCache, Snapshot};
pub use clock::{Clock, ManualClock, SystemClock};
pub use devices::{DeviceCapacity, is_native_resource};
pub use error::{Result, SimError, SinkError, StoreError};
pub use housekeeping::{Housekeeping, HousekeepingConfig, spawn};
pub use log_reduction::{IDENTICAL_ERROR_DELAY, LogReduction};
pub use metrics::{JsonlSink, METRIC_TYPE_REAL, MetricsSink, NodeMetric, TracingSink};
pub use pod::Pod;
pub use quantity::{Quantity, QuantityError};
pub use reconciler::{DEFAULT_LIFECYCLE_INTERVAL, LifecycleReconciler, TickReport, terminal_pod};
pub use record::{RESOURCE_CPU, RESOURCE_MEMORY, ResourceList, SandboxConfig, SandboxRecord, TerminationOutcome};
pub use requests::{UnrecognizedResources, derive_requests, zero_requests};
pub use runtime::{ANNOTATION_RUNNING_DURATION, ANNOTATION_TERMINATION, SimulatedRuntime, parse_simulation};
pub use store::{ClusterStore, MemoryStore};
