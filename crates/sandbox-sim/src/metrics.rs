//! Node metric samples and the sinks they are published to.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::error::SinkError;

/// Metric type tag for samples computed from live sandboxes.
pub const METRIC_TYPE_REAL: &str = "real";

/// Aggregate allocation for the node. `capacity["cpu"]` is in milli-units,
/// `capacity["memory"]` in bytes, both as decimal strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetric {
    #[serde(rename = "type")]
    pub metric_type: String,
    #[serde(rename = "time")]
    pub sample_time: DateTime<Utc>,
    pub capacity: BTreeMap<String, String>,
}

#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn publish_node_metrics(&self, sample: &NodeMetric) -> Result<(), SinkError>;
}

/// Writes each sample to the log.
pub struct TracingSink;

#[async_trait]
impl MetricsSink for TracingSink {
    async fn publish_node_metrics(&self, sample: &NodeMetric) -> Result<(), SinkError> {
        info!(
            metric_type = %sample.metric_type,
            time = %sample.sample_time.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            cpu = sample.capacity.get("cpu").map(String::as_str).unwrap_or("0"),
            memory = sample.capacity.get("memory").map(String::as_str).unwrap_or("0"),
            "node metrics"
        );
        Ok(())
    }
}

/// Appends one JSON line per sample to a file.
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl MetricsSink for JsonlSink {
    async fn publish_node_metrics(&self, sample: &NodeMetric) -> Result<(), SinkError> {
        let mut line = serde_json::to_string(sample)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
