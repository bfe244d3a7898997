#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("invalid annotation {key}: {reason}")]
    InvalidAnnotation { key: String, reason: String },

    #[error("invalid termination outcome: {0}")]
    InvalidOutcome(String),
}

pub type Result<T> = std::result::Result<T, SimError>;

/// Errors surfaced by a [`ClusterStore`](crate::ClusterStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("pod {namespace}/{name} not found")]
    NotFound { namespace: String, name: String },

    #[error("api error: {0}")]
    Api(String),

    #[error("decode error: {0}")]
    Decode(String),
}

/// Errors surfaced by a [`MetricsSink`](crate::MetricsSink).
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("serialize sample: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("api error: {0}")]
    Api(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
