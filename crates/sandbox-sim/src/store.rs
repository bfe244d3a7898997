use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::pod::Pod;

/// Read/update access to pod objects in the cluster-state store.
#[async_trait]
pub trait ClusterStore: Send + Sync {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, StoreError>;

    /// Write `pod.status` back to the store. Returns the stored object.
    async fn update_pod_status(&self, pod: &Pod) -> Result<Pod, StoreError>;
}

/// In-process store keyed by `(namespace, name)`.
///
/// Status updates only replace `status` and bump `resourceVersion`, the way
/// the API server's status subresource behaves.
#[derive(Default)]
pub struct MemoryStore {
    pods: Mutex<HashMap<(String, String), Pod>>,
}

fn key(namespace: &str, name: &str) -> (String, String) {
    (namespace.to_string(), name.to_string())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pods(pods: impl IntoIterator<Item = Pod>) -> Self {
        let pods = pods
            .into_iter()
            .map(|p| (key(p.namespace(), p.name()), p))
            .collect();
        Self {
            pods: Mutex::new(pods),
        }
    }

    pub async fn put_pod(&self, pod: Pod) {
        let mut pods = self.pods.lock().await;
        pods.insert(key(pod.namespace(), pod.name()), pod);
    }

    pub async fn pod(&self, namespace: &str, name: &str) -> Option<Pod> {
        self.pods.lock().await.get(&key(namespace, name)).cloned()
    }
}

#[async_trait]
impl ClusterStore for MemoryStore {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, StoreError> {
        self.pod(namespace, name)
            .await
            .ok_or_else(|| StoreError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    async fn update_pod_status(&self, pod: &Pod) -> Result<Pod, StoreError> {
        let mut pods = self.pods.lock().await;
        let stored = pods
            .get_mut(&key(pod.namespace(), pod.name()))
            .ok_or_else(|| StoreError::NotFound {
                namespace: pod.namespace().to_string(),
                name: pod.name().to_string(),
            })?;

        let version = stored
            .metadata
            .resource_version
            .as_deref()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        stored.metadata.resource_version = Some((version + 1).to_string());
        stored.status = pod.status.clone();
        Ok(stored.clone())
    }
}
