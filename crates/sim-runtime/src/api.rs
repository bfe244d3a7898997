//! HTTP-backed cluster store and metrics sink.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use sandbox_sim::{ClusterStore, MetricsSink, NodeMetric, Pod, SinkError, StoreError};
use tracing::debug;

use crate::http::HttpClient;

fn pod_path(namespace: &str, name: &str) -> String {
    format!("/api/v1/namespaces/{namespace}/pods/{name}")
}

/// Pods read from and written to a Kubernetes API server.
#[derive(Clone)]
pub struct ApiServerStore {
    http: HttpClient,
    token: String,
}

impl ApiServerStore {
    pub fn new(http: HttpClient, token: String) -> Self {
        Self { http, token }
    }
}

#[async_trait]
impl ClusterStore for ApiServerStore {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, StoreError> {
        let resp = self
            .http
            .request(Method::GET, &pod_path(namespace, name), &self.token)
            .send()
            .await
            .map_err(|e| StoreError::Api(format!("get pod: {e}")))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Api(format!("get pod {status}: {body}")));
        }

        resp.json()
            .await
            .map_err(|e| StoreError::Decode(format!("get pod: {e}")))
    }

    async fn update_pod_status(&self, pod: &Pod) -> Result<Pod, StoreError> {
        let path = format!("{}/status", pod_path(pod.namespace(), pod.name()));
        let resp = self
            .http
            .request(Method::PUT, &path, &self.token)
            .json(pod)
            .send()
            .await
            .map_err(|e| StoreError::Api(format!("update pod status: {e}")))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound {
                namespace: pod.namespace().to_string(),
                name: pod.name().to_string(),
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Api(format!("update pod status {status}: {body}")));
        }

        debug!(namespace = %pod.namespace(), pod = %pod.name(), "pod status updated");
        resp.json()
            .await
            .map_err(|e| StoreError::Decode(format!("update pod status: {e}")))
    }
}

/// POSTs each sample as JSON to the configured endpoint.
pub struct HttpSink {
    http: HttpClient,
    token: String,
}

impl HttpSink {
    pub fn new(http: HttpClient, token: String) -> Self {
        Self { http, token }
    }
}

#[async_trait]
impl MetricsSink for HttpSink {
    async fn publish_node_metrics(&self, sample: &NodeMetric) -> Result<(), SinkError> {
        let resp = self
            .http
            .request(Method::POST, "", &self.token)
            .json(sample)
            .send()
            .await
            .map_err(|e| SinkError::Api(format!("publish: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SinkError::Api(format!("publish {status}: {body}")));
        }
        Ok(())
    }
}
