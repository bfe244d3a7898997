//! Scripted sandbox traffic for running the simulation without a real
//! runtime proxy in front of it.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sandbox_sim::{Pod, SandboxConfig, SimulatedRuntime};
use serde::Deserialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{RuntimeError, RuntimeResult};

#[derive(Debug, Default, Deserialize)]
pub struct Scenario {
    /// Pods seeded into the in-memory store.
    #[serde(default)]
    pub pods: Vec<Pod>,
    #[serde(default)]
    pub sandboxes: Vec<ScenarioSandbox>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioSandbox {
    /// Sandbox id. Generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub attempt: u32,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    /// Delay from replay start to the create call.
    #[serde(default)]
    pub after_ms: u64,
    /// Delay from replay start to an explicit stop, if any.
    #[serde(default)]
    pub stop_after_ms: Option<u64>,
}

fn default_namespace() -> String {
    "default".to_string()
}

impl ScenarioSandbox {
    fn config(&self) -> SandboxConfig {
        SandboxConfig {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            uid: self.uid.clone(),
            attempt: self.attempt,
            annotations: self.annotations.clone(),
        }
    }
}

pub async fn load(path: &Path) -> RuntimeResult<Scenario> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| RuntimeError::Scenario(format!("read {}: {e}", path.display())))?;
    let scenario: Scenario = serde_yaml_ng::from_str(&content)
        .map_err(|e| RuntimeError::Scenario(format!("parse {}: {e}", path.display())))?;
    scenario.validate()?;
    Ok(scenario)
}

impl Scenario {
    fn validate(&self) -> RuntimeResult<()> {
        let mut ids = HashSet::new();
        for sandbox in &self.sandboxes {
            if let Some(id) = &sandbox.id
                && !ids.insert(id.as_str())
            {
                return Err(RuntimeError::Scenario(format!("duplicate sandbox id {id}")));
            }
            if let Some(stop) = sandbox.stop_after_ms
                && stop < sandbox.after_ms
            {
                return Err(RuntimeError::Scenario(format!(
                    "sandbox {}/{} stops before it is created",
                    sandbox.namespace, sandbox.name
                )));
            }
        }
        Ok(())
    }
}

/// Replay sandbox creations (and optional stops) against `runtime`. Returns
/// once every entry has been played or `shutdown` is cancelled.
pub async fn replay(
    sandboxes: Vec<ScenarioSandbox>,
    runtime: Arc<SimulatedRuntime>,
    shutdown: CancellationToken,
) {
    let total = sandboxes.len();
    let mut tasks = JoinSet::new();
    for sandbox in sandboxes {
        tasks.spawn(play(sandbox, Arc::clone(&runtime), shutdown.clone()));
    }

    let mut failed = 0usize;
    while let Some(result) = tasks.join_next().await {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                failed += 1;
                warn!(error = %e, "scenario sandbox failed");
            }
            Err(e) => {
                failed += 1;
                warn!(error = %e, "scenario task panicked");
            }
        }
    }
    info!(total, failed, "scenario replay finished");
}

async fn play(
    sandbox: ScenarioSandbox,
    runtime: Arc<SimulatedRuntime>,
    shutdown: CancellationToken,
) -> RuntimeResult<()> {
    let start = tokio::time::Instant::now();
    let id = sandbox
        .id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    if !sleep_until(start + Duration::from_millis(sandbox.after_ms), &shutdown).await {
        return Ok(());
    }
    runtime.run_pod_sandbox(&id, sandbox.config()).await?;

    if let Some(stop_after_ms) = sandbox.stop_after_ms {
        if !sleep_until(start + Duration::from_millis(stop_after_ms), &shutdown).await {
            return Ok(());
        }
        runtime.stop_pod_sandbox(&id);
        runtime.remove_pod_sandbox(&id);
    }
    Ok(())
}

/// Returns `false` if cancelled first.
async fn sleep_until(deadline: tokio::time::Instant, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep_until(deadline) => true,
    }
}

#[cfg(test)]
mod tests {
    use sandbox_sim::{MemoryStore, SandboxCache};

    use super::*;

    const SCENARIO: &str = r#"
pods:
  - metadata:
      name: web-0
      namespace: default
    spec:
      containers:
        - name: app
          resources:
            requests:
              cpu: 100m
              memory: 200Mi
sandboxes:
  - id: sb-web
    name: web-0
    annotations:
      sim.sandbox/running-duration: 30s
  - id: sb-batch
    name: batch-0
    after_ms: 1000
    stop_after_ms: 5000
"#;

    #[tokio::test]
    async fn load_parses_pods_and_sandboxes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenario.yaml");
        tokio::fs::write(&path, SCENARIO).await.unwrap();

        let scenario = load(&path).await.unwrap();
        assert_eq!(scenario.pods.len(), 1);
        assert_eq!(scenario.pods[0].spec.containers[0].resources.requests["cpu"], "100m");
        assert_eq!(scenario.sandboxes.len(), 2);
        assert_eq!(scenario.sandboxes[1].namespace, "default");
        assert_eq!(scenario.sandboxes[1].stop_after_ms, Some(5000));
    }

    #[tokio::test]
    async fn load_rejects_duplicate_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenario.yaml");
        let yaml = "sandboxes:\n  - {id: a, name: x}\n  - {id: a, name: y}\n";
        tokio::fs::write(&path, yaml).await.unwrap();

        let err = load(&path).await.unwrap_err();
        assert!(err.to_string().contains("duplicate"), "got: {err}");
    }

    #[tokio::test]
    async fn load_rejects_stop_before_create() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenario.yaml");
        let yaml = "sandboxes:\n  - {name: x, after_ms: 500, stop_after_ms: 100}\n";
        tokio::fs::write(&path, yaml).await.unwrap();

        assert!(load(&path).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn replay_creates_and_stops_on_schedule() {
        let scenario: Scenario = serde_yaml_ng::from_str(SCENARIO).unwrap();
        let cache = Arc::new(SandboxCache::new());
        let store = Arc::new(MemoryStore::with_pods(scenario.pods));
        let runtime = Arc::new(SimulatedRuntime::new(cache.clone(), store));
        let shutdown = CancellationToken::new();

        let replay = tokio::spawn(replay(scenario.sandboxes, runtime, shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(cache.contains("sb-web"));
        assert!(cache.contains("sb-batch"));
        let web = cache.get("sb-web").unwrap();
        assert_eq!(web.requested_quantity("cpu").milli_value(), 100);
        assert_eq!(web.simulated_duration(), Duration::from_secs(30));

        replay.await.unwrap();
        assert!(!cache.contains("sb-batch"));
        assert!(cache.contains("sb-web"));
    }

    #[tokio::test(start_paused = true)]
    async fn replay_stops_on_cancel() {
        let scenario: Scenario = serde_yaml_ng::from_str(SCENARIO).unwrap();
        let cache = Arc::new(SandboxCache::new());
        let runtime = Arc::new(SimulatedRuntime::new(cache.clone(), Arc::new(MemoryStore::new())));
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        replay(scenario.sandboxes, runtime, shutdown).await;
        assert!(cache.is_empty());
    }
}
