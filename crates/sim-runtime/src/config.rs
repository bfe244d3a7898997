use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use sandbox_sim::{HousekeepingConfig, UnrecognizedResources};
use serde::{Deserialize, Serialize};

use crate::error::{RuntimeError, RuntimeResult};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub name: String,
    /// Kubernetes API server. Absent means an in-memory store seeded from
    /// the scenario.
    #[serde(default)]
    pub server: Option<ServerConfig>,
    #[serde(default)]
    pub housekeeping: HousekeepingConfig,
    #[serde(default)]
    pub requests: RequestsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub node: NodeConfig,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub url: String,
    #[serde(default)]
    pub token: String,
    /// PEM bundle trusted in addition to the system roots, for API servers
    /// with a cluster-local CA.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<PathBuf>,
}

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestsConfig {
    pub unrecognized: UnrecognizedResources,
}

/// Where node metric samples go.
#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MetricsConfig {
    #[default]
    Log,
    File {
        path: PathBuf,
    },
    Http {
        url: String,
        #[serde(default)]
        token: String,
    },
}

impl MetricsConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::File { .. } => "file",
            Self::Http { .. } => "http",
        }
    }
}

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Capacity advertised by the node; extended resources become fake
    /// device-plugin capacity.
    pub capacity: BTreeMap<String, String>,
}

/// Load and validate a runtime config from a YAML file.
///
/// Relative paths in the config are resolved against the config file's parent directory.
pub async fn load(path: &Path) -> RuntimeResult<RuntimeConfig> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| RuntimeError::Config(format!("read {}: {e}", path.display())))?;
    let mut config: RuntimeConfig = serde_yaml_ng::from_str(&content)
        .map_err(|e| RuntimeError::Config(format!("parse {}: {e}", path.display())))?;
    config.resolve_relative_paths(config_dir(path));
    config.validate().await?;
    Ok(config)
}

/// Directory holding the config file. A bare filename lives in the current
/// directory.
fn config_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

impl RuntimeConfig {
    /// Resolve relative paths against `config_dir` (the directory containing the YAML file).
    fn resolve_relative_paths(&mut self, config_dir: &Path) {
        if let MetricsConfig::File { path } = &mut self.metrics
            && path.is_relative()
        {
            *path = config_dir.join(&*path);
        }
        if let Some(server) = &mut self.server
            && let Some(ca_file) = &mut server.ca_file
            && ca_file.is_relative()
        {
            *ca_file = config_dir.join(&*ca_file);
        }
    }

    /// Apply CLI / env overrides for the API server.
    pub fn apply_overrides(&mut self, api_url: Option<String>, token: Option<String>) {
        if api_url.is_none() && token.is_none() {
            return;
        }
        let server = self.server.get_or_insert_with(|| ServerConfig {
            url: String::new(),
            token: String::new(),
            ca_file: None,
        });
        if let Some(url) = api_url {
            server.url = url;
        }
        if let Some(token) = token {
            server.token = token;
        }
    }

    async fn validate(&self) -> RuntimeResult<()> {
        if self.name.trim().is_empty() {
            return Err(RuntimeError::Config("name must not be empty".into()));
        }
        if self.housekeeping.lifecycle_interval_ms == 0 {
            return Err(RuntimeError::Config(
                "housekeeping.lifecycle_interval_ms must be positive".into(),
            ));
        }
        if self.housekeeping.resource_interval_ms == 0 {
            return Err(RuntimeError::Config(
                "housekeeping.resource_interval_ms must be positive".into(),
            ));
        }
        self.validate_server()?;
        if let Some(ca_file) = self.server.as_ref().and_then(|s| s.ca_file.as_deref()) {
            check_path_exists(ca_file, "server.ca_file").await?;
        }

        match &self.metrics {
            MetricsConfig::Log => {}
            MetricsConfig::File { path } => {
                if let Some(dir) = path.parent()
                    && !dir.as_os_str().is_empty()
                {
                    check_path_exists(dir, "metrics.path directory").await?;
                }
            }
            MetricsConfig::Http { url, .. } => {
                if url.is_empty() {
                    return Err(RuntimeError::Config("metrics.url must not be empty".into()));
                }
            }
        }
        Ok(())
    }

    /// Server fields are required once a server is configured.
    pub fn validate_server(&self) -> RuntimeResult<()> {
        if let Some(server) = &self.server
            && server.url.is_empty()
        {
            return Err(RuntimeError::Config(
                "server.url is required (set in config or via --api-url / SIM_API_URL)".into(),
            ));
        }
        Ok(())
    }
}

async fn check_path_exists(path: &Path, label: &str) -> RuntimeResult<()> {
    let exists = tokio::fs::try_exists(path)
        .await
        .map_err(|e| RuntimeError::Config(format!("check {label}: {e}")))?;
    if !exists {
        return Err(RuntimeError::Config(format!(
            "{label} not found: {}",
            path.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write_config(dir: &Path, yaml: &str) -> PathBuf {
        let path = dir.join("sim.yaml");
        tokio::fs::write(&path, yaml).await.unwrap();
        path
    }

    #[tokio::test]
    async fn load_full_config() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = r#"
name: node-a
server:
  url: https://127.0.0.1:6443
  token: secret
  ca_file: ca.pem
housekeeping:
  lifecycle_interval_ms: 500
  resource_interval_ms: 5000
requests:
  unrecognized: keep
metrics:
  kind: http
  url: https://collector.example.com/node-metrics
  token: push
node:
  capacity:
    cpu: "8"
    nvidia.com/gpu: "4"
"#;
        tokio::fs::write(dir.path().join("ca.pem"), "").await.unwrap();
        let config = load(&write_config(dir.path(), yaml).await).await.unwrap();

        assert_eq!(config.name, "node-a");
        let server = config.server.unwrap();
        assert_eq!(server.url, "https://127.0.0.1:6443");
        assert_eq!(server.token, "secret");
        assert_eq!(server.ca_file, Some(dir.path().join("ca.pem")));
        assert_eq!(config.housekeeping.lifecycle_interval_ms, 500);
        assert_eq!(config.housekeeping.resource_interval_ms, 5000);
        assert_eq!(config.requests.unrecognized, UnrecognizedResources::Keep);
        assert_eq!(
            config.metrics,
            MetricsConfig::Http {
                url: "https://collector.example.com/node-metrics".into(),
                token: "push".into(),
            }
        );
        assert_eq!(config.node.capacity["nvidia.com/gpu"], "4");
    }

    #[tokio::test]
    async fn load_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(&write_config(dir.path(), "name: node-a\n").await)
            .await
            .unwrap();

        assert!(config.server.is_none());
        assert_eq!(config.housekeeping, HousekeepingConfig::default());
        assert_eq!(config.requests.unrecognized, UnrecognizedResources::Skip);
        assert_eq!(config.metrics, MetricsConfig::Log);
        assert!(config.node.capacity.is_empty());
    }

    #[tokio::test]
    async fn load_resolves_relative_metrics_path() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(dir.path().join("out")).await.unwrap();
        let yaml = "name: node-a\nmetrics:\n  kind: file\n  path: out/metrics.jsonl\n";
        let config = load(&write_config(dir.path(), yaml).await).await.unwrap();

        assert_eq!(
            config.metrics,
            MetricsConfig::File {
                path: dir.path().join("out/metrics.jsonl"),
            }
        );
    }

    #[tokio::test]
    async fn bare_config_filename_resolves_against_current_dir() {
        let path = Path::new("sim.yaml");
        assert_eq!(config_dir(path), Path::new("."));

        let yaml = "name: node-a\nmetrics:\n  kind: file\n  path: metrics.jsonl\n";
        let mut config: RuntimeConfig = serde_yaml_ng::from_str(yaml).unwrap();
        config.validate().await.unwrap();

        config.resolve_relative_paths(config_dir(path));
        assert_eq!(
            config.metrics,
            MetricsConfig::File {
                path: PathBuf::from("./metrics.jsonl"),
            }
        );
        config.validate().await.unwrap();
    }

    #[tokio::test]
    async fn load_fails_on_missing_ca_file() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = "name: node-a\nserver:\n  url: https://127.0.0.1:6443\n  ca_file: missing-ca.pem\n";
        let err = load(&write_config(dir.path(), yaml).await).await.unwrap_err();
        assert!(err.to_string().contains("server.ca_file not found"), "got: {err}");
    }

    #[tokio::test]
    async fn load_fails_on_missing_metrics_dir() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = "name: node-a\nmetrics:\n  kind: file\n  path: /nonexistent/dir/metrics.jsonl\n";
        let err = load(&write_config(dir.path(), yaml).await).await.unwrap_err();
        assert!(err.to_string().contains("not found"), "got: {err}");
    }

    #[tokio::test]
    async fn load_rejects_zero_interval() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = "name: node-a\nhousekeeping:\n  lifecycle_interval_ms: 0\n";
        let err = load(&write_config(dir.path(), yaml).await).await.unwrap_err();
        assert!(err.to_string().contains("lifecycle_interval_ms"), "got: {err}");
    }

    #[tokio::test]
    async fn load_rejects_unknown_policy() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = "name: node-a\nrequests:\n  unrecognized: sum\n";
        let err = load(&write_config(dir.path(), yaml).await).await.unwrap_err();
        assert!(err.to_string().contains("parse"), "got: {err}");
    }

    #[tokio::test]
    async fn load_fails_on_missing_file() {
        let err = load(Path::new("/nonexistent/sim.yaml")).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Config(_)));
    }

    #[test]
    fn overrides_create_or_patch_server() {
        let mut config: RuntimeConfig = serde_yaml_ng::from_str("name: node-a\n").unwrap();
        config.apply_overrides(None, None);
        assert!(config.server.is_none());

        config.apply_overrides(Some("https://api:6443".into()), None);
        let server = config.server.as_ref().unwrap();
        assert_eq!(server.url, "https://api:6443");
        assert!(server.token.is_empty());

        config.apply_overrides(None, Some("tok".into()));
        assert_eq!(config.server.as_ref().unwrap().token, "tok");
        assert!(config.validate_server().is_ok());
    }

    #[test]
    fn token_without_url_is_invalid() {
        let mut config: RuntimeConfig = serde_yaml_ng::from_str("name: node-a\n").unwrap();
        config.apply_overrides(None, Some("tok".into()));
        let err = config.validate_server().unwrap_err();
        assert!(err.to_string().contains("server.url"), "got: {err}");
    }
}
