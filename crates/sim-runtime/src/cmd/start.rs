use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use sandbox_sim::{
    ClusterStore, DeviceCapacity, JsonlSink, MemoryStore, MetricsSink, SandboxCache, SimulatedRuntime,
    SystemClock, TracingSink,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::{ApiServerStore, HttpSink};
use crate::config::{self, MetricsConfig, RuntimeConfig};
use crate::error::{RuntimeError, RuntimeResult};
use crate::http::HttpClient;
use crate::scenario::{self, Scenario};

#[derive(Args)]
pub struct StartArgs {
    /// Path to the runtime YAML config file
    #[arg(long, short)]
    config: PathBuf,
    /// Scenario to replay: pods to seed and sandboxes to create
    #[arg(long, short)]
    scenario: Option<PathBuf>,
    /// Kubernetes API server URL (overrides config)
    #[arg(long, env = "SIM_API_URL")]
    api_url: Option<String>,
    /// API server bearer token (overrides config)
    #[arg(long, env = "SIM_API_TOKEN")]
    token: Option<String>,
}

/// Load config, start housekeeping and run until SIGTERM / SIGINT.
pub async fn run_start(args: StartArgs) -> RuntimeResult<()> {
    let mut runtime_config = config::load(&args.config).await?;
    runtime_config.apply_overrides(args.api_url, args.token);
    runtime_config.validate_server()?;

    let scenario = match &args.scenario {
        Some(path) => scenario::load(path).await?,
        None => Scenario::default(),
    };
    let Scenario { pods, sandboxes } = scenario;

    let store = build_store(&runtime_config, pods).await?;
    let sink = build_sink(&runtime_config)?;

    let devices = DeviceCapacity::from_node_capacity(&runtime_config.node.capacity);
    for (name, quantity) in devices.capacity() {
        info!(resource = %name, capacity = %quantity, "device capacity registered");
    }

    let cache = Arc::new(SandboxCache::new());
    let runtime = Arc::new(
        SimulatedRuntime::new(Arc::clone(&cache), Arc::clone(&store))
            .with_policy(runtime_config.requests.unrecognized)
            .with_devices(devices),
    );

    let shutdown = CancellationToken::new();
    let housekeeping = sandbox_sim::spawn(
        runtime_config.housekeeping,
        cache,
        store,
        sink,
        Arc::new(SystemClock),
        shutdown.clone(),
    );

    spawn_signal_handler(shutdown.clone());

    info!(
        name = %runtime_config.name,
        lifecycle_interval_ms = runtime_config.housekeeping.lifecycle_interval_ms,
        resource_interval_ms = runtime_config.housekeeping.resource_interval_ms,
        metrics = runtime_config.metrics.kind(),
        scenario_sandboxes = sandboxes.len(),
        "runtime started"
    );

    let replay = (!sandboxes.is_empty()).then(|| {
        tokio::spawn(scenario::replay(
            sandboxes,
            Arc::clone(&runtime),
            shutdown.clone(),
        ))
    });

    shutdown.cancelled().await;

    housekeeping.join().await;
    if let Some(handle) = replay
        && let Err(e) = handle.await
    {
        warn!(error = %e, "scenario replay task failed");
    }

    info!(
        remaining = runtime.list_pod_sandboxes().len(),
        "runtime stopped"
    );
    Ok(())
}

/// API server store when a server is configured, otherwise an in-memory
/// store seeded with the scenario pods.
pub(crate) async fn build_store(
    config: &RuntimeConfig,
    pods: Vec<sandbox_sim::Pod>,
) -> RuntimeResult<Arc<dyn ClusterStore>> {
    match &config.server {
        Some(server) => {
            if !pods.is_empty() {
                warn!(count = pods.len(), "api server configured, scenario pods ignored");
            }
            let root_ca = match &server.ca_file {
                Some(path) => Some(tokio::fs::read(path).await.map_err(|e| {
                    RuntimeError::Config(format!("read server.ca_file {}: {e}", path.display()))
                })?),
                None => None,
            };
            let http = HttpClient::new(&server.url, root_ca.as_deref())?;
            Ok(Arc::new(ApiServerStore::new(http, server.token.clone())))
        }
        None => {
            info!(pods = pods.len(), "using in-memory pod store");
            Ok(Arc::new(MemoryStore::with_pods(pods)))
        }
    }
}

pub(crate) fn build_sink(config: &RuntimeConfig) -> RuntimeResult<Arc<dyn MetricsSink>> {
    Ok(match &config.metrics {
        MetricsConfig::Log => Arc::new(TracingSink),
        MetricsConfig::File { path } => Arc::new(JsonlSink::new(path.clone())),
        MetricsConfig::Http { url, token } => Arc::new(HttpSink::new(HttpClient::new(url, None)?, token.clone())),
    })
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate()).ok();
        let mut sigint = signal(SignalKind::interrupt()).ok();

        tokio::select! {
            _ = recv_signal(&mut sigterm) => {
                info!("received SIGTERM, shutting down");
            }
            _ = recv_signal(&mut sigint) => {
                info!("received SIGINT, shutting down");
            }
            _ = shutdown.cancelled() => return,
        }
        shutdown.cancel();
    });
}

/// Await a signal if registered, or pend forever if registration failed.
async fn recv_signal(sig: &mut Option<tokio::signal::unix::Signal>) {
    match sig {
        Some(s) => {
            s.recv().await;
        }
        None => std::future::pending().await,
    }
}
