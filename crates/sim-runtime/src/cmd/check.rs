use std::fmt::Write as _;
use std::path::PathBuf;

use clap::Args;
use sandbox_sim::DeviceCapacity;

use crate::config::{self, MetricsConfig, RuntimeConfig};
use crate::error::RuntimeResult;

#[derive(Args)]
pub struct CheckArgs {
    /// Path to the runtime YAML config file
    #[arg(long, short)]
    config: PathBuf,
}

/// Validate a config file and print the effective settings.
pub async fn run_check(args: CheckArgs) -> RuntimeResult<()> {
    let runtime_config = config::load(&args.config).await?;
    print!("{}", summary(&runtime_config));
    Ok(())
}

fn summary(config: &RuntimeConfig) -> String {
    let devices = DeviceCapacity::from_node_capacity(&config.node.capacity);
    let store = match &config.server {
        Some(server) => match &server.ca_file {
            Some(ca_file) => format!("api server {} (ca {})", server.url, ca_file.display()),
            None => format!("api server {}", server.url),
        },
        None => "in-memory".to_string(),
    };
    let sink = match &config.metrics {
        MetricsConfig::Log => "log".to_string(),
        MetricsConfig::File { path } => format!("file {}", path.display()),
        MetricsConfig::Http { url, .. } => format!("http {url}"),
    };

    let mut out = String::new();
    let _ = writeln!(out, "name:               {}", config.name);
    let _ = writeln!(out, "store:              {store}");
    let _ = writeln!(out, "metrics:            {sink}");
    let _ = writeln!(
        out,
        "lifecycle interval: {}",
        humantime::format_duration(config.housekeeping.lifecycle_interval())
    );
    let _ = writeln!(
        out,
        "resource interval:  {}",
        humantime::format_duration(config.housekeeping.resource_interval())
    );
    let _ = writeln!(out, "unrecognized:       {:?}", config.requests.unrecognized);
    if devices.is_empty() {
        let _ = writeln!(out, "devices:            none");
    } else {
        for (name, quantity) in devices.capacity() {
            let _ = writeln!(out, "device:             {name}={quantity}");
        }
    }
    out
}
