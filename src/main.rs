// SPDX-License-Identifier: MIT
//! diagd entry point: load config, wire up components, tick until shutdown.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Parser;
use tracing::info;

use diagd::component::Component;
use diagd::config::{DaemonConfig, NfsConfigProvider};
use diagd::nfs::NfsComponent;

#[derive(Parser)]
#[command(name = "diagd", about = "Host diagnostics daemon", version)]
struct Args {
    /// Path to the TOML config file
    #[arg(long, env = "DIAGD_CONFIG", default_value = "/etc/diagd/config.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, env = "DIAGD_LOG")]
    log: Option<String>,

    /// Override the machine ID used as this host's group-member identity
    #[arg(long, env = "DIAGD_MACHINE_ID")]
    machine_id: Option<String>,
}

/// Stable per-host identity; doubles as this member's file name in every
/// shared group directory.
fn machine_id() -> String {
    if let Ok(id) = std::fs::read_to_string("/etc/machine-id") {
        let id = id.trim();
        if !id.is_empty() {
            return id.to_string();
        }
    }
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = if args.config.exists() {
        DaemonConfig::load(&args.config)?
    } else {
        DaemonConfig::default()
    };

    let log_level = args.log.clone().unwrap_or_else(|| config.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .compact()
        .init();

    let machine_id = args.machine_id.unwrap_or_else(machine_id);
    info!(
        version = env!("CARGO_PKG_VERSION"),
        machine_id = %machine_id,
        config = %args.config.display(),
        "diagd starting"
    );

    let nfs_configs = Arc::new(NfsConfigProvider::new(config.nfs_groups.clone()));
    let components: Vec<Arc<dyn Component>> = vec![Arc::new(
        NfsComponent::new(machine_id, Arc::clone(&nfs_configs))
            .with_check_interval(config.check_interval()),
    )];

    for component in &components {
        if !component.is_supported() {
            info!(component = component.name(), "component not supported on this host");
            continue;
        }
        component
            .start()
            .with_context(|| format!("failed to start component {}", component.name()))?;
        info!(component = component.name(), "component started");
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutting down");

    for component in &components {
        component
            .close()
            .with_context(|| format!("failed to close component {}", component.name()))?;
    }
    Ok(())
}
