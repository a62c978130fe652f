//! Gateway binary: configuration, logging, metrics, and the HTTP server

use aiops_common::{Config, ConfigMode};
use aiops_gateway::{build_state, Server};
use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config_path = std::env::var("AIOPS_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("aiops.toml"));
    let strict = std::env::var("AIOPS_CONFIG_STRICT").is_ok();
    let mode = if strict {
        ConfigMode::Strict
    } else {
        ConfigMode::Permissive
    };
    let config = Config::load(&config_path, mode)
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;

    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .context("installing metrics recorder")?;

    let bind_addr = format!("{}:{}", config.server.bind_address, config.server.port);
    info!(
        config = %config_path.display(),
        bind = %bind_addr,
        "starting aiops incident gateway"
    );

    let state = build_state(config, Some(metrics_handle))?;
    Server::new(state).run(&bind_addr).await?;
    Ok(())
}
