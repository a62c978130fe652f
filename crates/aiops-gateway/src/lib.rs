//! HTTP ingest gateway for the AIOps incident engine
//!
//! Exposes the single event entry point plus health and metrics endpoints,
//! and wires the production collaborators into the engine.

use aiops_agents::Collaborators;
use aiops_collab::{
    HttpExecutors, HttpLlmClient, HttpNotifier, HttpObservabilityClient, HttpPolicyClient,
    ObservabilityClient, RegionalObservability,
};
use aiops_common::{Config, Result};
use aiops_engine::Engine;
use aiops_store::IncidentStore;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Instant;

pub mod handlers;
pub mod server;

pub use server::Server;

/// Shared state behind every handler
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub metrics: Option<PrometheusHandle>,
    pub started_at: Instant,
}

/// Build the production collaborator bundle from configuration
pub fn build_collaborators(
    config: &Config,
    store: Arc<dyn IncidentStore>,
) -> Result<Collaborators> {
    let collab_config = config.collaborators.clone();
    let executors = Arc::new(HttpExecutors::new(&collab_config)?);
    let notifier = Arc::new(HttpNotifier::new(&collab_config)?);

    // Validate client construction once up front; per-region clients fall
    // back to the central-region client if theirs cannot be built
    let central_client: Arc<dyn ObservabilityClient> = Arc::new(HttpObservabilityClient::new(
        &collab_config,
        &config.engine.central_region,
    )?);
    let factory_config = collab_config.clone();
    let observability = Arc::new(RegionalObservability::new(
        &config.engine.central_region,
        Box::new(move |region| {
            HttpObservabilityClient::new(&factory_config, region)
                .map(|client| Arc::new(client) as Arc<dyn ObservabilityClient>)
                .unwrap_or_else(|_| central_client.clone())
        }),
    ));

    Ok(Collaborators {
        store,
        llm: Arc::new(HttpLlmClient::new(&collab_config)?),
        observability,
        policy: Arc::new(HttpPolicyClient::new(&collab_config)?),
        build: executors.clone(),
        command: executors.clone(),
        function: executors,
        email: notifier.clone(),
        broadcast: notifier,
    })
}

/// Assemble the full application state: store, collaborators, engine
pub fn build_state(config: Config, metrics: Option<PrometheusHandle>) -> Result<AppState> {
    let config = Arc::new(config);
    let store = aiops_store::open_store(&config.engine.incident_table)?;
    let collaborators = build_collaborators(&config, store)?;
    let engine = Arc::new(Engine::new(config, collaborators));
    Ok(AppState {
        engine,
        metrics,
        started_at: Instant::now(),
    })
}

/// State over an in-memory store for handler tests; collaborator endpoints
/// point at unused local ports and are never contacted
#[cfg(test)]
pub(crate) fn test_state() -> AppState {
    let config = Arc::new(Config::default());
    let store: Arc<dyn IncidentStore> = Arc::new(aiops_store::MemoryIncidentStore::new());
    let collaborators = build_collaborators(&config, store).unwrap();
    AppState {
        engine: Arc::new(Engine::new(config, collaborators)),
        metrics: None,
        started_at: Instant::now(),
    }
}
