//! External collaborator clients for the AIOps incident engine
//!
//! Each collaborator is a small RPC-shaped trait with an HTTP-backed
//! production implementation. Traits keep the engine testable with in-process
//! doubles and keep client construction out of the agents.

use aiops_common::{Error, Result};

pub mod executors;
pub mod llm;
pub mod notify;
pub mod observability;
pub mod policy;

pub use executors::{BuildExecutor, CommandExecutor, FunctionExecutor, HttpExecutors};
pub use llm::{extract_json, HttpLlmClient, LlmClient};
pub use notify::{BroadcastTransport, EmailTransport, HttpNotifier};
pub use policy::{HttpPolicyClient, PolicyClient};
pub use observability::{
    Datapoint, HttpObservabilityClient, ObservabilityClient, ObservabilityFactory,
    RegionalObservability,
};

/// Shared reqwest client construction for all collaborators
pub(crate) fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("aiops-incident-engine/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::Network(format!("failed to create HTTP client: {e}")))
}
