//! Infrastructure mutation executors
//!
//! The engine never mutates infrastructure itself; it dispatches to these
//! collaborators. All three surface errors to the caller and never silently
//! succeed.

use crate::http_client;
use aiops_common::{CollaboratorsConfig, Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::info;

/// Image-build pipeline (infrastructure restoration)
#[async_trait]
pub trait BuildExecutor: Send + Sync {
    /// Start a build; returns the build id
    async fn start_build(&self, project: &str, env_overrides: &[(String, String)])
        -> Result<String>;
}

/// Command dispatch service (automation documents)
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Start a named automation document; returns the execution id
    async fn start_command(&self, document: &str, parameters: &Value) -> Result<String>;
}

/// Synchronous function invocation
#[async_trait]
pub trait FunctionExecutor: Send + Sync {
    async fn invoke(&self, name: &str, payload: &Value) -> Result<Value>;
}

/// HTTP-backed mutation executor client covering all three dispatch shapes
pub struct HttpExecutors {
    client: reqwest::Client,
    build_endpoint: String,
    command_endpoint: String,
    function_endpoint: String,
    timeout: Duration,
}

impl HttpExecutors {
    pub fn new(config: &CollaboratorsConfig) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            build_endpoint: config.build_endpoint.clone(),
            command_endpoint: config.command_endpoint.clone(),
            function_endpoint: config.function_endpoint.clone(),
            timeout: Duration::from_secs(config.mutation_timeout_seconds),
        })
    }

    async fn post(&self, url: String, body: Value) -> Result<Value> {
        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Network(format!("executor request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Execution(format!(
                "executor returned status {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| Error::Network(format!("bad executor response: {e}")))
    }
}

#[async_trait]
impl BuildExecutor for HttpExecutors {
    async fn start_build(
        &self,
        project: &str,
        env_overrides: &[(String, String)],
    ) -> Result<String> {
        info!(project, "starting build");
        let body = serde_json::json!({
            "project": project,
            "environment_overrides": env_overrides.iter()
                .map(|(k, v)| serde_json::json!({"name": k, "value": v}))
                .collect::<Vec<_>>(),
        });
        let response = self
            .post(format!("{}/v1/builds", self.build_endpoint), body)
            .await?;
        response["build_id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::Execution("build response missing build_id".to_string()))
    }
}

#[async_trait]
impl CommandExecutor for HttpExecutors {
    async fn start_command(&self, document: &str, parameters: &Value) -> Result<String> {
        info!(document, "starting command dispatch");
        let body = serde_json::json!({
            "document": document,
            "parameters": parameters,
        });
        let response = self
            .post(format!("{}/v1/executions", self.command_endpoint), body)
            .await?;
        response["execution_id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::Execution("command response missing execution_id".to_string()))
    }
}

#[async_trait]
impl FunctionExecutor for HttpExecutors {
    async fn invoke(&self, name: &str, payload: &Value) -> Result<Value> {
        info!(name, "invoking function");
        let body = serde_json::json!({
            "function": name,
            "payload": payload,
        });
        self.post(format!("{}/v1/invocations", self.function_endpoint), body)
            .await
    }
}
