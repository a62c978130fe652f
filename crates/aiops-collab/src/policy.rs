//! Policy compliance collaborator

use crate::http_client;
use aiops_common::{CollaboratorsConfig, Error, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Compliance lookup for a resource.
///
/// Returns `None` when the policy engine has no data for the resource; risk
/// assessment treats that as compliant (fail-open).
#[async_trait]
pub trait PolicyClient: Send + Sync {
    async fn check_compliance(
        &self,
        resource_type: &str,
        resource_id: &str,
    ) -> Result<Option<bool>>;
}

/// HTTP-backed policy client
pub struct HttpPolicyClient {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpPolicyClient {
    pub fn new(config: &CollaboratorsConfig) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            endpoint: config.policy_endpoint.clone(),
            timeout: Duration::from_secs(config.read_timeout_seconds),
        })
    }
}

#[async_trait]
impl PolicyClient for HttpPolicyClient {
    async fn check_compliance(
        &self,
        resource_type: &str,
        resource_id: &str,
    ) -> Result<Option<bool>> {
        debug!(resource_type, resource_id, "checking policy compliance");
        let response = self
            .client
            .get(format!(
                "{}/v1/compliance/{resource_type}/{resource_id}",
                self.endpoint
            ))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::Network(format!("policy request failed: {e}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Error::Network(format!(
                "policy engine returned status {}",
                response.status()
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Network(format!("bad policy response: {e}")))?;
        Ok(payload["compliant"].as_bool())
    }
}
