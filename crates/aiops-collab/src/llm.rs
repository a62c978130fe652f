//! LLM reasoning collaborator

use crate::http_client;
use aiops_common::{CollaboratorsConfig, Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Text-generation collaborator used for triage analysis, runbook synthesis
/// and incident summaries
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate text for a prompt. Callers must tolerate non-JSON output;
    /// see [`extract_json`].
    async fn invoke(&self, prompt: &str, max_tokens: u32, temperature: f32) -> Result<String>;
}

/// HTTP-backed LLM client
pub struct HttpLlmClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
}

#[derive(Deserialize)]
struct GenerateResponse {
    text: String,
}

impl HttpLlmClient {
    pub fn new(config: &CollaboratorsConfig) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            endpoint: config.llm_endpoint.clone(),
            api_key: config.llm_api_key.clone(),
            timeout: Duration::from_secs(config.read_timeout_seconds),
        })
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn invoke(&self, prompt: &str, max_tokens: u32, temperature: f32) -> Result<String> {
        debug!(max_tokens, temperature, "invoking llm");

        let mut request = self
            .client
            .post(format!("{}/v1/generate", self.endpoint))
            .timeout(self.timeout)
            .json(&serde_json::json!({
                "prompt": prompt,
                "max_tokens": max_tokens,
                "temperature": temperature,
            }));
        if let Some(api_key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {api_key}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Network(format!("LLM request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Network(format!(
                "LLM returned status {}",
                response.status()
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::Network(format!("Failed to parse LLM response: {e}")))?;
        Ok(body.text.trim().to_string())
    }
}

/// Extract a JSON value from LLM output.
///
/// Models frequently wrap JSON in fenced code blocks; strip the fence when
/// present, then parse. Failure surfaces as `LlmParse` so callers can fall
/// back to their deterministic defaults.
pub fn extract_json(text: &str) -> Result<Value> {
    let candidate = if let Some(after) = text.split("```json").nth(1) {
        after.split("```").next().unwrap_or(after)
    } else if let Some(inner) = text.split("```").nth(1) {
        inner
    } else {
        text
    };

    serde_json::from_str(candidate.trim())
        .map_err(|e| Error::LlmParse(format!("not valid JSON: {e}")))
}
