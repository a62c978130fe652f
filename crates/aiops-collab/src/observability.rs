//! Observability collaborator: metrics, logs, and traces

use crate::http_client;
use aiops_common::{CollaboratorsConfig, Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// One aggregated metric datapoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Datapoint {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub average: f64,
    #[serde(default)]
    pub maximum: f64,
    #[serde(default)]
    pub minimum: f64,
    #[serde(default)]
    pub sum: f64,
}

/// Read-only observability collaborator
#[async_trait]
pub trait ObservabilityClient: Send + Sync {
    async fn get_metric_stats(
        &self,
        namespace: &str,
        name: &str,
        dimensions: &[(String, String)],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        period_seconds: u64,
        statistics: &[&str],
    ) -> Result<Vec<Datapoint>>;

    async fn logs_query(
        &self,
        group: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        query: &str,
    ) -> Result<Vec<Value>>;

    async fn traces_query(
        &self,
        expression: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Value>>;
}

/// HTTP-backed observability client bound to one region
pub struct HttpObservabilityClient {
    client: reqwest::Client,
    endpoint: String,
    region: String,
    timeout: Duration,
}

impl HttpObservabilityClient {
    pub fn new(config: &CollaboratorsConfig, region: &str) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            endpoint: config.observability_endpoint.clone(),
            region: region.to_string(),
            timeout: Duration::from_secs(config.read_timeout_seconds),
        })
    }

    async fn post(&self, route: &str, body: Value) -> Result<Value> {
        let response = self
            .client
            .post(format!("{}{route}", self.endpoint))
            .timeout(self.timeout)
            .header("x-region", &self.region)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Network(format!("observability request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Network(format!(
                "observability returned status {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| Error::Network(format!("bad observability response: {e}")))
    }
}

#[async_trait]
impl ObservabilityClient for HttpObservabilityClient {
    async fn get_metric_stats(
        &self,
        namespace: &str,
        name: &str,
        dimensions: &[(String, String)],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        period_seconds: u64,
        statistics: &[&str],
    ) -> Result<Vec<Datapoint>> {
        debug!(namespace, name, "querying metric statistics");
        let body = serde_json::json!({
            "namespace": namespace,
            "metric_name": name,
            "dimensions": dimensions.iter()
                .map(|(k, v)| serde_json::json!({"name": k, "value": v}))
                .collect::<Vec<_>>(),
            "start": start,
            "end": end,
            "period_seconds": period_seconds,
            "statistics": statistics,
        });
        let response = self.post("/v1/metrics/statistics", body).await?;
        serde_json::from_value(response["datapoints"].clone())
            .map_err(|e| Error::Network(format!("bad datapoints payload: {e}")))
    }

    async fn logs_query(
        &self,
        group: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        query: &str,
    ) -> Result<Vec<Value>> {
        debug!(group, "querying logs");
        let body = serde_json::json!({
            "log_group": group,
            "start": start,
            "end": end,
            "query": query,
        });
        let response = self.post("/v1/logs/query", body).await?;
        Ok(response["rows"].as_array().cloned().unwrap_or_default())
    }

    async fn traces_query(
        &self,
        expression: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Value>> {
        debug!(expression, "querying traces");
        let body = serde_json::json!({
            "filter_expression": expression,
            "start": start,
            "end": end,
        });
        let response = self.post("/v1/traces/query", body).await?;
        Ok(response["traces"].as_array().cloned().unwrap_or_default())
    }
}

/// Factory producing an observability client bound to a region
pub type ObservabilityFactory =
    Box<dyn Fn(&str) -> Arc<dyn ObservabilityClient> + Send + Sync>;

/// Per-region observability client map.
///
/// Telemetry may follow an incident into a different region than the one the
/// engine started in; clients are created on demand and cached per region
/// rather than mutating a shared client.
pub struct RegionalObservability {
    default_region: String,
    factory: ObservabilityFactory,
    clients: RwLock<HashMap<String, Arc<dyn ObservabilityClient>>>,
}

impl RegionalObservability {
    pub fn new(default_region: &str, factory: ObservabilityFactory) -> Self {
        Self {
            default_region: default_region.to_string(),
            factory,
            clients: RwLock::new(HashMap::new()),
        }
    }

    pub fn default_region(&self) -> &str {
        &self.default_region
    }

    /// Client for the default region
    pub fn default_client(&self) -> Arc<dyn ObservabilityClient> {
        let region = self.default_region.clone();
        self.client_for(&region)
    }

    /// Client bound to the given region, created on first use
    pub fn client_for(&self, region: &str) -> Arc<dyn ObservabilityClient> {
        if let Some(client) = self.clients.read().get(region) {
            return client.clone();
        }
        info!(region, "binding observability client to region");
        let client = (self.factory)(region);
        self.clients
            .write()
            .insert(region.to_string(), client.clone());
        client
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct NullClient;

    #[async_trait]
    impl ObservabilityClient for NullClient {
        async fn get_metric_stats(
            &self,
            _: &str,
            _: &str,
            _: &[(String, String)],
            _: DateTime<Utc>,
            _: DateTime<Utc>,
            _: u64,
            _: &[&str],
        ) -> Result<Vec<Datapoint>> {
            Ok(Vec::new())
        }

        async fn logs_query(
            &self,
            _: &str,
            _: DateTime<Utc>,
            _: DateTime<Utc>,
            _: &str,
        ) -> Result<Vec<Value>> {
            Ok(Vec::new())
        }

        async fn traces_query(
            &self,
            _: &str,
            _: DateTime<Utc>,
            _: DateTime<Utc>,
        ) -> Result<Vec<Value>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn regional_map_caches_clients_per_region() {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = created.clone();
        let regional = RegionalObservability::new(
            "us-east-1",
            Box::new(move |_region| {
                counter.fetch_add(1, Ordering::SeqCst);
                Arc::new(NullClient)
            }),
        );

        regional.client_for("us-east-1");
        regional.client_for("us-east-1");
        regional.client_for("eu-west-1");
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn http_client_sends_region_header_and_parses_datapoints() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/metrics/statistics"))
            .and(header("x-region", "eu-west-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "datapoints": [
                    {"timestamp": "2026-03-01T12:00:00Z", "average": 91.5, "maximum": 99.0}
                ]
            })))
            .mount(&server)
            .await;

        let config = CollaboratorsConfig {
            observability_endpoint: server.uri(),
            ..Default::default()
        };
        let client = HttpObservabilityClient::new(&config, "eu-west-1").unwrap();
        let datapoints = client
            .get_metric_stats(
                "compute",
                "CPUUtilization",
                &[("InstanceId".to_string(), "i-abc".to_string())],
                Utc::now(),
                Utc::now(),
                60,
                &["Average", "Maximum"],
            )
            .await
            .unwrap();
        assert_eq!(datapoints.len(), 1);
        assert!((datapoints[0].average - 91.5).abs() < 1e-9);
    }
}
