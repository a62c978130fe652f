//! Telemetry agent: deep query of metrics, logs, and traces

use crate::{Agent, AgentContext, AgentPriority, AgentType, Collaborators};
use aiops_collab::observability::Datapoint;
use aiops_collab::ObservabilityClient;
use aiops_common::{Result, ResourceType};
use aiops_store::IncidentStore;
use async_trait::async_trait;
use chrono::Duration;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

/// Window of telemetry inspected before the event
const LOOKBACK_MINUTES: i64 = 15;

/// Log query applied to the resource's log group
const ERROR_LOG_QUERY: &str = "fields @timestamp, @message \
     | filter @message like /ERROR|Exception|Failed|Timeout/ \
     | sort @timestamp desc | limit 50";

/// Telemetry gathers observability data for the 15 minutes before the event
/// and flags threshold anomalies
pub struct TelemetryAgent {
    collab: Collaborators,
}

impl TelemetryAgent {
    pub fn new(collab: Collaborators) -> Self {
        Self { collab }
    }

    /// Metric namespace, dimensions, and names per resource type
    fn metric_config(
        resource_type: ResourceType,
        resource_id: &str,
    ) -> Option<(&'static str, Vec<(String, String)>, Vec<&'static str>)> {
        let id = resource_id.to_string();
        match resource_type {
            ResourceType::Compute => Some((
                "compute",
                vec![("InstanceId".to_string(), id)],
                vec!["CPUUtilization", "NetworkIn", "NetworkOut", "StatusCheckFailed"],
            )),
            ResourceType::Function => Some((
                "function",
                vec![("FunctionName".to_string(), id)],
                vec!["Invocations", "Errors", "Duration", "Throttles"],
            )),
            ResourceType::TableStore => Some((
                "table-store",
                vec![("TableName".to_string(), id)],
                vec![
                    "ConsumedReadCapacityUnits",
                    "ConsumedWriteCapacityUnits",
                    "UserErrors",
                ],
            )),
            ResourceType::RelationalDb => Some((
                "relational-db",
                vec![("DBInstanceIdentifier".to_string(), id)],
                vec![
                    "CPUUtilization",
                    "DatabaseConnections",
                    "ReadLatency",
                    "WriteLatency",
                ],
            )),
            _ => None,
        }
    }

    fn log_group(resource_type: ResourceType, resource_id: &str) -> Option<String> {
        match resource_type {
            ResourceType::Function => Some(format!("/functions/{resource_id}")),
            ResourceType::RelationalDb => Some(format!("/databases/{resource_id}/error")),
            _ => None,
        }
    }

    fn summarize(datapoints: &[Datapoint]) -> Value {
        let count = datapoints.len() as f64;
        let average = datapoints.iter().map(|d| d.average).sum::<f64>() / count;
        let maximum = datapoints.iter().map(|d| d.maximum).fold(f64::MIN, f64::max);
        let minimum = datapoints.iter().map(|d| d.minimum).fold(f64::MAX, f64::min);
        json!({
            "average": average,
            "max": maximum,
            "min": minimum,
            "datapoint_count": datapoints.len(),
        })
    }

    /// Threshold anomaly detection over collected metrics and logs
    fn detect_anomalies(metrics: &Map<String, Value>, error_log_count: u64) -> Vec<Value> {
        let mut anomalies = Vec::new();

        for (name, data) in metrics {
            let average = data["average"].as_f64().unwrap_or(0.0);
            if name == "CPUUtilization" && average > 80.0 {
                anomalies.push(json!({
                    "type": "metric",
                    "metric": name,
                    "severity": "high",
                    "description": format!("High CPU utilization: {average:.1}%"),
                }));
            }
            if name == "Errors" && average > 5.0 {
                anomalies.push(json!({
                    "type": "metric",
                    "metric": name,
                    "severity": "high",
                    "description": format!("High error rate: {average:.1}"),
                }));
            }
        }

        if error_log_count > 10 {
            anomalies.push(json!({
                "type": "log",
                "severity": "medium",
                "description": format!(
                    "High error log count: {error_log_count} errors in {LOOKBACK_MINUTES} minutes"
                ),
            }));
        }

        anomalies
    }

    fn health_score(metrics: &Map<String, Value>, anomalies: &[Value]) -> f64 {
        if metrics.is_empty() {
            return 0.5;
        }
        (1.0 - 0.1 * anomalies.len() as f64).clamp(0.0, 1.0)
    }
}

#[async_trait]
impl Agent for TelemetryAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Telemetry
    }

    fn priority(&self) -> AgentPriority {
        AgentPriority::High
    }

    async fn analyze(&self, ctx: &AgentContext) -> Result<Value> {
        let incident = &ctx.incident;

        if ctx.is_duplicate() {
            info!(
                correlation_id = %incident.correlation_id,
                "duplicate incident, skipping telemetry collection"
            );
            return Ok(json!({
                "skipped_duplicate": true,
                "anomalies": [],
                "telemetry_health_score": 1.0,
            }));
        }

        info!(
            resource = %incident.resource_key(),
            region = %incident.region,
            correlation_id = %incident.correlation_id,
            "collecting telemetry"
        );

        let end = incident.event_time;
        let start = end - Duration::minutes(LOOKBACK_MINUTES);
        // Bind to the incident's region, which may differ from ours
        let client = self.collab.observability.client_for(&incident.region);

        let mut metrics = Map::new();
        if let Some((namespace, dimensions, names)) =
            Self::metric_config(incident.resource_type, &incident.resource_id)
        {
            for name in names {
                let datapoints = client
                    .get_metric_stats(
                        namespace,
                        name,
                        &dimensions,
                        start,
                        end,
                        60,
                        &["Average", "Maximum", "Minimum"],
                    )
                    .await?;
                if !datapoints.is_empty() {
                    metrics.insert(name.to_string(), Self::summarize(&datapoints));
                }
            }
        }

        let mut baseline_anomaly = None;
        let logs = match Self::log_group(incident.resource_type, &incident.resource_id) {
            Some(group) => match client.logs_query(&group, start, end, ERROR_LOG_QUERY).await {
                Ok(rows) => {
                    let error_count = rows.len() as u64;
                    baseline_anomaly = self
                        .compare_log_baseline(&group, error_count as f64)
                        .await;
                    json!({
                        "entries": rows,
                        "log_group": group,
                        "error_count": error_count,
                    })
                }
                Err(e) => {
                    warn!(error = %e, "log query failed");
                    json!({ "entries": [], "error": e.to_string() })
                }
            },
            None => json!({ "entries": [] }),
        };

        let traces = match client
            .traces_query(
                &format!(
                    "annotation.correlation_id = \"{}\"",
                    incident.correlation_id
                ),
                start,
                end,
            )
            .await
        {
            Ok(traces) => json!({ "traces": traces, "trace_count": traces.len() }),
            Err(e) => {
                warn!(error = %e, "trace query failed");
                json!({ "traces": [], "error": e.to_string() })
            }
        };

        let error_log_count = logs["error_count"].as_u64().unwrap_or(0);
        let mut anomalies = Self::detect_anomalies(&metrics, error_log_count);
        if let Some(anomaly) = baseline_anomaly {
            anomalies.push(anomaly);
        }
        let health_score = Self::health_score(&metrics, &anomalies);

        let correlation_data = json!({
            "has_metrics": !metrics.is_empty(),
            "has_logs": logs["entries"].as_array().map(|e| !e.is_empty()).unwrap_or(false),
            "has_traces": traces["trace_count"].as_u64().unwrap_or(0) > 0,
        });

        Ok(json!({
            "region": incident.region,
            "metrics": metrics,
            "logs": logs,
            "traces": traces,
            "anomalies": anomalies,
            "correlation_data": correlation_data,
            "telemetry_health_score": health_score,
        }))
    }

    async fn execute(&self, ctx: &AgentContext, analysis: &Value) -> Result<Value> {
        let mut data = Map::new();
        data.insert("telemetry_results".to_string(), analysis.clone());
        self.collab
            .store
            .merge(&ctx.incident.correlation_id, data)
            .await?;

        let anomalies = analysis["anomalies"].as_array().map(Vec::len).unwrap_or(0);
        let health = analysis["telemetry_health_score"].as_f64().unwrap_or(0.5);
        aiops_common::metric_names::publish_telemetry(anomalies, health);

        Ok(json!({
            "telemetry_collected": !analysis["skipped_duplicate"].as_bool().unwrap_or(false),
            "metrics_count": analysis["metrics"].as_object().map(|m| m.len()).unwrap_or(0),
            "log_entries_count": analysis["logs"]["entries"].as_array().map(Vec::len).unwrap_or(0),
            "traces_count": analysis["traces"]["trace_count"].as_u64().unwrap_or(0),
            "anomalies_detected": anomalies,
            "health_score": health,
        }))
    }
}

impl TelemetryAgent {
    /// Compare the current error count against the stored pattern baseline
    /// and fold the observation into it
    async fn compare_log_baseline(&self, log_group: &str, error_count: f64) -> Option<Value> {
        let key = format!("{log_group}#error-burst");

        let anomaly = match self.collab.store.get_pattern(&key).await {
            Ok(Some(baseline)) if baseline.is_anomalous(error_count) => Some(json!({
                "type": "log_baseline",
                "severity": "medium",
                "description": format!(
                    "Error burst deviates from baseline: {error_count:.0} vs avg {:.1} (z={:.2})",
                    baseline.avg_count,
                    baseline.z_score(error_count),
                ),
            })),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "pattern baseline lookup failed");
                None
            }
        };

        if let Err(e) = self.collab.store.upsert_pattern(&key, error_count).await {
            warn!(error = %e, "pattern baseline update failed");
        }
        anomaly
    }
}
