//! Event ingest and normalization
//!
//! Converts heterogeneous infrastructure event envelopes into the canonical
//! [`IncidentContext`]. Unrecognized envelopes are ignored, not errors: no
//! incident is created for them.

use aiops_common::types::generate_correlation_id;
use aiops_common::{IncidentContext, ResourceType};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Raw event envelope accepted by the ingest entry point
#[derive(Debug, Clone, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "detail-type", default)]
    pub detail_type: String,
    /// Object for direct events; a nested JSON string for regional forwards
    #[serde(default)]
    pub detail: Value,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub regional_context: Option<Value>,
    #[serde(default)]
    pub resources: Vec<String>,
}

/// Result of normalizing a raw envelope
#[derive(Debug, Clone)]
pub enum NormalizedEvent {
    /// A recognized event, ready for the workflow engine
    Incident(Box<IncidentContext>),
    /// An unrecognized envelope; no incident is created
    Ignored { reason: &'static str },
}

/// Normalize a raw envelope into an incident context.
///
/// `default_region` applies when the envelope carries no region of its own.
pub fn normalize(envelope: &EventEnvelope, default_region: &str) -> NormalizedEvent {
    let region = envelope
        .region
        .clone()
        .unwrap_or_else(|| default_region.to_string());

    let (event_name, resource_type, resource_id, actor, detail) =
        match envelope.detail_type.as_str() {
            "EC2 Instance State-change Notification" => {
                let resource_id = string_at(&envelope.detail, &["instance-id"])
                    .unwrap_or_else(|| "unknown".to_string());
                debug!(%resource_id, "normalized instance state-change event");
                (
                    "InstanceStateChange".to_string(),
                    ResourceType::Compute,
                    resource_id,
                    "System".to_string(),
                    envelope.detail.clone(),
                )
            }
            "AWS API Call via CloudTrail" => normalize_api_call(&envelope.detail, None),
            "Regional Event" => {
                // Regional forwards carry the inner payload as a JSON string;
                // promote it and re-normalize as an API call.
                let inner = match &envelope.detail {
                    Value::String(s) => serde_json::from_str::<Value>(s).unwrap_or(Value::Null),
                    other => other.clone(),
                };
                if inner.is_null() {
                    warn!("regional event carried an unparseable inner payload");
                }
                normalize_api_call(&inner, Some("RegionalForwarder".to_string()))
            }
            other => {
                warn!(detail_type = other, "ignoring unknown event type");
                return NormalizedEvent::Ignored {
                    reason: "unknown_event_type",
                };
            }
        };

    let event_time = string_at(&detail, &["eventTime"])
        .and_then(|t| DateTime::parse_from_rfc3339(&t).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    NormalizedEvent::Incident(Box::new(IncidentContext {
        correlation_id: generate_correlation_id(),
        event_name,
        resource_type,
        resource_id,
        region,
        regional_context: envelope.regional_context.clone(),
        actor,
        event_details: detail,
        event_time,
    }))
}

fn normalize_api_call(
    detail: &Value,
    actor_override: Option<String>,
) -> (String, ResourceType, String, String, Value) {
    let event_name =
        string_at(detail, &["eventName"]).unwrap_or_else(|| "Unknown".to_string());
    let actor = actor_override.unwrap_or_else(|| {
        string_at(detail, &["userIdentity", "arn"]).unwrap_or_else(|| "Unknown".to_string())
    });
    let resource_type = detect_resource_type(detail);
    let resource_id = extract_resource_identifier(detail, resource_type);
    debug!(
        %event_name,
        resource_type = %resource_type,
        %resource_id,
        "normalized api call audit event"
    );
    (event_name, resource_type, resource_id, actor, detail.clone())
}

/// Classify the affected resource from the event source and name.
///
/// Closed table; anything unmatched maps to `unknown`, which is not an error.
fn detect_resource_type(detail: &Value) -> ResourceType {
    let event_name = string_at(detail, &["eventName"]).unwrap_or_default();
    let event_source = string_at(detail, &["eventSource"]).unwrap_or_default();

    if event_source.contains("ec2")
        || matches!(event_name.as_str(), "TerminateInstances" | "StopInstances")
    {
        ResourceType::Compute
    } else if event_source.contains("lambda")
        || matches!(
            event_name.as_str(),
            "DeleteFunction" | "UpdateFunctionConfiguration"
        )
    {
        ResourceType::Function
    } else if event_source.contains("dynamodb") || event_name == "DeleteTable" {
        ResourceType::TableStore
    } else if event_source.contains("s3")
        || matches!(event_name.as_str(), "DeleteBucket" | "PutBucketPolicy")
    {
        ResourceType::ObjectStore
    } else if event_source.contains("rds") || event_name == "DeleteDBInstance" {
        ResourceType::RelationalDb
    } else if event_source.contains("ssm")
        || matches!(event_name.as_str(), "PutParameter" | "DeleteParameter")
    {
        ResourceType::ParameterStore
    } else {
        ResourceType::Unknown
    }
}

/// Extract the specific resource id from the request parameters
fn extract_resource_identifier(detail: &Value, resource_type: ResourceType) -> String {
    let params = &detail["requestParameters"];

    let id = match resource_type {
        ResourceType::Compute => params["instancesSet"]["items"]
            .get(0)
            .and_then(|item| item["instanceId"].as_str())
            .map(str::to_string),
        ResourceType::Function => string_at(params, &["functionName"]),
        ResourceType::TableStore => string_at(params, &["tableName"]),
        ResourceType::ObjectStore => string_at(params, &["bucketName"]),
        ResourceType::RelationalDb => string_at(params, &["dBInstanceIdentifier"]),
        ResourceType::ParameterStore => string_at(params, &["name"]),
        ResourceType::Unknown => None,
    };

    id.unwrap_or_else(|| "unknown".to_string())
}

fn string_at(value: &Value, path: &[&str]) -> Option<String> {
    let mut current = value;
    for key in path {
        current = current.get(key)?;
    }
    current.as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn api_call_envelope(detail: Value) -> EventEnvelope {
        EventEnvelope {
            detail_type: "AWS API Call via CloudTrail".to_string(),
            detail,
            region: Some("us-east-1".to_string()),
            regional_context: None,
            resources: Vec::new(),
        }
    }

    #[test]
    fn terminate_instances_normalizes_to_compute() {
        let envelope = api_call_envelope(json!({
            "eventName": "TerminateInstances",
            "eventSource": "ec2.amazonaws.com",
            "requestParameters": {
                "instancesSet": { "items": [{ "instanceId": "i-abc" }] }
            }
        }));

        let ctx = match normalize(&envelope, "us-west-2") {
            NormalizedEvent::Incident(ctx) => ctx,
            other => panic!("expected incident, got {other:?}"),
        };
        assert_eq!(ctx.event_name, "TerminateInstances");
        assert_eq!(ctx.resource_type, ResourceType::Compute);
        assert_eq!(ctx.resource_id, "i-abc");
        assert_eq!(ctx.region, "us-east-1");
        assert_eq!(ctx.resource_key(), "compute#i-abc");
        assert!(ctx.correlation_id.starts_with("incident-"));
    }

    #[test]
    fn instance_state_change_normalizes_with_system_actor() {
        let envelope = EventEnvelope {
            detail_type: "EC2 Instance State-change Notification".to_string(),
            detail: json!({ "instance-id": "i-123", "state": "stopped" }),
            region: None,
            regional_context: None,
            resources: Vec::new(),
        };

        let ctx = match normalize(&envelope, "eu-west-1") {
            NormalizedEvent::Incident(ctx) => ctx,
            other => panic!("expected incident, got {other:?}"),
        };
        assert_eq!(ctx.event_name, "InstanceStateChange");
        assert_eq!(ctx.resource_type, ResourceType::Compute);
        assert_eq!(ctx.resource_id, "i-123");
        assert_eq!(ctx.actor, "System");
        assert_eq!(ctx.region, "eu-west-1");
    }

    #[test]
    fn regional_event_promotes_nested_payload() {
        let inner = json!({
            "eventName": "DeleteTable",
            "eventSource": "dynamodb.amazonaws.com",
            "requestParameters": { "tableName": "orders" }
        });
        let envelope = EventEnvelope {
            detail_type: "Regional Event".to_string(),
            detail: Value::String(inner.to_string()),
            region: Some("ap-southeast-2".to_string()),
            regional_context: Some(json!({ "forwarded_from": "ap-southeast-2" })),
            resources: Vec::new(),
        };

        let ctx = match normalize(&envelope, "us-east-1") {
            NormalizedEvent::Incident(ctx) => ctx,
            other => panic!("expected incident, got {other:?}"),
        };
        assert_eq!(ctx.event_name, "DeleteTable");
        assert_eq!(ctx.resource_type, ResourceType::TableStore);
        assert_eq!(ctx.resource_id, "orders");
        assert_eq!(ctx.actor, "RegionalForwarder");
        assert!(ctx.regional_context.is_some());
        assert_eq!(ctx.event_details, inner);
    }

    #[test]
    fn unknown_envelope_is_ignored() {
        let envelope = EventEnvelope {
            detail_type: "Garbage".to_string(),
            detail: json!({}),
            region: None,
            regional_context: None,
            resources: Vec::new(),
        };
        assert_matches!(
            normalize(&envelope, "us-east-1"),
            NormalizedEvent::Ignored {
                reason: "unknown_event_type"
            }
        );
    }

    #[test]
    fn unknown_resource_types_and_ids_are_not_errors() {
        let envelope = api_call_envelope(json!({
            "eventName": "DoSomethingNovel",
            "eventSource": "novel.amazonaws.com"
        }));

        let ctx = match normalize(&envelope, "us-east-1") {
            NormalizedEvent::Incident(ctx) => ctx,
            other => panic!("expected incident, got {other:?}"),
        };
        assert_eq!(ctx.resource_type, ResourceType::Unknown);
        assert_eq!(ctx.resource_id, "unknown");
    }

    #[test]
    fn missing_id_path_maps_to_unknown() {
        let envelope = api_call_envelope(json!({
            "eventName": "TerminateInstances",
            "eventSource": "ec2.amazonaws.com",
            "requestParameters": {}
        }));
        let ctx = match normalize(&envelope, "us-east-1") {
            NormalizedEvent::Incident(ctx) => ctx,
            other => panic!("expected incident, got {other:?}"),
        };
        assert_eq!(ctx.resource_type, ResourceType::Compute);
        assert_eq!(ctx.resource_id, "unknown");
    }

    #[test]
    fn fingerprint_is_stable_under_reencoding() {
        // Same raw event, different whitespace and key order
        let first: EventEnvelope = serde_json::from_str(
            r#"{"detail-type":"AWS API Call via CloudTrail","region":"us-east-1",
                "detail":{"eventName":"TerminateInstances","eventSource":"ec2.amazonaws.com",
                "requestParameters":{"instancesSet":{"items":[{"instanceId":"i-abc"}]}}}}"#,
        )
        .unwrap();
        let second: EventEnvelope = serde_json::from_str(
            r#"{
                "detail": {
                    "requestParameters": {"instancesSet": {"items": [{"instanceId": "i-abc"}]}},
                    "eventSource": "ec2.amazonaws.com",
                    "eventName": "TerminateInstances"
                },
                "region": "us-east-1",
                "detail-type": "AWS API Call via CloudTrail"
            }"#,
        )
        .unwrap();

        let fingerprint_of = |envelope: &EventEnvelope| {
            let ctx = match normalize(envelope, "us-east-1") {
                NormalizedEvent::Incident(ctx) => ctx,
                other => panic!("expected incident, got {other:?}"),
            };
            aiops_common::fingerprint(
                &ctx.event_name,
                ctx.resource_type.as_str(),
                &ctx.resource_id,
                &ctx.region,
            )
        };

        assert_eq!(fingerprint_of(&first), fingerprint_of(&second));
    }

    #[test]
    fn event_time_parses_when_present() {
        let envelope = api_call_envelope(json!({
            "eventName": "DeleteFunction",
            "eventSource": "lambda.amazonaws.com",
            "eventTime": "2026-03-01T12:30:00Z",
            "requestParameters": { "functionName": "checkout" }
        }));
        let ctx = match normalize(&envelope, "us-east-1") {
            NormalizedEvent::Incident(ctx) => ctx,
            other => panic!("expected incident, got {other:?}"),
        };
        assert_eq!(ctx.event_time.to_rfc3339(), "2026-03-01T12:30:00+00:00");
    }
}
