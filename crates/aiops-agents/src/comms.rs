//! Communications agent: human-readable updates and notifications

use crate::{Agent, AgentContext, AgentPriority, AgentType, Collaborators};
use aiops_collab::{BroadcastTransport, EmailTransport, LlmClient};
use aiops_common::{Config, Result};
use aiops_store::IncidentStore;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// Topic used when no broadcast topic is configured
const DEFAULT_TOPIC: &str = "incidents";

/// Communications runs last: it summarizes the incident from every earlier
/// agent's results and notifies the right people
pub struct CommunicationsAgent {
    config: Arc<Config>,
    collab: Collaborators,
}

impl CommunicationsAgent {
    pub fn new(config: Arc<Config>, collab: Collaborators) -> Self {
        Self { config, collab }
    }

    /// LLM-generated incident summary with a templated fallback
    async fn generate_summary(&self, ctx: &AgentContext) -> String {
        let incident = &ctx.incident;
        let triage = ctx.previous_analysis(AgentType::Triage).cloned().unwrap_or(json!({}));
        let telemetry = ctx
            .previous_analysis(AgentType::Telemetry)
            .cloned()
            .unwrap_or(json!({}));
        let remediation = ctx
            .previous_analysis(AgentType::Remediation)
            .cloned()
            .unwrap_or(json!({}));
        let risk = ctx.previous_analysis(AgentType::Risk).cloned().unwrap_or(json!({}));

        let prompt = format!(
            "Generate a concise, human-readable incident summary for an operations team.\n\n\
             INCIDENT DETAILS:\n\
             - Resource: {} / {}\n- Event: {}\n- Time: {}\n\n\
             TRIAGE:\n- Classification: {}\n- Severity: {}/10\n\n\
             TELEMETRY:\n- Anomalies detected: {}\n- Health score: {}\n\n\
             REMEDIATION:\n- Mode: {}\n- Estimated duration: {}s\n\n\
             RISK:\n- Risk score: {}\n- Safe to proceed: {}\n\n\
             Use this structure: a two or three sentence description, an IMPACT\n\
             section, a CURRENT STATUS section, and a NEXT STEPS section.\n\
             Keep it concise and actionable.",
            incident.resource_type,
            incident.resource_id,
            incident.event_name,
            incident.event_time.to_rfc3339(),
            triage["classification"].as_str().unwrap_or("UNKNOWN"),
            triage["severity_score"].as_u64().unwrap_or(0),
            telemetry["anomalies"].as_array().map(Vec::len).unwrap_or(0),
            telemetry["telemetry_health_score"].as_f64().unwrap_or(0.5),
            if remediation["auto_executable"].as_bool().unwrap_or(false) {
                "Automated"
            } else {
                "Requires approval"
            },
            remediation["estimated_duration"].as_u64().unwrap_or(0),
            risk["risk_score"].as_f64().unwrap_or(0.5),
            risk["safe_to_proceed"].as_bool().unwrap_or(false),
        );

        match self.collab.llm.invoke(&prompt, 1024, 0.3).await {
            Ok(summary) if !summary.is_empty() => summary,
            Ok(_) | Err(_) => {
                warn!("summary generation failed, using template");
                format!(
                    "**INCIDENT SUMMARY**\n\n\
                     {} resource {} experienced a {} event.\n\n\
                     **IMPACT**\n\
                     - Classification: {}\n\
                     - Severity: {}/10\n\n\
                     **CURRENT STATUS**\n\
                     Incident detected and being processed by the automated \
                     incident-response system.\n\n\
                     **NEXT STEPS**\n\
                     Automated remediation in progress.",
                    incident.resource_type.as_str().to_uppercase(),
                    incident.resource_id,
                    incident.event_name,
                    triage["classification"].as_str().unwrap_or("UNKNOWN"),
                    triage["severity_score"].as_u64().unwrap_or(0),
                )
            }
        }
    }

    /// Default mailbox, plus escalation addresses for critical incidents
    fn recipients(&self, classification: &str) -> Vec<String> {
        let mut recipients = vec![self.config.comms.default_email.clone()];
        if classification == "CRITICAL" {
            recipients.extend(self.config.comms.escalation_emails.iter().cloned());
        }
        recipients.dedup();
        recipients
    }

    fn topic(&self) -> String {
        self.config
            .comms
            .sns_topic_arn
            .clone()
            .unwrap_or_else(|| DEFAULT_TOPIC.to_string())
    }
}

#[async_trait]
impl Agent for CommunicationsAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Communications
    }

    fn priority(&self) -> AgentPriority {
        AgentPriority::Low
    }

    async fn analyze(&self, ctx: &AgentContext) -> Result<Value> {
        let classification = ctx
            .previous_analysis(AgentType::Triage)
            .and_then(|t| t["classification"].as_str())
            .unwrap_or("MEDIUM")
            .to_string();

        info!(
            resource = %ctx.incident.resource_key(),
            %classification,
            correlation_id = %ctx.incident.correlation_id,
            "preparing communications"
        );

        let summary = self.generate_summary(ctx).await;
        let recipients = self.recipients(&classification);
        let notification_type = if matches!(classification.as_str(), "CRITICAL" | "HIGH") {
            "both"
        } else {
            "email"
        };

        Ok(json!({
            "incident_summary": summary,
            "notification_type": notification_type,
            "recipients": recipients,
            "severity": classification.to_lowercase(),
            "should_notify": true,
        }))
    }

    async fn execute(&self, ctx: &AgentContext, analysis: &Value) -> Result<Value> {
        if !analysis["should_notify"].as_bool().unwrap_or(true) {
            return Ok(json!({ "status": "skipped", "reason": "No notification required" }));
        }

        let summary = analysis["incident_summary"].as_str().unwrap_or_default();
        let severity = analysis["severity"].as_str().unwrap_or("medium");
        let notification_type = analysis["notification_type"].as_str().unwrap_or("email");
        let recipients: Vec<String> = analysis["recipients"]
            .as_array()
            .map(|r| {
                r.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let subject = format!(
            "AIOps Alert [{}] - {}",
            severity.to_uppercase(),
            ctx.incident.resource_key(),
        );
        let body = format!(
            "{summary}\n\nIncident ID: {}\n\nThis is an automated notification from the \
             incident-response system.",
            ctx.incident.correlation_id,
        );

        let mut notification_results = Vec::new();

        if matches!(notification_type, "email" | "both") {
            match self
                .collab
                .email
                .send(&self.config.comms.sender_email, &recipients, &subject, &body)
                .await
            {
                Ok(message_id) => notification_results.push(json!({
                    "type": "email",
                    "status": "success",
                    "message_id": message_id,
                    "recipients": recipients,
                })),
                Err(e) => {
                    warn!(error = %e, "email delivery failed, falling back to broadcast");
                    notification_results.push(json!({
                        "type": "email",
                        "status": "failed",
                        "error": e.to_string(),
                    }));
                    match self.collab.broadcast.publish(&self.topic(), &subject, &body).await {
                        Ok(message_id) => notification_results.push(json!({
                            "type": "broadcast",
                            "status": "success",
                            "message_id": message_id,
                        })),
                        Err(e) => notification_results.push(json!({
                            "type": "broadcast",
                            "status": "failed",
                            "error": e.to_string(),
                        })),
                    }
                }
            }
        }

        if notification_type == "both" {
            match self.collab.broadcast.publish(&self.topic(), &subject, summary).await {
                Ok(message_id) => notification_results.push(json!({
                    "type": "broadcast",
                    "status": "success",
                    "message_id": message_id,
                })),
                Err(e) => notification_results.push(json!({
                    "type": "broadcast",
                    "status": "failed",
                    "error": e.to_string(),
                })),
            }
        }

        let mut data = Map::new();
        data.insert(
            "communication_log".to_string(),
            json!(notification_results),
        );
        self.collab
            .store
            .merge(&ctx.incident.correlation_id, data)
            .await?;

        let sent = notification_results
            .iter()
            .filter(|r| r["status"] == "success")
            .count();
        let failed = notification_results
            .iter()
            .filter(|r| r["status"] == "failed")
            .count();
        aiops_common::metric_names::publish_communications(sent, failed);

        Ok(json!({
            "notifications_sent": sent,
            "notification_results": notification_results,
            "recipients": recipients,
        }))
    }
}
