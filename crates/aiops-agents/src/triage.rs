//! Triage agent: classification, deduplication, and prioritization

use crate::{Agent, AgentContext, AgentPriority, AgentType, Collaborators};
use aiops_collab::{extract_json, LlmClient};
use aiops_common::{fingerprint, Classification, Result, WorkflowState};
use aiops_store::IncidentStore;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

/// Event sources with a history of low-signal events
const NOISY_SOURCES: &[&str] = &["cloudtrail.amazonaws.com", "config.amazonaws.com"];

/// Noise score above which an incident is likely a false positive
const SUPPRESSION_THRESHOLD: f64 = 0.7;

/// Triage runs first: it fingerprints the incident, checks for duplicates,
/// scores severity and noise, and classifies the triggering event
pub struct TriageAgent {
    collab: Collaborators,
}

impl TriageAgent {
    pub fn new(collab: Collaborators) -> Self {
        Self { collab }
    }

    /// Base severity from the event verb
    fn base_severity(event_name: &str) -> u8 {
        let name = event_name.to_lowercase();
        let contains_any = |words: &[&str]| words.iter().any(|w| name.contains(w));

        if contains_any(&["delete", "terminate", "destroy"]) {
            10
        } else if contains_any(&["stop", "disable", "detach"]) {
            8
        } else if contains_any(&["modify", "update", "change"]) {
            6
        } else if contains_any(&["create", "start", "enable"]) {
            3
        } else {
            5
        }
    }

    /// Severity score 1-10: verb base, resource criticality bump, blended
    /// with the mean severity of historical duplicates when present
    fn calculate_severity(ctx: &AgentContext, similar_incidents: &[Value]) -> u8 {
        let mut severity = Self::base_severity(&ctx.incident.event_name);

        if ctx.incident.resource_type.is_critical() {
            severity = (severity + 1).min(10);
        }

        if !similar_incidents.is_empty() {
            let historical: f64 = similar_incidents
                .iter()
                .map(|inc| {
                    inc["classification"]
                        .as_str()
                        .and_then(|c| serde_json::from_value::<Classification>(json!(c)).ok())
                        .map(|c| c.severity() as f64)
                        .unwrap_or(5.0)
                })
                .sum::<f64>()
                / similar_incidents.len() as f64;
            severity = ((severity as f64 + historical) / 2.0).round() as u8;
        }

        severity.clamp(1, 10)
    }

    /// Likelihood this incident is noise, in [0, 1]
    fn calculate_noise_score(ctx: &AgentContext, similar_incidents: &[Value]) -> f64 {
        let mut noise: f64 = 0.0;

        if similar_incidents.len() >= 5 {
            noise += 0.3;
        }

        if !similar_incidents.is_empty() {
            let resolved = similar_incidents
                .iter()
                .filter(|inc| inc["resolved"].as_bool().unwrap_or(false))
                .count();
            if resolved as f64 / similar_incidents.len() as f64 > 0.8 {
                noise += 0.2;
            }
        }

        let event_source = ctx.incident.event_details["eventSource"]
            .as_str()
            .unwrap_or_default();
        if NOISY_SOURCES.contains(&event_source) {
            noise += 0.1;
        }

        noise.clamp(0.0, 1.0)
    }

    /// Duplicate scan: incidents sharing this fingerprint in the last 24 hours
    async fn check_duplicates(&self, fingerprint: &str) -> (bool, Vec<Value>) {
        let since = Utc::now() - Duration::hours(24);
        match self
            .collab
            .store
            .scan_by_fingerprint(fingerprint, since, 10)
            .await
        {
            Ok(incidents) => {
                let similar: Vec<Value> = incidents
                    .iter()
                    .map(|inc| {
                        json!({
                            "incident_id": inc.correlation_id,
                            "timestamp": inc.incident_timestamp,
                            "classification": inc.classification.map(|c| c.as_str()),
                            "resolved": inc.workflow_state == WorkflowState::Completed,
                        })
                    })
                    .collect();
                (!similar.is_empty(), similar)
            }
            Err(e) => {
                warn!(error = %e, "duplicate scan failed, assuming no duplicates");
                (false, Vec::new())
            }
        }
    }

    /// Semantic event classification via the LLM, with a deterministic
    /// keyword fallback when the model is unavailable or returns prose
    async fn classify_event(&self, ctx: &AgentContext, severity: u8) -> Value {
        let historical = if ctx.similar_incidents.is_empty() {
            String::new()
        } else {
            format!(
                "\nHISTORICAL CONTEXT: {} similar incidents were previously resolved for this resource type.\n",
                ctx.similar_incidents.len()
            )
        };

        let prompt = format!(
            "You are an expert operations agent analyzing infrastructure change events.\n\n\
             EVENT DETAILS:\n{}\n\n\
             RESOURCE INFORMATION:\n- Type: {}\n- ID: {}\n{}\n\
             ANALYSIS TASKS:\n\n\
             1. CLASSIFICATION - Categorize this event:\n\
                - FAILURE: critical resource deleted or terminated, requires immediate recovery\n\
                - TAMPERING: unauthorized configuration change, security concern\n\
                - ANOMALY: unusual behavior but not critical\n\
                - NORMAL: expected operation, no action needed\n\n\
             2. CONFIDENCE - Rate your confidence in this classification (0.0 to 1.0)\n\n\
             3. REASONING - Explain your analysis in two or three sentences\n\n\
             4. PREDICTED IMPACT - Affected services, estimated downtime in minutes,\n\
                blast radius (localized/regional/global), customer impact\n\n\
             Respond in JSON with these keys:\n\
             {{\"classification\": \"FAILURE|TAMPERING|ANOMALY|NORMAL\", \"confidence\": 0.95,\n \
              \"reasoning\": \"...\", \"affected_services\": [\"...\"],\n \
              \"estimated_downtime_minutes\": 5, \"blast_radius\": \"localized\",\n \
              \"customer_impact\": \"medium\"}}",
            serde_json::to_string_pretty(&ctx.incident.event_details).unwrap_or_default(),
            ctx.incident.resource_type,
            ctx.incident.resource_id,
            historical,
        );

        let parsed = match self.collab.llm.invoke(&prompt, 1024, 0.1).await {
            Ok(text) => extract_json(&text).ok(),
            Err(e) => {
                warn!(error = %e, "llm classification failed, using fallback");
                None
            }
        };

        match parsed {
            Some(value)
                if value["classification"].as_str().is_some()
                    && value["confidence"].as_f64().is_some() =>
            {
                value
            }
            _ => Self::fallback_classification(ctx, severity),
        }
    }

    /// Keyword-based fallback classification when LLM output is unusable
    fn fallback_classification(ctx: &AgentContext, severity: u8) -> Value {
        let name = ctx.incident.event_name.to_uppercase();
        if name.contains("TERMINATE") || name.contains("DELETE") || name.contains("DESTROY") {
            json!({
                "classification": "FAILURE",
                "confidence": 0.7,
                "reasoning": "Fallback classification based on keyword detection",
                "affected_services": [ctx.incident.resource_type.as_str()],
                "estimated_downtime_minutes": severity as u64 * 5,
                "blast_radius": if severity < 7 { "localized" } else { "regional" },
                "customer_impact": if severity >= 8 { "high" } else { "medium" },
            })
        } else {
            json!({
                "classification": "NORMAL",
                "confidence": 0.5,
                "reasoning": "Unable to parse model response, defaulting to NORMAL",
                "affected_services": [],
                "estimated_downtime_minutes": 0,
                "blast_radius": "localized",
                "customer_impact": "none",
            })
        }
    }
}

#[async_trait]
impl Agent for TriageAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Triage
    }

    fn priority(&self) -> AgentPriority {
        AgentPriority::Critical
    }

    async fn analyze(&self, ctx: &AgentContext) -> Result<Value> {
        let incident = &ctx.incident;
        info!(
            resource = %incident.resource_key(),
            correlation_id = %incident.correlation_id,
            "triaging incident"
        );

        let fingerprint = fingerprint(
            &incident.event_name,
            incident.resource_type.as_str(),
            &incident.resource_id,
            &incident.region,
        );

        let (is_duplicate, similar_incidents) = self.check_duplicates(&fingerprint).await;
        let severity_score = Self::calculate_severity(ctx, &similar_incidents);
        let classification = Classification::from_severity(severity_score);
        let noise_score = Self::calculate_noise_score(ctx, &similar_incidents);
        let event_analysis = self.classify_event(ctx, severity_score).await;

        let requires_immediate_action = matches!(
            classification,
            Classification::Critical | Classification::High
        ) && !is_duplicate;

        Ok(json!({
            "fingerprint": fingerprint,
            "classification": classification.as_str(),
            "severity_score": severity_score,
            "is_duplicate": is_duplicate,
            "similar_incidents": similar_incidents,
            "noise_score": noise_score,
            "business_impact": {
                "affected_services": event_analysis["affected_services"],
                "estimated_downtime_minutes": event_analysis["estimated_downtime_minutes"],
                "blast_radius": event_analysis["blast_radius"],
                "customer_impact": event_analysis["customer_impact"],
            },
            "event_classification": event_analysis["classification"],
            "confidence": event_analysis["confidence"],
            "reasoning": event_analysis["reasoning"],
            "should_suppress": noise_score > SUPPRESSION_THRESHOLD,
            "requires_immediate_action": requires_immediate_action,
        }))
    }

    async fn execute(&self, ctx: &AgentContext, analysis: &Value) -> Result<Value> {
        let correlation_id = &ctx.incident.correlation_id;

        let mut data = Map::new();
        data.insert("triage_results".to_string(), analysis.clone());
        data.insert("fingerprint".to_string(), analysis["fingerprint"].clone());
        data.insert(
            "classification".to_string(),
            analysis["classification"].clone(),
        );
        data.insert(
            "event_classification".to_string(),
            analysis["event_classification"].clone(),
        );
        data.insert("confidence".to_string(), analysis["confidence"].clone());
        data.insert("severity".to_string(), analysis["severity_score"].clone());

        // Link duplicates back to the original incident
        if analysis["is_duplicate"].as_bool().unwrap_or(false) {
            if let Some(original) = analysis["similar_incidents"]
                .get(0)
                .and_then(|inc| inc["incident_id"].as_str())
            {
                data.insert("duplicate_of".to_string(), json!(original));
            }
        }

        self.collab.store.merge(correlation_id, data).await?;

        aiops_common::metric_names::publish_triage(
            analysis["classification"].as_str().unwrap_or("UNKNOWN"),
            analysis["severity_score"].as_u64().unwrap_or(0) as u8,
            analysis["noise_score"].as_f64().unwrap_or(0.0),
            analysis["is_duplicate"].as_bool().unwrap_or(false),
        );

        Ok(json!({
            "triage_complete": true,
            "classification": analysis["classification"],
            "action_required": analysis["requires_immediate_action"],
            "suppressed": analysis["should_suppress"],
        }))
    }
}
