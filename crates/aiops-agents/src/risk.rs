//! Risk agent: change-safety and compliance guardrails

use crate::{Agent, AgentContext, AgentPriority, AgentType, Collaborators};
use aiops_collab::{ObservabilityClient, PolicyClient};
use aiops_common::{BlastRadius, BlockedWindow, Config, Result};
use aiops_store::IncidentStore;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// Risk validates that an automated change is safe to make right now: change
/// windows, policy compliance, error budget, and blast radius
pub struct RiskAgent {
    config: Arc<Config>,
    collab: Collaborators,
}

/// Whether `now` falls inside any blocked change window. `end_hour` is
/// inclusive: a window ending at 23 blocks through 23:59.
pub fn is_within_blocked_window(windows: &[BlockedWindow], now: DateTime<Utc>) -> bool {
    let weekday = now.weekday().num_days_from_monday();
    let hour = now.hour();
    windows
        .iter()
        .any(|w| weekday == w.day_of_week && hour >= w.start_hour && hour <= w.end_hour)
}

impl RiskAgent {
    pub fn new(config: Arc<Config>, collab: Collaborators) -> Self {
        Self { config, collab }
    }

    /// Policy compliance, fail-open: absent data or engine errors count as
    /// compliant
    async fn check_policy_compliance(&self, ctx: &AgentContext) -> bool {
        match self
            .collab
            .policy
            .check_compliance(
                ctx.incident.resource_type.as_str(),
                &ctx.incident.resource_id,
            )
            .await
        {
            Ok(Some(compliant)) => {
                if !compliant {
                    warn!(
                        resource = %ctx.incident.resource_key(),
                        "resource has compliance violations"
                    );
                }
                compliant
            }
            Ok(None) => true,
            Err(e) => {
                warn!(error = %e, "policy check failed, assuming compliant");
                true
            }
        }
    }

    /// Error budget, fail-open: more than the configured number of CRITICAL
    /// incidents in the current hour exhausts the budget
    async fn check_error_budget(&self, ctx: &AgentContext) -> bool {
        let now = Utc::now();
        let hour_start = now
            .with_minute(0)
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(now);

        let client = self.collab.observability.client_for(&ctx.incident.region);
        match client
            .get_metric_stats(
                "aiops/engine",
                "IncidentCount",
                &[("Classification".to_string(), "CRITICAL".to_string())],
                hour_start,
                now,
                3600,
                &["Sum"],
            )
            .await
        {
            Ok(datapoints) => {
                let critical: f64 = datapoints.first().map(|d| d.sum).unwrap_or(0.0);
                if critical > self.config.risk.error_budget_limit as f64 {
                    warn!(
                        critical_incidents = critical,
                        "error budget exhausted for the current hour"
                    );
                    return false;
                }
                true
            }
            Err(e) => {
                warn!(error = %e, "error budget check failed, assuming available");
                true
            }
        }
    }

    /// Blast radius is localized unless the plan is wide or the resource is a
    /// data store; this check never raises to global on its own
    fn assess_blast_radius(ctx: &AgentContext) -> BlastRadius {
        let plan_steps = ctx
            .previous_analysis(AgentType::Remediation)
            .and_then(|a| a["runbook"]["steps"].as_array())
            .map(Vec::len)
            .unwrap_or(0);

        if plan_steps > 5 || ctx.incident.resource_type.is_data_store() {
            BlastRadius::Regional
        } else {
            BlastRadius::Localized
        }
    }

    fn calculate_risk_score(
        change_window_ok: bool,
        policy_compliant: bool,
        slo_budget_ok: bool,
        blast_radius: BlastRadius,
    ) -> f64 {
        let mut risk: f64 = 0.0;
        if !change_window_ok {
            risk += 0.3;
        }
        if !policy_compliant {
            risk += 0.4;
        }
        if !slo_budget_ok {
            risk += 0.2;
        }
        risk += match blast_radius {
            BlastRadius::Localized => 0.1,
            BlastRadius::Regional => 0.2,
            BlastRadius::Global => 0.3,
        };
        risk.min(1.0)
    }

    fn identify_risk_factors(
        change_window_ok: bool,
        policy_compliant: bool,
        slo_budget_ok: bool,
        blast_radius: BlastRadius,
        ctx: &AgentContext,
    ) -> Vec<String> {
        let mut factors = Vec::new();
        if !change_window_ok {
            factors.push("Outside approved change window".to_string());
        }
        if !policy_compliant {
            factors.push("Resource has compliance violations".to_string());
        }
        if !slo_budget_ok {
            factors.push("Error budget exhausted".to_string());
        }
        if blast_radius != BlastRadius::Localized {
            factors.push(format!("Wide blast radius: {}", blast_radius.as_str()));
        }

        if let Some(plan) = ctx.previous_analysis(AgentType::Remediation) {
            let steps = plan["runbook"]["steps"].as_array().map(Vec::len).unwrap_or(0);
            if steps > 5 {
                factors.push(format!("Complex remediation: {steps} steps"));
            }
            let duration = plan["estimated_duration"].as_u64().unwrap_or(0);
            if duration > 600 {
                factors.push(format!("Long remediation: {duration}s estimated"));
            }
        }
        factors
    }
}

#[async_trait]
impl Agent for RiskAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Risk
    }

    fn priority(&self) -> AgentPriority {
        AgentPriority::High
    }

    async fn analyze(&self, ctx: &AgentContext) -> Result<Value> {
        let incident = &ctx.incident;
        info!(
            resource = %incident.resource_key(),
            correlation_id = %incident.correlation_id,
            "assessing change risk"
        );

        let change_window_ok =
            !is_within_blocked_window(&self.config.risk.blocked_windows, Utc::now());
        let policy_compliant = self.check_policy_compliance(ctx).await;
        let slo_budget_ok = self.check_error_budget(ctx).await;
        let blast_radius = Self::assess_blast_radius(ctx);

        let mut risk_score =
            Self::calculate_risk_score(change_window_ok, policy_compliant, slo_budget_ok, blast_radius);
        let risk_factors = Self::identify_risk_factors(
            change_window_ok,
            policy_compliant,
            slo_budget_ok,
            blast_radius,
            ctx,
        );

        let mut approval_required = risk_score > 0.5 || !change_window_ok || !policy_compliant;

        // Configured exception list skips the approval gate for well-known
        // recoverable resource types
        let auto_approved = self
            .config
            .risk
            .auto_approve_resource_types
            .iter()
            .any(|t| t == incident.resource_type.as_str());
        if auto_approved {
            info!(
                resource = %incident.resource_key(),
                "auto-approving change for configured resource type"
            );
            approval_required = false;
            risk_score = 0.1;
        }

        Ok(json!({
            "risk_score": risk_score,
            "change_window_ok": change_window_ok,
            "policy_compliant": policy_compliant,
            "slo_budget_ok": slo_budget_ok,
            "blast_radius": blast_radius.as_str(),
            "approval_required": approval_required,
            "auto_approved": auto_approved,
            "risk_factors": risk_factors,
            "safe_to_proceed": risk_score < 0.5 && change_window_ok && policy_compliant,
        }))
    }

    async fn execute(&self, ctx: &AgentContext, analysis: &Value) -> Result<Value> {
        let correlation_id = &ctx.incident.correlation_id;

        let mut data = Map::new();
        data.insert("risk_assessment".to_string(), analysis.clone());
        if analysis["approval_required"].as_bool().unwrap_or(false) {
            data.insert("approval_status".to_string(), json!("pending"));
            data.insert(
                "approval_request".to_string(),
                json!({
                    "requested_at": Utc::now(),
                    "risk_score": analysis["risk_score"],
                    "risk_factors": analysis["risk_factors"],
                }),
            );
        }
        self.collab.store.merge(correlation_id, data).await?;

        aiops_common::metric_names::publish_risk(
            analysis["risk_score"].as_f64().unwrap_or(0.0),
            analysis["approval_required"].as_bool().unwrap_or(false),
            analysis["policy_compliant"].as_bool().unwrap_or(true),
        );

        Ok(json!({
            "risk_validated": true,
            "safe_to_proceed": analysis["safe_to_proceed"],
            "approval_required": analysis["approval_required"],
            "risk_score": analysis["risk_score"],
        }))
    }
}
