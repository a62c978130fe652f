//! Remediation agent: runbook synthesis and recovery execution

use crate::{Agent, AgentContext, AgentPriority, AgentType, Collaborators};
use aiops_collab::{
    extract_json, BuildExecutor, CommandExecutor, FunctionExecutor, LlmClient,
};
use aiops_common::{Config, Error, Result};
use aiops_store::IncidentStore;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Remediation synthesizes an ordered runbook from the accumulated analysis
/// and executes it through the mutation executors, stopping at the first
/// failing step
pub struct RemediationAgent {
    config: Arc<Config>,
    collab: Collaborators,
}

impl RemediationAgent {
    pub fn new(config: Arc<Config>, collab: Collaborators) -> Self {
        Self { config, collab }
    }

    /// Synthesize a runbook via the LLM; fall back to a single image-build
    /// restore step when the output does not parse
    async fn generate_runbook(&self, ctx: &AgentContext, classification: &str) -> Value {
        let incident = &ctx.incident;

        let telemetry_summary = ctx
            .previous_analysis(AgentType::Telemetry)
            .and_then(|t| t["anomalies"].as_array().cloned())
            .filter(|anomalies| !anomalies.is_empty())
            .map(|anomalies| {
                let lines: Vec<String> = anomalies
                    .iter()
                    .take(3)
                    .filter_map(|a| a["description"].as_str().map(str::to_string))
                    .collect();
                format!("\nDetected anomalies:\n- {}\n", lines.join("\n- "))
            })
            .unwrap_or_default();

        let prompt = format!(
            "You are an operations agent creating a remediation runbook for an \
             infrastructure incident.\n\n\
             INCIDENT DETAILS:\n\
             - Resource Type: {}\n- Resource ID: {}\n- Event: {}\n- Classification: {}\n{}\n\
             CREATE A STEP-BY-STEP REMEDIATION RUNBOOK:\n\n\
             1. Immediate stabilization (under a minute)\n\
             2. Primary recovery (one to five minutes)\n\
             3. Verification of recovery success\n\n\
             For each step specify:\n\
             - step_number: sequential number\n\
             - action_type: \"image-build\" | \"command-dispatch\" | \"function\" | \"manual\"\n\
             - description: what this step does\n\
             - timeout_seconds: maximum time allowed\n\
             - command: automation document, function name, or build command\n\
             - success_criteria: how to verify success\n\n\
             Respond in JSON with these keys:\n\
             {{\"steps\": [{{\"step_number\": 1, \"action_type\": \"image-build\",\n \
              \"description\": \"...\", \"timeout_seconds\": 300, \"command\": \"...\",\n \
              \"success_criteria\": \"...\"}}],\n \
              \"estimated_duration_seconds\": 300, \"prerequisites\": []}}",
            incident.resource_type,
            incident.resource_id,
            incident.event_name,
            classification,
            telemetry_summary,
        );

        let parsed = match self.collab.llm.invoke(&prompt, 2048, 0.2).await {
            Ok(text) => extract_json(&text).ok(),
            Err(e) => {
                warn!(error = %e, "runbook generation failed, using fallback");
                None
            }
        };

        match parsed {
            Some(runbook)
                if runbook["steps"]
                    .as_array()
                    .map(|steps| !steps.is_empty())
                    .unwrap_or(false) =>
            {
                runbook
            }
            _ => json!({
                "steps": [{
                    "step_number": 1,
                    "action_type": "image-build",
                    "description": format!(
                        "Restore {} from source definitions",
                        incident.resource_type
                    ),
                    "timeout_seconds": 300,
                    "command": "apply",
                    "success_criteria": "Resource restored",
                }],
                "estimated_duration_seconds": 300,
                "prerequisites": [],
            }),
        }
    }

    fn assess_risk_level(runbook: &Value, ctx: &AgentContext, classification: &str) -> &'static str {
        if classification == "CRITICAL" {
            return "high";
        }
        let steps = runbook["steps"].as_array().map(Vec::len).unwrap_or(0);
        let duration = runbook["estimated_duration_seconds"].as_u64().unwrap_or(0);
        if steps > 5 || duration > 600 {
            return "high";
        }
        if ctx.incident.resource_type.is_data_store() {
            return "medium";
        }
        "low"
    }

    /// The approval decision defers to risk: an explicit approval requirement
    /// from risk always wins, and an auto-approved resource never needs one
    fn requires_approval(ctx: &AgentContext, risk_level: &str, classification: &str) -> bool {
        if let Some(risk) = ctx.previous_analysis(AgentType::Risk) {
            if risk["approval_required"].as_bool().unwrap_or(false) {
                return true;
            }
            if risk["auto_approved"].as_bool().unwrap_or(false) {
                return false;
            }
        }
        matches!(risk_level, "high" | "medium") || classification == "CRITICAL"
    }

    /// Execute one runbook step through the matching executor
    async fn execute_step(&self, ctx: &AgentContext, step: &Value) -> Result<Value> {
        let action_type = step["action_type"].as_str().unwrap_or("manual");
        let command = step["command"].as_str().unwrap_or_default();
        let timeout = Duration::from_secs(
            step["timeout_seconds"]
                .as_u64()
                .unwrap_or(self.config.collaborators.mutation_timeout_seconds),
        );

        let dispatch = async {
            match action_type {
                "image-build" => {
                    let build_id = self
                        .collab
                        .build
                        .start_build(
                            &self.config.remediation.codebuild_project,
                            &[
                                (
                                    "CORRELATION_ID".to_string(),
                                    ctx.incident.correlation_id.clone(),
                                ),
                                (
                                    "RESOURCE_TYPE".to_string(),
                                    ctx.incident.resource_type.as_str().to_string(),
                                ),
                            ],
                        )
                        .await?;
                    Ok(json!({ "status": "success", "build_id": build_id }))
                }
                "command-dispatch" => {
                    if command.is_empty() {
                        return Err(Error::Execution("no automation document specified".into()));
                    }
                    let execution_id = self
                        .collab
                        .command
                        .start_command(command, &json!({}))
                        .await?;
                    Ok(json!({ "status": "success", "execution_id": execution_id }))
                }
                "function" => {
                    if command.is_empty() {
                        return Err(Error::Execution("no function specified".into()));
                    }
                    let response = self
                        .collab
                        .function
                        .invoke(
                            command,
                            &json!({
                                "correlation_id": ctx.incident.correlation_id,
                                "step": step,
                            }),
                        )
                        .await?;
                    Ok(json!({ "status": "success", "response": response }))
                }
                _ => Ok(json!({
                    "status": "skipped",
                    "message": "Manual step requires human intervention",
                })),
            }
        };

        tokio::time::timeout(timeout, dispatch)
            .await
            .map_err(|_| Error::Timeout(format!("step timed out after {}s", timeout.as_secs())))?
    }

    /// Run the steps in order; a failing step stops execution, a skipped
    /// manual step does not
    async fn execute_runbook(&self, ctx: &AgentContext, runbook: &Value) -> Value {
        let steps = runbook["steps"].as_array().cloned().unwrap_or_default();
        let mut execution_results = Vec::new();
        let mut overall_success = true;

        for step in &steps {
            let step_number = step["step_number"].as_u64().unwrap_or(0);
            info!(
                step = step_number,
                description = step["description"].as_str().unwrap_or(""),
                "executing runbook step"
            );

            match self.execute_step(ctx, step).await {
                Ok(result) => {
                    execution_results.push(json!({
                        "step_number": step_number,
                        "status": result["status"],
                        "result": result,
                    }));
                }
                Err(e) => {
                    warn!(step = step_number, error = %e, "runbook step failed");
                    execution_results.push(json!({
                        "step_number": step_number,
                        "status": "failed",
                        "error": e.to_string(),
                    }));
                    overall_success = false;
                    break;
                }
            }
        }

        json!({
            "status": if overall_success { "success" } else { "failed" },
            "steps_executed": execution_results.len(),
            "execution_results": execution_results,
            "overall_success": overall_success,
        })
    }
}

#[async_trait]
impl Agent for RemediationAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Remediation
    }

    fn priority(&self) -> AgentPriority {
        AgentPriority::Medium
    }

    async fn analyze(&self, ctx: &AgentContext) -> Result<Value> {
        if ctx.is_duplicate() {
            info!(
                correlation_id = %ctx.incident.correlation_id,
                "duplicate incident, skipping remediation planning"
            );
            return Ok(json!({ "skipped_duplicate": true }));
        }

        let classification = ctx
            .previous_analysis(AgentType::Triage)
            .and_then(|t| t["classification"].as_str())
            .unwrap_or("MEDIUM")
            .to_string();

        info!(
            resource = %ctx.incident.resource_key(),
            %classification,
            correlation_id = %ctx.incident.correlation_id,
            "generating remediation plan"
        );

        let runbook = self.generate_runbook(ctx, &classification).await;
        let risk_level = Self::assess_risk_level(&runbook, ctx, &classification);
        let requires_approval = Self::requires_approval(ctx, risk_level, &classification);

        Ok(json!({
            "runbook": runbook,
            "estimated_duration": runbook["estimated_duration_seconds"].as_u64().unwrap_or(300),
            "risk_level": risk_level,
            "requires_approval": requires_approval,
            "rollback_plan": {
                "description": "Rollback to previous state if remediation fails",
                "steps": [
                    "Take snapshot of current state",
                    "Alert on-call engineer",
                    "Revert to last known good configuration",
                ],
                "automated": false,
            },
            "auto_executable": !requires_approval,
        }))
    }

    async fn execute(&self, ctx: &AgentContext, analysis: &Value) -> Result<Value> {
        let correlation_id = &ctx.incident.correlation_id;

        if analysis["skipped_duplicate"].as_bool().unwrap_or(false) {
            let mut data = Map::new();
            data.insert(
                "remediation_results".to_string(),
                json!({ "status": "skipped", "reason": "duplicate_incident" }),
            );
            self.collab.store.merge(correlation_id, data).await?;
            return Ok(json!({ "status": "skipped", "reason": "duplicate_incident" }));
        }

        let mut data = Map::new();
        data.insert("remediation_plan".to_string(), analysis.clone());

        if analysis["requires_approval"].as_bool().unwrap_or(false) {
            info!(
                correlation_id = %correlation_id,
                "remediation requires approval, holding execution"
            );
            data.insert("approval_status".to_string(), json!("pending"));
            self.collab.store.merge(correlation_id, data).await?;

            aiops_common::metric_names::publish_remediation("pending_approval", 0);
            return Ok(json!({
                "status": "pending_approval",
                "message": "Remediation requires human approval",
                "approval_required": true,
            }));
        }

        self.collab.store.merge(correlation_id, data).await?;

        let execution = self.execute_runbook(ctx, &analysis["runbook"]).await;

        let mut results = Map::new();
        results.insert("remediation_results".to_string(), execution.clone());
        self.collab.store.merge(correlation_id, results).await?;

        aiops_common::metric_names::publish_remediation(
            execution["status"].as_str().unwrap_or("unknown"),
            execution["steps_executed"].as_u64().unwrap_or(0) as usize,
        );

        Ok(execution)
    }
}
