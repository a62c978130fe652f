//! The incident workflow engine
//!
//! Drives every incident through the workflow state machine: normalize the
//! envelope, create the incident, run the cooldown gate, coordinate the
//! agents in priority order, apply the confidence gate, and persist the
//! terminal state. The engine is the only component that writes workflow
//! states; agents only ever write their own result slots.

use crate::gate;
use aiops_agents::{
    AgentPhase, AgentType, Collaborators, CoordinationObserver, CoordinationSummary, Coordinator,
    SimilarIncident,
};
use aiops_common::metric_names;
use aiops_common::{
    retry, Config, Error, EventClassification, Incident, IncidentContext, Result, RetryPolicy,
    WorkflowState,
};
use aiops_collab::BroadcastTransport;
use aiops_ingest::{normalize, EventEnvelope, NormalizedEvent};
use aiops_store::IncidentStore;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Outcome of handling one raw event
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EngineOutcome {
    /// Unrecognized envelope; no incident was created
    Ignored { reason: String },
    /// Suppressed by the cooldown gate
    Cooldown {
        correlation_id: String,
        last_incident: String,
    },
    /// Analysis confidence was below the threshold; recovery withheld
    ManualReviewRequired {
        correlation_id: String,
        confidence: f64,
    },
    /// The event did not call for automated recovery
    NoActionNeeded {
        correlation_id: String,
        classification: String,
        final_state: WorkflowState,
    },
    /// The full workflow ran to a terminal state
    Finished {
        correlation_id: String,
        final_state: WorkflowState,
        total_agents: usize,
        successful_agents: usize,
        failed_agents: usize,
        total_duration_seconds: f64,
    },
}

/// Multi-agent incident workflow engine
pub struct Engine {
    config: Arc<Config>,
    store: Arc<dyn IncidentStore>,
    broadcast: Arc<dyn BroadcastTransport>,
    coordinator: Coordinator,
    retry_policy: RetryPolicy,
}

impl Engine {
    pub fn new(config: Arc<Config>, collaborators: Collaborators) -> Self {
        let store = collaborators.store.clone();
        let broadcast = collaborators.broadcast.clone();
        let coordinator = Coordinator::new(config.clone(), collaborators);
        Self {
            config,
            store,
            broadcast,
            coordinator,
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Handle one raw event envelope end to end.
    ///
    /// Incidents are independent: callers run many of these concurrently,
    /// each keyed by its own correlation id.
    pub async fn handle_event(&self, envelope: &EventEnvelope) -> Result<EngineOutcome> {
        let started = std::time::Instant::now();

        let ctx = match normalize(envelope, &self.config.engine.central_region) {
            NormalizedEvent::Incident(ctx) => *ctx,
            NormalizedEvent::Ignored { reason } => {
                return Ok(EngineOutcome::Ignored {
                    reason: reason.to_string(),
                });
            }
        };

        info!(
            correlation_id = %ctx.correlation_id,
            event = %ctx.event_name,
            resource = %ctx.resource_key(),
            region = %ctx.region,
            "incident detected"
        );

        // Create the incident record at DETECTING
        let incident = Incident::from_context(&ctx);
        retry(&self.retry_policy, "incident_put", || {
            self.store.put(&incident)
        })
        .await?;

        // Cooldown gate: a recent active or completed recovery for this
        // resource suppresses the new incident before any agent runs
        match gate::check_cooldown(&self.store, &ctx, self.config.engine.cooldown_minutes).await {
            Ok(Some(prior)) => {
                warn!(
                    correlation_id = %ctx.correlation_id,
                    prior_incident = %prior,
                    "suppressing incident: resource in cooldown"
                );
                let mut data = Map::new();
                data.insert(
                    "cooldown_reason".to_string(),
                    json!(format!("Recent incident: {prior}")),
                );
                self.transition(&ctx.correlation_id, WorkflowState::Cooldown, Some(data))
                    .await?;
                return Ok(EngineOutcome::Cooldown {
                    correlation_id: ctx.correlation_id,
                    last_incident: prior,
                });
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "cooldown check failed, proceeding"),
        }

        let similar = gate::fetch_similar_incidents(
            &self.store,
            &ctx,
            self.config.engine.similar_incident_limit,
        )
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "similar-incident fetch failed, proceeding without context");
            Vec::new()
        });

        self.transition(&ctx.correlation_id, WorkflowState::Analyzing, None)
            .await?;

        let deadline = Instant::now() + Duration::from_secs(self.config.engine.deadline_seconds);
        let shared_state = Arc::new(Mutex::new(WorkflowState::Analyzing));
        let observer = TransitionObserver {
            store: self.store.clone(),
            correlation_id: ctx.correlation_id.clone(),
            state: shared_state.clone(),
        };

        // Analysis batch: triage, telemetry, risk
        let mut summary = self
            .coordinator
            .orchestrate(
                &ctx,
                &similar,
                &[AgentType::Triage, AgentType::Telemetry, AgentType::Risk],
                Default::default(),
                deadline,
                Some(&observer),
            )
            .await;

        if summary.deadline_exceeded || summary.halted {
            return self
                .finish(&ctx, summary, shared_state, started, true)
                .await;
        }

        // Confidence gate, applied at the end of ANALYZING
        let triage = summary
            .agent_results
            .get(&AgentType::Triage)
            .and_then(|r| r.analysis.clone())
            .unwrap_or(Value::Null);
        let event_classification: Option<EventClassification> =
            serde_json::from_value(triage["event_classification"].clone()).ok();
        let confidence = triage["confidence"].as_f64().unwrap_or(0.0);
        let requires_recovery = event_classification
            .map(|c| c.requires_recovery())
            .unwrap_or(false);

        if requires_recovery && confidence < self.config.engine.confidence_threshold {
            warn!(
                correlation_id = %ctx.correlation_id,
                confidence,
                threshold = self.config.engine.confidence_threshold,
                "confidence below threshold, withholding recovery"
            );
            let mut data = Map::new();
            data.insert("recovery_needed".to_string(), json!(false));
            data.insert("reason".to_string(), json!("low_confidence"));
            self.transition(&ctx.correlation_id, WorkflowState::Completed, Some(data))
                .await?;
            self.send_manual_review_notification(&ctx, confidence).await;
            self.publish_engine_metrics(&ctx, &triage, started, true);
            return Ok(EngineOutcome::ManualReviewRequired {
                correlation_id: ctx.correlation_id,
                confidence,
            });
        }

        if !requires_recovery {
            info!(
                correlation_id = %ctx.correlation_id,
                classification = ?event_classification,
                "no recovery required"
            );
            summary = self
                .run_batch(
                    &ctx,
                    &similar,
                    &[AgentType::Communications],
                    summary,
                    deadline,
                    &observer,
                )
                .await;
            let final_state = self.final_state(&summary);
            let mut data = Map::new();
            data.insert("recovery_needed".to_string(), json!(false));
            data.insert("reason".to_string(), json!("no_recovery_required"));
            self.transition_from(
                &ctx.correlation_id,
                shared_state,
                final_state,
                Some(data),
            )
            .await?;
            self.publish_engine_metrics(&ctx, &triage, started, final_state == WorkflowState::Completed);
            let classification = event_classification
                .map(|c| c.as_str().to_string())
                .unwrap_or_else(|| "UNKNOWN".to_string());
            return Ok(EngineOutcome::NoActionNeeded {
                correlation_id: ctx.correlation_id,
                classification,
                final_state,
            });
        }

        // Recovery batch: remediation plans at PLANNING and executes at
        // EXECUTING, driven through the observer hooks
        summary = self
            .run_batch(
                &ctx,
                &similar,
                &[AgentType::Remediation],
                summary,
                deadline,
                &observer,
            )
            .await;
        if summary.deadline_exceeded || summary.halted {
            return self
                .finish(&ctx, summary, shared_state, started, true)
                .await;
        }

        // Communications batch, always last
        summary = self
            .run_batch(
                &ctx,
                &similar,
                &[AgentType::Communications],
                summary,
                deadline,
                &observer,
            )
            .await;

        self.finish(&ctx, summary, shared_state, started, false).await
    }

    async fn run_batch(
        &self,
        ctx: &IncidentContext,
        similar: &[SimilarIncident],
        agent_types: &[AgentType],
        summary: CoordinationSummary,
        deadline: Instant,
        observer: &TransitionObserver,
    ) -> CoordinationSummary {
        self.coordinator
            .orchestrate(
                ctx,
                similar,
                agent_types,
                summary.agent_results,
                deadline,
                Some(observer),
            )
            .await
    }

    /// Terminal state rule: COMPLETED iff every requested agent succeeded
    fn final_state(&self, summary: &CoordinationSummary) -> WorkflowState {
        if summary.successful_agents == summary.total_agents {
            WorkflowState::Completed
        } else {
            WorkflowState::Failed
        }
    }

    async fn finish(
        &self,
        ctx: &IncidentContext,
        summary: CoordinationSummary,
        shared_state: Arc<Mutex<WorkflowState>>,
        started: std::time::Instant,
        forced_failure: bool,
    ) -> Result<EngineOutcome> {
        let final_state = if forced_failure {
            WorkflowState::Failed
        } else {
            self.final_state(&summary)
        };
        let total_duration = started.elapsed().as_secs_f64();

        let mut data = Map::new();
        data.insert("success".to_string(), json!(final_state == WorkflowState::Completed));
        data.insert("total_duration_seconds".to_string(), json!(total_duration));
        data.insert(
            "agent_summary".to_string(),
            json!({
                "execution_order": summary.execution_order,
                "total_agents": summary.total_agents,
                "successful_agents": summary.successful_agents,
                "failed_agents": summary.failed_agents,
            }),
        );
        self.transition_from(&ctx.correlation_id, shared_state, final_state, Some(data))
            .await?;

        if final_state == WorkflowState::Failed {
            self.send_failure_fallback(ctx, &summary).await;
        }

        let triage = summary
            .agent_results
            .get(&AgentType::Triage)
            .and_then(|r| r.analysis.clone())
            .unwrap_or(Value::Null);
        self.publish_engine_metrics(ctx, &triage, started, final_state == WorkflowState::Completed);

        info!(
            correlation_id = %ctx.correlation_id,
            final_state = %final_state,
            successful = summary.successful_agents,
            failed = summary.failed_agents,
            duration_seconds = total_duration,
            "incident workflow finished"
        );

        Ok(EngineOutcome::Finished {
            correlation_id: ctx.correlation_id.clone(),
            final_state,
            total_agents: summary.total_agents,
            successful_agents: summary.successful_agents,
            failed_agents: summary.failed_agents,
            total_duration_seconds: total_duration,
        })
    }

    /// Persist a transition from DETECTING/ANALYZING where the engine knows
    /// the current state implicitly
    async fn transition(
        &self,
        correlation_id: &str,
        to: WorkflowState,
        data: Option<Map<String, Value>>,
    ) -> Result<()> {
        retry(&self.retry_policy, "update_state", || {
            self.store.update_state(correlation_id, to, data.clone())
        })
        .await
        .map_err(|e| {
            error!(correlation_id, state = %to, error = %e, "state transition failed");
            e
        })
    }

    /// Persist a transition validated against the observer-tracked state
    async fn transition_from(
        &self,
        correlation_id: &str,
        shared_state: Arc<Mutex<WorkflowState>>,
        to: WorkflowState,
        data: Option<Map<String, Value>>,
    ) -> Result<()> {
        let mut current = shared_state.lock().await;
        if !current.can_transition(to) {
            return Err(Error::Internal(format!(
                "invalid workflow transition {current} -> {to}"
            )));
        }
        self.transition(correlation_id, to, data).await?;
        *current = to;
        Ok(())
    }

    async fn send_manual_review_notification(&self, ctx: &IncidentContext, confidence: f64) {
        let topic = self
            .config
            .comms
            .sns_topic_arn
            .clone()
            .unwrap_or_else(|| "incidents".to_string());
        let subject = format!("Manual Review Required - {}", ctx.resource_id);
        let body = format!(
            "Low confidence ({confidence:.2}) for incident {}. Please review manually.",
            ctx.correlation_id
        );
        if let Err(e) = self.broadcast.publish(&topic, &subject, &body).await {
            warn!(error = %e, "manual review notification failed");
        }
    }

    /// On FAILED terminal states where Communications did not succeed, send a
    /// minimal broadcast so the failure is never silent
    async fn send_failure_fallback(&self, ctx: &IncidentContext, summary: &CoordinationSummary) {
        let comms_succeeded = summary
            .agent_results
            .get(&AgentType::Communications)
            .map(|r| r.is_success())
            .unwrap_or(false);
        if comms_succeeded {
            return;
        }

        let first_error = summary
            .agent_results
            .values()
            .filter_map(|r| r.error.clone())
            .next()
            .unwrap_or_else(|| "unknown".to_string());
        let topic = self
            .config
            .comms
            .sns_topic_arn
            .clone()
            .unwrap_or_else(|| "incidents".to_string());
        let body = json!({
            "correlation_id": ctx.correlation_id,
            "final_state": WorkflowState::Failed,
            "error": first_error,
        })
        .to_string();

        if let Err(e) = self
            .broadcast
            .publish(&topic, "Incident workflow failed", &body)
            .await
        {
            warn!(error = %e, "failure fallback notification failed");
        }
    }

    fn publish_engine_metrics(
        &self,
        ctx: &IncidentContext,
        triage: &Value,
        started: std::time::Instant,
        success: bool,
    ) {
        metric_names::publish_engine(
            ctx.resource_type.as_str(),
            triage["classification"].as_str().unwrap_or("UNKNOWN"),
            started.elapsed().as_secs_f64(),
            success,
        );
    }
}

/// Persists PLANNING/EXECUTING transitions as remediation reaches the
/// matching phase
struct TransitionObserver {
    store: Arc<dyn IncidentStore>,
    correlation_id: String,
    state: Arc<Mutex<WorkflowState>>,
}

#[async_trait]
impl CoordinationObserver for TransitionObserver {
    async fn phase_started(&self, agent_type: AgentType, phase: AgentPhase) {
        let target = match (agent_type, phase) {
            (AgentType::Remediation, AgentPhase::Analyze) => WorkflowState::Planning,
            (AgentType::Remediation, AgentPhase::Execute) => WorkflowState::Executing,
            _ => return,
        };

        let mut current = self.state.lock().await;
        if !current.can_transition(target) {
            warn!(
                correlation_id = %self.correlation_id,
                from = %current,
                to = %target,
                "skipping invalid observer transition"
            );
            return;
        }
        match self
            .store
            .update_state(&self.correlation_id, target, None)
            .await
        {
            Ok(()) => *current = target,
            Err(e) => warn!(
                correlation_id = %self.correlation_id,
                error = %e,
                "observer transition failed"
            ),
        }
    }
}
