//! Priority-ordered agent coordination
//!
//! The coordinator runs agents sequentially: each agent's analysis depends on
//! the accumulated results of the agents before it. A failed agent does not
//! stop the run unless it flags a critical failure; the per-incident deadline
//! abandons the current agent and halts.

use crate::{
    run_agent, Agent, AgentContext, AgentResult, AgentStatus, AgentType, Collaborators,
    CommunicationsAgent, RemediationAgent, RiskAgent, SimilarIncident, TelemetryAgent,
    TriageAgent,
};
use aiops_common::{Config, IncidentContext};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Agent lifecycle phase, reported to the observer as it starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentPhase {
    Analyze,
    Execute,
}

/// Hook invoked at phase boundaries; the workflow engine uses it to persist
/// state transitions around remediation
#[async_trait]
pub trait CoordinationObserver: Send + Sync {
    async fn phase_started(&self, agent_type: AgentType, phase: AgentPhase);
}

/// Outcome of one coordination run. Results accumulate across seeded batches,
/// so the counters always reflect every agent seen so far.
#[derive(Debug, Clone, Serialize)]
pub struct CoordinationSummary {
    pub correlation_id: String,
    pub execution_order: Vec<AgentType>,
    pub agent_results: BTreeMap<AgentType, AgentResult>,
    pub total_agents: usize,
    pub successful_agents: usize,
    pub failed_agents: usize,
    /// An agent demanded a stop via `critical_failure`
    pub halted: bool,
    /// The per-incident deadline expired mid-run
    pub deadline_exceeded: bool,
}

/// Runs agents for one incident in priority order
pub struct Coordinator {
    config: Arc<Config>,
    collaborators: Collaborators,
}

impl Coordinator {
    pub fn new(config: Arc<Config>, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
        }
    }

    fn build_agent(&self, agent_type: AgentType) -> Box<dyn Agent> {
        match agent_type {
            AgentType::Triage => Box::new(TriageAgent::new(self.collaborators.clone())),
            AgentType::Telemetry => Box::new(TelemetryAgent::new(self.collaborators.clone())),
            AgentType::Risk => Box::new(RiskAgent::new(
                self.config.clone(),
                self.collaborators.clone(),
            )),
            AgentType::Remediation => Box::new(RemediationAgent::new(
                self.config.clone(),
                self.collaborators.clone(),
            )),
            AgentType::Communications => Box::new(CommunicationsAgent::new(
                self.config.clone(),
                self.collaborators.clone(),
            )),
        }
    }

    /// Orchestrate a batch of agents for one incident.
    ///
    /// `seed_results` carries results from earlier batches so later agents
    /// observe the full accumulated context; the returned summary covers the
    /// seeded results as well.
    pub async fn orchestrate(
        &self,
        incident: &IncidentContext,
        similar_incidents: &[SimilarIncident],
        agent_types: &[AgentType],
        seed_results: BTreeMap<AgentType, AgentResult>,
        deadline: Instant,
        observer: Option<&dyn CoordinationObserver>,
    ) -> CoordinationSummary {
        let mut agents: Vec<Box<dyn Agent>> =
            agent_types.iter().map(|t| self.build_agent(*t)).collect();
        // Stable sort preserves the requested order among equal priorities
        agents.sort_by_key(|a| a.priority());

        let mut ctx = AgentContext::new(incident.clone(), similar_incidents.to_vec());
        ctx.previous_results = seed_results;

        let mut execution_order = Vec::new();
        let mut halted = false;
        let mut deadline_exceeded = false;

        info!(
            correlation_id = %incident.correlation_id,
            agents = agents.len(),
            "orchestrating agents"
        );

        for agent in &agents {
            let agent_type = agent.agent_type();
            let remaining = deadline.saturating_duration_since(Instant::now());

            if remaining.is_zero() {
                error!(
                    correlation_id = %incident.correlation_id,
                    agent = %agent_type,
                    "per-incident deadline expired before agent could run"
                );
                ctx.previous_results
                    .insert(agent_type, deadline_result(agent_type));
                execution_order.push(agent_type);
                deadline_exceeded = true;
                break;
            }

            let result =
                match tokio::time::timeout(remaining, run_agent(agent.as_ref(), &ctx, observer))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => {
                        error!(
                            correlation_id = %incident.correlation_id,
                            agent = %agent_type,
                            "per-incident deadline expired, abandoning agent"
                        );
                        deadline_exceeded = true;
                        deadline_result(agent_type)
                    }
                };

            let failed_critically =
                result.status == AgentStatus::Failed && result.critical_failure;
            ctx.previous_results.insert(agent_type, result);
            execution_order.push(agent_type);

            if deadline_exceeded {
                break;
            }
            if failed_critically {
                warn!(
                    correlation_id = %incident.correlation_id,
                    agent = %agent_type,
                    "critical failure, stopping orchestration"
                );
                halted = true;
                break;
            }
        }

        let successful_agents = ctx
            .previous_results
            .values()
            .filter(|r| r.status == AgentStatus::Success)
            .count();
        let failed_agents = ctx
            .previous_results
            .values()
            .filter(|r| r.status == AgentStatus::Failed)
            .count();

        CoordinationSummary {
            correlation_id: incident.correlation_id.clone(),
            execution_order,
            total_agents: ctx.previous_results.len(),
            successful_agents,
            failed_agents,
            agent_results: ctx.previous_results,
            halted,
            deadline_exceeded,
        }
    }
}

fn deadline_result(agent_type: AgentType) -> AgentResult {
    AgentResult {
        agent_type,
        status: AgentStatus::Failed,
        analysis: None,
        execution: None,
        duration_seconds: 0.0,
        critical_failure: false,
        error: Some("deadline_exceeded".to_string()),
    }
}
