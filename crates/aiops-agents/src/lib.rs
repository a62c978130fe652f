//! Agent framework and specialized agents for the AIOps incident engine
//!
//! Every agent implements [`Agent`]: a read-only `analyze` phase and a
//! mutating `execute` phase, wrapped by a fail-soft runner that converts
//! errors into a FAILED result instead of aborting the workflow. The
//! [`Coordinator`] runs agents sequentially in priority order, threading
//! accumulated results through the shared context.

use aiops_common::{IncidentContext, Result};
use aiops_collab::{
    BroadcastTransport, BuildExecutor, CommandExecutor, EmailTransport, FunctionExecutor,
    LlmClient, PolicyClient, RegionalObservability,
};
use aiops_store::IncidentStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};

pub mod comms;
pub mod coordinator;
pub mod remediation;
pub mod risk;
pub mod telemetry;
pub mod triage;

pub use comms::CommunicationsAgent;
pub use coordinator::{AgentPhase, CoordinationObserver, CoordinationSummary, Coordinator};
pub use remediation::RemediationAgent;
pub use risk::RiskAgent;
pub use telemetry::TelemetryAgent;
pub use triage::TriageAgent;

/// Agent type enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    Triage,
    Telemetry,
    Remediation,
    Risk,
    #[serde(rename = "comms")]
    Communications,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Triage => "triage",
            AgentType::Telemetry => "telemetry",
            AgentType::Remediation => "remediation",
            AgentType::Risk => "risk",
            AgentType::Communications => "comms",
        }
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Agent execution priority; lower runs earlier
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AgentPriority {
    Critical = 1,
    High = 2,
    Medium = 3,
    Low = 4,
}

impl AgentPriority {
    pub fn value(&self) -> u8 {
        *self as u8
    }
}

/// Agent execution status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

/// Complete result of one agent run, embedded into the incident record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent_type: AgentType,
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<Value>,
    pub duration_seconds: f64,
    #[serde(default)]
    pub critical_failure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentResult {
    pub fn is_success(&self) -> bool {
        self.status == AgentStatus::Success
    }
}

/// Condensed view of a historical incident used for context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarIncident {
    pub correlation_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<String>,
    pub resolved: bool,
}

/// Injected collaborator handles shared by all agents.
///
/// Constructed once per process; every client must be safe for concurrent
/// use.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn IncidentStore>,
    pub llm: Arc<dyn LlmClient>,
    pub observability: Arc<RegionalObservability>,
    pub policy: Arc<dyn PolicyClient>,
    pub build: Arc<dyn BuildExecutor>,
    pub command: Arc<dyn CommandExecutor>,
    pub function: Arc<dyn FunctionExecutor>,
    pub email: Arc<dyn EmailTransport>,
    pub broadcast: Arc<dyn BroadcastTransport>,
}

/// Context handed to each agent: the normalized incident, historical context
/// loaded by the gate, and every earlier agent's result
#[derive(Clone)]
pub struct AgentContext {
    pub incident: IncidentContext,
    pub similar_incidents: Vec<SimilarIncident>,
    pub previous_results: BTreeMap<AgentType, AgentResult>,
}

impl AgentContext {
    pub fn new(incident: IncidentContext, similar_incidents: Vec<SimilarIncident>) -> Self {
        Self {
            incident,
            similar_incidents,
            previous_results: BTreeMap::new(),
        }
    }

    /// A previous agent's analysis payload, if it ran and produced one
    pub fn previous_analysis(&self, agent_type: AgentType) -> Option<&Value> {
        self.previous_results
            .get(&agent_type)
            .and_then(|r| r.analysis.as_ref())
    }

    /// Whether triage marked this incident as a duplicate
    pub fn is_duplicate(&self) -> bool {
        self.previous_analysis(AgentType::Triage)
            .and_then(|a| a["is_duplicate"].as_bool())
            .unwrap_or(false)
    }
}

/// Capability set every specialized agent implements
#[async_trait]
pub trait Agent: Send + Sync {
    fn agent_type(&self) -> AgentType;
    fn priority(&self) -> AgentPriority;

    /// Analysis phase: may read collaborators, must not mutate infrastructure
    /// or the incident store
    async fn analyze(&self, ctx: &AgentContext) -> Result<Value>;

    /// Execution phase: may mutate infrastructure via collaborators and
    /// persists its own result slot
    async fn execute(&self, ctx: &AgentContext, analysis: &Value) -> Result<Value>;

    /// Whether a failure of this agent should stop coordination
    fn critical_on_failure(&self) -> bool {
        false
    }

    /// Run both phases, recording timings and converting errors into a FAILED
    /// result
    async fn run(&self, ctx: &AgentContext) -> AgentResult
    where
        Self: Sized,
    {
        run_agent(self, ctx, None).await
    }
}

/// Fail-soft agent runner shared by the trait and the coordinator.
///
/// The optional observer is notified at phase boundaries so the workflow
/// engine can persist state transitions around them.
pub async fn run_agent(
    agent: &dyn Agent,
    ctx: &AgentContext,
    observer: Option<&dyn CoordinationObserver>,
) -> AgentResult {
    let agent_type = agent.agent_type();
    let correlation_id = ctx.incident.correlation_id.clone();
    let start = std::time::Instant::now();

    info!(agent = %agent_type, correlation_id = %correlation_id, "agent starting");

    if let Some(observer) = observer {
        observer.phase_started(agent_type, AgentPhase::Analyze).await;
    }

    let analysis = match agent.analyze(ctx).await {
        Ok(analysis) => analysis,
        Err(e) => {
            error!(
                agent = %agent_type,
                correlation_id = %correlation_id,
                error = %e,
                "agent analysis failed"
            );
            return AgentResult {
                agent_type,
                status: AgentStatus::Failed,
                analysis: None,
                execution: None,
                duration_seconds: start.elapsed().as_secs_f64(),
                critical_failure: agent.critical_on_failure(),
                error: Some(e.to_string()),
            };
        }
    };

    if let Some(observer) = observer {
        observer.phase_started(agent_type, AgentPhase::Execute).await;
    }

    match agent.execute(ctx, &analysis).await {
        Ok(execution) => {
            info!(agent = %agent_type, correlation_id = %correlation_id, "agent completed");
            AgentResult {
                agent_type,
                status: AgentStatus::Success,
                analysis: Some(analysis),
                execution: Some(execution),
                duration_seconds: start.elapsed().as_secs_f64(),
                critical_failure: false,
                error: None,
            }
        }
        Err(e) => {
            error!(
                agent = %agent_type,
                correlation_id = %correlation_id,
                error = %e,
                "agent execution failed"
            );
            AgentResult {
                agent_type,
                status: AgentStatus::Failed,
                analysis: Some(analysis),
                execution: None,
                duration_seconds: start.elapsed().as_secs_f64(),
                critical_failure: agent.critical_on_failure(),
                error: Some(e.to_string()),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support;
