//! Core types for the AIOps incident engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Generate a new correlation id in the `incident-<uuid>` format
pub fn generate_correlation_id() -> String {
    format!("incident-{}", Uuid::new_v4())
}

/// Workflow states an incident moves through
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowState {
    Detecting,
    Analyzing,
    Planning,
    Executing,
    Verifying,
    Completed,
    Failed,
    Cooldown,
}

impl WorkflowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowState::Detecting => "DETECTING",
            WorkflowState::Analyzing => "ANALYZING",
            WorkflowState::Planning => "PLANNING",
            WorkflowState::Executing => "EXECUTING",
            WorkflowState::Verifying => "VERIFYING",
            WorkflowState::Completed => "COMPLETED",
            WorkflowState::Failed => "FAILED",
            WorkflowState::Cooldown => "COOLDOWN",
        }
    }

    /// Terminal states never change again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowState::Completed | WorkflowState::Failed | WorkflowState::Cooldown
        )
    }

    /// Whether a transition from `self` to `to` follows an allowed edge
    pub fn can_transition(&self, to: WorkflowState) -> bool {
        use WorkflowState::*;
        match (self, to) {
            (Detecting, Analyzing) | (Detecting, Cooldown) => true,
            (Analyzing, Planning) | (Analyzing, Completed) | (Analyzing, Failed) => true,
            (Planning, Executing) | (Planning, Failed) => true,
            (Executing, Verifying) | (Executing, Completed) | (Executing, Failed) => true,
            (Verifying, Completed) | (Verifying, Failed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Infrastructure resource types recognized by the normalizer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceType {
    Compute,
    Function,
    TableStore,
    ObjectStore,
    RelationalDb,
    ParameterStore,
    Unknown,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Compute => "compute",
            ResourceType::Function => "function",
            ResourceType::TableStore => "table-store",
            ResourceType::ObjectStore => "object-store",
            ResourceType::RelationalDb => "relational-db",
            ResourceType::ParameterStore => "parameter-store",
            ResourceType::Unknown => "unknown",
        }
    }

    /// Data stores get a wider default blast radius and higher remediation risk
    pub fn is_data_store(&self) -> bool {
        matches!(self, ResourceType::TableStore | ResourceType::RelationalDb)
    }

    /// Resource types whose loss bumps triage severity
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            ResourceType::Compute
                | ResourceType::RelationalDb
                | ResourceType::TableStore
                | ResourceType::Function
        )
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Categorical severity bucket derived from the severity score
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Classification {
    /// Map a 1-10 severity score to a classification bucket
    pub fn from_severity(score: u8) -> Self {
        match score {
            s if s >= 9 => Classification::Critical,
            s if s >= 7 => Classification::High,
            s if s >= 5 => Classification::Medium,
            s if s >= 3 => Classification::Low,
            _ => Classification::Info,
        }
    }

    /// Representative severity for a historical classification
    pub fn severity(&self) -> u8 {
        match self {
            Classification::Critical => 10,
            Classification::High => 8,
            Classification::Medium => 5,
            Classification::Low => 3,
            Classification::Info => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Critical => "CRITICAL",
            Classification::High => "HIGH",
            Classification::Medium => "MEDIUM",
            Classification::Low => "LOW",
            Classification::Info => "INFO",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Semantic classification of the triggering event, produced during analysis
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventClassification {
    Failure,
    Tampering,
    Anomaly,
    Normal,
}

impl EventClassification {
    /// Whether this classification calls for automated recovery
    pub fn requires_recovery(&self) -> bool {
        matches!(
            self,
            EventClassification::Failure | EventClassification::Tampering
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventClassification::Failure => "FAILURE",
            EventClassification::Tampering => "TAMPERING",
            EventClassification::Anomaly => "ANOMALY",
            EventClassification::Normal => "NORMAL",
        }
    }
}

/// Qualitative reach of an incident or change
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BlastRadius {
    Localized,
    Regional,
    Global,
}

impl BlastRadius {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlastRadius::Localized => "localized",
            BlastRadius::Regional => "regional",
            BlastRadius::Global => "global",
        }
    }
}

/// Canonical normalized incident context handed to the agents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentContext {
    pub correlation_id: String,
    pub event_name: String,
    pub resource_type: ResourceType,
    pub resource_id: String,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regional_context: Option<Value>,
    pub actor: String,
    pub event_details: Value,
    pub event_time: DateTime<Utc>,
}

impl IncidentContext {
    /// Composite key `{type}#{id}` used by the cooldown gate and indexes
    pub fn resource_key(&self) -> String {
        format!("{}#{}", self.resource_type, self.resource_id)
    }
}

/// The root incident entity persisted in the incident store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub correlation_id: String,
    pub incident_timestamp: DateTime<Utc>,
    pub resource_type: ResourceType,
    pub resource_id: String,
    pub resource_key: String,
    pub region: String,
    pub workflow_state: WorkflowState,
    pub event_details: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_classification: Option<EventClassification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triage_results: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telemetry_results: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_assessment: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation_plan: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation_results: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub communication_log: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_request: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_reason: Option<String>,
    /// Additional flat attributes merged during state updates
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Incident {
    /// Create a fresh incident record from a normalized context, at DETECTING
    pub fn from_context(ctx: &IncidentContext) -> Self {
        let now = Utc::now();
        Incident {
            correlation_id: ctx.correlation_id.clone(),
            incident_timestamp: now,
            resource_type: ctx.resource_type,
            resource_id: ctx.resource_id.clone(),
            resource_key: ctx.resource_key(),
            region: ctx.region.clone(),
            workflow_state: WorkflowState::Detecting,
            event_details: ctx.event_details.clone(),
            created_at: now,
            updated_at: now,
            fingerprint: None,
            event_classification: None,
            classification: None,
            triage_results: None,
            telemetry_results: None,
            risk_assessment: None,
            remediation_plan: None,
            remediation_results: None,
            communication_log: None,
            duplicate_of: None,
            approval_status: None,
            approval_request: None,
            cooldown_reason: None,
            extra: serde_json::Map::new(),
        }
    }
}
