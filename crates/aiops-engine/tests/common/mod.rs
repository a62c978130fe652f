//! Shared test harness: collaborator fakes and a state-recording store

use aiops_agents::Collaborators;
use aiops_collab::observability::Datapoint;
use aiops_collab::{
    BroadcastTransport, BuildExecutor, CommandExecutor, EmailTransport, FunctionExecutor,
    LlmClient, ObservabilityClient, PolicyClient, RegionalObservability,
};
use aiops_common::{
    Config, Error, EventClassification, Incident, Result, ResourceType, WorkflowState,
};
use aiops_engine::Engine;
use aiops_ingest::EventEnvelope;
use aiops_store::{IncidentStore, MemoryIncidentStore, PatternBaseline};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Store wrapper recording every workflow-state write, for asserting that
/// incidents walk valid paths through the state machine
pub struct RecordingStore {
    inner: MemoryIncidentStore,
    pub transitions: Mutex<Vec<(String, WorkflowState)>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryIncidentStore::new(),
            transitions: Mutex::new(Vec::new()),
        }
    }

    /// The observed state sequence for one incident, initial put included
    pub fn states_for(&self, correlation_id: &str) -> Vec<WorkflowState> {
        self.transitions
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == correlation_id)
            .map(|(_, state)| *state)
            .collect()
    }
}

#[async_trait]
impl IncidentStore for RecordingStore {
    async fn put(&self, incident: &Incident) -> Result<()> {
        self.transitions
            .lock()
            .unwrap()
            .push((incident.correlation_id.clone(), incident.workflow_state));
        self.inner.put(incident).await
    }

    async fn get(&self, correlation_id: &str) -> Result<Option<Incident>> {
        self.inner.get(correlation_id).await
    }

    async fn update_state(
        &self,
        correlation_id: &str,
        state: WorkflowState,
        data: Option<Map<String, Value>>,
    ) -> Result<()> {
        self.transitions
            .lock()
            .unwrap()
            .push((correlation_id.to_string(), state));
        self.inner.update_state(correlation_id, state, data).await
    }

    async fn merge(&self, correlation_id: &str, data: Map<String, Value>) -> Result<()> {
        self.inner.merge(correlation_id, data).await
    }

    async fn query_recent_by_resource(
        &self,
        resource_key: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Incident>> {
        self.inner
            .query_recent_by_resource(resource_key, since, limit)
            .await
    }

    async fn query_by_resource_type(
        &self,
        resource_type: ResourceType,
        classification: Option<EventClassification>,
        state: WorkflowState,
        limit: usize,
    ) -> Result<Vec<Incident>> {
        self.inner
            .query_by_resource_type(resource_type, classification, state, limit)
            .await
    }

    async fn scan_by_fingerprint(
        &self,
        fingerprint: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Incident>> {
        self.inner.scan_by_fingerprint(fingerprint, since, limit).await
    }

    async fn get_pattern(&self, key: &str) -> Result<Option<PatternBaseline>> {
        self.inner.get_pattern(key).await
    }

    async fn upsert_pattern(&self, key: &str, count: f64) -> Result<PatternBaseline> {
        self.inner.upsert_pattern(key, count).await
    }
}

/// LLM fake routing canned responses by prompt shape
pub struct FakeLlm {
    pub triage_response: Mutex<String>,
    pub runbook_response: Mutex<String>,
    pub summary_response: Mutex<String>,
}

impl FakeLlm {
    pub fn new() -> Self {
        Self {
            triage_response: Mutex::new(
                json!({
                    "classification": "FAILURE",
                    "confidence": 0.95,
                    "reasoning": "resource was terminated",
                    "affected_services": ["checkout"],
                    "estimated_downtime_minutes": 5,
                    "blast_radius": "localized",
                    "customer_impact": "high"
                })
                .to_string(),
            ),
            runbook_response: Mutex::new(
                json!({
                    "steps": [{
                        "step_number": 1,
                        "action_type": "image-build",
                        "description": "Restore infrastructure from source",
                        "timeout_seconds": 300,
                        "command": "apply",
                        "success_criteria": "resource exists and is healthy"
                    }],
                    "estimated_duration_seconds": 300,
                    "prerequisites": []
                })
                .to_string(),
            ),
            summary_response: Mutex::new("**INCIDENT SUMMARY**\n\nResource restored.".to_string()),
        }
    }

    pub fn set_triage(&self, classification: &str, confidence: f64) {
        *self.triage_response.lock().unwrap() = json!({
            "classification": classification,
            "confidence": confidence,
            "reasoning": "test",
            "affected_services": [],
            "estimated_downtime_minutes": 1,
            "blast_radius": "localized",
            "customer_impact": "low"
        })
        .to_string();
    }
}

#[async_trait]
impl LlmClient for FakeLlm {
    async fn invoke(&self, prompt: &str, _max_tokens: u32, _temperature: f32) -> Result<String> {
        let response = if prompt.contains("ANALYSIS TASKS") {
            self.triage_response.lock().unwrap().clone()
        } else if prompt.contains("REMEDIATION RUNBOOK") {
            self.runbook_response.lock().unwrap().clone()
        } else {
            self.summary_response.lock().unwrap().clone()
        };
        Ok(response)
    }
}

/// Observability fake with programmable metric averages
pub struct FakeObservability {
    pub metric_averages: Mutex<HashMap<String, f64>>,
    pub fail_metrics: AtomicBool,
}

impl FakeObservability {
    pub fn new() -> Self {
        Self {
            metric_averages: Mutex::new(HashMap::new()),
            fail_metrics: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ObservabilityClient for FakeObservability {
    async fn get_metric_stats(
        &self,
        namespace: &str,
        name: &str,
        _dimensions: &[(String, String)],
        _start: DateTime<Utc>,
        end: DateTime<Utc>,
        _period_seconds: u64,
        _statistics: &[&str],
    ) -> Result<Vec<Datapoint>> {
        if namespace == "aiops/engine" && name == "IncidentCount" {
            return Ok(Vec::new());
        }
        if self.fail_metrics.load(Ordering::SeqCst) {
            return Err(Error::Network("observability unavailable".into()));
        }
        let averages = self.metric_averages.lock().unwrap();
        Ok(averages
            .get(name)
            .map(|v| {
                vec![Datapoint {
                    timestamp: end,
                    average: *v,
                    maximum: *v,
                    minimum: *v,
                    sum: *v,
                }]
            })
            .unwrap_or_default())
    }

    async fn logs_query(
        &self,
        _group: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
        _query: &str,
    ) -> Result<Vec<Value>> {
        Ok(Vec::new())
    }

    async fn traces_query(
        &self,
        _expression: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<Value>> {
        Ok(Vec::new())
    }
}

pub struct FakePolicy;

#[async_trait]
impl PolicyClient for FakePolicy {
    async fn check_compliance(&self, _: &str, _: &str) -> Result<Option<bool>> {
        Ok(None)
    }
}

/// Mutation executor fake recording every dispatch
pub struct RecordingExecutors {
    pub builds: Mutex<Vec<(String, Vec<(String, String)>)>>,
    pub commands: Mutex<Vec<String>>,
    pub functions: Mutex<Vec<String>>,
}

impl RecordingExecutors {
    pub fn new() -> Self {
        Self {
            builds: Mutex::new(Vec::new()),
            commands: Mutex::new(Vec::new()),
            functions: Mutex::new(Vec::new()),
        }
    }

    pub fn total_dispatches(&self) -> usize {
        self.builds.lock().unwrap().len()
            + self.commands.lock().unwrap().len()
            + self.functions.lock().unwrap().len()
    }
}

#[async_trait]
impl BuildExecutor for RecordingExecutors {
    async fn start_build(
        &self,
        project: &str,
        env_overrides: &[(String, String)],
    ) -> Result<String> {
        self.builds
            .lock()
            .unwrap()
            .push((project.to_string(), env_overrides.to_vec()));
        Ok("build-1".to_string())
    }
}

#[async_trait]
impl CommandExecutor for RecordingExecutors {
    async fn start_command(&self, document: &str, _parameters: &Value) -> Result<String> {
        self.commands.lock().unwrap().push(document.to_string());
        Ok("exec-1".to_string())
    }
}

#[async_trait]
impl FunctionExecutor for RecordingExecutors {
    async fn invoke(&self, name: &str, _payload: &Value) -> Result<Value> {
        self.functions.lock().unwrap().push(name.to_string());
        Ok(json!({"status": "ok"}))
    }
}

/// Notification fake recording emails and broadcasts
pub struct RecordingNotifier {
    pub emails: Mutex<Vec<(Vec<String>, String)>>,
    pub broadcasts: Mutex<Vec<(String, String)>>,
    pub fail_email: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            emails: Mutex::new(Vec::new()),
            broadcasts: Mutex::new(Vec::new()),
            fail_email: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl EmailTransport for RecordingNotifier {
    async fn send(&self, _from: &str, to: &[String], subject: &str, _body: &str) -> Result<String> {
        if self.fail_email.load(Ordering::SeqCst) {
            return Err(Error::Notification("email transport down".into()));
        }
        self.emails
            .lock()
            .unwrap()
            .push((to.to_vec(), subject.to_string()));
        Ok("msg-1".to_string())
    }
}

#[async_trait]
impl BroadcastTransport for RecordingNotifier {
    async fn publish(&self, _topic: &str, subject: &str, body: &str) -> Result<String> {
        self.broadcasts
            .lock()
            .unwrap()
            .push((subject.to_string(), body.to_string()));
        Ok("msg-2".to_string())
    }
}

/// Engine plus every fake it talks to
pub struct TestHarness {
    pub store: Arc<RecordingStore>,
    pub llm: Arc<FakeLlm>,
    pub observability: Arc<FakeObservability>,
    pub executors: Arc<RecordingExecutors>,
    pub notifier: Arc<RecordingNotifier>,
    pub engine: Engine,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(RecordingStore::new());
        let llm = Arc::new(FakeLlm::new());
        let observability = Arc::new(FakeObservability::new());
        let executors = Arc::new(RecordingExecutors::new());
        let notifier = Arc::new(RecordingNotifier::new());

        let obs = observability.clone();
        let collaborators = Collaborators {
            store: store.clone(),
            llm: llm.clone(),
            observability: Arc::new(RegionalObservability::new(
                "us-east-1",
                Box::new(move |_region| obs.clone() as Arc<dyn ObservabilityClient>),
            )),
            policy: Arc::new(FakePolicy),
            build: executors.clone(),
            command: executors.clone(),
            function: executors.clone(),
            email: notifier.clone(),
            broadcast: notifier.clone(),
        };

        let engine = Engine::new(Arc::new(config), collaborators);
        Self {
            store,
            llm,
            observability,
            executors,
            notifier,
            engine,
        }
    }
}

/// The clean-path terminate-instance envelope
pub fn terminate_instance_envelope() -> EventEnvelope {
    serde_json::from_value(json!({
        "detail-type": "AWS API Call via CloudTrail",
        "detail": {
            "eventName": "TerminateInstances",
            "eventSource": "ec2.amazonaws.com",
            "requestParameters": {
                "instancesSet": { "items": [{ "instanceId": "i-abc" }] }
            }
        },
        "region": "us-east-1"
    }))
    .unwrap()
}

/// An envelope for a resource type outside the auto-approve list
pub fn delete_bucket_envelope() -> EventEnvelope {
    serde_json::from_value(json!({
        "detail-type": "AWS API Call via CloudTrail",
        "detail": {
            "eventName": "DeleteBucket",
            "eventSource": "s3.amazonaws.com",
            "requestParameters": { "bucketName": "audit-archive" }
        },
        "region": "us-east-1"
    }))
    .unwrap()
}

/// Seed a completed historical incident for the terminate-instance resource,
/// `hours_ago` in the past, carrying the given fingerprint
pub async fn seed_completed_incident(
    store: &RecordingStore,
    fingerprint: &str,
    hours_ago: i64,
) -> String {
    let ctx = aiops_common::IncidentContext {
        correlation_id: aiops_common::types::generate_correlation_id(),
        event_name: "TerminateInstances".to_string(),
        resource_type: ResourceType::Compute,
        resource_id: "i-abc".to_string(),
        region: "us-east-1".to_string(),
        regional_context: None,
        actor: "System".to_string(),
        event_details: json!({"eventName": "TerminateInstances"}),
        event_time: Utc::now(),
    };
    let mut incident = Incident::from_context(&ctx);
    let then = Utc::now() - chrono::Duration::hours(hours_ago);
    incident.incident_timestamp = then;
    incident.created_at = then;
    incident.updated_at = then;
    incident.workflow_state = WorkflowState::Completed;
    incident.fingerprint = Some(fingerprint.to_string());
    incident.classification = Some(aiops_common::Classification::Critical);
    incident.event_classification = Some(EventClassification::Failure);
    store.put(&incident).await.unwrap();
    incident.correlation_id
}

/// Windows that block changes at every hour of every day; used to make the
/// change-window check deterministic in tests
pub fn always_blocked_windows() -> Vec<aiops_common::BlockedWindow> {
    (0..7)
        .map(|day| aiops_common::BlockedWindow {
            day_of_week: day,
            start_hour: 0,
            end_hour: 23,
        })
        .collect()
}
