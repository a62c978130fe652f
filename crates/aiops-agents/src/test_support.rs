//! Hand-rolled collaborator fakes for agent unit tests

use crate::{AgentContext, Collaborators};
use aiops_collab::observability::Datapoint;
use aiops_collab::{
    BroadcastTransport, BuildExecutor, CommandExecutor, EmailTransport, FunctionExecutor,
    LlmClient, ObservabilityClient, PolicyClient, RegionalObservability,
};
use aiops_common::types::generate_correlation_id;
use aiops_common::{Error, Incident, IncidentContext, ResourceType, Result};
use aiops_store::{IncidentStore, MemoryIncidentStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// LLM fake routing canned responses by prompt shape
pub struct FakeLlm {
    pub triage_response: Mutex<String>,
    pub runbook_response: Mutex<String>,
    pub summary_response: Mutex<String>,
    pub fail: AtomicBool,
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
            fail: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl LlmClient for FakeLlm {
    async fn invoke(&self, prompt: &str, _max_tokens: u32, _temperature: f32) -> Result<String> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Network("llm unavailable".into()));
        }
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

/// Observability fake with programmable datapoints, logs, and traces
pub struct FakeObservability {
    pub metric_averages: Mutex<HashMap<String, f64>>,
    pub log_rows: Mutex<Vec<Value>>,
    pub traces: Mutex<Vec<Value>>,
    pub critical_incident_sum: Mutex<f64>,
    pub fail_metrics: AtomicBool,
}

impl FakeObservability {
    pub fn new() -> Self {
        Self {
            metric_averages: Mutex::new(HashMap::new()),
            log_rows: Mutex::new(Vec::new()),
            traces: Mutex::new(Vec::new()),
            critical_incident_sum: Mutex::new(0.0),
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
            return Ok(vec![Datapoint {
                timestamp: end,
                average: 0.0,
                maximum: 0.0,
                minimum: 0.0,
                sum: *self.critical_incident_sum.lock().unwrap(),
            }]);
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
        Ok(self.log_rows.lock().unwrap().clone())
    }

    async fn traces_query(
        &self,
        _expression: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<Value>> {
        Ok(self.traces.lock().unwrap().clone())
    }
}

/// Policy fake with a fixed verdict
pub struct FakePolicy {
    pub verdict: Mutex<Option<bool>>,
    pub fail: AtomicBool,
}

impl FakePolicy {
    pub fn compliant() -> Self {
        Self {
            verdict: Mutex::new(None),
            fail: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl PolicyClient for FakePolicy {
    async fn check_compliance(&self, _: &str, _: &str) -> Result<Option<bool>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Network("policy engine unavailable".into()));
        }
        Ok(*self.verdict.lock().unwrap())
    }
}

/// Mutation executor fake that records every dispatch
pub struct RecordingExecutors {
    pub builds: Mutex<Vec<(String, Vec<(String, String)>)>>,
    pub commands: Mutex<Vec<String>>,
    pub functions: Mutex<Vec<String>>,
    pub fail_builds: AtomicBool,
}

impl RecordingExecutors {
    pub fn new() -> Self {
        Self {
            builds: Mutex::new(Vec::new()),
            commands: Mutex::new(Vec::new()),
            functions: Mutex::new(Vec::new()),
            fail_builds: AtomicBool::new(false),
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
        if self.fail_builds.load(Ordering::SeqCst) {
            return Err(Error::Execution("build service rejected request".into()));
        }
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

/// Bundle of fakes a test can inspect after driving the agents
pub struct FakeCollaborators {
    pub store: Arc<MemoryIncidentStore>,
    pub llm: Arc<FakeLlm>,
    pub observability: Arc<FakeObservability>,
    pub policy: Arc<FakePolicy>,
    pub executors: Arc<RecordingExecutors>,
    pub notifier: Arc<RecordingNotifier>,
}

impl FakeCollaborators {
    /// Baseline fakes for a clean terminate-compute-instance incident
    pub fn healthy_compute_incident() -> Self {
        Self {
            store: Arc::new(MemoryIncidentStore::new()),
            llm: Arc::new(FakeLlm::new()),
            observability: Arc::new(FakeObservability::new()),
            policy: Arc::new(FakePolicy::compliant()),
            executors: Arc::new(RecordingExecutors::new()),
            notifier: Arc::new(RecordingNotifier::new()),
        }
    }
}

/// Assemble the collaborator bundle from fakes
pub fn collaborators(fakes: &FakeCollaborators) -> Collaborators {
    let observability = fakes.observability.clone();
    Collaborators {
        store: fakes.store.clone(),
        llm: fakes.llm.clone(),
        observability: Arc::new(RegionalObservability::new(
            "us-east-1",
            Box::new(move |_region| observability.clone() as Arc<dyn ObservabilityClient>),
        )),
        policy: fakes.policy.clone(),
        build: fakes.executors.clone(),
        command: fakes.executors.clone(),
        function: fakes.executors.clone(),
        email: fakes.notifier.clone(),
        broadcast: fakes.notifier.clone(),
    }
}

/// Build an agent context without persisting anything
pub fn sample_context(
    resource_type: ResourceType,
    resource_id: &str,
    event_name: &str,
) -> AgentContext {
    let incident = IncidentContext {
        correlation_id: generate_correlation_id(),
        event_name: event_name.to_string(),
        resource_type,
        resource_id: resource_id.to_string(),
        region: "us-east-1".to_string(),
        regional_context: None,
        actor: "System".to_string(),
        event_details: json!({
            "eventName": event_name,
            "eventSource": "ec2.amazonaws.com",
            "requestParameters": {
                "instancesSet": { "items": [{ "instanceId": resource_id }] }
            }
        }),
        event_time: Utc::now(),
    };
    AgentContext::new(incident, Vec::new())
}

/// Build a context and seed its incident record into the fake store, the way
/// the engine does before coordination
pub async fn seeded_context(
    fakes: &FakeCollaborators,
    resource_type: ResourceType,
    resource_id: &str,
    event_name: &str,
) -> AgentContext {
    let ctx = sample_context(resource_type, resource_id, event_name);
    let incident = Incident::from_context(&ctx.incident);
    fakes.store.put(&incident).await.unwrap();
    ctx
}
