//! Incident and pattern persistence for the AIOps incident engine
//!
//! The store is the exclusive owner of incident persistence. Records are
//! keyed by correlation id with secondary indexes on `(resource_key,
//! incident_timestamp)`, `(resource_type, incident_timestamp)` and
//! `(fingerprint, incident_timestamp)`. All operations are idempotent on the
//! correlation id and fail with retryable `Store` errors on backend trouble.

use aiops_common::{Error, EventClassification, Incident, Result, ResourceType, WorkflowState};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;

pub mod memory;
pub mod patterns;
pub mod sled_store;

pub use memory::MemoryIncidentStore;
pub use patterns::PatternBaseline;
pub use sled_store::SledIncidentStore;

/// Durable key/value store of incidents plus pattern baselines
#[async_trait]
pub trait IncidentStore: Send + Sync {
    /// Initial write of a fresh incident (state DETECTING)
    async fn put(&self, incident: &Incident) -> Result<()>;

    /// Fetch one incident by correlation id
    async fn get(&self, correlation_id: &str) -> Result<Option<Incident>>;

    /// Set the workflow state (last-write-wins) and merge additional flat
    /// attributes; bumps `updated_at`
    async fn update_state(
        &self,
        correlation_id: &str,
        state: WorkflowState,
        data: Option<Map<String, Value>>,
    ) -> Result<()>;

    /// Merge flat attributes without touching the workflow state; bumps
    /// `updated_at`. Used by agents persisting their result slots.
    async fn merge(&self, correlation_id: &str, data: Map<String, Value>) -> Result<()>;

    /// Most recent incidents for a resource key strictly after `since`,
    /// newest first. Used by the cooldown gate.
    async fn query_recent_by_resource(
        &self,
        resource_key: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Incident>>;

    /// Incidents of a resource type in a given state, optionally filtered by
    /// event classification, newest first. Used for historical context.
    async fn query_by_resource_type(
        &self,
        resource_type: ResourceType,
        classification: Option<EventClassification>,
        state: WorkflowState,
        limit: usize,
    ) -> Result<Vec<Incident>>;

    /// Incidents sharing a fingerprint strictly after `since`, newest first.
    /// Used by triage deduplication.
    async fn scan_by_fingerprint(
        &self,
        fingerprint: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Incident>>;

    /// Load a pattern baseline by `log_group#pattern` key
    async fn get_pattern(&self, key: &str) -> Result<Option<PatternBaseline>>;

    /// Fold a new observation into a pattern baseline (EMA) and return the
    /// updated baseline
    async fn upsert_pattern(&self, key: &str, count: f64) -> Result<PatternBaseline>;
}

/// Open the durable store at the configured path
pub fn open_store(path: &Path) -> Result<Arc<dyn IncidentStore>> {
    Ok(Arc::new(SledIncidentStore::open(path)?))
}

/// Timestamp format used in index keys: fixed width, lexicographically
/// ordered
pub(crate) fn index_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Apply a state change and/or attribute merge to a JSON incident record
pub(crate) fn apply_update(
    record: &mut Value,
    state: Option<WorkflowState>,
    data: Option<&Map<String, Value>>,
) -> Result<()> {
    let object = record
        .as_object_mut()
        .ok_or_else(|| Error::Store("incident record is not an object".to_string()))?;

    if let Some(state) = state {
        object.insert(
            "workflow_state".to_string(),
            Value::String(state.as_str().to_string()),
        );
    }
    if let Some(data) = data {
        for (key, value) in data {
            object.insert(key.clone(), value.clone());
        }
    }
    object.insert(
        "updated_at".to_string(),
        serde_json::to_value(Utc::now())?,
    );
    Ok(())
}

/// Deserialize a JSON record back into an incident
pub(crate) fn decode_incident(value: Value) -> Result<Incident> {
    serde_json::from_value(value).map_err(|e| Error::Store(format!("corrupt incident record: {e}")))
}
