//! In-memory incident store
//!
//! Backs tests and ephemeral runs. Shares the record semantics of the durable
//! store: JSON records, last-write-wins updates, strict `>` since filters.

use crate::patterns::PatternBaseline;
use crate::{apply_update, decode_incident, IncidentStore};
use aiops_common::{Error, EventClassification, Incident, Result, ResourceType, WorkflowState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Incident store held entirely in process memory
#[derive(Default)]
pub struct MemoryIncidentStore {
    incidents: RwLock<HashMap<String, Value>>,
    patterns: RwLock<HashMap<String, PatternBaseline>>,
}

impl MemoryIncidentStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn collect<F>(&self, filter: F, limit: usize) -> Result<Vec<Incident>>
    where
        F: Fn(&Incident) -> bool,
    {
        let incidents = self.incidents.read().await;
        let mut matched: Vec<Incident> = Vec::new();
        for record in incidents.values() {
            let incident = decode_incident(record.clone())?;
            if filter(&incident) {
                matched.push(incident);
            }
        }
        matched.sort_by(|a, b| b.incident_timestamp.cmp(&a.incident_timestamp));
        matched.truncate(limit);
        Ok(matched)
    }
}

#[async_trait]
impl IncidentStore for MemoryIncidentStore {
    async fn put(&self, incident: &Incident) -> Result<()> {
        let record = serde_json::to_value(incident)?;
        self.incidents
            .write()
            .await
            .insert(incident.correlation_id.clone(), record);
        debug!(correlation_id = %incident.correlation_id, "incident stored");
        Ok(())
    }

    async fn get(&self, correlation_id: &str) -> Result<Option<Incident>> {
        let incidents = self.incidents.read().await;
        incidents
            .get(correlation_id)
            .cloned()
            .map(decode_incident)
            .transpose()
    }

    async fn update_state(
        &self,
        correlation_id: &str,
        state: WorkflowState,
        data: Option<Map<String, Value>>,
    ) -> Result<()> {
        let mut incidents = self.incidents.write().await;
        let record = incidents
            .get_mut(correlation_id)
            .ok_or_else(|| Error::Store(format!("unknown incident: {correlation_id}")))?;
        apply_update(record, Some(state), data.as_ref())?;
        Ok(())
    }

    async fn merge(&self, correlation_id: &str, data: Map<String, Value>) -> Result<()> {
        let mut incidents = self.incidents.write().await;
        let record = incidents
            .get_mut(correlation_id)
            .ok_or_else(|| Error::Store(format!("unknown incident: {correlation_id}")))?;
        apply_update(record, None, Some(&data))?;
        Ok(())
    }

    async fn query_recent_by_resource(
        &self,
        resource_key: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Incident>> {
        self.collect(
            |incident| incident.resource_key == resource_key && incident.incident_timestamp > since,
            limit,
        )
        .await
    }

    async fn query_by_resource_type(
        &self,
        resource_type: ResourceType,
        classification: Option<EventClassification>,
        state: WorkflowState,
        limit: usize,
    ) -> Result<Vec<Incident>> {
        self.collect(
            |incident| {
                incident.resource_type == resource_type
                    && incident.workflow_state == state
                    && classification
                        .map(|c| incident.event_classification == Some(c))
                        .unwrap_or(true)
            },
            limit,
        )
        .await
    }

    async fn scan_by_fingerprint(
        &self,
        fingerprint: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Incident>> {
        self.collect(
            |incident| {
                incident.fingerprint.as_deref() == Some(fingerprint)
                    && incident.incident_timestamp > since
            },
            limit,
        )
        .await
    }

    async fn get_pattern(&self, key: &str) -> Result<Option<PatternBaseline>> {
        Ok(self.patterns.read().await.get(key).cloned())
    }

    async fn upsert_pattern(&self, key: &str, count: f64) -> Result<PatternBaseline> {
        let mut patterns = self.patterns.write().await;
        let now = Utc::now();
        let updated = match patterns.get(key) {
            Some(existing) => existing.update(count, now),
            None => PatternBaseline::new(count, now),
        };
        patterns.insert(key.to_string(), updated.clone());
        Ok(updated)
    }
}
